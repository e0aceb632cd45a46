//! Shared deterministic types for relay core logic.
//!
//! These types define stable contracts between core components and the
//! persisted documents. They must not depend on external state or I/O.

use serde::{Deserialize, Serialize};

/// Context budget classification returned by the tracker.
///
/// Variants are declared in escalation order so `Ord` follows severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    Ok,
    Warn,
    Rollover,
    HardStop,
}

impl TrackerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackerStatus::Ok => "ok",
            TrackerStatus::Warn => "warn",
            TrackerStatus::Rollover => "rollover",
            TrackerStatus::HardStop => "hard_stop",
        }
    }

    /// True when the orchestrator must run the handoff protocol.
    pub fn requires_handoff(self) -> bool {
        matches!(self, TrackerStatus::Rollover | TrackerStatus::HardStop)
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Preflight failed; nothing beyond a timeline entry was persisted.
    Blocked,
    /// A budget, guardrail or verification failure paused the run.
    Paused,
    /// Every plan step is complete.
    Completed,
    /// The iteration budget ran out with steps remaining.
    Incomplete,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Blocked => "blocked",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
        }
    }
}

/// Why a run paused. Serialized as the stable reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    RuntimeBudget,
    HandoffBudget,
    ContextRollover,
    ContextHardStop,
    VerificationFailure,
}

impl PauseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PauseReason::RuntimeBudget => "runtime_budget",
            PauseReason::HandoffBudget => "handoff_budget",
            PauseReason::ContextRollover => "context_rollover",
            PauseReason::ContextHardStop => "context_hard_stop",
            PauseReason::VerificationFailure => "verification_failure",
        }
    }

    /// Pause reason for a handoff triggered by `status`, if any.
    pub fn for_context(status: TrackerStatus) -> Option<Self> {
        match status {
            TrackerStatus::Rollover => Some(PauseReason::ContextRollover),
            TrackerStatus::HardStop => Some(PauseReason::ContextHardStop),
            TrackerStatus::Ok | TrackerStatus::Warn => None,
        }
    }
}

/// Whether a verification command actually ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Executed,
    Blocked,
}

/// Static risk classification of a shell command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Outcome of one verification command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub command: String,
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub status: CommandStatus,
    pub risk_level: RiskLevel,
}

impl VerificationResult {
    /// Blocked commands count as failures, same as a non-zero exit.
    pub fn failed(&self) -> bool {
        self.return_code != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocKind {
    File,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    Ok,
    Error,
}

/// Evidence that a referenced document was (or was not) read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocEvidence {
    pub source: String,
    pub kind: DocKind,
    pub status: DocStatus,
    pub char_count: usize,
    pub excerpt: String,
    #[serde(default)]
    pub error: String,
}

impl DocEvidence {
    pub fn is_readable(&self) -> bool {
        self.status == DocStatus::Ok
    }
}

/// Policy flags deciding whether exhaustion events pause the run for review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Guardrails {
    pub pause_on_handoff: bool,
    pub pause_on_verification_failure: bool,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            pause_on_handoff: true,
            pause_on_verification_failure: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_status_orders_by_severity() {
        assert!(TrackerStatus::Ok < TrackerStatus::Warn);
        assert!(TrackerStatus::Warn < TrackerStatus::Rollover);
        assert!(TrackerStatus::Rollover < TrackerStatus::HardStop);
        assert!(!TrackerStatus::Warn.requires_handoff());
        assert!(TrackerStatus::HardStop.requires_handoff());
    }

    #[test]
    fn pause_reason_codes_are_stable() {
        let json = serde_json::to_string(&PauseReason::ContextHardStop).expect("serialize");
        assert_eq!(json, "\"context_hard_stop\"");
        assert_eq!(
            PauseReason::for_context(TrackerStatus::Rollover).map(PauseReason::as_str),
            Some("context_rollover")
        );
        assert_eq!(PauseReason::for_context(TrackerStatus::Warn), None);
    }
}
