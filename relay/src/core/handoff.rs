//! Handoff packet construction.
//!
//! A packet is everything a fresh session needs to continue a run without
//! replaying the previous session's history. Packets are built here and
//! persisted by the orchestrator; once written they are never modified.

use serde::{Deserialize, Serialize};

use crate::core::prompt::PromptConfiguration;
use crate::core::run_state::RunState;
use crate::core::tracker::{TokenBudgetTracker, round_ratio};
use crate::core::types::{TrackerStatus, VerificationResult};

pub const HANDOFF_SCHEMA_VERSION: &str = "1.0.0";

const RESUME_INSTRUCTIONS: [&str; 3] = [
    "Start new session with this handoff packet as mandatory context.",
    "Continue from remaining plan steps before adding new scope.",
    "Re-run acceptance checks after next implementation batch.",
];

/// Storage key for the `sequence`-th packet (1-based).
pub fn handoff_key(sequence: u32) -> String {
    format!("handoff_packet_{sequence:03}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub completed_steps: Vec<String>,
    pub remaining_steps: Vec<String>,
    pub usage_ratio: f64,
    pub context_status: TrackerStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffPacket {
    pub schema_version: String,
    pub generated_at: String,
    /// Tracker status that triggered the handoff, e.g. `context_rollover`.
    pub reason: String,
    pub session_id: String,
    pub parent_session_id: Option<String>,
    pub objective: String,
    pub prompt_configuration: PromptConfiguration,
    pub progress_snapshot: ProgressSnapshot,
    pub changed_files: Vec<String>,
    pub decisions: Vec<String>,
    pub risks: Vec<String>,
    pub acceptance_checks: Vec<String>,
    pub verification: Vec<VerificationResult>,
    pub next_actions: Vec<String>,
    pub resume_instructions: Vec<String>,
}

/// Identity of the session emitting a packet.
#[derive(Debug, Clone, Copy)]
pub struct HandoffOrigin<'a> {
    pub session_id: &'a str,
    pub parent_session_id: Option<&'a str>,
    pub generated_at: &'a str,
}

pub fn build_handoff_packet(
    origin: HandoffOrigin<'_>,
    reason: TrackerStatus,
    state: &RunState,
    prompt: &PromptConfiguration,
    tracker: &TokenBudgetTracker,
) -> HandoffPacket {
    HandoffPacket {
        schema_version: HANDOFF_SCHEMA_VERSION.to_string(),
        generated_at: origin.generated_at.to_string(),
        reason: format!("context_{}", reason.as_str()),
        session_id: origin.session_id.to_string(),
        parent_session_id: origin.parent_session_id.map(str::to_string),
        objective: state.objective.clone(),
        prompt_configuration: prompt.clone(),
        progress_snapshot: ProgressSnapshot {
            completed_steps: state.completed_steps.clone(),
            remaining_steps: state.remaining_steps(),
            usage_ratio: round_ratio(tracker.usage_ratio()),
            context_status: tracker.status(),
        },
        changed_files: state.changed_files.clone(),
        decisions: state.decisions.clone(),
        risks: state.risks.clone(),
        acceptance_checks: state.acceptance_checks.clone(),
        verification: state.verification_results.clone(),
        next_actions: state.next_actions.clone(),
        resume_instructions: RESUME_INSTRUCTIONS.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::planner::PlanBundle;
    use crate::core::prompt::PersonaProfile;
    use crate::core::tracker::Thresholds;

    #[test]
    fn packet_captures_progress_and_tracker_state() {
        let plan = PlanBundle {
            plan_steps: vec!["a".to_string(), "b".to_string()],
            creative_alternatives: Vec::new(),
            acceptance_checks: vec!["tests pass".to_string()],
        };
        let mut state = RunState::fresh("ship it", &plan);
        state.mark_completed("a");
        state.refresh_next_actions();

        let mut tracker = TokenBudgetTracker::new(100, Thresholds::default());
        tracker.record("assistant", &"x".repeat(360));

        let prompt = PromptConfiguration::new("be careful", "", PersonaProfile::default(), "ship it");
        let packet = build_handoff_packet(
            HandoffOrigin {
                session_id: "session_b",
                parent_session_id: Some("session_a"),
                generated_at: "2026-01-01T00:00:00Z",
            },
            TrackerStatus::Rollover,
            &state,
            &prompt,
            &tracker,
        );

        assert_eq!(packet.schema_version, HANDOFF_SCHEMA_VERSION);
        assert_eq!(packet.reason, "context_rollover");
        assert_eq!(packet.parent_session_id.as_deref(), Some("session_a"));
        assert_eq!(packet.progress_snapshot.completed_steps, vec!["a"]);
        assert_eq!(packet.progress_snapshot.remaining_steps, vec!["b"]);
        assert_eq!(packet.progress_snapshot.usage_ratio, 0.9);
        assert_eq!(packet.progress_snapshot.context_status, TrackerStatus::Rollover);
        assert_eq!(packet.next_actions, vec!["b"]);
        assert_eq!(packet.resume_instructions.len(), 3);
    }

    #[test]
    fn keys_are_zero_padded() {
        assert_eq!(handoff_key(1), "handoff_packet_001");
        assert_eq!(handoff_key(12), "handoff_packet_012");
    }
}
