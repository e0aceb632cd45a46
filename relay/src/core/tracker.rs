//! Context budget tracking for one session's conversational window.
//!
//! Costs are a length heuristic (roughly four characters per token), not a
//! real tokenizer. The tracker is append-only between compactions; the only
//! way usage goes down is [`TokenBudgetTracker::reset_with_seed`].

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::TrackerStatus;

const CHARS_PER_TOKEN: u64 = 4;
const SUMMARY_ROLE: &str = "system";
const USER_ROLE: &str = "user";

/// Marker prefix of the synthetic event produced by compaction.
pub const COMPACTION_MARKER: &str = "[compacted_context]";
const COMPACTION_PROSE: &str = "Preserved latent state for assistant/tool activity.";

/// Estimate the cost of `text`. Never zero.
pub fn estimate_cost(text: &str) -> u64 {
    (text.chars().count() as u64 / CHARS_PER_TOKEN).max(1)
}

/// One recorded event. Cost is computed once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationalEvent {
    role: String,
    content: String,
    estimated_cost: u64,
}

impl ConversationalEvent {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            estimated_cost: estimate_cost(content),
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn estimated_cost(&self) -> u64 {
        self.estimated_cost
    }
}

/// Role/content pair replayed into a fresh tracker window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedEvent {
    pub role: String,
    pub content: String,
}

impl From<&ConversationalEvent> for SeedEvent {
    fn from(event: &ConversationalEvent) -> Self {
        Self {
            role: event.role.clone(),
            content: event.content.clone(),
        }
    }
}

/// Usage ratios at which the status escalates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub warn: f64,
    pub rollover: f64,
    pub hard_stop: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn: 0.70,
            rollover: 0.85,
            hard_stop: 0.95,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        if !(self.warn > 0.0 && self.warn < self.rollover && self.rollover < self.hard_stop) {
            return Err(anyhow!(
                "thresholds must be strictly ascending and positive (warn={}, rollover={}, hard_stop={})",
                self.warn,
                self.rollover,
                self.hard_stop
            ));
        }
        if self.hard_stop > 1.0 {
            return Err(anyhow!("thresholds.hard_stop must be <= 1.0"));
        }
        Ok(())
    }
}

/// Round a usage ratio to three decimals for persisted documents.
pub fn round_ratio(ratio: f64) -> f64 {
    (ratio * 1000.0).round() / 1000.0
}

/// Point-in-time view of the tracker, embedded in checkpoints and state documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub max_tokens: i64,
    pub used_tokens: u64,
    /// Rounded to three decimals.
    pub usage_ratio: f64,
    pub status: TrackerStatus,
}

#[derive(Debug, Clone)]
pub struct TokenBudgetTracker {
    max_budget: i64,
    thresholds: Thresholds,
    used_budget: u64,
    events: Vec<ConversationalEvent>,
}

impl TokenBudgetTracker {
    pub fn new(max_budget: i64, thresholds: Thresholds) -> Self {
        Self {
            max_budget,
            thresholds,
            used_budget: 0,
            events: Vec::new(),
        }
    }

    pub fn max_budget(&self) -> i64 {
        self.max_budget
    }

    pub fn used_budget(&self) -> u64 {
        self.used_budget
    }

    pub fn events(&self) -> &[ConversationalEvent] {
        &self.events
    }

    /// `used / max`, saturating at 1.0 when the budget is not positive.
    pub fn usage_ratio(&self) -> f64 {
        if self.max_budget <= 0 {
            return 1.0;
        }
        self.used_budget as f64 / self.max_budget as f64
    }

    pub fn status(&self) -> TrackerStatus {
        let ratio = self.usage_ratio();
        if ratio >= self.thresholds.hard_stop {
            TrackerStatus::HardStop
        } else if ratio >= self.thresholds.rollover {
            TrackerStatus::Rollover
        } else if ratio >= self.thresholds.warn {
            TrackerStatus::Warn
        } else {
            TrackerStatus::Ok
        }
    }

    /// Append an event and return the resulting status.
    pub fn record(&mut self, role: &str, content: &str) -> TrackerStatus {
        let event = ConversationalEvent::new(role, content);
        self.used_budget += event.estimated_cost;
        self.events.push(event);
        self.status()
    }

    /// Keep every user event verbatim and fold everything else into one summary.
    ///
    /// The summary leads with the elided event count and cost; only the prose
    /// tail is clipped. Its cost never exceeds the cost it replaces. Windows
    /// too small for the marked form get a terse `events=N tokens=M` line.
    pub fn compact_window(&self) -> Vec<SeedEvent> {
        let elided: Vec<&ConversationalEvent> = self
            .events
            .iter()
            .filter(|event| event.role != USER_ROLE)
            .collect();
        if elided.is_empty() {
            return self.events.iter().map(SeedEvent::from).collect();
        }

        let count = elided.len();
        let elided_cost: u64 = elided.iter().map(|event| event.estimated_cost).sum();
        // longest text costing no more than the elided events, and one token less
        let budget_chars = (elided_cost * CHARS_PER_TOKEN + CHARS_PER_TOKEN - 1) as usize;
        let cheaper_chars = budget_chars.saturating_sub(CHARS_PER_TOKEN as usize);

        let facts = format!("{COMPACTION_MARKER} events={count}, tokens={elided_cost}.");
        let summary = if facts.chars().count() <= budget_chars {
            let keep = cheaper_chars.max(facts.chars().count());
            let clipped: String = format!("{facts} {COMPACTION_PROSE}").chars().take(keep).collect();
            clipped.trim_end().to_string()
        } else {
            let terse = format!("events={count} tokens={elided_cost}");
            if terse.chars().count() <= budget_chars {
                terse
            } else {
                // at most three tokens elided, so both numbers are single digits
                format!("e{count} t{elided_cost}")
            }
        };

        let mut compacted: Vec<SeedEvent> = self
            .events
            .iter()
            .filter(|event| event.role == USER_ROLE)
            .map(SeedEvent::from)
            .collect();
        compacted.push(SeedEvent {
            role: SUMMARY_ROLE.to_string(),
            content: summary,
        });
        compacted
    }

    /// Clear the window and replay `seed` through [`Self::record`].
    pub fn reset_with_seed(&mut self, seed: &[SeedEvent]) {
        self.events.clear();
        self.used_budget = 0;
        for item in seed {
            self.record(&item.role, &item.content);
        }
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            max_tokens: self.max_budget,
            used_tokens: self.used_budget,
            usage_ratio: round_ratio(self.usage_ratio()),
            status: self.status(),
        }
    }
}
