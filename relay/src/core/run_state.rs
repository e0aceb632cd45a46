//! Canonical run state and the merge applied when a run resumes.
//!
//! `RunState` is the unit that is checkpointed, handed off and resumed. Its
//! schema is explicit: unknown fields in older documents are dropped on load
//! rather than carried forward.

use serde::{Deserialize, Serialize};

use crate::core::planner::PlanBundle;
use crate::core::types::VerificationResult;

pub const RUN_STATE_SCHEMA_VERSION: u32 = 1;

const DOCS_FIRST_DECISION: &str = "Applied docs-first planning policy before implementation.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub objective: String,
    pub plan_steps: Vec<String>,
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    /// Derived: `plan_steps - completed_steps`, plan order preserved.
    #[serde(default)]
    pub next_actions: Vec<String>,
    #[serde(default)]
    pub changed_files: Vec<String>,
    #[serde(default)]
    pub acceptance_checks: Vec<String>,
    #[serde(default)]
    pub verification_results: Vec<VerificationResult>,
    #[serde(default)]
    pub retrieved_skills: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

fn default_schema_version() -> u32 {
    RUN_STATE_SCHEMA_VERSION
}

/// Prior progress a run resumes from, already reduced to typed state.
///
/// Session and checkpoint resumes both produce this shape, so the loop never
/// needs to know which path was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeSeed {
    pub prior: RunState,
    pub lineage: Vec<String>,
    pub doc_sources: Vec<String>,
    /// Session the resumed progress came from; becomes the new session's parent.
    pub parent_session_id: String,
    /// Decision line recorded in the new state, e.g. "Resumed from session 'x'.".
    pub note: String,
}

impl RunState {
    /// Fresh state for a run with no prior progress.
    pub fn fresh(objective: &str, plan: &PlanBundle) -> Self {
        let mut state = Self {
            schema_version: RUN_STATE_SCHEMA_VERSION,
            objective: objective.to_string(),
            plan_steps: plan.plan_steps.clone(),
            completed_steps: Vec::new(),
            decisions: vec![DOCS_FIRST_DECISION.to_string()],
            risks: Vec::new(),
            next_actions: Vec::new(),
            changed_files: Vec::new(),
            acceptance_checks: plan.acceptance_checks.clone(),
            verification_results: Vec::new(),
            retrieved_skills: Vec::new(),
            notes: Vec::new(),
        };
        state.refresh_next_actions();
        state
    }

    /// Seed a new state from prior progress.
    ///
    /// Plan, progress, decisions, risks, changed files and next actions carry
    /// over exactly; acceptance checks are the union (planner's first).
    /// Verification results, skills and notes belong to the new run.
    pub fn resumed(objective: &str, plan: &PlanBundle, seed: &ResumeSeed) -> Self {
        let prior = &seed.prior;
        let plan_steps = if prior.plan_steps.is_empty() {
            plan.plan_steps.clone()
        } else {
            prior.plan_steps.clone()
        };
        let completed_steps = prior
            .completed_steps
            .iter()
            .filter(|step| plan_steps.contains(step))
            .cloned()
            .collect();

        let mut decisions = prior.decisions.clone();
        decisions.push(DOCS_FIRST_DECISION.to_string());
        decisions.push(seed.note.clone());

        let mut acceptance_checks = plan.acceptance_checks.clone();
        for check in &prior.acceptance_checks {
            if !acceptance_checks.contains(check) {
                acceptance_checks.push(check.clone());
            }
        }

        let carried_plan = !prior.plan_steps.is_empty();
        let mut state = Self {
            schema_version: RUN_STATE_SCHEMA_VERSION,
            objective: objective.to_string(),
            plan_steps,
            completed_steps,
            decisions,
            risks: prior.risks.clone(),
            next_actions: prior.next_actions.clone(),
            changed_files: prior.changed_files.clone(),
            acceptance_checks,
            verification_results: Vec::new(),
            retrieved_skills: Vec::new(),
            notes: Vec::new(),
        };
        if !carried_plan {
            state.refresh_next_actions();
        }
        state
    }

    /// Plan steps not yet completed, in plan order.
    pub fn remaining_steps(&self) -> Vec<String> {
        self.plan_steps
            .iter()
            .filter(|step| !self.completed_steps.contains(step))
            .cloned()
            .collect()
    }

    pub fn refresh_next_actions(&mut self) {
        self.next_actions = self.remaining_steps();
    }

    /// Mark `step` completed. Returns false if it already was.
    pub fn mark_completed(&mut self, step: &str) -> bool {
        if self.completed_steps.iter().any(|done| done == step) {
            return false;
        }
        self.completed_steps.push(step.to_string());
        true
    }

    pub fn record_decision(&mut self, decision: impl Into<String>) {
        self.decisions.push(decision.into());
    }

    pub fn record_risk(&mut self, risk: impl Into<String>) {
        self.risks.push(risk.into());
    }

    pub fn verification_failures(&self) -> Vec<String> {
        self.verification_results
            .iter()
            .filter(|result| result.failed())
            .map(|result| result.command.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(steps: &[&str], checks: &[&str]) -> PlanBundle {
        PlanBundle {
            plan_steps: steps.iter().map(|s| s.to_string()).collect(),
            creative_alternatives: vec!["alt".to_string()],
            acceptance_checks: checks.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn seed(prior: RunState) -> ResumeSeed {
        ResumeSeed {
            prior,
            lineage: vec!["session_a".to_string()],
            doc_sources: Vec::new(),
            parent_session_id: "session_a".to_string(),
            note: "Resumed from session 'session_a'.".to_string(),
        }
    }

    #[test]
    fn fresh_state_derives_next_actions_from_plan() {
        let state = RunState::fresh("obj", &plan(&["a", "b"], &["tests"]));
        assert_eq!(state.next_actions, vec!["a", "b"]);
        assert_eq!(state.decisions, vec![DOCS_FIRST_DECISION]);
    }

    #[test]
    fn mark_completed_is_idempotent_and_order_preserving() {
        let mut state = RunState::fresh("obj", &plan(&["a", "b", "c"], &[]));
        assert!(state.mark_completed("b"));
        assert!(!state.mark_completed("b"));
        state.refresh_next_actions();
        assert_eq!(state.next_actions, vec!["a", "c"]);
    }

    #[test]
    fn resumed_state_keeps_prior_progress_and_next_actions() {
        let mut prior = RunState::fresh("obj", &plan(&["a", "b", "c"], &["old check"]));
        prior.mark_completed("a");
        prior.refresh_next_actions();
        prior.record_risk("flaky test");
        prior.changed_files.push("src/lib.rs".to_string());

        let state = RunState::resumed("obj", &plan(&["x", "y"], &["new check"]), &seed(prior));
        assert_eq!(state.plan_steps, vec!["a", "b", "c"]);
        assert_eq!(state.completed_steps, vec!["a"]);
        assert_eq!(state.next_actions, vec!["b", "c"]);
        assert_eq!(state.risks, vec!["flaky test"]);
        assert_eq!(state.changed_files, vec!["src/lib.rs"]);
        assert_eq!(state.acceptance_checks, vec!["new check", "old check"]);
        assert_eq!(
            state.decisions.last().map(String::as_str),
            Some("Resumed from session 'session_a'.")
        );
    }

    #[test]
    fn resumed_state_uses_planner_steps_when_prior_plan_missing() {
        let prior = RunState {
            plan_steps: Vec::new(),
            ..RunState::fresh("obj", &plan(&[], &[]))
        };
        let state = RunState::resumed("obj", &plan(&["x"], &[]), &seed(prior));
        assert_eq!(state.plan_steps, vec!["x"]);
        assert_eq!(state.next_actions, vec!["x"]);
    }

    #[test]
    fn unknown_legacy_fields_are_dropped() {
        let raw = r#"{
            "objective": "obj",
            "plan_steps": ["a"],
            "completed_steps": ["a"],
            "legacy_vibe_next_steps": ["ignored"]
        }"#;
        let state: RunState = serde_json::from_str(raw).expect("parse");
        assert_eq!(state.schema_version, RUN_STATE_SCHEMA_VERSION);
        let reencoded = serde_json::to_string(&state).expect("serialize");
        assert!(!reencoded.contains("legacy_vibe_next_steps"));
    }
}
