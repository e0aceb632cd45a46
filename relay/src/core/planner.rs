//! Planner seam and the default docs-first planner.

use serde::{Deserialize, Serialize};

/// Plan produced before the loop starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanBundle {
    pub plan_steps: Vec<String>,
    pub creative_alternatives: Vec<String>,
    pub acceptance_checks: Vec<String>,
}

pub trait Planner {
    fn plan(&self, objective: &str, docs: &[String]) -> PlanBundle;
}

/// Fixed five-step plan that always starts from the referenced docs.
pub struct DocsFirstPlanner;

impl Planner for DocsFirstPlanner {
    fn plan(&self, objective: &str, docs: &[String]) -> PlanBundle {
        let doc_step = if docs.is_empty() {
            "Collect missing docs/spec links before implementation"
        } else {
            "Review referenced docs and extract constraints"
        };
        let plan_steps = [
            doc_step,
            "Draft implementation plan with milestones",
            "Implement smallest vertical slice",
            "Run verification checks and inspect diffs",
            "Prepare rollout notes and next iteration tasks",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let creative_alternatives = vec![
            "Use a strict deterministic mode for lower cost and higher reproducibility".to_string(),
            "Use a creative exploration mode for ideation, then switch to strict mode for execution"
                .to_string(),
        ];

        let mut acceptance_checks = vec![
            "All changed files compile or parse cleanly".to_string(),
            "Relevant test command completes successfully".to_string(),
            "Handoff packet includes unresolved risks and next actions".to_string(),
        ];
        let lowered = objective.to_lowercase();
        if lowered.contains("ui") || lowered.contains("preview") {
            acceptance_checks
                .push("Preview reflects expected UI behavior on desktop and mobile".to_string());
        }

        PlanBundle {
            plan_steps,
            creative_alternatives,
            acceptance_checks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_depends_on_docs() {
        let with_docs = DocsFirstPlanner.plan("build", &["README.md".to_string()]);
        assert_eq!(
            with_docs.plan_steps[0],
            "Review referenced docs and extract constraints"
        );
        let without = DocsFirstPlanner.plan("build", &[]);
        assert_eq!(
            without.plan_steps[0],
            "Collect missing docs/spec links before implementation"
        );
        assert_eq!(without.plan_steps.len(), 5);
    }

    #[test]
    fn preview_objectives_get_ui_check() {
        let plan = DocsFirstPlanner.plan("Build preview pane", &[]);
        assert_eq!(plan.acceptance_checks.len(), 4);
        let plan = DocsFirstPlanner.plan("Refactor storage", &[]);
        assert_eq!(plan.acceptance_checks.len(), 3);
    }
}
