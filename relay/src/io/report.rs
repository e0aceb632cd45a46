//! Human-readable report and public summary for a finalized session.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::document::StateDocument;
use crate::io::store::SessionStore;

const RUN_REPORT_TEMPLATE: &str = include_str!("templates/run_report.md");

pub const REPORT_FILE: &str = "run_report.md";
pub const PUBLIC_SUMMARY_KEY: &str = "public_summary";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportPaths {
    pub report_path: String,
    pub public_summary_path: String,
}

pub fn render_run_report(
    doc: &StateDocument,
    handoff_count: usize,
    checkpoint_count: usize,
) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("run_report", RUN_REPORT_TEMPLATE)
        .context("load run report template")?;
    let template = env.get_template("run_report")?;
    let rendered = template
        .render(context! {
            objective => &doc.run_state.objective,
            status => doc.status.as_str(),
            lineage => &doc.session_lineage,
            handoff_count => handoff_count,
            checkpoint_count => checkpoint_count,
            context => &doc.context,
            readable_docs => doc.readable_docs(),
            total_docs => doc.doc_evidence.len(),
            completed => &doc.run_state.completed_steps,
            remaining => doc.remaining_steps(),
            skills => &doc.run_state.retrieved_skills,
            verification => &doc.run_state.verification_results,
            pause_reason => (!doc.pause_reason.is_empty()).then_some(doc.pause_reason.as_str()),
        })
        .context("render run report")?;
    Ok(rendered)
}

/// Write the report and the public summary next to the state document.
pub fn write_reports(
    store: &dyn SessionStore,
    session_id: &str,
    doc: &StateDocument,
    handoff_count: usize,
    checkpoint_count: usize,
) -> Result<ReportPaths> {
    let report = render_run_report(doc, handoff_count, checkpoint_count)?;
    let report_path = store
        .put_text(session_id, REPORT_FILE, &report)
        .context("write run report")?;

    let summary = serde_json::to_value(doc.public_summary(handoff_count))
        .context("serialize public summary")?;
    let public_summary_path = store
        .put_snapshot(session_id, PUBLIC_SUMMARY_KEY, &summary)
        .context("write public summary")?;

    debug!(session_id, report = %report_path, "reports written");
    Ok(ReportPaths {
        report_path,
        public_summary_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::STATE_DOCUMENT_VERSION;
    use crate::core::planner::PlanBundle;
    use crate::core::prompt::{PersonaProfile, PromptConfiguration};
    use crate::core::run_state::RunState;
    use crate::core::tracker::{Thresholds, TokenBudgetTracker};
    use crate::core::types::{CommandStatus, RiskLevel, RunStatus, VerificationResult};
    use crate::io::store::FsSessionStore;

    fn document() -> StateDocument {
        let plan = PlanBundle {
            plan_steps: vec!["a".to_string(), "b".to_string()],
            creative_alternatives: Vec::new(),
            acceptance_checks: Vec::new(),
        };
        let mut state = RunState::fresh("ship it", &plan);
        state.mark_completed("a");
        state.refresh_next_actions();
        state.verification_results.push(VerificationResult {
            command: "cargo test".to_string(),
            return_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 5,
            status: CommandStatus::Executed,
            risk_level: RiskLevel::Low,
        });
        StateDocument {
            schema_version: STATE_DOCUMENT_VERSION.to_string(),
            run_state: state,
            session_lineage: vec!["session_a".to_string()],
            prompt_configuration: PromptConfiguration::new("", "", PersonaProfile::default(), "ship it"),
            doc_evidence: Vec::new(),
            context: TokenBudgetTracker::new(100, Thresholds::default()).snapshot(),
            status: RunStatus::Paused,
            pause_reason: "runtime_budget".to_string(),
        }
    }

    #[test]
    fn report_lists_progress_verification_and_pause() {
        let report = render_run_report(&document(), 0, 1).expect("render");
        assert!(report.contains("## Objective\nship it"));
        assert!(report.contains("- Completed steps:\n  - a"));
        assert!(report.contains("- Remaining steps:\n  - b"));
        assert!(report.contains("`cargo test` -> code=0, status=executed, risk=low"));
        assert!(report.contains("- Reason: runtime_budget"));
    }

    #[test]
    fn summary_matches_state_document() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FsSessionStore::new(temp.path());
        let session = store.create_session("ship it", None).expect("create").session_id;
        let doc = document();

        let paths = write_reports(&store, &session, &doc, 2, 1).expect("write");
        let summary = store.read_located(&paths.public_summary_path).expect("read");
        assert_eq!(summary["completed_steps"], serde_json::json!(["a"]));
        assert_eq!(summary["remaining_steps"], serde_json::json!(["b"]));
        assert_eq!(summary["handoff_count"], 2);
        assert_eq!(summary["status"], "paused");
        assert_eq!(summary["context"]["status"], "ok");
        assert!(std::path::Path::new(&paths.report_path).is_file());
    }
}
