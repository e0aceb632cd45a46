//! Persisted end-of-session documents.
//!
//! The state document, the public summary and the markdown report are all
//! derived from one [`StateDocument`] value so they cannot disagree about
//! progress or context status.

use serde::{Deserialize, Serialize};

use crate::core::prompt::PromptConfiguration;
use crate::core::run_state::RunState;
use crate::core::tracker::TrackerSnapshot;
use crate::core::types::{DocEvidence, RunStatus};

pub const STATE_DOCUMENT_VERSION: &str = "1";

/// Snapshot key of the latest state document inside a session.
pub const STATE_KEY: &str = "state";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub schema_version: String,
    pub run_state: RunState,
    pub session_lineage: Vec<String>,
    pub prompt_configuration: PromptConfiguration,
    pub doc_evidence: Vec<DocEvidence>,
    pub context: TrackerSnapshot,
    pub status: RunStatus,
    /// Empty when the run was not paused.
    #[serde(default)]
    pub pause_reason: String,
}

impl StateDocument {
    pub fn remaining_steps(&self) -> Vec<String> {
        self.run_state.remaining_steps()
    }

    pub fn readable_docs(&self) -> usize {
        self.doc_evidence.iter().filter(|doc| doc.is_readable()).count()
    }

    pub fn doc_sources(&self) -> Vec<String> {
        self.doc_evidence.iter().map(|doc| doc.source.clone()).collect()
    }

    pub fn public_summary(&self, handoff_count: usize) -> PublicSummary {
        PublicSummary {
            objective: self.run_state.objective.clone(),
            lineage: self.session_lineage.clone(),
            handoff_count,
            context: self.context.clone(),
            completed_steps: self.run_state.completed_steps.clone(),
            remaining_steps: self.remaining_steps(),
            status: self.status,
        }
    }
}

/// Compact shareable summary of a finalized session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicSummary {
    pub objective: String,
    pub lineage: Vec<String>,
    pub handoff_count: usize,
    pub context: TrackerSnapshot,
    pub completed_steps: Vec<String>,
    pub remaining_steps: Vec<String>,
    pub status: RunStatus,
}
