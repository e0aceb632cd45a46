//! Iteration-keyed checkpoints inside a session.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::run_state::RunState;
use crate::core::tracker::TrackerSnapshot;
use crate::io::store::{SessionStore, now_rfc3339};

const CHECKPOINT_PREFIX: &str = "checkpoints/ckpt_";

/// Durable run-state snapshot at a given iteration. Never modified once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub created_at: String,
    pub session_id: String,
    pub iteration: u32,
    pub objective: String,
    pub tracker_snapshot: TrackerSnapshot,
    pub doc_sources: Vec<String>,
    /// Lineage up to and including `session_id`, so the checkpoint resumes on its own.
    #[serde(default)]
    pub session_lineage: Vec<String>,
    pub run_state_snapshot: RunState,
}

/// A stored checkpoint and where it lives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredCheckpoint {
    pub locator: String,
    pub checkpoint: Checkpoint,
}

pub fn checkpoint_id(iteration: u32) -> String {
    format!("ckpt_{iteration:03}")
}

fn checkpoint_key(iteration: u32) -> String {
    format!("checkpoints/{}", checkpoint_id(iteration))
}

fn iteration_of(key: &str) -> Option<u32> {
    key.strip_prefix(CHECKPOINT_PREFIX)?.parse().ok()
}

/// Everything a checkpoint captures besides its id and timestamp.
pub struct CheckpointInput<'a> {
    pub session_id: &'a str,
    pub iteration: u32,
    pub run_state: &'a RunState,
    pub tracker_snapshot: TrackerSnapshot,
    pub doc_sources: &'a [String],
    pub session_lineage: &'a [String],
}

pub struct CheckpointRepository<'a> {
    store: &'a dyn SessionStore,
}

impl<'a> CheckpointRepository<'a> {
    pub fn new(store: &'a dyn SessionStore) -> Self {
        Self { store }
    }

    /// Persist a checkpoint for a 1-based iteration.
    pub fn save(&self, input: CheckpointInput<'_>) -> Result<StoredCheckpoint> {
        if input.iteration == 0 {
            return Err(anyhow!("checkpoint iteration must be 1-based"));
        }
        let checkpoint = Checkpoint {
            checkpoint_id: checkpoint_id(input.iteration),
            created_at: now_rfc3339(),
            session_id: input.session_id.to_string(),
            iteration: input.iteration,
            objective: input.run_state.objective.clone(),
            tracker_snapshot: input.tracker_snapshot,
            doc_sources: input.doc_sources.to_vec(),
            session_lineage: input.session_lineage.to_vec(),
            run_state_snapshot: input.run_state.clone(),
        };
        let value = serde_json::to_value(&checkpoint).context("serialize checkpoint")?;
        let locator = self
            .store
            .put_immutable(input.session_id, &checkpoint_key(input.iteration), &value)
            .with_context(|| format!("write checkpoint {}", checkpoint.checkpoint_id))?;
        info!(session_id = input.session_id, checkpoint = %checkpoint.checkpoint_id, "checkpoint written");
        Ok(StoredCheckpoint {
            locator,
            checkpoint,
        })
    }

    /// All checkpoints of a session, ordered by iteration.
    pub fn list(&self, session_id: &str) -> Result<Vec<StoredCheckpoint>> {
        let mut keyed: Vec<(u32, String)> = self
            .store
            .list_snapshots(session_id, CHECKPOINT_PREFIX)?
            .into_iter()
            .filter_map(|key| iteration_of(&key).map(|iteration| (iteration, key)))
            .collect();
        keyed.sort_by_key(|(iteration, _)| *iteration);

        keyed
            .into_iter()
            .map(|(_, key)| self.read_key(session_id, &key))
            .collect()
    }

    /// Highest-iteration checkpoint, if any.
    pub fn latest(&self, session_id: &str) -> Result<Option<StoredCheckpoint>> {
        Ok(self.list(session_id)?.pop())
    }

    /// Load a checkpoint from a locator returned by [`Self::save`] or [`Self::list`].
    pub fn load(&self, locator: &str) -> Result<Checkpoint> {
        let value = self
            .store
            .read_located(locator)
            .with_context(|| format!("read checkpoint {locator}"))?;
        serde_json::from_value(value).with_context(|| format!("decode checkpoint {locator}"))
    }

    fn read_key(&self, session_id: &str, key: &str) -> Result<StoredCheckpoint> {
        let value = self
            .store
            .get_snapshot(session_id, key)?
            .with_context(|| format!("checkpoint {key} vanished from session {session_id}"))?;
        let checkpoint =
            serde_json::from_value(value).with_context(|| format!("decode checkpoint {key}"))?;
        Ok(StoredCheckpoint {
            locator: self.store.locate_snapshot(session_id, key),
            checkpoint,
        })
    }
}
