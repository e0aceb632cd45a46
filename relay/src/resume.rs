//! Resume paths: from a session's final state or from a checkpoint.
//!
//! Both paths reduce to a [`ResumeSeed`], so the orchestrator never branches
//! on where prior progress came from.

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::document::{STATE_KEY, StateDocument};
use crate::core::run_state::ResumeSeed;
use crate::io::checkpoints::CheckpointRepository;
use crate::io::store::SessionStore;

const STATE_SCHEMA: &str = include_str!("../schemas/state/v1.schema.json");

/// Validate a state document against the embedded JSON Schema (Draft 2020-12).
pub fn validate_state_document(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(STATE_SCHEMA).context("parse state schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile state schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("state document validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

/// Read and validate the latest state document of a session, if one exists.
pub fn read_state_document(store: &dyn SessionStore, session_id: &str) -> Result<Option<StateDocument>> {
    let Some(value) = store.get_snapshot(session_id, STATE_KEY)? else {
        return Ok(None);
    };
    validate_state_document(&value).with_context(|| format!("state of session {session_id}"))?;
    let doc = serde_json::from_value(value)
        .with_context(|| format!("decode state of session {session_id}"))?;
    Ok(Some(doc))
}

/// Like [`read_state_document`], but a missing state is an error.
pub fn load_state_document(store: &dyn SessionStore, session_id: &str) -> Result<StateDocument> {
    read_state_document(store, session_id)?
        .ok_or_else(|| anyhow!("session {session_id} has no persisted state"))
}

/// Seed from the final persisted state of `session_id`.
#[instrument(skip_all, fields(session_id))]
pub fn from_session(store: &dyn SessionStore, session_id: &str) -> Result<ResumeSeed> {
    let doc = load_state_document(store, session_id)?;
    let lineage = if doc.session_lineage.is_empty() {
        vec![session_id.to_string()]
    } else {
        doc.session_lineage.clone()
    };
    debug!(lineage_len = lineage.len(), "resuming from session state");
    Ok(ResumeSeed {
        doc_sources: doc.doc_sources(),
        prior: doc.run_state,
        lineage,
        parent_session_id: session_id.to_string(),
        note: format!("Resumed from session '{session_id}'."),
    })
}

/// Seed from a checkpoint locator. The originating session's state is not consulted.
#[instrument(skip_all, fields(locator))]
pub fn from_checkpoint(store: &dyn SessionStore, locator: &str) -> Result<ResumeSeed> {
    let checkpoint = CheckpointRepository::new(store).load(locator)?;
    let lineage = if checkpoint.session_lineage.is_empty() {
        vec![checkpoint.session_id.clone()]
    } else {
        checkpoint.session_lineage
    };
    debug!(iteration = checkpoint.iteration, "resuming from checkpoint");
    Ok(ResumeSeed {
        prior: checkpoint.run_state_snapshot,
        lineage,
        doc_sources: checkpoint.doc_sources,
        parent_session_id: checkpoint.session_id,
        note: format!("Resumed from checkpoint '{locator}'."),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_documents_missing_required_fields() {
        let err = validate_state_document(&json!({"schema_version": "1"})).expect_err("invalid");
        assert!(err.to_string().contains("validation failed"));
    }

    #[test]
    fn rejects_unknown_status() {
        let doc = json!({
            "schema_version": "1",
            "run_state": {"objective": "o", "plan_steps": []},
            "session_lineage": ["session_a"],
            "prompt_configuration": {},
            "doc_evidence": [],
            "context": {"used_tokens": 0, "usage_ratio": 0.0, "status": "ok"},
            "status": "exploded"
        });
        assert!(validate_state_document(&doc).is_err());
    }

    #[test]
    fn missing_state_reads_as_none_but_corrupt_state_is_an_error() {
        let store = crate::test_support::MemorySessionStore::new();
        let session = store.create_session("obj", None).expect("session");
        let id = session.session_id.as_str();
        assert!(read_state_document(&store, id).expect("read").is_none());
        assert!(load_state_document(&store, id).is_err());

        store
            .put_snapshot(id, STATE_KEY, &json!({"schema_version": "1"}))
            .expect("put");
        assert!(read_state_document(&store, id).is_err());
    }
}
