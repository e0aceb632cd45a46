//! Per-session timeline events and lineage-wide replay.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::io::store::{SessionStore, now_rfc3339};

/// One line of a session timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: String,
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// A timeline event tagged with the session that recorded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEvent {
    pub session_id: String,
    #[serde(flatten)]
    pub event: TimelineEvent,
}

pub fn record_event(
    store: &dyn SessionStore,
    session_id: &str,
    event: &str,
    data: Value,
) -> Result<()> {
    let entry = TimelineEvent {
        timestamp: now_rfc3339(),
        event: event.to_string(),
        data,
    };
    let value = serde_json::to_value(&entry).context("serialize timeline event")?;
    store
        .append_event(session_id, &value)
        .with_context(|| format!("append {event} to session {session_id}"))
}

/// Concatenate the timelines of `lineage` in order.
///
/// Events that do not decode as [`TimelineEvent`] are skipped. A session in
/// the lineage with no timeline contributes nothing.
pub fn lineage_timeline(store: &dyn SessionStore, lineage: &[String]) -> Result<Vec<LineageEvent>> {
    let mut events = Vec::new();
    for session_id in lineage {
        for raw in store.read_timeline(session_id)? {
            match serde_json::from_value::<TimelineEvent>(raw) {
                Ok(event) => events.push(LineageEvent {
                    session_id: session_id.clone(),
                    event,
                }),
                Err(err) => debug!(session_id, err = %err, "skipping malformed timeline event"),
            }
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::store::FsSessionStore;
    use serde_json::json;

    #[test]
    fn replays_sessions_in_lineage_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FsSessionStore::new(temp.path());
        let first = store.create_session("obj", None).expect("create").session_id;
        let second = store
            .create_session("obj", Some(&first))
            .expect("create")
            .session_id;

        record_event(&store, &second, "run_started", json!({})).expect("record");
        record_event(&store, &first, "run_started", json!({})).expect("record");
        record_event(&store, &first, "handoff", json!({"sequence": 1})).expect("record");
        store
            .append_event(&first, &json!({"unexpected": true}))
            .expect("append");

        let events = lineage_timeline(&store, &[first.clone(), second.clone()]).expect("replay");
        let tags: Vec<(&str, &str)> = events
            .iter()
            .map(|e| (e.session_id.as_str(), e.event.event.as_str()))
            .collect();
        assert_eq!(
            tags,
            vec![
                (first.as_str(), "run_started"),
                (first.as_str(), "handoff"),
                (second.as_str(), "run_started"),
            ]
        );
        assert_eq!(events[1].event.data["sequence"], 1);
    }
}
