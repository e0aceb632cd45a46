//! Append-only session storage.
//!
//! A session owns an immutable metadata document, an append-only timeline
//! (one JSON event per line) and a set of keyed JSON snapshots. Snapshots
//! written with [`SessionStore::put_immutable`] are create-once; everything
//! else written with [`SessionStore::put_snapshot`] is replaced atomically.
//!
//! The orchestrator only sees the [`SessionStore`] trait. [`FsSessionStore`]
//! lays sessions out as directories under a root.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{SecondsFormat, Utc};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

const METADATA_FILE: &str = "metadata.json";
const TIMELINE_FILE: &str = "timeline.jsonl";
const SESSION_ID_LEN: usize = 10;

/// Immutable identity of a session, written once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub parent_session_id: Option<String>,
    pub objective: String,
    pub created_at: String,
}

/// Durable write or read failure inside a session store.
///
/// Fatal for a run: the orchestrator never returns a partial result once one
/// of these surfaces. Callers can recover it with `downcast_ref`.
#[derive(Debug, thiserror::Error)]
#[error("storage {op} failed for {}: {source}", path.display())]
pub struct StorageError {
    pub op: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl StorageError {
    pub fn new(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Storage-medium-agnostic session store.
///
/// Keys may contain `/` to group snapshots (e.g. `checkpoints/ckpt_001`).
/// Every write returns a locator: an opaque string that
/// [`SessionStore::read_located`] resolves back to the same document.
pub trait SessionStore {
    fn create_session(&self, objective: &str, parent: Option<&str>) -> Result<SessionMetadata>;
    fn read_metadata(&self, session_id: &str) -> Result<SessionMetadata>;

    fn append_event(&self, session_id: &str, event: &Value) -> Result<()>;
    /// Timeline events in append order. Unparsable lines are skipped.
    fn read_timeline(&self, session_id: &str) -> Result<Vec<Value>>;

    /// Write or replace a snapshot.
    fn put_snapshot(&self, session_id: &str, key: &str, value: &Value) -> Result<String>;
    /// Write a snapshot that must not already exist.
    fn put_immutable(&self, session_id: &str, key: &str, value: &Value) -> Result<String>;
    /// Write or replace a plain-text artifact such as a report.
    fn put_text(&self, session_id: &str, name: &str, contents: &str) -> Result<String>;
    fn get_snapshot(&self, session_id: &str, key: &str) -> Result<Option<Value>>;
    /// Keys under `prefix`, sorted lexicographically.
    fn list_snapshots(&self, session_id: &str, prefix: &str) -> Result<Vec<String>>;

    fn read_located(&self, locator: &str) -> Result<Value>;
    fn locate(&self, session_id: &str) -> String;
    fn locate_snapshot(&self, session_id: &str, key: &str) -> String;
}

/// Generate a fresh session identifier, e.g. `session_k3v9x0a2mz`.
pub fn new_session_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(SESSION_ID_LEN)
        .collect::<String>()
        .to_lowercase();
    format!("session_{suffix}")
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Sessions as directories under `root`.
///
/// ```text
/// <root>/<session_id>/metadata.json
/// <root>/<session_id>/timeline.jsonl
/// <root>/<session_id>/<key>.json
/// ```
#[derive(Debug, Clone)]
pub struct FsSessionStore {
    root: PathBuf,
}

impl FsSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    fn snapshot_path(&self, session_id: &str, key: &str) -> PathBuf {
        self.session_dir(session_id).join(format!("{key}.json"))
    }

    fn read_json(path: &Path) -> Result<Value> {
        let contents =
            fs::read_to_string(path).map_err(|err| StorageError::new("read", path, err))?;
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).map_err(|err| StorageError::new("create directory", parent, err))?;
    Ok(())
}

fn pretty_json(value: &Value) -> Result<String> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize snapshot")?;
    buf.push('\n');
    Ok(buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    ensure_parent(path)?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents).map_err(|err| StorageError::new("write", &tmp_path, err))?;
    fs::rename(&tmp_path, path).map_err(|err| StorageError::new("replace", path, err))?;
    Ok(())
}

impl SessionStore for FsSessionStore {
    fn create_session(&self, objective: &str, parent: Option<&str>) -> Result<SessionMetadata> {
        let metadata = SessionMetadata {
            session_id: new_session_id(),
            parent_session_id: parent.map(str::to_string),
            objective: objective.to_string(),
            created_at: now_rfc3339(),
        };
        let dir = self.session_dir(&metadata.session_id);
        fs::create_dir_all(&dir).map_err(|err| StorageError::new("create session", &dir, err))?;
        let value = serde_json::to_value(&metadata).context("serialize session metadata")?;
        let path = dir.join(METADATA_FILE);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| StorageError::new("create metadata", &path, err))?;
        file.write_all(pretty_json(&value)?.as_bytes())
            .map_err(|err| StorageError::new("write metadata", &path, err))?;
        debug!(session_id = %metadata.session_id, parent = ?metadata.parent_session_id, "session created");
        Ok(metadata)
    }

    fn read_metadata(&self, session_id: &str) -> Result<SessionMetadata> {
        let path = self.session_dir(session_id).join(METADATA_FILE);
        let value = Self::read_json(&path)?;
        serde_json::from_value(value).with_context(|| format!("decode {}", path.display()))
    }

    fn append_event(&self, session_id: &str, event: &Value) -> Result<()> {
        let path = self.session_dir(session_id).join(TIMELINE_FILE);
        ensure_parent(&path)?;
        let mut line = serde_json::to_string(event).context("serialize timeline event")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| StorageError::new("open timeline", &path, err))?;
        file.write_all(line.as_bytes())
            .map_err(|err| StorageError::new("append timeline", &path, err))?;
        Ok(())
    }

    fn read_timeline(&self, session_id: &str) -> Result<Vec<Value>> {
        let path = self.session_dir(session_id).join(TIMELINE_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents =
            fs::read_to_string(&path).map_err(|err| StorageError::new("read", &path, err))?;
        let mut events = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(value) => events.push(value),
                Err(err) => {
                    warn!(session_id, line = idx + 1, err = %err, "skipping unparsable timeline line");
                }
            }
        }
        Ok(events)
    }

    fn put_snapshot(&self, session_id: &str, key: &str, value: &Value) -> Result<String> {
        let path = self.snapshot_path(session_id, key);
        write_atomic(&path, &pretty_json(value)?)?;
        Ok(path.display().to_string())
    }

    fn put_immutable(&self, session_id: &str, key: &str, value: &Value) -> Result<String> {
        let path = self.snapshot_path(session_id, key);
        ensure_parent(&path)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| StorageError::new("create snapshot", &path, err))?;
        file.write_all(pretty_json(value)?.as_bytes())
            .map_err(|err| StorageError::new("write snapshot", &path, err))?;
        Ok(path.display().to_string())
    }

    fn put_text(&self, session_id: &str, name: &str, contents: &str) -> Result<String> {
        let path = self.session_dir(session_id).join(name);
        write_atomic(&path, contents)?;
        Ok(path.display().to_string())
    }

    fn get_snapshot(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        let path = self.snapshot_path(session_id, key);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_json(&path).map(Some)
    }

    fn list_snapshots(&self, session_id: &str, prefix: &str) -> Result<Vec<String>> {
        let (dir_part, name_prefix) = match prefix.rsplit_once('/') {
            Some((dir, name)) => (Some(dir), name),
            None => (None, prefix),
        };
        let session_dir = self.session_dir(session_id);
        let dir = match dir_part {
            Some(part) => session_dir.join(part),
            None => session_dir,
        };
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|err| StorageError::new("list", &dir, err))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StorageError::new("list", &dir, err))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".json") else {
                continue;
            };
            if !stem.starts_with(name_prefix) {
                continue;
            }
            keys.push(match dir_part {
                Some(part) => format!("{part}/{stem}"),
                None => stem.to_string(),
            });
        }
        keys.sort();
        Ok(keys)
    }

    fn read_located(&self, locator: &str) -> Result<Value> {
        let path = Path::new(locator);
        if !path.is_file() {
            return Err(anyhow!("no stored document at {locator}"));
        }
        Self::read_json(path)
    }

    fn locate(&self, session_id: &str) -> String {
        self.session_dir(session_id).display().to_string()
    }

    fn locate_snapshot(&self, session_id: &str, key: &str) -> String {
        self.snapshot_path(session_id, key).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn creates_session_with_parent_and_unique_ids() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FsSessionStore::new(temp.path());
        let first = store.create_session("obj", None).expect("create");
        let second = store
            .create_session("obj", Some(&first.session_id))
            .expect("create");
        assert_ne!(first.session_id, second.session_id);
        assert!(first.session_id.starts_with("session_"));
        let loaded = store.read_metadata(&second.session_id).expect("metadata");
        assert_eq!(loaded.parent_session_id.as_deref(), Some(first.session_id.as_str()));
    }

    #[test]
    fn timeline_appends_and_skips_garbage() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FsSessionStore::new(temp.path());
        let session = store.create_session("obj", None).expect("create");
        store
            .append_event(&session.session_id, &json!({"event": "a"}))
            .expect("append");
        let path = store.session_dir(&session.session_id).join(TIMELINE_FILE);
        let mut file = OpenOptions::new().append(true).open(&path).expect("open");
        file.write_all(b"not json\n").expect("write");
        store
            .append_event(&session.session_id, &json!({"event": "b"}))
            .expect("append");

        let events = store.read_timeline(&session.session_id).expect("read");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["event"], "b");
    }

    #[test]
    fn immutable_snapshots_cannot_be_overwritten() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FsSessionStore::new(temp.path());
        let session = store.create_session("obj", None).expect("create");
        let locator = store
            .put_immutable(&session.session_id, "checkpoints/ckpt_001", &json!({"n": 1}))
            .expect("put");
        let err = store
            .put_immutable(&session.session_id, "checkpoints/ckpt_001", &json!({"n": 2}))
            .expect_err("second write must fail");
        assert!(err.downcast_ref::<StorageError>().is_some());
        assert_eq!(store.read_located(&locator).expect("read")["n"], 1);
    }

    #[test]
    fn snapshots_replace_and_list_by_prefix() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FsSessionStore::new(temp.path());
        let id = store.create_session("obj", None).expect("create").session_id;
        store.put_snapshot(&id, "state", &json!({"v": 1})).expect("put");
        store.put_snapshot(&id, "state", &json!({"v": 2})).expect("put");
        store
            .put_immutable(&id, "handoff_packet_002", &json!({}))
            .expect("put");
        store
            .put_immutable(&id, "handoff_packet_001", &json!({}))
            .expect("put");

        assert_eq!(store.get_snapshot(&id, "state").expect("get"), Some(json!({"v": 2})));
        assert_eq!(store.get_snapshot(&id, "missing").expect("get"), None);
        assert_eq!(
            store.list_snapshots(&id, "handoff_packet_").expect("list"),
            vec!["handoff_packet_001", "handoff_packet_002"]
        );
        assert!(store.list_snapshots(&id, "checkpoints/ckpt_").expect("list").is_empty());
    }

    #[test]
    fn unwritable_root_surfaces_storage_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "file, not a directory").expect("write");
        let store = FsSessionStore::new(&blocker);
        let err = store.create_session("obj", None).expect_err("must fail");
        let storage = err.downcast_ref::<StorageError>().expect("typed error");
        assert_eq!(storage.op, "create session");
    }

    #[test]
    fn storage_error_names_operation_path_and_cause() {
        let err = StorageError::new(
            "write snapshot",
            "/sessions/s1/state.json",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(
            err.to_string(),
            "storage write snapshot failed for /sessions/s1/state.json: denied"
        );
        let cause = std::error::Error::source(&err).expect("source");
        assert_eq!(cause.to_string(), "denied");
    }
}
