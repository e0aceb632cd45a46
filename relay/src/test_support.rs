//! Test doubles for driving the orchestrator without a filesystem or shell.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::planner::{PlanBundle, Planner};
use crate::core::risk::classify_command;
use crate::core::types::{
    CommandStatus, DocEvidence, DocKind, DocStatus, RiskLevel, VerificationResult,
};
use crate::io::config::RelayConfig;
use crate::io::docs::DocIngestor;
use crate::io::store::{
    FsSessionStore, SessionMetadata, SessionStore, StorageError, new_session_id,
};
use crate::io::verification::{VerificationRunner, blocked_result};

const LOCATOR_SCHEME: &str = "mem://";

/// Build a plan bundle with one alternative and one acceptance check.
pub fn plan(steps: &[&str]) -> PlanBundle {
    PlanBundle {
        plan_steps: steps.iter().map(|s| s.to_string()).collect(),
        creative_alternatives: vec!["strict mode".to_string()],
        acceptance_checks: vec!["tests pass".to_string()],
    }
}

/// Config with an empty constitution so only loop events consume the context budget.
pub fn quiet_config() -> RelayConfig {
    RelayConfig {
        constitution: String::new(),
        ..RelayConfig::default()
    }
}

/// Filesystem store rooted in a fresh temp directory. Keep the guard alive.
pub fn temp_store() -> (tempfile::TempDir, FsSessionStore) {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = FsSessionStore::new(temp.path().join("sessions"));
    (temp, store)
}

/// Planner that always returns the same bundle.
pub struct ScriptedPlanner {
    pub bundle: PlanBundle,
}

impl Planner for ScriptedPlanner {
    fn plan(&self, _objective: &str, _docs: &[String]) -> PlanBundle {
        self.bundle.clone()
    }
}

/// Ingestor that reports every source as readable without touching disk.
pub struct StaticIngestor;

impl DocIngestor for StaticIngestor {
    fn ingest(&self, sources: &[String], _repo_root: &Path) -> Vec<DocEvidence> {
        sources
            .iter()
            .map(|source| DocEvidence {
                source: source.clone(),
                kind: DocKind::File,
                status: DocStatus::Ok,
                char_count: 10,
                excerpt: "static doc".to_string(),
                error: String::new(),
            })
            .collect()
    }
}

/// Verifier returning scripted exit codes; high-risk commands are still blocked.
#[derive(Default)]
pub struct ScriptedVerifier {
    pub exit_codes: HashMap<String, i32>,
}

impl ScriptedVerifier {
    pub fn failing(command: &str, code: i32) -> Self {
        Self {
            exit_codes: HashMap::from([(command.to_string(), code)]),
        }
    }
}

impl VerificationRunner for ScriptedVerifier {
    fn run(&self, commands: &[String], _workdir: &Path) -> Vec<VerificationResult> {
        commands
            .iter()
            .map(|command| {
                let risk_level = classify_command(command);
                if risk_level == RiskLevel::High {
                    return blocked_result(command);
                }
                VerificationResult {
                    command: command.clone(),
                    return_code: self.exit_codes.get(command).copied().unwrap_or(0),
                    stdout: String::new(),
                    stderr: String::new(),
                    duration_ms: 1,
                    status: CommandStatus::Executed,
                    risk_level,
                }
            })
            .collect()
    }
}

#[derive(Default)]
struct MemorySession {
    metadata: Option<SessionMetadata>,
    timeline: Vec<Value>,
    snapshots: BTreeMap<String, Value>,
    texts: BTreeMap<String, String>,
}

/// In-memory [`SessionStore`]. Optionally fails one operation kind.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<BTreeMap<String, MemorySession>>,
    fail_op: Option<&'static str>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose `op` (e.g. `"put_immutable"`) always fails with a [`StorageError`].
    pub fn failing(op: &'static str) -> Self {
        Self {
            fail_op: Some(op),
            ..Self::default()
        }
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn text(&self, session_id: &str, name: &str) -> Option<String> {
        self.lock().get(session_id)?.texts.get(name).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, MemorySession>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check(&self, op: &'static str, target: &str) -> Result<()> {
        if self.fail_op == Some(op) {
            return Err(StorageError::new(op, target, io::Error::other("injected failure")).into());
        }
        Ok(())
    }

    fn with_session<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut MemorySession) -> Result<T>,
    ) -> Result<T> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| anyhow!("unknown session {session_id}"))?;
        f(session)
    }
}

impl SessionStore for MemorySessionStore {
    fn create_session(&self, objective: &str, parent: Option<&str>) -> Result<SessionMetadata> {
        self.check("create_session", objective)?;
        let metadata = SessionMetadata {
            session_id: new_session_id(),
            parent_session_id: parent.map(str::to_string),
            objective: objective.to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        };
        self.lock().insert(
            metadata.session_id.clone(),
            MemorySession {
                metadata: Some(metadata.clone()),
                ..MemorySession::default()
            },
        );
        Ok(metadata)
    }

    fn read_metadata(&self, session_id: &str) -> Result<SessionMetadata> {
        self.with_session(session_id, |session| {
            session
                .metadata
                .clone()
                .ok_or_else(|| anyhow!("session {session_id} has no metadata"))
        })
    }

    fn append_event(&self, session_id: &str, event: &Value) -> Result<()> {
        self.check("append_event", session_id)?;
        self.with_session(session_id, |session| {
            session.timeline.push(event.clone());
            Ok(())
        })
    }

    fn read_timeline(&self, session_id: &str) -> Result<Vec<Value>> {
        self.with_session(session_id, |session| Ok(session.timeline.clone()))
    }

    fn put_snapshot(&self, session_id: &str, key: &str, value: &Value) -> Result<String> {
        self.check("put_snapshot", key)?;
        self.with_session(session_id, |session| {
            session.snapshots.insert(key.to_string(), value.clone());
            Ok(())
        })?;
        Ok(self.locate_snapshot(session_id, key))
    }

    fn put_immutable(&self, session_id: &str, key: &str, value: &Value) -> Result<String> {
        self.check("put_immutable", key)?;
        self.with_session(session_id, |session| {
            if session.snapshots.contains_key(key) {
                return Err(StorageError::new(
                    "create snapshot",
                    key,
                    io::Error::from(io::ErrorKind::AlreadyExists),
                )
                .into());
            }
            session.snapshots.insert(key.to_string(), value.clone());
            Ok(())
        })?;
        Ok(self.locate_snapshot(session_id, key))
    }

    fn put_text(&self, session_id: &str, name: &str, contents: &str) -> Result<String> {
        self.check("put_text", name)?;
        self.with_session(session_id, |session| {
            session.texts.insert(name.to_string(), contents.to_string());
            Ok(())
        })?;
        Ok(format!("{}/{name}", self.locate(session_id)))
    }

    fn get_snapshot(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        self.with_session(session_id, |session| Ok(session.snapshots.get(key).cloned()))
    }

    fn list_snapshots(&self, session_id: &str, prefix: &str) -> Result<Vec<String>> {
        self.with_session(session_id, |session| {
            Ok(session
                .snapshots
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect())
        })
    }

    fn read_located(&self, locator: &str) -> Result<Value> {
        let (session_id, key) = locator
            .strip_prefix(LOCATOR_SCHEME)
            .and_then(|rest| rest.split_once('/'))
            .ok_or_else(|| anyhow!("not a memory locator: {locator}"))?;
        self.get_snapshot(session_id, key)?
            .ok_or_else(|| anyhow!("no stored document at {locator}"))
    }

    fn locate(&self, session_id: &str) -> String {
        format!("{LOCATOR_SCHEME}{session_id}")
    }

    fn locate_snapshot(&self, session_id: &str, key: &str) -> String {
        format!("{LOCATOR_SCHEME}{session_id}/{key}")
    }
}
