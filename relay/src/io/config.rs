//! Relay configuration stored in `relay.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::preflight::PreflightPolicy;
use crate::core::prompt::PersonaProfile;
use crate::core::skills::SkillEntry;
use crate::core::tracker::Thresholds;
use crate::core::types::Guardrails;

pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

const DEFAULT_CONSTITUTION: &str = "Prefer small verified changes. Read the referenced docs before editing. Never run destructive commands without review.";

/// Relay configuration (TOML).
///
/// Edited by humans; missing fields fall back to defaults. Loaded once per
/// process and passed down as an immutable snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Context window budget in estimated tokens. Non-positive saturates usage.
    pub max_tokens: i64,
    pub thresholds: Thresholds,

    pub max_iterations: u32,
    pub max_handoffs: u32,
    pub max_runtime_secs: u64,
    /// Write a checkpoint every N iterations; 0 disables checkpoints.
    pub checkpoint_every: u32,

    pub guardrails: Guardrails,
    pub preflight: PreflightPolicy,
    pub verification: VerificationConfig,
    pub docs: DocsConfig,

    /// Root directory holding one subdirectory per session.
    pub sessions_dir: PathBuf,
    pub project_profile: String,
    pub default_persona: String,
    pub constitution: String,

    pub personas: BTreeMap<String, PersonaProfile>,
    pub skills: Vec<SkillEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerificationConfig {
    /// Per-command wall-clock budget in seconds.
    pub timeout_secs: u64,
    /// Truncate stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Commands run after the loop when none are given on the command line.
    pub commands: Vec<String>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            output_limit_bytes: 100_000,
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DocsConfig {
    /// Per-URL fetch budget in seconds.
    pub fetch_timeout_secs: u64,
    /// Bytes of a remote body kept before decoding.
    pub fetch_limit_bytes: usize,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 10,
            fetch_limit_bytes: 20_000,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        let builder = PersonaProfile::balanced_builder();
        let mut personas = BTreeMap::new();
        personas.insert(builder.name.clone(), builder);
        Self {
            max_tokens: 2400,
            thresholds: Thresholds::default(),
            max_iterations: 5,
            max_handoffs: 3,
            max_runtime_secs: 900,
            checkpoint_every: 1,
            guardrails: Guardrails::default(),
            preflight: PreflightPolicy::default(),
            verification: VerificationConfig::default(),
            docs: DocsConfig::default(),
            sessions_dir: PathBuf::from(".relay/sessions"),
            project_profile: String::new(),
            default_persona: "balanced_builder".to_string(),
            constitution: DEFAULT_CONSTITUTION.to_string(),
            personas,
            skills: Vec::new(),
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        if self.verification.timeout_secs == 0 {
            return Err(anyhow!("verification.timeout_secs must be > 0"));
        }
        if self.verification.output_limit_bytes == 0 {
            return Err(anyhow!("verification.output_limit_bytes must be > 0"));
        }
        if self.docs.fetch_timeout_secs == 0 {
            return Err(anyhow!("docs.fetch_timeout_secs must be > 0"));
        }
        if self.docs.fetch_limit_bytes == 0 {
            return Err(anyhow!("docs.fetch_limit_bytes must be > 0"));
        }
        if self.sessions_dir.as_os_str().is_empty() {
            return Err(anyhow!("sessions_dir must not be empty"));
        }
        if self.verification.commands.iter().any(|c| c.trim().is_empty()) {
            return Err(anyhow!("verification.commands must not contain empty commands"));
        }
        Ok(())
    }

    /// Resolve a persona by name.
    ///
    /// Unknown names fall back to the configured default persona, then to the
    /// built-in fallback profile. The returned profile's `name` is its table key.
    pub fn persona(&self, name: Option<&str>) -> PersonaProfile {
        let requested = name.unwrap_or(&self.default_persona);
        for key in [requested, self.default_persona.as_str()] {
            if let Some(profile) = self.personas.get(key) {
                return PersonaProfile {
                    name: key.to_string(),
                    ..profile.clone()
                };
            }
        }
        debug!(requested, "persona not configured, using fallback");
        PersonaProfile::default()
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RelayConfig::default()`.
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    if !path.exists() {
        let cfg = RelayConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RelayConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RelayConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RelayConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("relay.toml");
        let mut cfg = RelayConfig::default();
        cfg.skills.push(SkillEntry {
            name: "test-runner".to_string(),
            description: "run tests".to_string(),
        });
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("relay.toml");
        fs::write(
            &path,
            "max_handoffs = 1\n\n[guardrails]\npause_on_handoff = false\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_handoffs, 1);
        assert!(!cfg.guardrails.pause_on_handoff);
        assert!(!cfg.guardrails.pause_on_verification_failure);
        assert_eq!(cfg.max_tokens, 2400);
    }

    #[test]
    fn rejects_descending_thresholds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("relay.toml");
        fs::write(
            &path,
            "[thresholds]\nwarn = 0.9\nrollover = 0.8\nhard_stop = 0.95\n",
        )
        .expect("write");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn docs_section_overrides_fetch_bounds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("relay.toml");
        fs::write(&path, "[docs]\nfetch_limit_bytes = 512\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.docs.fetch_limit_bytes, 512);
        assert_eq!(cfg.docs.fetch_timeout_secs, 10);

        fs::write(&path, "[docs]\nfetch_timeout_secs = 0\n").expect("write");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn persona_lookup_falls_back() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.persona(Some("missing")).name, "balanced_builder");
        assert_eq!(cfg.persona(None).name, "balanced_builder");

        let bare = RelayConfig {
            personas: BTreeMap::new(),
            ..RelayConfig::default()
        };
        assert_eq!(bare.persona(Some("missing")).name, "fallback");
    }
}
