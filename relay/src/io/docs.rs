//! Document ingestion for the docs-first preflight.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use tracing::{debug, warn};

use crate::core::types::{DocEvidence, DocKind, DocStatus};
use crate::io::config::DocsConfig;

const EXCERPT_CHARS: usize = 500;
const USER_AGENT: &str = concat!("relay/", env!("CARGO_PKG_VERSION"));

pub trait DocIngestor {
    /// Read every source, recording failures as evidence rather than errors.
    fn ingest(&self, sources: &[String], repo_root: &Path) -> Vec<DocEvidence>;
}

/// Reads local files relative to the repository root and fetches
/// `http(s)://` sources with a bounded GET.
///
/// Remote bodies are cut at `fetch_limit_bytes` and decoded lossily.
pub struct FileDocIngestor {
    client: Client,
    fetch_limit_bytes: usize,
}

impl FileDocIngestor {
    pub fn new(config: &DocsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            fetch_limit_bytes: config.fetch_limit_bytes,
        })
    }

    fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("fetch {url}"))?;
        let mut raw = Vec::new();
        response
            .take(self.fetch_limit_bytes as u64)
            .read_to_end(&mut raw)
            .with_context(|| format!("read body of {url}"))?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    fn read_url(&self, url: &str) -> DocEvidence {
        match self.fetch(url) {
            Ok(text) => {
                debug!(url, bytes = text.len(), "remote doc fetched");
                DocEvidence {
                    source: url.to_string(),
                    kind: DocKind::Url,
                    status: DocStatus::Ok,
                    char_count: text.chars().count(),
                    excerpt: excerpt(&text),
                    error: String::new(),
                }
            }
            Err(err) => {
                warn!(url, err = %format!("{err:#}"), "remote doc unreadable");
                DocEvidence {
                    source: url.to_string(),
                    kind: DocKind::Url,
                    status: DocStatus::Error,
                    char_count: 0,
                    excerpt: String::new(),
                    error: format!("{err:#}"),
                }
            }
        }
    }
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn excerpt(text: &str) -> String {
    let head: String = text.chars().take(EXCERPT_CHARS).collect();
    head.replace('\n', " ").trim().to_string()
}

fn read_file(source: &str, repo_root: &Path) -> DocEvidence {
    let raw = Path::new(source);
    let path = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        repo_root.join(raw)
    };
    let path = path.canonicalize().unwrap_or(path);
    let shown = path.display().to_string();
    match fs::read_to_string(&path) {
        Ok(text) => DocEvidence {
            source: shown,
            kind: DocKind::File,
            status: DocStatus::Ok,
            char_count: text.chars().count(),
            excerpt: excerpt(&text),
            error: String::new(),
        },
        Err(err) => {
            warn!(source = %shown, err = %err, "doc unreadable");
            DocEvidence {
                source: shown,
                kind: DocKind::File,
                status: DocStatus::Error,
                char_count: 0,
                excerpt: String::new(),
                error: err.to_string(),
            }
        }
    }
}

impl DocIngestor for FileDocIngestor {
    fn ingest(&self, sources: &[String], repo_root: &Path) -> Vec<DocEvidence> {
        sources
            .iter()
            .map(|source| {
                if is_url(source) {
                    self.read_url(source)
                } else {
                    read_file(source, repo_root)
                }
            })
            .collect()
    }
}
