//! Child process execution with a deadline and capped output capture.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

const READ_CHUNK: usize = 8192;
/// How long readers may keep draining once the child itself is gone.
const READER_GRACE: Duration = Duration::from_millis(250);
const READER_POLL: Duration = Duration::from_millis(10);

/// Bytes kept from one output stream plus how many were dropped past the cap.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CapturedStream {
    pub bytes: Vec<u8>,
    pub dropped: usize,
}

impl CapturedStream {
    /// Lossy UTF-8, trimmed, with a trailing notice when bytes were dropped.
    pub fn text(&self, label: &str) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).trim().to_string();
        if self.dropped > 0 {
            text.push_str(&format!("\n[{label} truncated {} bytes]", self.dropped));
        }
        text
    }

    fn keep(&mut self, chunk: &[u8], cap: usize) {
        let room = cap.saturating_sub(self.bytes.len());
        let kept = chunk.len().min(room);
        self.bytes.extend_from_slice(&chunk[..kept]);
        self.dropped += chunk.len() - kept;
    }
}

/// A pipe drained on its own thread into a shared buffer.
///
/// The buffer is shared so that output captured so far survives when a
/// descendant of the child keeps the pipe open and the thread never sees EOF.
struct StreamReader {
    label: &'static str,
    captured: Arc<Mutex<CapturedStream>>,
    handle: JoinHandle<Result<()>>,
}

impl StreamReader {
    fn spawn(label: &'static str, mut reader: impl Read + Send + 'static, cap: usize) -> Self {
        let captured = Arc::new(Mutex::new(CapturedStream::default()));
        let sink = Arc::clone(&captured);
        let handle = thread::spawn(move || {
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                let read = reader.read(&mut chunk).context("read child output")?;
                if read == 0 {
                    return Ok(());
                }
                sink.lock()
                    .map_err(|_| anyhow!("capture buffer poisoned"))?
                    .keep(&chunk[..read], cap);
            }
        });
        Self {
            label,
            captured,
            handle,
        }
    }

    /// Join the reader if it reaches EOF before `deadline`, otherwise detach
    /// it and keep whatever it captured so far.
    fn finish(self, deadline: Instant) -> Result<CapturedStream> {
        let label = self.label;
        while !self.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(READER_POLL);
        }
        if self.handle.is_finished() {
            self.handle
                .join()
                .map_err(|_| anyhow!("{label} reader thread panicked"))?
                .with_context(|| format!("capture {label}"))?;
        } else {
            warn!(stream = label, "pipe still held open by a descendant, keeping partial output");
        }
        let captured = self
            .captured
            .lock()
            .map_err(|_| anyhow!("{label} capture buffer poisoned"))?
            .clone();
        Ok(captured)
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: CapturedStream,
    pub stderr: CapturedStream,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        self.stdout.text("stdout")
    }

    pub fn stderr_text(&self) -> String {
        self.stderr.text("stderr")
    }
}

/// Run `cmd` with stdin closed and kill it once `timeout` elapses.
///
/// Pipes are drained concurrently so a chatty child never blocks on a full
/// pipe; at most `output_limit_bytes` per stream are retained. Background
/// descendants that inherit the pipes do not extend the call past the
/// deadline by more than a short grace period.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let started = Instant::now();
    let mut child = cmd.spawn().context("spawn command")?;
    debug!(pid = child.id(), "child spawned");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout = StreamReader::spawn("stdout", stdout, output_limit_bytes);
    let stderr = StreamReader::spawn("stderr", stderr, output_limit_bytes);

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "deadline passed, killing child");
            child.kill().context("kill command")?;
            (child.wait().context("reap killed command")?, true)
        }
    };
    let elapsed = started.elapsed();

    let deadline = Instant::now() + READER_GRACE;
    let stdout = stdout.finish(deadline)?;
    let stderr = stderr.finish(deadline)?;
    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(stdout_dropped = stdout.dropped, stderr_dropped = stderr.dropped, "output capped");
    }

    debug!(exit_code = ?status.code(), timed_out, elapsed_ms = elapsed.as_millis() as u64, "child finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
        elapsed,
    })
}
