//! Post-loop verification commands.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tracing::{info, warn};

use crate::core::risk::classify_command;
use crate::core::types::{CommandStatus, RiskLevel, VerificationResult};
use crate::io::process::run_command_with_timeout;

pub const BLOCKED_RETURN_CODE: i32 = 126;
pub const TIMEOUT_RETURN_CODE: i32 = 124;
pub const SPAWN_FAILURE_RETURN_CODE: i32 = 127;
pub const BLOCKED_MESSAGE: &str = "Blocked high-risk command by safety policy.";

pub trait VerificationRunner {
    /// Run each command in order. Never fails as a whole: every problem is a
    /// per-command result with a non-zero return code.
    fn run(&self, commands: &[String], workdir: &Path) -> Vec<VerificationResult>;
}

/// Runs commands through `sh -c`, refusing high-risk ones before execution.
#[derive(Debug, Clone)]
pub struct ShellVerificationRunner {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

pub fn blocked_result(command: &str) -> VerificationResult {
    VerificationResult {
        command: command.to_string(),
        return_code: BLOCKED_RETURN_CODE,
        stdout: String::new(),
        stderr: BLOCKED_MESSAGE.to_string(),
        duration_ms: 0,
        status: CommandStatus::Blocked,
        risk_level: RiskLevel::High,
    }
}

impl ShellVerificationRunner {
    fn run_one(&self, command: &str, workdir: &Path, risk_level: RiskLevel) -> VerificationResult {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(workdir);

        match run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes) {
            Ok(output) => {
                let duration_ms = u64::try_from(output.elapsed.as_millis()).unwrap_or(u64::MAX);
                let mut stderr = output.stderr_text();
                let return_code = if output.timed_out {
                    if !stderr.is_empty() {
                        stderr.push('\n');
                    }
                    stderr.push_str(&format!(
                        "Command timed out after {}s.",
                        self.timeout.as_secs()
                    ));
                    TIMEOUT_RETURN_CODE
                } else {
                    output.status.code().unwrap_or(1)
                };
                VerificationResult {
                    command: command.to_string(),
                    return_code,
                    stdout: output.stdout_text(),
                    stderr,
                    duration_ms,
                    status: CommandStatus::Executed,
                    risk_level,
                }
            }
            Err(err) => {
                warn!(command, err = %err, "verification command failed to run");
                VerificationResult {
                    command: command.to_string(),
                    return_code: SPAWN_FAILURE_RETURN_CODE,
                    stdout: String::new(),
                    stderr: format!("{err:#}"),
                    duration_ms: 0,
                    status: CommandStatus::Executed,
                    risk_level,
                }
            }
        }
    }
}

impl VerificationRunner for ShellVerificationRunner {
    fn run(&self, commands: &[String], workdir: &Path) -> Vec<VerificationResult> {
        commands
            .iter()
            .map(|command| {
                let risk_level = classify_command(command);
                if risk_level == RiskLevel::High {
                    warn!(command, "blocked high-risk verification command");
                    return blocked_result(command);
                }
                let result = self.run_one(command, workdir, risk_level);
                info!(command, return_code = result.return_code, "verification command finished");
                result
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(timeout: Duration) -> ShellVerificationRunner {
        ShellVerificationRunner {
            timeout,
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn blocks_high_risk_commands_without_running_them() {
        let temp = tempfile::tempdir().expect("tempdir");
        let marker = temp.path().join("marker");
        std::fs::write(&marker, "keep").expect("write");
        let command = format!("rm -rf {}", marker.display());

        let results = runner(Duration::from_secs(5)).run(&[command], temp.path());
        assert_eq!(results[0].status, CommandStatus::Blocked);
        assert_eq!(results[0].return_code, BLOCKED_RETURN_CODE);
        assert_eq!(results[0].risk_level, RiskLevel::High);
        assert_eq!(results[0].stderr, BLOCKED_MESSAGE);
        assert!(marker.exists());
    }

    #[test]
    fn runs_in_workdir_and_reports_exit_codes() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("present.txt"), "x").expect("write");
        let results = runner(Duration::from_secs(5)).run(
            &["test -f present.txt && echo ok".to_string(), "exit 2".to_string()],
            temp.path(),
        );
        assert_eq!(results[0].return_code, 0);
        assert_eq!(results[0].stdout, "ok");
        assert!(!results[0].failed());
        assert_eq!(results[1].return_code, 2);
        assert!(results[1].failed());
        assert_eq!(results[1].risk_level, RiskLevel::Low);
    }

    #[test]
    fn timeouts_become_failed_results() {
        let temp = tempfile::tempdir().expect("tempdir");
        let results = runner(Duration::from_millis(200)).run(&["sleep 5".to_string()], temp.path());
        assert_eq!(results[0].return_code, TIMEOUT_RETURN_CODE);
        assert!(results[0].stderr.contains("timed out"));
    }

    #[test]
    fn timeout_bounds_commands_whose_children_keep_running() {
        let temp = tempfile::tempdir().expect("tempdir");
        let started = std::time::Instant::now();
        let results = runner(Duration::from_millis(300))
            .run(&["sleep 4; echo done".to_string()], temp.path());
        assert_eq!(results[0].return_code, TIMEOUT_RETURN_CODE);
        assert!(results[0].failed());
        assert!(!results[0].stdout.contains("done"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
