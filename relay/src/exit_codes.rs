//! Stable exit codes for the `relay` CLI.

use crate::core::types::RunStatus;

/// Run completed every plan step, or a read-only command succeeded.
pub const OK: i32 = 0;
/// Invalid arguments or config, or a storage failure.
pub const ERROR: i32 = 1;
/// Preflight checks blocked the run.
pub const BLOCKED: i32 = 2;
/// A budget or guardrail paused the run.
pub const PAUSED: i32 = 3;
/// Iterations ran out with plan steps remaining.
pub const INCOMPLETE: i32 = 4;

pub fn for_status(status: RunStatus) -> i32 {
    match status {
        RunStatus::Completed => OK,
        RunStatus::Blocked => BLOCKED,
        RunStatus::Paused => PAUSED,
        RunStatus::Incomplete => INCOMPLETE,
    }
}
