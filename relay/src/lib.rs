//! Crash-resumable, bounded-context run orchestration.
//!
//! A run pursues one objective across a chain of sessions. Each session's
//! conversational window is metered by a token budget tracker; when it fills,
//! the run hands off to a fresh session through a portable packet instead of
//! replaying history. Progress is checkpointed per iteration so a run can be
//! resumed from a checkpoint or from a session's final state.
//!
//! - **[`core`]**: Pure, deterministic logic (tracker, run state, handoff
//!   packets, selection, planning, preflight). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, session store, checkpoints,
//!   doc ingestion, verification commands, reports).
//!
//! [`orchestrator`] drives the loop and [`resume`] turns stored progress back
//! into a seed for a new run.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod resume;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
