//! Deterministic, pure logic shared by the relay orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod document;
pub mod handoff;
pub mod planner;
pub mod preflight;
pub mod prompt;
pub mod risk;
pub mod run_state;
pub mod selector;
pub mod skills;
pub mod tracker;
pub mod types;
