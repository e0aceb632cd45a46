//! I/O adapters for the relay orchestrator.

pub mod checkpoints;
pub mod config;
pub mod docs;
pub mod process;
pub mod prompt;
pub mod report;
pub mod store;
pub mod timeline;
pub mod verification;
