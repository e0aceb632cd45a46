//! CLI tests for `relay run`, `relay checkpoints` and `relay replay`.
//!
//! Spawns the relay binary inside a temp directory and checks exit codes and
//! the JSON it prints.

use std::path::Path;
use std::process::{Command, Output};

use relay::exit_codes;

fn relay(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_relay"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("spawn relay")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

fn workspace() -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("README.md"), "# Demo\nShip the thing.\n").expect("write doc");
    std::fs::write(
        temp.path().join("relay.toml"),
        "sessions_dir = \"state/sessions\"\n",
    )
    .expect("write config");
    temp
}

#[test]
fn run_with_docs_exits_incomplete_and_persists_session() {
    let temp = workspace();
    let output = relay(
        temp.path(),
        &["run", "--objective", "ship it", "--doc", "README.md", "--iterations", "1"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::INCOMPLETE));
    let outcome = stdout_json(&output);
    assert_eq!(outcome["status"], "incomplete");
    assert_eq!(outcome["completed_steps"].as_array().expect("steps").len(), 1);
    assert_eq!(outcome["readable_docs"], 1);

    let session = outcome["session_id"].as_str().expect("session id");
    let session_dir = temp.path().join("state/sessions").join(session);
    assert!(session_dir.join("state.json").is_file());
    assert!(session_dir.join("run_report.md").is_file());
    assert!(session_dir.join("system_prompt.md").is_file());

    let listing = relay(temp.path(), &["checkpoints", session]);
    assert_eq!(listing.status.code(), Some(exit_codes::OK));
    let listing = stdout_json(&listing);
    assert_eq!(listing[0]["checkpoint_id"], "ckpt_001");

    let replay = relay(temp.path(), &["replay", session]);
    assert_eq!(replay.status.code(), Some(exit_codes::OK));
    let events = stdout_json(&replay);
    let names: Vec<&str> = events
        .as_array()
        .expect("events")
        .iter()
        .filter_map(|event| event["event"].as_str())
        .collect();
    assert_eq!(names.first(), Some(&"session_started"));
    assert_eq!(names.last(), Some(&"run_finalized"));
}

#[test]
fn run_without_docs_is_blocked() {
    let temp = workspace();
    let output = relay(temp.path(), &["run", "--objective", "ship it"]);

    assert_eq!(output.status.code(), Some(exit_codes::BLOCKED));
    let outcome = stdout_json(&output);
    assert_eq!(outcome["status"], "blocked");
    assert!(!outcome["preflight_failures"].as_array().expect("failures").is_empty());
}

#[test]
fn zero_runtime_budget_exits_paused() {
    let temp = workspace();
    let output = relay(
        temp.path(),
        &["run", "--objective", "ship it", "--doc", "README.md", "--max-runtime-secs", "0"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::PAUSED));
    assert_eq!(stdout_json(&output)["pause_reason"], "runtime_budget");
}

#[test]
fn invalid_config_exits_with_error() {
    let temp = workspace();
    std::fs::write(
        temp.path().join("relay.toml"),
        "[thresholds]\nwarn = 0.9\nrollover = 0.5\n",
    )
    .expect("write config");
    let output = relay(temp.path(), &["run", "--objective", "ship it", "--doc", "README.md"]);

    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
}

#[test]
fn init_writes_default_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let first = relay(temp.path(), &["init"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    let written = relay::io::config::load_config(&temp.path().join("relay.toml")).expect("load");
    assert_eq!(written, relay::io::config::RelayConfig::default());

    let second = relay(temp.path(), &["init"]);
    assert_eq!(second.status.code(), Some(exit_codes::ERROR));
    let forced = relay(temp.path(), &["init", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

#[test]
fn replay_reports_a_corrupt_state_snapshot() {
    let temp = workspace();
    let output = relay(
        temp.path(),
        &["run", "--objective", "ship it", "--doc", "README.md", "--iterations", "1"],
    );
    let session = stdout_json(&output)["session_id"]
        .as_str()
        .expect("session id")
        .to_string();
    let session_dir = temp.path().join("state/sessions").join(&session);
    std::fs::write(session_dir.join("state.json"), "{\"schema_version\": \"1\"}").expect("corrupt state");

    let replay = relay(temp.path(), &["replay", &session]);
    assert_eq!(replay.status.code(), Some(exit_codes::ERROR));

    std::fs::remove_file(session_dir.join("state.json")).expect("remove state");
    let replay = relay(temp.path(), &["replay", &session]);
    assert_eq!(replay.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout_json(&replay)[0]["event"], "session_started");
}
