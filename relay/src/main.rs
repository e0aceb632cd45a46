//! `relay` CLI: run an objective under context, handoff and runtime budgets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use relay::core::planner::DocsFirstPlanner;
use relay::exit_codes;
use relay::io::checkpoints::CheckpointRepository;
use relay::io::config::{DEFAULT_CONFIG_FILE, RelayConfig, load_config, write_config};
use relay::io::docs::FileDocIngestor;
use relay::io::store::FsSessionStore;
use relay::io::timeline::lineage_timeline;
use relay::io::verification::ShellVerificationRunner;
use relay::logging;
use relay::orchestrator::{Orchestrator, RunRequest};
use relay::resume::read_state_document;

#[derive(Parser)]
#[command(
    name = "relay",
    version,
    about = "Crash-resumable bounded-context run orchestrator"
)]
struct Cli {
    /// Path to the relay config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Run an objective and print the outcome as JSON.
    Run(RunArgs),
    /// List a session's checkpoints in iteration order.
    Checkpoints {
        session: String,
    },
    /// Print the timeline of a session's whole lineage as JSON.
    Replay {
        session: String,
    },
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    objective: String,
    /// Doc or spec to read before planning (file path or URL). Repeatable.
    #[arg(long = "doc")]
    docs: Vec<String>,
    /// Verification command run after the loop. Repeatable.
    #[arg(long = "verify")]
    verify: Vec<String>,
    #[arg(long)]
    iterations: Option<u32>,
    #[arg(long)]
    max_handoffs: Option<u32>,
    #[arg(long)]
    max_runtime_secs: Option<u64>,
    #[arg(long)]
    max_tokens: Option<i64>,
    #[arg(long)]
    persona: Option<String>,
    #[arg(long)]
    project_profile: Option<String>,
    /// Repository root docs and verification commands are resolved against.
    #[arg(long, default_value = ".")]
    repo: PathBuf,
    /// Resume from a session's final state.
    #[arg(long = "resume-from")]
    resume_from: Option<String>,
    /// Resume from a checkpoint file; takes precedence over `--resume-from`.
    #[arg(long = "resume-checkpoint")]
    resume_checkpoint: Option<String>,
    #[arg(long)]
    checkpoint_every: Option<u32>,
    #[arg(long)]
    pause_on_verification_failure: bool,
    /// Continue in a child session after a handoff instead of pausing.
    #[arg(long)]
    continue_on_handoff: bool,
}

#[derive(Serialize)]
struct CheckpointListing {
    checkpoint_id: String,
    iteration: u32,
    locator: String,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::ERROR);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run(args) => {
            let config = load_config(&cli.config)?;
            cmd_run(&config, &session_store(&config), args)
        }
        Command::Checkpoints { session } => {
            let config = load_config(&cli.config)?;
            cmd_checkpoints(&session_store(&config), &session)
        }
        Command::Replay { session } => {
            let config = load_config(&cli.config)?;
            cmd_replay(&session_store(&config), &session)
        }
    }
}

fn session_store(config: &RelayConfig) -> FsSessionStore {
    FsSessionStore::new(&config.sessions_dir)
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        return Err(anyhow!(
            "relay init: {} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    write_config(path, &RelayConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn build_request(config: &RelayConfig, args: RunArgs) -> RunRequest {
    let mut request = RunRequest::from_config(args.objective, config);
    request.docs = args.docs;
    request.persona = args.persona;
    request.repo_path = args.repo;
    request.resume_from_session = args.resume_from;
    request.resume_from_checkpoint = args.resume_checkpoint;
    if !args.verify.is_empty() {
        request.verify_commands = args.verify;
    }
    if let Some(iterations) = args.iterations {
        request.iterations = iterations;
    }
    if let Some(max_handoffs) = args.max_handoffs {
        request.max_handoffs = max_handoffs;
    }
    if let Some(secs) = args.max_runtime_secs {
        request.max_runtime = Duration::from_secs(secs);
    }
    if let Some(max_tokens) = args.max_tokens {
        request.max_tokens = max_tokens;
    }
    if let Some(profile) = args.project_profile {
        request.project_profile = profile;
    }
    if let Some(every) = args.checkpoint_every {
        request.checkpoint_every = every;
    }
    if args.pause_on_verification_failure {
        request.guardrails.pause_on_verification_failure = true;
    }
    if args.continue_on_handoff {
        request.guardrails.pause_on_handoff = false;
    }
    request
}

fn cmd_run(config: &RelayConfig, store: &FsSessionStore, args: RunArgs) -> Result<i32> {
    let request = build_request(config, args);
    let verifier = ShellVerificationRunner {
        timeout: Duration::from_secs(config.verification.timeout_secs),
        output_limit_bytes: config.verification.output_limit_bytes,
    };
    let ingestor = FileDocIngestor::new(&config.docs)?;
    let orchestrator = Orchestrator {
        config,
        store,
        planner: &DocsFirstPlanner,
        preflight: &config.preflight,
        ingestor: &ingestor,
        verifier: &verifier,
    };
    let outcome = orchestrator.run(&request)?;
    print_json(&outcome)?;
    Ok(exit_codes::for_status(outcome.status))
}

fn cmd_checkpoints(store: &FsSessionStore, session: &str) -> Result<i32> {
    let listing: Vec<CheckpointListing> = CheckpointRepository::new(store)
        .list(session)?
        .into_iter()
        .map(|stored| CheckpointListing {
            checkpoint_id: stored.checkpoint.checkpoint_id,
            iteration: stored.checkpoint.iteration,
            locator: stored.locator,
        })
        .collect();
    print_json(&listing)?;
    Ok(exit_codes::OK)
}

fn cmd_replay(store: &FsSessionStore, session: &str) -> Result<i32> {
    // sessions that never finalized have no state snapshot to read lineage from
    let lineage = match read_state_document(store, session)? {
        Some(doc) => doc.session_lineage,
        None => vec![session.to_string()],
    };
    let events = lineage_timeline(store, &lineage)?;
    print_json(&events)?;
    Ok(exit_codes::OK)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{rendered}");
    Ok(())
}
