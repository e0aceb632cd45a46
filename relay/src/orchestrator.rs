//! The bounded iteration loop.
//!
//! One run walks the plan one step per iteration inside three budgets:
//! iterations, handoffs and wall-clock runtime (measured on the monotonic
//! clock). The context tracker decides when a session is full; the handoff
//! protocol then writes a packet, compacts the window and either pauses or
//! continues in a child session.
//!
//! Expected terminal conditions (preflight failure, budget exhaustion,
//! verification failure) are reported in [`RunOutcome`]. Only storage
//! failures surface as `Err`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::core::document::{STATE_DOCUMENT_VERSION, STATE_KEY, StateDocument};
use crate::core::handoff::{HandoffOrigin, build_handoff_packet, handoff_key};
use crate::core::planner::Planner;
use crate::core::preflight::{PreflightCheck, PreflightInput};
use crate::core::prompt::PromptConfiguration;
use crate::core::run_state::{ResumeSeed, RunState};
use crate::core::selector::select_step;
use crate::core::skills::retrieve_skills;
use crate::core::tracker::{TokenBudgetTracker, TrackerSnapshot};
use crate::core::types::{DocEvidence, Guardrails, PauseReason, RunStatus, TrackerStatus};
use crate::io::checkpoints::{CheckpointInput, CheckpointRepository};
use crate::io::config::RelayConfig;
use crate::io::docs::DocIngestor;
use crate::io::prompt::render_system_prompt;
use crate::io::report::write_reports;
use crate::io::store::{SessionMetadata, SessionStore, now_rfc3339};
use crate::io::timeline::record_event;
use crate::io::verification::VerificationRunner;
use crate::resume;

const SKILLS_TOP_K: usize = 3;
const DOCS_EVIDENCE_KEY: &str = "docs_evidence";
const SYSTEM_PROMPT_FILE: &str = "system_prompt.md";

/// Inputs of one run. Built from config defaults and overridden by the caller.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub objective: String,
    pub docs: Vec<String>,
    pub persona: Option<String>,
    pub iterations: u32,
    pub repo_path: PathBuf,
    pub verify_commands: Vec<String>,
    pub project_profile: String,
    pub max_tokens: i64,
    pub max_handoffs: u32,
    pub max_runtime: Duration,
    pub checkpoint_every: u32,
    pub resume_from_session: Option<String>,
    /// Checkpoint locator; wins over `resume_from_session` when both are set.
    pub resume_from_checkpoint: Option<String>,
    pub guardrails: Guardrails,
}

impl RunRequest {
    pub fn from_config(objective: impl Into<String>, config: &RelayConfig) -> Self {
        Self {
            objective: objective.into(),
            docs: Vec::new(),
            persona: None,
            iterations: config.max_iterations,
            repo_path: PathBuf::from("."),
            verify_commands: config.verification.commands.clone(),
            project_profile: config.project_profile.clone(),
            max_tokens: config.max_tokens,
            max_handoffs: config.max_handoffs,
            max_runtime: Duration::from_secs(config.max_runtime_secs),
            checkpoint_every: config.checkpoint_every,
            resume_from_session: None,
            resume_from_checkpoint: None,
            guardrails: config.guardrails,
        }
    }
}

/// Structured result of a run; serialized as the CLI output.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub preflight_failures: Vec<String>,
    pub session_id: String,
    pub session_path: String,
    pub session_lineage: Vec<String>,
    pub handoff_packets: Vec<String>,
    pub checkpoints: Vec<String>,
    pub handoff_budget_used: u32,
    pub runtime_seconds: f64,
    pub completed_steps: Vec<String>,
    pub remaining_steps: Vec<String>,
    /// Empty when the run did not pause.
    pub pause_reason: String,
    pub verification_failures: Vec<String>,
    pub readable_docs: usize,
    pub context: TrackerSnapshot,
    pub state_path: Option<String>,
    pub report_path: Option<String>,
    pub public_summary_path: Option<String>,
}

/// Collaborators and configuration for running objectives.
pub struct Orchestrator<'a> {
    pub config: &'a RelayConfig,
    pub store: &'a dyn SessionStore,
    pub planner: &'a dyn Planner,
    pub preflight: &'a dyn PreflightCheck,
    pub ingestor: &'a dyn DocIngestor,
    pub verifier: &'a dyn VerificationRunner,
}

/// Read-only inputs shared by every iteration of one run.
struct LoopContext<'r> {
    request: &'r RunRequest,
    started: Instant,
    docs: &'r [String],
    prompt: &'r PromptConfiguration,
}

/// Mutable bookkeeping of the loop, kept apart from the persisted run state.
struct LoopLedger {
    tracker: TokenBudgetTracker,
    session: SessionMetadata,
    lineage: Vec<String>,
    handoff_packets: Vec<String>,
    checkpoints: Vec<String>,
    handoffs_used: u32,
    pause: Option<PauseReason>,
}

impl Orchestrator<'_> {
    #[instrument(skip_all, fields(iterations = request.iterations, max_handoffs = request.max_handoffs))]
    pub fn run(&self, request: &RunRequest) -> Result<RunOutcome> {
        let started = Instant::now();
        let objective = request.objective.as_str();

        let seed = self.resolve_seed(request)?;
        let docs = match (&seed, request.docs.is_empty()) {
            (Some(seed), true) => seed.doc_sources.clone(),
            _ => request.docs.clone(),
        };
        let plan = self.planner.plan(objective, &docs);

        let session = self
            .store
            .create_session(objective, seed.as_ref().map(|s| s.parent_session_id.as_str()))
            .context("create session")?;
        let mut lineage = seed.as_ref().map(|s| s.lineage.clone()).unwrap_or_default();
        lineage.push(session.session_id.clone());
        info!(session_id = %session.session_id, lineage_len = lineage.len(), "session created");
        record_event(
            self.store,
            &session.session_id,
            "session_started",
            json!({ "parent_session_id": session.parent_session_id, "lineage": lineage }),
        )?;

        let evidence = self.ingestor.ingest(&docs, &request.repo_path);
        let readable_docs = evidence.iter().filter(|doc| doc.is_readable()).count();
        let failures = self.preflight.validate(&PreflightInput {
            docs: &docs,
            readable_docs,
            plan_steps: &plan.plan_steps,
            alternatives: &plan.creative_alternatives,
            acceptance_checks: &plan.acceptance_checks,
        });
        let mut tracker = TokenBudgetTracker::new(request.max_tokens, self.config.thresholds);
        if !failures.is_empty() {
            warn!(failures = failures.len(), "preflight blocked the run");
            record_event(
                self.store,
                &session.session_id,
                "preflight_failed",
                json!({ "failures": failures }),
            )?;
            return Ok(RunOutcome {
                status: RunStatus::Blocked,
                preflight_failures: failures,
                session_path: self.store.locate(&session.session_id),
                session_id: session.session_id,
                session_lineage: lineage,
                handoff_packets: Vec::new(),
                checkpoints: Vec::new(),
                handoff_budget_used: 0,
                runtime_seconds: started.elapsed().as_secs_f64(),
                completed_steps: Vec::new(),
                remaining_steps: plan.plan_steps,
                pause_reason: String::new(),
                verification_failures: Vec::new(),
                readable_docs,
                context: tracker.snapshot(),
                state_path: None,
                report_path: None,
                public_summary_path: None,
            });
        }
        let evidence_value = serde_json::to_value(&evidence).context("serialize doc evidence")?;
        self.store
            .put_snapshot(&session.session_id, DOCS_EVIDENCE_KEY, &evidence_value)
            .context("write doc evidence")?;

        let mut state = match &seed {
            Some(seed) => RunState::resumed(objective, &plan, seed),
            None => RunState::fresh(objective, &plan),
        };
        let skills: Vec<String> = retrieve_skills(&self.config.skills, objective, SKILLS_TOP_K)
            .into_iter()
            .map(|skill| skill.name.clone())
            .collect();
        state.retrieved_skills = skills;
        state.notes.push(format!(
            "Creative alternatives: {}",
            plan.creative_alternatives.join(", ")
        ));
        state
            .notes
            .push(format!("Readable docs: {readable_docs}/{}", docs.len()));

        let prompt = PromptConfiguration::new(
            &self.config.constitution,
            &request.project_profile,
            self.config.persona(request.persona.as_deref()),
            objective,
        );
        let system_prompt = render_system_prompt(&prompt, &state.retrieved_skills)?;
        self.store
            .put_text(&session.session_id, SYSTEM_PROMPT_FILE, &system_prompt)
            .context("write system prompt")?;
        record_event(
            self.store,
            &session.session_id,
            "preflight_passed",
            json!({ "docs": docs, "skills": state.retrieved_skills }),
        )?;

        tracker.record("user", objective);
        if !self.config.constitution.trim().is_empty() {
            tracker.record("system", &self.config.constitution);
        }

        let mut ledger = LoopLedger {
            tracker,
            session,
            lineage,
            handoff_packets: Vec::new(),
            checkpoints: Vec::new(),
            handoffs_used: 0,
            pause: None,
        };
        let ctx = LoopContext {
            request,
            started,
            docs: &docs,
            prompt: &prompt,
        };
        self.iterate(&ctx, &mut state, &mut ledger)?;

        let verify_commands = &request.verify_commands;
        if !verify_commands.is_empty() {
            let results = self.verifier.run(verify_commands, &request.repo_path);
            let failed: Vec<String> = results
                .iter()
                .filter(|result| result.failed())
                .map(|result| result.command.clone())
                .collect();
            state.verification_results.extend(results);
            if !failed.is_empty() {
                warn!(failed = failed.len(), "verification failures");
                if request.guardrails.pause_on_verification_failure {
                    ledger.pause = Some(PauseReason::VerificationFailure);
                }
            }
            record_event(
                self.store,
                &ledger.session.session_id,
                "verification",
                json!({ "commands": verify_commands, "failures": failed }),
            )?;
        }

        self.finalize(started, evidence, prompt, state, ledger)
    }

    fn resolve_seed(&self, request: &RunRequest) -> Result<Option<ResumeSeed>> {
        if let Some(locator) = &request.resume_from_checkpoint {
            return resume::from_checkpoint(self.store, locator).map(Some);
        }
        if let Some(session_id) = &request.resume_from_session {
            return resume::from_session(self.store, session_id).map(Some);
        }
        Ok(None)
    }

    fn iterate(&self, ctx: &LoopContext<'_>, state: &mut RunState, ledger: &mut LoopLedger) -> Result<()> {
        let request = ctx.request;
        let objective = request.objective.as_str();
        for index in 0..request.iterations {
            let iteration = index + 1;
            let elapsed = ctx.started.elapsed();
            if elapsed >= request.max_runtime {
                warn!(iteration, "runtime budget exhausted");
                state.record_risk(format!(
                    "Stopped early because max runtime budget ({}s) was reached.",
                    request.max_runtime.as_secs()
                ));
                ledger.pause = Some(PauseReason::RuntimeBudget);
                record_event(
                    self.store,
                    &ledger.session.session_id,
                    "budget_stop",
                    json!({
                        "reason": PauseReason::RuntimeBudget.as_str(),
                        "elapsed_seconds": elapsed.as_secs_f64(),
                        "max_runtime_seconds": request.max_runtime.as_secs(),
                    }),
                )?;
                return Ok(());
            }

            let Some(step) = select_step(&state.plan_steps, &state.completed_steps, index as usize)
            else {
                debug!("empty plan, nothing to iterate");
                return Ok(());
            };
            let step = step.to_string();
            state.mark_completed(&step);
            state.record_decision(format!("Iteration {iteration}: advanced step '{step}'."));
            state.refresh_next_actions();
            let status = ledger.tracker.record(
                "assistant",
                &format!("Iteration {iteration}: {step}. Objective: {objective}"),
            );
            debug!(iteration, step = %step, status = status.as_str(), "iteration recorded");
            record_event(
                self.store,
                &ledger.session.session_id,
                "iteration",
                json!({ "iteration": iteration, "step": step, "context_status": status }),
            )?;

            if request.checkpoint_every > 0 && iteration % request.checkpoint_every == 0 {
                let stored = CheckpointRepository::new(self.store).save(CheckpointInput {
                    session_id: &ledger.session.session_id,
                    iteration,
                    run_state: state,
                    tracker_snapshot: ledger.tracker.snapshot(),
                    doc_sources: ctx.docs,
                    session_lineage: &ledger.lineage,
                })?;
                record_event(
                    self.store,
                    &ledger.session.session_id,
                    "checkpoint",
                    json!({ "iteration": iteration, "locator": stored.locator }),
                )?;
                ledger.checkpoints.push(stored.locator);
            }

            if status.requires_handoff() && !self.hand_off(ctx, status, state, ledger)? {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Run the handoff protocol. Returns whether the loop may continue.
    fn hand_off(
        &self,
        ctx: &LoopContext<'_>,
        status: TrackerStatus,
        state: &mut RunState,
        ledger: &mut LoopLedger,
    ) -> Result<bool> {
        let request = ctx.request;
        let session_id = ledger.session.session_id.clone();
        if ledger.handoffs_used >= request.max_handoffs {
            warn!(handoffs_used = ledger.handoffs_used, "handoff budget exhausted");
            state.record_risk(format!(
                "Rollover requested but max handoffs budget ({}) was reached. Increase the handoff budget to continue.",
                request.max_handoffs
            ));
            ledger.pause = Some(PauseReason::HandoffBudget);
            record_event(
                self.store,
                &session_id,
                "budget_stop",
                json!({
                    "reason": PauseReason::HandoffBudget.as_str(),
                    "handoff_count": ledger.handoffs_used,
                    "max_handoffs": request.max_handoffs,
                }),
            )?;
            return Ok(false);
        }

        ledger.handoffs_used += 1;
        let sequence = ledger.handoffs_used;
        let generated_at = now_rfc3339();
        let packet = build_handoff_packet(
            HandoffOrigin {
                session_id: &session_id,
                parent_session_id: ledger.session.parent_session_id.as_deref(),
                generated_at: &generated_at,
            },
            status,
            state,
            ctx.prompt,
            &ledger.tracker,
        );
        let value = serde_json::to_value(&packet).context("serialize handoff packet")?;
        let locator = self
            .store
            .put_immutable(&session_id, &handoff_key(sequence), &value)
            .with_context(|| format!("write handoff packet {sequence}"))?;
        info!(session_id = %session_id, sequence, reason = %packet.reason, "handoff packet written");
        record_event(
            self.store,
            &session_id,
            "handoff",
            json!({ "sequence": sequence, "reason": packet.reason, "locator": locator }),
        )?;
        ledger.handoff_packets.push(locator.clone());

        let compacted = ledger.tracker.compact_window();
        ledger.tracker.reset_with_seed(&compacted);
        debug!(used = ledger.tracker.used_budget(), "context compacted");

        if request.guardrails.pause_on_handoff {
            ledger.pause = PauseReason::for_context(status);
            record_event(
                self.store,
                &session_id,
                "autopilot_pause",
                json!({ "reason": ledger.pause.map(PauseReason::as_str) }),
            )?;
            return Ok(false);
        }

        let child = self
            .store
            .create_session(&request.objective, Some(&session_id))
            .context("create child session")?;
        ledger.lineage.push(child.session_id.clone());
        info!(parent = %session_id, session_id = %child.session_id, "continuing in child session");
        record_event(
            self.store,
            &child.session_id,
            "session_started",
            json!({
                "parent_session_id": session_id,
                "lineage": ledger.lineage,
                "source_handoff": locator,
            }),
        )?;
        ledger.session = child;
        Ok(true)
    }

    fn finalize(
        &self,
        started: Instant,
        evidence: Vec<DocEvidence>,
        prompt: PromptConfiguration,
        state: RunState,
        ledger: LoopLedger,
    ) -> Result<RunOutcome> {
        let status = if ledger.pause.is_some() {
            RunStatus::Paused
        } else if state.next_actions.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::Incomplete
        };
        let pause_reason = ledger
            .pause
            .map(|reason| reason.as_str().to_string())
            .unwrap_or_default();
        let session_id = ledger.session.session_id.clone();

        let doc = StateDocument {
            schema_version: STATE_DOCUMENT_VERSION.to_string(),
            run_state: state,
            session_lineage: ledger.lineage.clone(),
            prompt_configuration: prompt,
            doc_evidence: evidence,
            context: ledger.tracker.snapshot(),
            status,
            pause_reason,
        };
        let value = serde_json::to_value(&doc).context("serialize state document")?;
        let state_path = self
            .store
            .put_snapshot(&session_id, STATE_KEY, &value)
            .context("write state document")?;
        let reports = write_reports(
            self.store,
            &session_id,
            &doc,
            ledger.handoff_packets.len(),
            ledger.checkpoints.len(),
        )?;
        record_event(
            self.store,
            &session_id,
            "run_finalized",
            json!({ "status": status, "pause_reason": doc.pause_reason }),
        )?;
        info!(session_id = %session_id, status = status.as_str(), pause_reason = %doc.pause_reason, "run finalized");

        Ok(RunOutcome {
            status,
            preflight_failures: Vec::new(),
            session_path: self.store.locate(&session_id),
            session_id,
            session_lineage: ledger.lineage,
            handoff_packets: ledger.handoff_packets,
            checkpoints: ledger.checkpoints,
            handoff_budget_used: ledger.handoffs_used,
            runtime_seconds: started.elapsed().as_secs_f64(),
            completed_steps: doc.run_state.completed_steps.clone(),
            remaining_steps: doc.run_state.next_actions.clone(),
            verification_failures: doc.run_state.verification_failures(),
            readable_docs: doc.readable_docs(),
            context: doc.context.clone(),
            pause_reason: doc.pause_reason,
            state_path: Some(state_path),
            report_path: Some(reports.report_path),
            public_summary_path: Some(reports.public_summary_path),
        })
    }
}
