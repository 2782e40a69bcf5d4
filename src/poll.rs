//! The control loop.
//!
//! One cooperative loop per run: read state, resolve gates, prompt newly
//! active stages, consume completion signals, recover dead agents, nudge
//! stalled ones, sleep, repeat. Steps run strictly in sequence within a
//! tick; recovery precedes nudging so a dead agent is never nudged, and
//! signal-driven advancement precedes both so a finished stage's agent
//! isn't prodded after legitimately exiting.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::CrewPaths;
use crate::probe::ProcessProbe;
use crate::runner::{AgentRunner, ProcessHealth};
use crate::signal::{read_signal, remove_signal};
use crate::tmux::TmuxPort;
use crate::workflow::{StageDefinition, StageStatus, WorkflowEngine, WorkflowStatus};
use crate::{clog, clog_debug, clog_error, clog_warn, Error, Result};

pub const AGENT_READY_TIMEOUT: Duration = Duration::from_secs(15);
pub const RESPAWN_READY_TIMEOUT: Duration = Duration::from_secs(15);

pub const NUDGE_MESSAGE: &str =
    "Please continue with your task. If you are finished, write your completion signal file.";

/// How a pending human gate gets resolved.
pub trait GateDecider {
    /// True approves the stage, false rejects it and ends the workflow.
    fn decide(&self, stage_name: &str) -> bool;
}

/// Ask on stdin, defaulting to reject.
pub struct InteractiveGate;

impl GateDecider for InteractiveGate {
    fn decide(&self, stage_name: &str) -> bool {
        print!("\nGate: '{}' stage requires approval. Approve? [y/N]: ", stage_name);
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        answer.trim().eq_ignore_ascii_case("y")
    }
}

/// Approve every gate without asking.
pub struct AutoApproveGate;

impl GateDecider for AutoApproveGate {
    fn decide(&self, stage_name: &str) -> bool {
        clog!("Gate for stage '{}' auto-approved", stage_name);
        true
    }
}

/// Loop tuning knobs, taken from config and CLI flags.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub nudge_interval: Duration,
    pub max_nudges: u32,
    pub max_respawns: u32,
}

/// Per-run loop bookkeeping. Never persisted.
pub struct PollContext {
    /// Highest stage index already prompted; -1 after a loop-back so the
    /// new cycle's first stage is prompted again.
    prompted_stage_index: i64,
    last_active_at: Instant,
    nudge_count: u32,
}

impl PollContext {
    pub fn new(prompted_stage_index: i64) -> Self {
        Self {
            prompted_stage_index,
            last_active_at: Instant::now(),
            nudge_count: 0,
        }
    }
}

enum Tick {
    Continue,
    Break,
}

// ---- prompt assembly ----

/// Role instructions from `<crew_dir>/agents/<role>.md`, with a minimal
/// fallback so a missing template never blocks a run.
fn load_role_template(crew_dir: &Path, role: &str) -> String {
    std::fs::read_to_string(crew_dir.join("agents").join(format!("{}.md", role)))
        .unwrap_or_else(|_| format!("You are the {}.", role))
}

fn load_shared_context(crew_dir: &Path) -> String {
    std::fs::read_to_string(crew_dir.join("CONTEXT.md")).unwrap_or_default()
}

/// The raw definition YAML, echoed into prompts so agents see the whole
/// pipeline they are part of.
fn load_workflow_yaml(workflow_name: &str, paths: &CrewPaths) -> String {
    for dir in &paths.workflow_search_paths {
        if let Ok(raw) = std::fs::read_to_string(dir.join(format!("{}.yaml", workflow_name))) {
            return raw;
        }
    }
    String::new()
}

pub fn build_prompt(
    role_template: &str,
    goal: &str,
    role: &str,
    workflow_name: &str,
    context: &str,
    workflow_yaml: &str,
) -> String {
    let context_section = if context.is_empty() {
        String::new()
    } else {
        format!("\n## Shared Context\n\n{}\n", context)
    };
    let workflow_section = if workflow_yaml.is_empty() {
        format!("\n## Workflow\n\nWorkflow: {}\n", workflow_name)
    } else {
        format!(
            "\n## Workflow\n\nYou are running inside the workflow below. \
             Your role is the \"{}\" stage.\n\n```yaml\n{}```\n",
            role, workflow_yaml
        )
    };
    format!(
        "{}\n{}\n## Goal\n\n{}\n{}\nWhen your stage is complete, write \
         .crew/signals/{}.done with a JSON result.\n\nBegin working \
         according to the instructions and goal above.",
        role_template, context_section, goal, workflow_section, role
    )
}

/// Build and deliver a stage prompt to its agent, optionally clearing the
/// agent's context first. Delivery problems are logged, not fatal; the
/// nudge pass catches an unprompted idle agent eventually.
pub async fn prompt_agent<T: TmuxPort, P: ProcessProbe>(
    runner: &mut AgentRunner<T, P>,
    agent_name: &str,
    role: &str,
    workflow_name: &str,
    context_reset: bool,
    paths: &CrewPaths,
) {
    if context_reset {
        clog!("Resetting context for '{}'", agent_name);
        if let Err(e) = runner.reset_context(agent_name) {
            clog_error!("Context reset for '{}' failed: {}", agent_name, e);
        }
    }
    let role_template = load_role_template(&paths.crew_dir, role);
    let context = load_shared_context(&paths.crew_dir);
    let goal = crate::workflow::request::load_active_goal(&paths.crew_dir);
    let workflow_yaml = load_workflow_yaml(workflow_name, paths);
    let prompt = build_prompt(&role_template, &goal, role, workflow_name, &context, &workflow_yaml);

    if let Err(e) = runner.wait_for_ready(agent_name, AGENT_READY_TIMEOUT).await {
        clog_warn!("Readiness wait for '{}' failed: {}", agent_name, e);
    }
    if let Err(e) = runner.send_initial_prompt(agent_name, &prompt) {
        clog_error!("Sending prompt to '{}' failed: {}", agent_name, e);
    }
}

// ---- loop steps ----

/// Resolve a pending gate. Returns false when the gate was rejected and
/// the loop should end.
///
/// A `crew approve`/`crew reject` from another invocation can resolve the
/// gate between the snapshot read and our write; state is last-write-wins,
/// so a `GatePending` from the engine here means the gate is simply gone
/// and the loop carries on.
fn handle_gate(engine: &mut WorkflowEngine, gate: &dyn GateDecider) -> Result<bool> {
    let stage = match engine.current_stage()? {
        Some(stage) if stage.status == StageStatus::WaitingGate => stage,
        _ => return Ok(true),
    };

    if gate.decide(&stage.name) {
        match engine.approve_gate() {
            Ok(()) => clog!("Gate approved for stage '{}'", stage.name),
            Err(Error::GatePending | Error::NotRunning) => {
                clog!("Gate for stage '{}' already resolved elsewhere", stage.name)
            }
            Err(e) => return Err(e),
        }
        Ok(true)
    } else {
        match engine.reject_gate() {
            Ok(()) => {
                clog!("Gate rejected for stage '{}'. Workflow stopped.", stage.name);
                Ok(false)
            }
            Err(Error::GatePending | Error::NotRunning) => {
                clog!("Gate for stage '{}' already resolved elsewhere", stage.name);
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }
}

/// Prompt the current stage's agent if it became active without going
/// through signal-driven advancement, e.g. right after gate approval.
async fn prompt_if_needed<T: TmuxPort, P: ProcessProbe>(
    ctx: &mut PollContext,
    engine: &WorkflowEngine,
    runner: &mut AgentRunner<T, P>,
    stages: &[StageDefinition],
    workflow_name: &str,
    paths: &CrewPaths,
) -> Result<()> {
    let state = engine.get_state()?;
    if state.status != WorkflowStatus::Running {
        return Ok(());
    }
    let idx = state.current_stage_index;
    let (stage, def) = match (state.stages.get(idx), stages.get(idx)) {
        (Some(stage), Some(def)) => (stage, def),
        _ => return Ok(()),
    };
    if stage.status == StageStatus::Active && idx as i64 > ctx.prompted_stage_index {
        clog!("Prompting '{}' for stage '{}'", def.role, stage.name);
        prompt_agent(runner, &def.role, &def.role, workflow_name, def.context_reset, paths).await;
        ctx.prompted_stage_index = idx as i64;
    }
    Ok(())
}

/// Consume a completion signal for the active stage, advance, and prompt
/// whatever became active. A failed advance is fatal to the loop.
async fn try_advance_stage<T: TmuxPort, P: ProcessProbe>(
    ctx: &mut PollContext,
    engine: &mut WorkflowEngine,
    runner: &mut AgentRunner<T, P>,
    stages: &[StageDefinition],
    workflow_name: &str,
    paths: &CrewPaths,
) -> Result<Tick> {
    let state = match engine.get_state() {
        Ok(state) => state,
        Err(_) => return Ok(Tick::Break),
    };
    let prev_idx = state.current_stage_index;
    let (current, def) = match (state.stages.get(prev_idx), stages.get(prev_idx)) {
        (Some(stage), Some(def)) if stage.status == StageStatus::Active => (stage, def),
        _ => return Ok(Tick::Continue),
    };

    let signal = match read_signal(&paths.crew_dir, &def.role) {
        Some(signal) => signal,
        None => return Ok(Tick::Continue),
    };
    remove_signal(&paths.crew_dir, &def.role);
    clog!("Stage '{}' completed (signal received). Advancing...", current.name);
    if let Some(tasks) = &signal.tasks {
        if !tasks.is_empty() {
            clog!("  Tasks: {}", tasks.join(", "));
        }
    }

    if let Err(e) = engine.advance() {
        clog_error!("Error advancing: {}", e);
        return Ok(Tick::Break);
    }

    let new_state = match engine.get_state() {
        Ok(state) if state.status == WorkflowStatus::Running => state,
        _ => return Ok(Tick::Continue),
    };

    let next_idx = new_state.current_stage_index;
    if next_idx < prev_idx {
        clog!(
            "Loop detected: stage {} -> {}. Resetting prompt tracking.",
            prev_idx,
            next_idx
        );
        ctx.prompted_stage_index = -1;
    }
    if let (Some(next_stage), Some(next_def)) = (new_state.stages.get(next_idx), stages.get(next_idx))
    {
        if next_stage.status == StageStatus::Active {
            clog!("Prompting '{}' for stage '{}'", next_def.role, next_stage.name);
            prompt_agent(
                runner,
                &next_def.role,
                &next_def.role,
                workflow_name,
                next_def.context_reset,
                paths,
            )
            .await;
            ctx.prompted_stage_index = next_idx as i64;
        }
    }
    Ok(Tick::Continue)
}

/// Respawn the current stage's agent if it is dead and under the cap.
/// Over the cap, the condition is logged and the workflow stalls for a
/// human to intervene.
async fn maybe_recover_agent<T: TmuxPort, P: ProcessProbe>(
    ctx: &mut PollContext,
    engine: &WorkflowEngine,
    runner: &mut AgentRunner<T, P>,
    stages: &[StageDefinition],
    workflow_name: &str,
    settings: &PollSettings,
    paths: &CrewPaths,
) -> Result<()> {
    let state = engine.get_state()?;
    if state.status != WorkflowStatus::Running {
        return Ok(());
    }
    let def = match stages.get(state.current_stage_index) {
        Some(def) => def,
        None => return Ok(()),
    };

    match runner.check_health(&def.role) {
        Ok(ProcessHealth::Dead) => {}
        _ => return Ok(()),
    }

    if let Some(agent) = runner.agent_info(&def.role) {
        if agent.respawn_count >= settings.max_respawns {
            clog_error!(
                "Agent '{}' died but max respawns ({}) reached. Giving up.",
                def.role,
                settings.max_respawns
            );
            return Ok(());
        }
    }

    clog!("Agent '{}' detected dead. Respawning...", def.role);
    if let Err(e) = runner.respawn(&def.role).await {
        clog_error!("Respawn failed for '{}': {}", def.role, e);
        return Ok(());
    }

    if let Err(e) = runner.wait_for_ready(&def.role, RESPAWN_READY_TIMEOUT).await {
        clog_warn!("Post-respawn readiness wait for '{}' failed: {}", def.role, e);
    }
    if let Err(e) = runner.record_pid(&def.role) {
        clog_warn!("Recording pids for '{}' failed: {}", def.role, e);
    }
    if let Err(e) = runner.persist_registry() {
        clog_warn!("Persisting registry failed: {}", e);
    }

    prompt_agent(runner, &def.role, &def.role, workflow_name, def.context_reset, paths).await;

    ctx.last_active_at = Instant::now();
    ctx.nudge_count = 0;
    clog!("Agent '{}' respawned and prompted.", def.role);
    Ok(())
}

/// Nudge the current stage's agent when it has been idle past the
/// interval, up to the cap. Any observed activity resets the streak.
fn maybe_nudge_agent<T: TmuxPort, P: ProcessProbe>(
    ctx: &mut PollContext,
    engine: &WorkflowEngine,
    runner: &AgentRunner<T, P>,
    stages: &[StageDefinition],
    settings: &PollSettings,
) -> Result<()> {
    let state = engine.get_state()?;
    if state.status != WorkflowStatus::Running {
        return Ok(());
    }
    let idx = state.current_stage_index;
    let def = match (state.stages.get(idx), stages.get(idx)) {
        (Some(stage), Some(def)) if stage.status == StageStatus::Active => def,
        _ => return Ok(()),
    };

    let status = match runner.get_status(&def.role) {
        Ok(status) => status,
        Err(_) => return Ok(()),
    };

    let now = Instant::now();
    if status == crate::adapters::AgentStatus::Active {
        ctx.last_active_at = now;
        ctx.nudge_count = 0;
        return Ok(());
    }

    if status == crate::adapters::AgentStatus::Idle
        && now.duration_since(ctx.last_active_at) > settings.nudge_interval
        && ctx.nudge_count < settings.max_nudges
    {
        ctx.nudge_count += 1;
        clog!(
            "Nudging '{}' (attempt {}/{})...",
            def.role,
            ctx.nudge_count,
            settings.max_nudges
        );
        if let Err(e) = runner.send_nudge(&def.role, NUDGE_MESSAGE) {
            clog_error!("Nudge to '{}' failed: {}", def.role, e);
        }
        ctx.last_active_at = now;
    }
    Ok(())
}

/// Drive the workflow until it completes, errors, a gate is rejected, the
/// state becomes unreadable, or the token is cancelled. On cancellation
/// the caller owns cleanup; the loop touches nothing on the way out.
#[allow(clippy::too_many_arguments)]
pub async fn poll_loop<T: TmuxPort, P: ProcessProbe>(
    engine: &mut WorkflowEngine,
    runner: &mut AgentRunner<T, P>,
    paths: &CrewPaths,
    stages: &[StageDefinition],
    workflow_name: &str,
    gate: &dyn GateDecider,
    settings: &PollSettings,
    prompted_stage_index: i64,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut ctx = PollContext::new(prompted_stage_index);

    while !cancel.is_cancelled() {
        let state = match engine.get_state() {
            Ok(state) => state,
            Err(e) => {
                clog_error!("State unreadable, stopping loop: {}", e);
                break;
            }
        };
        match state.status {
            WorkflowStatus::Completed => {
                clog!("Workflow completed.");
                break;
            }
            WorkflowStatus::Error => {
                clog_error!("Workflow error.");
                break;
            }
            _ => {}
        }

        if !handle_gate(engine, gate)? {
            break;
        }

        prompt_if_needed(&mut ctx, engine, runner, stages, workflow_name, paths).await?;

        if let Tick::Break =
            try_advance_stage(&mut ctx, engine, runner, stages, workflow_name, paths).await?
        {
            break;
        }

        maybe_recover_agent(&mut ctx, engine, runner, stages, workflow_name, settings, paths)
            .await?;
        maybe_nudge_agent(&mut ctx, engine, runner, stages, settings)?;

        tokio::select! {
            _ = tokio::time::sleep(settings.poll_interval) => {}
            _ = cancel.cancelled() => break,
        }
    }
    clog_debug!("Poll loop exited");
    Ok(())
}
