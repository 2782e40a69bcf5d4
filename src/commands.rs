//! CLI command implementations.
//!
//! Commands are thin: they wire the engine, the runner and the poll loop
//! together and print to the operator. All interesting behavior lives in
//! the subsystems they call.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::adapters::LaunchOptions;
use crate::config::{Config, CrewPaths};
use crate::poll::{poll_loop, prompt_agent, AutoApproveGate, GateDecider, InteractiveGate,
    PollSettings, RESPAWN_READY_TIMEOUT};
use crate::probe::{ProcessProbe, SysProbe};
use crate::runner::{registry, AgentRunner};
use crate::signal::clean_signals_dir;
use crate::tmux::{Tmux, TmuxPort};
use crate::workflow::request::append_request_entry;
use crate::workflow::{list_definitions, load_definition, read_state, StageDefinition, StageStatus,
    WorkflowEngine, WorkflowStatus};
use crate::{clog, clog_error, clog_warn, Error, Result};

/// Time given to the provider CLIs to boot before PIDs are recorded.
const STARTUP_SETTLE_DELAY: Duration = Duration::from_secs(2);

const DEFAULT_WORKFLOW_NAME: &str = "dev-cycle";
const DEFAULT_WORKFLOW_YAML: &str = include_str!("../templates/dev-cycle.yaml");
const CONTEXT_TEMPLATE: &str = include_str!("../templates/CONTEXT.md");
const ROLE_TEMPLATES: &[(&str, &str)] = &[
    ("planner", include_str!("../templates/agents/planner.md")),
    ("implementer", include_str!("../templates/agents/implementer.md")),
    ("reviewer", include_str!("../templates/agents/reviewer.md")),
];

const REQUEST_TEMPLATE: &str = "# Request\n\n\
<!-- Appended automatically by `crew start`; manual entries are welcome. -->\n\
<!-- Mark finished requests as `## [done] [YYYY-MM-DD HH:MM] title`. -->\n";

/// Runtime flags shared by `start` and `continue`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub auto_approve: bool,
    pub nudge_interval: Option<u64>,
    pub keep_session: bool,
    pub debug: bool,
}

/// Scaffold `.crew/` in the working directory.
pub fn init(cwd: &Path, force: bool) -> Result<()> {
    let paths = CrewPaths::for_cwd(cwd);
    if paths.crew_dir.exists() && !force {
        return Err(Error::Config(
            ".crew/ already exists. Use --force to overwrite.".to_string(),
        ));
    }

    for dir in ["workflows", "agents", "signals", "inbox", "logs"] {
        std::fs::create_dir_all(paths.crew_dir.join(dir))?;
    }

    let default_workflow = paths
        .crew_dir
        .join("workflows")
        .join(format!("{}.yaml", DEFAULT_WORKFLOW_NAME));
    if !default_workflow.exists() {
        std::fs::write(&default_workflow, DEFAULT_WORKFLOW_YAML)?;
    }

    for (role, template) in ROLE_TEMPLATES {
        let path = paths.crew_dir.join("agents").join(format!("{}.md", role));
        if !path.exists() {
            std::fs::write(&path, template)?;
        }
    }

    let request_path = paths.crew_dir.join("REQUEST.md");
    if !request_path.exists() {
        std::fs::write(&request_path, REQUEST_TEMPLATE)?;
    }
    let context_path = paths.crew_dir.join("CONTEXT.md");
    if !context_path.exists() {
        std::fs::write(&context_path, CONTEXT_TEMPLATE)?;
    }

    let project_name = cwd
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());
    if Config::load(&paths.crew_dir).is_err() {
        Config::new(&project_name).save(&paths.crew_dir)?;
    }

    update_gitignore(cwd)?;

    println!("Initialized .crew/ directory");
    println!("  Project: {}", project_name);
    println!("  Run 'crew start <workflow> \"<goal>\"' to begin");
    Ok(())
}

fn update_gitignore(cwd: &Path) -> Result<()> {
    let entries = [".crew/state.json", ".crew/logs/", ".crew/inbox/", ".crew/signals/"];
    let path = cwd.join(".gitignore");
    let existing = std::fs::read_to_string(&path).unwrap_or_default();
    let missing: Vec<&str> = entries
        .iter()
        .filter(|e| !existing.contains(**e))
        .copied()
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    let content = format!("{}\n\n# crew\n{}\n", existing.trim_end(), missing.join("\n"));
    std::fs::write(&path, content)?;
    Ok(())
}

fn load_config_or_bail(crew_dir: &Path) -> Result<Config> {
    Config::load(crew_dir)
        .map_err(|_| Error::Config("not initialized. Run 'crew init' first.".to_string()))
}

fn spawn_agents(
    runner: &mut AgentRunner<Tmux, SysProbe>,
    stages: &[StageDefinition],
    auto_approve: bool,
) {
    if auto_approve {
        clog!("Auto-approve mode enabled.");
    }
    let options = crate::adapters::LaunchOptions { auto_approve };
    for stage in stages {
        if let Err(e) = runner.spawn(
            &stage.role,
            &stage.role,
            stage.provider,
            Some(&stage.model),
            options,
        ) {
            clog_error!("Error spawning {}: {}", stage.role, e);
        }
    }
}

fn record_all_pids(runner: &mut AgentRunner<Tmux, SysProbe>, stages: &[StageDefinition]) {
    for stage in stages {
        if let Err(e) = runner.record_pid(&stage.role) {
            clog_warn!("Recording pid for '{}' failed: {}", stage.role, e);
        }
    }
    if let Err(e) = runner.persist_registry() {
        clog_warn!("Persisting registry failed: {}", e);
    }
}

/// Prompt the current stage's agent if it started out active, returning
/// the prompted index for the loop's re-prompt guard.
async fn send_first_prompt(
    engine: &WorkflowEngine,
    runner: &mut AgentRunner<Tmux, SysProbe>,
    stages: &[StageDefinition],
    workflow_name: &str,
    paths: &CrewPaths,
) -> i64 {
    let state = match engine.get_state() {
        Ok(state) => state,
        Err(_) => return -1,
    };
    let idx = state.current_stage_index;
    if let (Some(stage), Some(def)) = (state.stages.get(idx), stages.get(idx)) {
        if stage.status == StageStatus::Active {
            clog!("Sending initial prompt to '{}'...", def.role);
            prompt_agent(runner, &def.role, &def.role, workflow_name, def.context_reset, paths)
                .await;
            return idx as i64;
        }
    }
    -1
}

fn run_settings(config: &Config, options: &RunOptions) -> PollSettings {
    PollSettings {
        poll_interval: Duration::from_secs(config.workflow.poll_interval_seconds),
        nudge_interval: Duration::from_secs(
            options
                .nudge_interval
                .unwrap_or(config.agent.nudge_interval_seconds),
        ),
        max_nudges: config.agent.max_escalation_phase,
        max_respawns: config.agent.max_respawns,
    }
}

fn gate_decider(auto_approve: bool) -> Box<dyn GateDecider> {
    if auto_approve {
        Box::new(AutoApproveGate)
    } else {
        Box::new(InteractiveGate)
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            clog!("\nShutting down...");
            token.cancel();
        }
    });
    cancel
}

async fn teardown<T: TmuxPort, P: ProcessProbe>(
    engine: &mut WorkflowEngine,
    runner: &mut AgentRunner<T, P>,
    keep_session: bool,
) {
    if keep_session {
        clog!("Leaving tmux session '{}' running.", runner.session_name());
    } else if let Err(e) = runner.destroy_session() {
        clog_warn!("Destroying session failed: {}", e);
    }
    // The run may already be completed or errored; that is fine.
    match engine.stop() {
        Ok(()) | Err(Error::NotRunning) => {}
        Err(e) => clog_warn!("Marking workflow stopped failed: {}", e),
    }
}

/// `crew start <workflow> <goal>`: spawn the session and drive the
/// workflow until it finishes or is interrupted.
pub async fn start(cwd: &Path, workflow_name: &str, goal: &str, options: &RunOptions) -> Result<()> {
    let paths = CrewPaths::for_cwd(cwd);
    let config = load_config_or_bail(&paths.crew_dir)?;
    if let Some(log_path) = crate::log::init_run(&paths.crew_dir, options.debug) {
        clog!("Log file: {}", log_path.display());
    }

    let mut engine = WorkflowEngine::new(&paths);
    engine.start(workflow_name, goal)?;
    append_request_entry(&paths.crew_dir, goal, "")?;

    let stages = engine.stage_definitions()?.to_vec();
    let mut runner = AgentRunner::new(Tmux, SysProbe, paths.crew_dir.clone(), paths.cwd.clone());
    runner.create_session(&config.tmux.session_prefix, &config.project_name)?;

    clean_signals_dir(&paths.crew_dir)?;
    runner.setup_layout(stages.len())?;

    let auto_approve = options.auto_approve || config.agent.auto_approve;
    spawn_agents(&mut runner, &stages, auto_approve);
    tokio::time::sleep(STARTUP_SETTLE_DELAY).await;
    record_all_pids(&mut runner, &stages);

    clog!("Workflow '{}' started with goal: \"{}\"", workflow_name, goal);
    clog!("tmux session: {}", runner.session_name());

    let prompted = send_first_prompt(&engine, &mut runner, &stages, workflow_name, &paths).await;

    let cancel = cancel_on_ctrl_c();
    let gate = gate_decider(auto_approve);
    let result = poll_loop(
        &mut engine,
        &mut runner,
        &paths,
        &stages,
        workflow_name,
        gate.as_ref(),
        &run_settings(&config, options),
        prompted,
        &cancel,
    )
    .await;

    // Teardown runs whether the loop finished or failed; a loop error must
    // not leak the tmux session or leave the state file running.
    teardown(
        &mut engine,
        &mut runner,
        options.keep_session || config.tmux.keep_session,
    )
    .await;
    result
}

/// `crew continue`: resume a stopped workflow with fresh agents.
pub async fn continue_run(cwd: &Path, options: &RunOptions) -> Result<()> {
    let paths = CrewPaths::for_cwd(cwd);
    let config = load_config_or_bail(&paths.crew_dir)?;
    if let Some(log_path) = crate::log::init_run(&paths.crew_dir, options.debug) {
        clog!("Log file: {}", log_path.display());
    }

    let mut engine = WorkflowEngine::new(&paths);
    engine.continue_workflow()?;
    let state = engine.get_state()?;
    let stages = engine.stage_definitions()?.to_vec();

    let mut runner = AgentRunner::new(Tmux, SysProbe, paths.crew_dir.clone(), paths.cwd.clone());
    runner.create_session(&config.tmux.session_prefix, &config.project_name)?;

    clean_signals_dir(&paths.crew_dir)?;
    runner.setup_layout(stages.len())?;

    let auto_approve = options.auto_approve || config.agent.auto_approve;
    spawn_agents(&mut runner, &stages, auto_approve);
    tokio::time::sleep(STARTUP_SETTLE_DELAY).await;
    record_all_pids(&mut runner, &stages);

    clog!(
        "Workflow '{}' continued from stage {}/{} ({})",
        state.workflow_name,
        state.current_stage_index + 1,
        stages.len(),
        stages
            .get(state.current_stage_index)
            .map(|s| s.name.as_str())
            .unwrap_or("unknown")
    );
    clog!("tmux session: {}", runner.session_name());

    let prompted =
        send_first_prompt(&engine, &mut runner, &stages, &state.workflow_name, &paths).await;

    let cancel = cancel_on_ctrl_c();
    let gate = gate_decider(auto_approve);
    let result = poll_loop(
        &mut engine,
        &mut runner,
        &paths,
        &stages,
        &state.workflow_name,
        gate.as_ref(),
        &run_settings(&config, options),
        prompted,
        &cancel,
    )
    .await;

    teardown(
        &mut engine,
        &mut runner,
        options.keep_session || config.tmux.keep_session,
    )
    .await;
    result
}

/// `crew stop`: mark the workflow stopped and tear the session down.
pub fn stop(cwd: &Path) -> Result<()> {
    let paths = CrewPaths::for_cwd(cwd);
    let config = load_config_or_bail(&paths.crew_dir)?;

    let mut engine = WorkflowEngine::new(&paths);
    if let Err(e) = engine.stop() {
        eprintln!("Error: {}", e);
    }

    let mut runner = AgentRunner::new(Tmux, SysProbe, paths.crew_dir.clone(), paths.cwd.clone());
    runner.set_session_name(&format!(
        "{}-{}",
        config.tmux.session_prefix, config.project_name
    ));
    runner.destroy_session()?;

    println!("Workflow stopped.");
    Ok(())
}

/// Relaunch a registry-adopted agent, refresh its PIDs in the registry,
/// and re-prompt it when it owns the active stage.
async fn restart_agent<T: TmuxPort, P: ProcessProbe>(
    runner: &mut AgentRunner<T, P>,
    paths: &CrewPaths,
    agent_name: &str,
) -> Result<()> {
    let role = runner
        .agent_info(agent_name)
        .ok_or_else(|| Error::AgentNotFound(agent_name.to_string()))?
        .role
        .clone();

    runner.respawn(agent_name).await?;
    if let Err(e) = runner.wait_for_ready(agent_name, RESPAWN_READY_TIMEOUT).await {
        clog_warn!("Readiness wait for '{}' failed: {}", agent_name, e);
    }
    if let Err(e) = runner.record_pid(agent_name) {
        clog_warn!("Recording pids for '{}' failed: {}", agent_name, e);
    }
    runner.persist_registry()?;

    let state = match read_state(&paths.crew_dir) {
        Ok(state) if state.status == WorkflowStatus::Running => state,
        _ => return Ok(()),
    };
    let def = match load_definition(&state.workflow_name, &paths.workflow_search_paths) {
        Ok(def) => def,
        Err(_) => return Ok(()),
    };
    let idx = state.current_stage_index;
    if let (Some(stage), Some(stage_def)) = (state.stages.get(idx), def.stages.get(idx)) {
        if stage.status == StageStatus::Active && stage_def.role == role {
            clog!("Re-prompting '{}' for stage '{}'", role, stage.name);
            prompt_agent(
                runner,
                agent_name,
                &stage_def.role,
                &state.workflow_name,
                stage_def.context_reset,
                paths,
            )
            .await;
        }
    }
    Ok(())
}

/// `crew restart <agent>`: relaunch one agent of a session another
/// invocation spawned, looked up through the persisted registry.
pub async fn restart(cwd: &Path, agent_name: &str) -> Result<()> {
    let paths = CrewPaths::for_cwd(cwd);
    let config = load_config_or_bail(&paths.crew_dir)?;
    let data = registry::load_registry(&paths.crew_dir)
        .map_err(|_| Error::Config("no agent registry. Run 'crew start' first.".to_string()))?;

    let mut runner = AgentRunner::new(Tmux, SysProbe, paths.crew_dir.clone(), paths.cwd.clone());
    runner.adopt_registry(
        &data,
        LaunchOptions {
            auto_approve: config.agent.auto_approve,
        },
    );
    restart_agent(&mut runner, &paths, agent_name).await?;
    println!("Agent '{}' restarted.", agent_name);
    Ok(())
}

/// `crew list`: enumerate workflow definitions across the search paths.
pub fn list(cwd: &Path) -> Result<()> {
    let paths = CrewPaths::for_cwd(cwd);
    let definitions = list_definitions(&paths.workflow_search_paths);
    if definitions.is_empty() {
        println!("No workflow definitions found.");
        println!("Run 'crew init' to install the defaults.");
        return Ok(());
    }
    println!("Available workflows:");
    for (name, def) in &definitions {
        println!(
            "  {:<16} {} stage(s)  {}",
            name,
            def.stages.len(),
            def.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// `crew status`: render the persisted state and registry, read-only.
pub fn status(cwd: &Path) -> Result<()> {
    let paths = CrewPaths::for_cwd(cwd);
    let state = read_state(&paths.crew_dir)
        .map_err(|_| Error::Config("no active workflow. Run 'crew start' first.".to_string()))?;

    let current = state.stages.get(state.current_stage_index);
    println!(
        "Workflow: {}  Status: {}  Cycle: {}",
        state.workflow_name, state.status, state.cycle_count
    );
    println!(
        "Stage: {} ({})",
        current.map(|s| s.name.as_str()).unwrap_or("none"),
        current.map(|s| s.status.to_string()).unwrap_or_else(|| "unknown".to_string())
    );
    println!();

    match registry::load_registry(&paths.crew_dir) {
        Ok(data) => {
            let probe = SysProbe;
            println!("Agents:");
            for agent in &data.agents {
                let pid = agent.agent_pid.unwrap_or(agent.shell_pid);
                let health = if pid != 0 && probe.is_alive(pid) {
                    "alive"
                } else {
                    "dead"
                };
                let respawns = if agent.respawn_count > 0 {
                    format!("  respawns:{}", agent.respawn_count)
                } else {
                    String::new()
                };
                let pane_idx = agent.pane.rsplit('.').next().unwrap_or("?");
                println!(
                    "  {:<14} pane:{}  pid:{}  {}{}",
                    agent.name, pane_idx, pid, health, respawns
                );
            }
        }
        Err(_) => println!("Agents: (no registry)"),
    }
    Ok(())
}

/// `crew approve`: release the pending gate from another invocation.
pub fn approve(cwd: &Path) -> Result<()> {
    let paths = CrewPaths::for_cwd(cwd);
    let mut engine = WorkflowEngine::new(&paths);
    engine.approve_gate()?;
    println!("Gate approved.");
    Ok(())
}

/// `crew reject`: reject the pending gate and end the workflow.
pub fn reject(cwd: &Path) -> Result<()> {
    let paths = CrewPaths::for_cwd(cwd);
    let mut engine = WorkflowEngine::new(&paths);
    engine.reject_gate()?;
    println!("Gate rejected. Workflow stopped.");
    Ok(())
}

/// `crew doctor`: check that the external tools crew drives are present.
pub fn doctor() -> Result<()> {
    println!("Checking prerequisites...\n");

    let mut all_ok = true;
    match Tmux::version() {
        Ok(version) => println!("  [OK] tmux: {}", version),
        Err(_) => {
            println!("  [FAIL] tmux: not found");
            all_ok = false;
        }
    }

    for name in ["claude", "codex"] {
        if which::which(name).is_err() {
            println!("  [FAIL] {}: not found", name);
            all_ok = false;
            continue;
        }
        match Command::new(name).arg("--version").output() {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_string();
                println!("  [OK] {}: {}", name, version);
            }
            _ => {
                println!("  [FAIL] {}: not found or error", name);
                all_ok = false;
            }
        }
    }

    println!();
    if all_ok {
        println!("All checks passed.");
        Ok(())
    } else {
        Err(Error::Config(
            "some checks failed. Install missing tools before running crew.".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Provider;
    use crate::runner::test_support::{runner_with, MockProbe, MockTmux};
    use tempfile::TempDir;

    const SOLO_YAML: &str = r#"
name: solo
stages:
  - {name: work, role: planner, provider: claude-code, model: m1}
"#;

    fn project_with_workflow(dir: &TempDir) -> CrewPaths {
        let paths = CrewPaths::isolated(dir.path());
        let workflows = paths.crew_dir.join("workflows");
        std::fs::create_dir_all(&workflows).unwrap();
        std::fs::write(workflows.join("solo.yaml"), SOLO_YAML).unwrap();
        paths
    }

    #[tokio::test]
    async fn test_teardown_closes_session_and_state() {
        let dir = TempDir::new().unwrap();
        let paths = project_with_workflow(&dir);
        let mut engine = WorkflowEngine::new(&paths);
        engine.start("solo", "goal").unwrap();

        let tmux = MockTmux::default();
        let probe = MockProbe::default();
        let mut runner = runner_with(&tmux, &probe, dir.path());
        runner.create_session("crew", "proj").unwrap();

        teardown(&mut engine, &mut runner, false).await;

        assert!(tmux
            .recorded()
            .contains(&"kill-session crew-proj".to_string()));
        assert_eq!(
            engine.get_state().unwrap().status,
            crate::workflow::WorkflowStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_teardown_tolerates_errored_workflow() {
        // The loop can exit with the workflow already in a terminal state;
        // teardown must still kill the session without reporting anything.
        let dir = TempDir::new().unwrap();
        let paths = project_with_workflow(&dir);
        let mut engine = WorkflowEngine::new(&paths);
        engine.start("solo", "goal").unwrap();
        engine.stop().unwrap();

        let tmux = MockTmux::default();
        let probe = MockProbe::default();
        let mut runner = runner_with(&tmux, &probe, dir.path());
        runner.create_session("crew", "proj").unwrap();

        teardown(&mut engine, &mut runner, false).await;
        assert!(tmux
            .recorded()
            .contains(&"kill-session crew-proj".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_agent_reprompts_active_stage_owner() {
        let dir = TempDir::new().unwrap();
        let paths = project_with_workflow(&dir);
        let mut engine = WorkflowEngine::new(&paths);
        engine.start("solo", "goal").unwrap();

        // First invocation spawns the agent and persists the registry.
        let tmux = MockTmux::default();
        let probe = MockProbe::default();
        {
            let mut runner = runner_with(&tmux, &probe, dir.path());
            runner.create_session("crew", "proj").unwrap();
            runner
                .spawn("planner", "planner", Provider::ClaudeCode, Some("m1"),
                    LaunchOptions::default())
                .unwrap();
            *tmux.pane_pid.lock().unwrap() = Some(100);
            runner.record_pid("planner").unwrap();
            runner.persist_registry().unwrap();
        }

        // A later invocation adopts the registry and restarts by name.
        let data = registry::load_registry(&paths.crew_dir).unwrap();
        let mut runner = runner_with(&tmux, &probe, dir.path());
        runner.adopt_registry(&data, LaunchOptions::default());
        restart_agent(&mut runner, &paths, "planner").await.unwrap();

        let persisted = registry::load_registry(&paths.crew_dir).unwrap();
        assert_eq!(persisted.agents[0].respawn_count, 1);
        // The planner owns the active stage, so it was re-prompted.
        assert!(tmux
            .recorded()
            .iter()
            .any(|c| c.starts_with("send-prompt-file crew-proj:0.0")));
    }

    #[tokio::test]
    async fn test_restart_agent_unknown_name() {
        let dir = TempDir::new().unwrap();
        let paths = project_with_workflow(&dir);

        let tmux = MockTmux::default();
        let probe = MockProbe::default();
        let mut runner = runner_with(&tmux, &probe, dir.path());
        assert!(matches!(
            restart_agent(&mut runner, &paths, "nobody").await,
            Err(Error::AgentNotFound(_))
        ));
    }

    #[test]
    fn test_init_scaffolds_crew_dir() {
        let dir = TempDir::new().unwrap();
        init(dir.path(), false).unwrap();

        let crew = dir.path().join(".crew");
        assert!(crew.join("workflows/dev-cycle.yaml").exists());
        assert!(crew.join("agents/planner.md").exists());
        assert!(crew.join("agents/implementer.md").exists());
        assert!(crew.join("agents/reviewer.md").exists());
        assert!(crew.join("REQUEST.md").exists());
        assert!(crew.join("CONTEXT.md").exists());
        assert!(crew.join("config.yaml").exists());
        assert!(crew.join("signals").is_dir());
        assert!(crew.join("logs").is_dir());

        let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(gitignore.contains(".crew/state.json"));
        assert!(gitignore.contains(".crew/logs/"));
    }

    #[test]
    fn test_init_refuses_existing_without_force() {
        let dir = TempDir::new().unwrap();
        init(dir.path(), false).unwrap();
        assert!(matches!(init(dir.path(), false), Err(Error::Config(_))));
        init(dir.path(), true).unwrap();
    }

    #[test]
    fn test_init_preserves_user_edits_on_force() {
        let dir = TempDir::new().unwrap();
        init(dir.path(), false).unwrap();
        let request = dir.path().join(".crew/REQUEST.md");
        std::fs::write(&request, "# Request\n\n## [2026-08-01 09:00] custom\n").unwrap();

        init(dir.path(), true).unwrap();
        let content = std::fs::read_to_string(&request).unwrap();
        assert!(content.contains("custom"));
    }

    #[test]
    fn test_init_loads_workflow_it_wrote() {
        let dir = TempDir::new().unwrap();
        init(dir.path(), false).unwrap();

        let paths = CrewPaths::for_cwd(dir.path());
        let def =
            crate::workflow::load_definition(DEFAULT_WORKFLOW_NAME, &paths.workflow_search_paths)
                .unwrap();
        assert_eq!(def.stages.len(), 3);
        assert!(def.loop_on_changes);
        assert!(def.stages[0].human_gate);
    }

    #[test]
    fn test_status_without_state() {
        let dir = TempDir::new().unwrap();
        assert!(status(dir.path()).is_err());
    }

    #[test]
    fn test_gitignore_not_duplicated() {
        let dir = TempDir::new().unwrap();
        init(dir.path(), false).unwrap();
        init(dir.path(), true).unwrap();

        let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore.matches(".crew/state.json").count(), 1);
    }

    #[test]
    fn test_approve_requires_state() {
        let dir = TempDir::new().unwrap();
        assert!(approve(dir.path()).is_err());
    }
}
