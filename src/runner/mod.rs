//! Agent lifecycle management.
//!
//! [`AgentRunner`] hosts one CLI agent per tmux pane: spawn, stop, status,
//! prompting, health checks and respawn. It is generic over the tmux
//! transport and the process probe so tests can run against scripted
//! fakes. All durable facts about agents go through
//! [`registry`](self::registry).

pub mod registry;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::Instant;

use regex::Regex;

use crate::adapters::{resolve_adapter, AgentStatus, CliAdapter, LaunchOptions, Provider};
use crate::probe::ProcessProbe;
use crate::tmux::{SplitDirection, TmuxPort};
use crate::{clog, clog_debug, clog_warn, Error, Result};

use registry::{AgentRecord, AgentRegistryData};

static AGENT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap());

/// Control characters are stripped from nudge text before it reaches
/// send-keys; newlines and tabs survive.
static CONTROL_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f\x7f]").unwrap());

/// Interval between status polls while waiting for an agent to come up.
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Settle time after interrupting a pane before relaunching into it.
const RESPAWN_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Verdict of a PID-level health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessHealth {
    Alive,
    Dead,
    /// No shell PID was ever recorded for the agent.
    Unknown,
}

/// In-memory view of one hosted agent.
pub struct AgentHandle {
    pub name: String,
    pub role: String,
    pub pane: String,
    pub provider: Provider,
    adapter: Box<dyn CliAdapter>,
    pub model: Option<String>,
    pub options: LaunchOptions,
    pub shell_pid: Option<u32>,
    pub agent_pid: Option<u32>,
    pub spawned_at: DateTime<Utc>,
    pub respawn_count: u32,
}

pub struct AgentRunner<T: TmuxPort, P: ProcessProbe> {
    tmux: T,
    probe: P,
    crew_dir: PathBuf,
    cwd: PathBuf,
    session_name: String,
    agents: BTreeMap<String, AgentHandle>,
    pane_index: u32,
}

impl<T: TmuxPort, P: ProcessProbe> AgentRunner<T, P> {
    pub fn new(tmux: T, probe: P, crew_dir: PathBuf, cwd: PathBuf) -> Self {
        Self {
            tmux,
            probe,
            crew_dir,
            cwd,
            session_name: String::new(),
            agents: BTreeMap::new(),
            pane_index: 0,
        }
    }

    fn validate_agent_name(name: &str) -> Result<()> {
        if !AGENT_NAME_RE.is_match(name) {
            return Err(Error::AgentNotFound(format!("invalid agent name: {}", name)));
        }
        Ok(())
    }

    fn agent(&self, name: &str) -> Result<&AgentHandle> {
        self.agents
            .get(name)
            .ok_or_else(|| Error::AgentNotFound(name.to_string()))
    }

    fn agent_mut(&mut self, name: &str) -> Result<&mut AgentHandle> {
        self.agents
            .get_mut(name)
            .ok_or_else(|| Error::AgentNotFound(name.to_string()))
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    /// Adopt an existing session name without creating it, e.g. when
    /// continuing after a process restart.
    pub fn set_session_name(&mut self, name: &str) {
        self.session_name = name.to_string();
    }

    pub fn agent_info(&self, name: &str) -> Option<&AgentHandle> {
        self.agents.get(name)
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    /// Rebuild the in-memory agents from a persisted registry snapshot, so
    /// a fresh process can act on agents another invocation spawned.
    pub fn adopt_registry(&mut self, data: &AgentRegistryData, options: LaunchOptions) {
        self.session_name = data.session_name.clone();
        self.agents.clear();
        for record in &data.agents {
            self.agents.insert(
                record.name.clone(),
                AgentHandle {
                    name: record.name.clone(),
                    role: record.role.clone(),
                    pane: record.pane.clone(),
                    provider: record.provider,
                    adapter: resolve_adapter(record.provider),
                    model: record.model.clone(),
                    options,
                    shell_pid: (record.shell_pid != 0).then_some(record.shell_pid),
                    agent_pid: record.agent_pid,
                    spawned_at: record.spawned_at,
                    respawn_count: record.respawn_count,
                },
            );
        }
        self.pane_index = data.agents.len() as u32;
        clog_debug!(
            "Adopted {} agent(s) from registry for session '{}'",
            data.agents.len(),
            self.session_name
        );
    }

    /// Create the detached session `<prefix>-<project>` all panes live in.
    pub fn create_session(&mut self, session_prefix: &str, project_name: &str) -> Result<()> {
        let name = format!("{}-{}", session_prefix, project_name);
        if self.tmux.has_session(&name) {
            return Err(Error::SessionExists(name));
        }
        self.tmux.new_session(&name)?;
        self.session_name = name;
        clog!("tmux session '{}' created", self.session_name);
        Ok(())
    }

    /// Stop every agent and kill the session.
    pub fn destroy_session(&mut self) -> Result<()> {
        if self.session_name.is_empty() {
            return Ok(());
        }
        self.stop_all();
        let result = self.tmux.kill_session(&self.session_name);
        self.session_name.clear();
        self.agents.clear();
        self.pane_index = 0;
        result
    }

    /// Split the session window into one pane per agent. The first pane
    /// already exists; three agents get the tiled layout.
    pub fn setup_layout(&self, agent_count: usize) -> Result<()> {
        if self.session_name.is_empty() {
            return Err(Error::Tmux("no active session".to_string()));
        }
        for i in 1..agent_count {
            let direction = if i == 1 {
                SplitDirection::Horizontal
            } else {
                SplitDirection::Vertical
            };
            self.tmux.split_window(&self.session_name, direction)?;
        }
        if agent_count == 3 {
            self.tmux.select_layout(&self.session_name, "tiled")?;
        }
        Ok(())
    }

    /// Launch a provider CLI in the next pane and register the agent.
    pub fn spawn(
        &mut self,
        agent_name: &str,
        role: &str,
        provider: Provider,
        model: Option<&str>,
        options: LaunchOptions,
    ) -> Result<()> {
        Self::validate_agent_name(agent_name)?;
        if self.agents.contains_key(agent_name) {
            return Err(Error::SpawnFailed(format!(
                "agent {} already exists",
                agent_name
            )));
        }

        let adapter = resolve_adapter(provider);
        let pane = format!("{}:0.{}", self.session_name, self.pane_index);
        let command = adapter.start_command(model, &self.cwd, options);
        self.tmux.send_text(&pane, &command)?;

        clog!("Agent '{}' ({}) spawned in pane {}", agent_name, role, pane);
        self.agents.insert(
            agent_name.to_string(),
            AgentHandle {
                name: agent_name.to_string(),
                role: role.to_string(),
                pane,
                provider,
                adapter,
                model: model.map(str::to_string),
                options,
                shell_pid: None,
                agent_pid: None,
                spawned_at: Utc::now(),
                respawn_count: 0,
            },
        );
        self.pane_index += 1;
        Ok(())
    }

    /// Interrupt the agent's pane and forget the agent.
    pub fn stop(&mut self, agent_name: &str) -> Result<()> {
        let pane = self.agent(agent_name)?.pane.clone();
        self.tmux.send_keys(&pane, "C-c")?;
        self.agents.remove(agent_name);
        clog_debug!("Agent '{}' stopped", agent_name);
        Ok(())
    }

    /// Best-effort stop of every agent. A pane that is already gone must
    /// not keep the session teardown from reaching kill-session.
    pub fn stop_all(&mut self) {
        for name in self.agent_names() {
            if let Err(e) = self.stop(&name) {
                clog_warn!("Stopping agent '{}' failed: {}", name, e);
                self.agents.remove(&name);
            }
        }
    }

    /// Poll until the agent has been seen active and then goes idle.
    ///
    /// A timeout is not an error: some CLIs never match the prompt
    /// heuristic, and prompting a busy agent is harmless.
    pub async fn wait_for_ready(&self, agent_name: &str, timeout: Duration) -> Result<()> {
        self.agent(agent_name)?;

        let start = Instant::now();
        let mut saw_active = false;
        while start.elapsed() < timeout {
            if let Ok(status) = self.get_status(agent_name) {
                if status == AgentStatus::Active {
                    saw_active = true;
                }
                if saw_active && status == AgentStatus::Idle {
                    clog_debug!("Agent '{}' ready after {:?}", agent_name, start.elapsed());
                    return Ok(());
                }
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
        clog_warn!(
            "Agent '{}' readiness wait timed out after {:?}; proceeding",
            agent_name,
            timeout
        );
        Ok(())
    }

    /// Deliver a multi-line prompt through a tmux paste buffer. The prompt
    /// goes to a per-agent file first so newlines arrive intact.
    pub fn send_initial_prompt(&self, agent_name: &str, prompt: &str) -> Result<()> {
        let agent = self.agent(agent_name)?;

        let prompt_dir = std::env::temp_dir().join("crew-prompts");
        std::fs::create_dir_all(&prompt_dir)?;
        let prompt_path = prompt_dir.join(format!("{}.md", agent_name));
        let tmp = prompt_dir.join(format!("{}.md.tmp", agent_name));
        std::fs::write(&tmp, prompt)?;
        std::fs::rename(&tmp, &prompt_path)?;

        self.tmux.send_prompt_file(&agent.pane, &prompt_path)
    }

    /// Type a short message into the agent's pane, stripped of control
    /// characters.
    pub fn send_nudge(&self, agent_name: &str, message: &str) -> Result<()> {
        let agent = self.agent(agent_name)?;
        let sanitized = CONTROL_CHARS_RE.replace_all(message, "");
        self.tmux.send_text(&agent.pane, &sanitized)
    }

    /// Send the provider's clear incantation without restarting the CLI.
    pub fn reset_context(&self, agent_name: &str) -> Result<()> {
        let agent = self.agent(agent_name)?;
        clog_debug!("Agent '{}' context reset", agent_name);
        self.tmux.send_text(&agent.pane, agent.adapter.clear_command())
    }

    pub fn get_status(&self, agent_name: &str) -> Result<AgentStatus> {
        let agent = self.agent(agent_name)?;
        let output = self.tmux.capture_pane(&agent.pane)?;
        Ok(agent.adapter.detect_status(&output))
    }

    /// Status for every agent; a capture failure maps to `Error` rather
    /// than failing the whole sweep.
    pub fn get_all_statuses(&self) -> BTreeMap<String, AgentStatus> {
        self.agents
            .iter()
            .map(|(name, agent)| {
                let status = self
                    .tmux
                    .capture_pane(&agent.pane)
                    .map(|out| agent.adapter.detect_status(&out))
                    .unwrap_or(AgentStatus::Error);
                (name.clone(), status)
            })
            .collect()
    }

    pub fn is_active(&self, agent_name: &str) -> Result<bool> {
        Ok(self.get_status(agent_name)? == AgentStatus::Active)
    }

    /// Append a message to the agent's inbox file.
    pub fn write_inbox(&self, agent_name: &str, content: &str) -> Result<()> {
        Self::validate_agent_name(agent_name)?;
        let inbox_dir = self.crew_dir.join("inbox");
        std::fs::create_dir_all(&inbox_dir)?;
        let inbox_path = inbox_dir.join(format!("{}.md", agent_name));
        let tmp = inbox_dir.join(format!("{}.md.tmp", agent_name));
        let existing = std::fs::read_to_string(&inbox_path).unwrap_or_default();
        std::fs::write(&tmp, format!("{}{}\n", existing, content))
            .map_err(|e| Error::NudgeFailed(e.to_string()))?;
        std::fs::rename(&tmp, &inbox_path).map_err(|e| Error::NudgeFailed(e.to_string()))?;
        Ok(())
    }

    /// Record the pane's shell PID and, when present, its first child as
    /// the CLI process. Call this after the CLI has had time to start so
    /// the first child is the agent rather than a transient.
    pub fn record_pid(&mut self, agent_name: &str) -> Result<()> {
        let pane = self.agent(agent_name)?.pane.clone();
        let shell_pid = self.tmux.pane_pid(&pane)?;
        let children = self.probe.child_pids(shell_pid).unwrap_or_default();

        let agent = self.agent_mut(agent_name)?;
        agent.shell_pid = Some(shell_pid);
        if let Some(&first) = children.first() {
            agent.agent_pid = Some(first);
        }
        clog_debug!(
            "Agent '{}' pids recorded: shell={} agent={:?}",
            agent_name,
            shell_pid,
            agent.agent_pid
        );
        Ok(())
    }

    /// PID-level liveness verdict.
    ///
    /// A dead recorded agent PID alone is not fatal; the shell may have
    /// replaced the CLI process. Only a dead agent PID with no surviving
    /// children is `Dead`.
    pub fn check_health(&self, agent_name: &str) -> Result<ProcessHealth> {
        let agent = self.agent(agent_name)?;

        let shell_pid = match agent.shell_pid {
            Some(pid) => pid,
            None => return Ok(ProcessHealth::Unknown),
        };
        if !self.probe.is_alive(shell_pid) {
            return Ok(ProcessHealth::Dead);
        }
        if let Some(agent_pid) = agent.agent_pid {
            if !self.probe.is_alive(agent_pid) {
                let children = self.probe.child_pids(shell_pid)?;
                if children.is_empty() {
                    return Ok(ProcessHealth::Dead);
                }
            }
        }
        Ok(ProcessHealth::Alive)
    }

    /// Relaunch a dead agent's CLI in its existing pane.
    pub async fn respawn(&mut self, agent_name: &str) -> Result<()> {
        let (pane, agent_pid, command) = {
            let agent = self.agent(agent_name)?;
            let command = agent
                .adapter
                .start_command(agent.model.as_deref(), &self.cwd, agent.options);
            (agent.pane.clone(), agent.agent_pid, command)
        };

        // Best-effort terminate the old CLI process if it is still around.
        if let Some(pid) = agent_pid {
            if self.probe.is_alive(pid) {
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
        }

        self.tmux.send_keys(&pane, "C-c")?;
        tokio::time::sleep(RESPAWN_SETTLE_DELAY).await;

        self.tmux
            .send_text(&pane, &command)
            .map_err(|e| Error::RespawnFailed(e.to_string()))?;

        let agent = self.agent_mut(agent_name)?;
        agent.respawn_count += 1;
        agent.spawned_at = Utc::now();
        agent.agent_pid = None;
        clog!(
            "Agent '{}' respawned (count={})",
            agent_name,
            agent.respawn_count
        );
        Ok(())
    }

    /// Snapshot the in-memory agents into `agents.json`.
    pub fn persist_registry(&self) -> Result<()> {
        let agents = self
            .agents
            .values()
            .map(|a| AgentRecord {
                name: a.name.clone(),
                role: a.role.clone(),
                pane: a.pane.clone(),
                provider: a.provider,
                model: a.model.clone(),
                shell_pid: a.shell_pid.unwrap_or(0),
                agent_pid: a.agent_pid,
                spawned_at: a.spawned_at,
                respawn_count: a.respawn_count,
            })
            .collect();
        let data = AgentRegistryData {
            session_name: self.session_name.clone(),
            agents,
            updated_at: Utc::now(),
        };
        registry::save_registry(&self.crew_dir, &data)
    }
}
