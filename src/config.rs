//! Project configuration and path resolution.
//!
//! Configuration lives at `.crew/config.yaml` inside the working directory.
//! All paths the subsystems touch are carried in an explicit [`CrewPaths`]
//! value; nothing below the CLI layer reads the process environment.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{clog_debug, Error, Result};

/// Default per-role model assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefaults {
    #[serde(default = "default_planner_model")]
    pub planner_model: String,
    #[serde(default = "default_implementer_model")]
    pub implementer_model: String,
    #[serde(default = "default_reviewer_model")]
    pub reviewer_model: String,
}

fn default_planner_model() -> String {
    "claude-opus-4-6".to_string()
}

fn default_implementer_model() -> String {
    "codex-1".to_string()
}

fn default_reviewer_model() -> String {
    "claude-opus-4-6".to_string()
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            planner_model: default_planner_model(),
            implementer_model: default_implementer_model(),
            reviewer_model: default_reviewer_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmuxConfig {
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,
    #[serde(default)]
    pub keep_session: bool,
}

fn default_session_prefix() -> String {
    "crew".to_string()
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            session_prefix: default_session_prefix(),
            keep_session: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Idle time before an agent gets a re-engagement message.
    #[serde(default = "default_nudge_interval")]
    pub nudge_interval_seconds: u64,
    /// Max nudges per idle streak before escalation stops.
    #[serde(default = "default_max_nudges")]
    pub max_escalation_phase: u32,
    /// Max automatic respawns of a dying agent.
    #[serde(default = "default_max_respawns")]
    pub max_respawns: u32,
    #[serde(default)]
    pub auto_approve: bool,
}

fn default_nudge_interval() -> u64 {
    300
}

fn default_max_nudges() -> u32 {
    3
}

fn default_max_respawns() -> u32 {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            nudge_interval_seconds: default_nudge_interval(),
            max_escalation_phase: default_max_nudges(),
            max_respawns: default_max_respawns(),
            auto_approve: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub project_name: String,
    #[serde(default)]
    pub defaults: ModelDefaults,
    #[serde(default)]
    pub tmux: TmuxConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl Config {
    pub fn new(project_name: &str) -> Self {
        Self {
            project_name: project_name.to_string(),
            defaults: ModelDefaults::default(),
            tmux: TmuxConfig::default(),
            agent: AgentConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }

    pub fn load(crew_dir: &Path) -> Result<Self> {
        let path = crew_dir.join("config.yaml");
        clog_debug!("Config::load path={}", path.display());
        let raw = fs::read_to_string(&path)
            .map_err(|_| Error::Config(format!("config.yaml not found in {}", crew_dir.display())))?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| Error::Config(format!("config.yaml invalid: {}", e)))?;
        clog_debug!(
            "Config loaded: project={} poll_interval={}s nudge_interval={}s",
            config.project_name,
            config.workflow.poll_interval_seconds,
            config.agent.nudge_interval_seconds
        );
        Ok(config)
    }

    pub fn save(&self, crew_dir: &Path) -> Result<()> {
        if !crew_dir.exists() {
            fs::create_dir_all(crew_dir)?;
        }
        let path = crew_dir.join("config.yaml");
        fs::write(&path, serde_yaml::to_string(self)?)?;
        clog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}

/// Explicit path bundle threaded through the subsystems.
#[derive(Debug, Clone)]
pub struct CrewPaths {
    /// The project working directory agents run in.
    pub cwd: PathBuf,
    /// The `.crew` state directory inside the working directory.
    pub crew_dir: PathBuf,
    /// Ordered search paths for workflow definition files.
    pub workflow_search_paths: Vec<PathBuf>,
}

impl CrewPaths {
    /// Resolve paths for a working directory.
    ///
    /// Definition lookup order: project-local `.crew/workflows`, then the
    /// user's `~/.crew/workflows`, then the bundled `templates/` directory.
    pub fn for_cwd(cwd: &Path) -> Self {
        let crew_dir = cwd.join(".crew");
        let mut search_paths = vec![crew_dir.join("workflows")];
        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(".crew").join("workflows"));
        }
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                search_paths.push(dir.join("templates"));
            }
        }
        Self {
            cwd: cwd.to_path_buf(),
            crew_dir,
            workflow_search_paths: search_paths,
        }
    }

    /// Paths rooted entirely inside a given directory, for tests and tools
    /// that must not touch the user's home directory.
    pub fn isolated(cwd: &Path) -> Self {
        let crew_dir = cwd.join(".crew");
        Self {
            cwd: cwd.to_path_buf(),
            workflow_search_paths: vec![crew_dir.join("workflows")],
            crew_dir,
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.crew_dir.join("state.json")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.crew_dir.join("agents.json")
    }

    pub fn signals_dir(&self) -> PathBuf {
        self.crew_dir.join("signals")
    }
}
