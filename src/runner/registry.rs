//! Persisted agent registry.
//!
//! `agents.json` records which agents a session hosts, their panes and
//! their PIDs, so a later `crew continue` can find them again. Saves stamp
//! `updatedAt` and go through temp file plus rename.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::adapters::Provider;
use crate::{Error, Result};

/// One persisted agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub name: String,
    pub role: String,
    /// tmux pane target, e.g. `crew-proj:0.2`.
    pub pane: String,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// PID of the pane's shell; 0 when never recorded.
    pub shell_pid: u32,
    /// PID of the CLI process under the shell, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_pid: Option<u32>,
    pub spawned_at: DateTime<Utc>,
    #[serde(default)]
    pub respawn_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegistryData {
    pub session_name: String,
    pub agents: Vec<AgentRecord>,
    pub updated_at: DateTime<Utc>,
}

pub fn load_registry(crew_dir: &Path) -> Result<AgentRegistryData> {
    let path = crew_dir.join("agents.json");
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| Error::Validation(format!("agents.json read failed: {}", e)))?;
    let data: AgentRegistryData = serde_json::from_str(&raw)
        .map_err(|e| Error::Validation(format!("agents.json validation failed: {}", e)))?;
    Ok(data)
}

pub fn save_registry(crew_dir: &Path, data: &AgentRegistryData) -> Result<()> {
    std::fs::create_dir_all(crew_dir)?;
    let mut stamped = data.clone();
    stamped.updated_at = Utc::now();
    let path = crew_dir.join("agents.json");
    let tmp = crew_dir.join("agents.json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(&stamped)?)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}
