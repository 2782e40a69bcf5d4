//! Persisted workflow run state.
//!
//! One `state.json` per working directory is the single source of truth for
//! a run. Writes go through a temp file plus rename so a crash mid-write
//! never leaves a torn state file. The file is never deleted; a finished
//! run stays inspectable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// Lifecycle status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Idle => write!(f, "idle"),
            WorkflowStatus::Running => write!(f, "running"),
            WorkflowStatus::Paused => write!(f, "paused"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Error => write!(f, "error"),
        }
    }
}

/// Status of one stage within the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Active,
    WaitingGate,
    Completed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::Active => write!(f, "active"),
            StageStatus::WaitingGate => write!(f, "waiting_gate"),
            StageStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageState {
    pub name: String,
    pub status: StageStatus,
}

/// The persisted state of one workflow run.
///
/// Invariants: `current_stage_index` is in bounds; all stages before it are
/// completed while the run is in progress; `cycle_count` starts at 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub workflow_name: String,
    pub goal: String,
    pub status: WorkflowStatus,
    pub current_stage_index: usize,
    pub cycle_count: u32,
    pub stages: Vec<StageState>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn current_stage(&self) -> Option<&StageState> {
        self.stages.get(self.current_stage_index)
    }

    pub fn current_stage_mut(&mut self) -> Option<&mut StageState> {
        self.stages.get_mut(self.current_stage_index)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Read the state file for a working directory.
pub fn read_state(crew_dir: &Path) -> Result<WorkflowState> {
    let path = crew_dir.join("state.json");
    let raw = std::fs::read_to_string(&path)
        .map_err(|_| Error::Validation(format!("state file not found: {}", path.display())))?;
    let state: WorkflowState = serde_json::from_str(&raw)
        .map_err(|e| Error::Validation(format!("state.json invalid: {}", e)))?;
    Ok(state)
}

/// Write the state file atomically (temp file + rename).
pub fn write_state(crew_dir: &Path, state: &WorkflowState) -> Result<()> {
    std::fs::create_dir_all(crew_dir)?;
    let path = crew_dir.join("state.json");
    let tmp = crew_dir.join("state.json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}
