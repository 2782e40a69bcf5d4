//! The workflow state machine.
//!
//! `WorkflowEngine` owns every mutation of the persisted
//! [`WorkflowState`]: stage sequencing, human gates, cycle looping and the
//! terminal transitions. The control loop only reads snapshots and calls
//! the mutating operations; it never edits state itself.

use chrono::Utc;
use std::path::PathBuf;

use crate::config::CrewPaths;
use crate::{clog, clog_debug, Error, Result};

use super::schema::{load_definition, StageDefinition, WorkflowDefinition};
use super::state::{
    read_state, write_state, StageState, StageStatus, WorkflowState, WorkflowStatus,
};

pub struct WorkflowEngine {
    crew_dir: PathBuf,
    search_paths: Vec<PathBuf>,
    definition: Option<WorkflowDefinition>,
}

impl WorkflowEngine {
    pub fn new(paths: &CrewPaths) -> Self {
        Self {
            crew_dir: paths.crew_dir.clone(),
            search_paths: paths.workflow_search_paths.clone(),
            definition: None,
        }
    }

    /// Start a named workflow with a goal.
    ///
    /// Fails with `AlreadyRunning` if a running state file exists, and with
    /// `WorkflowNotFound`/`InvalidDefinition` if the template is missing or
    /// malformed. Stage 0 becomes active, or waiting on its gate.
    pub fn start(&mut self, workflow_name: &str, goal: &str) -> Result<()> {
        if let Ok(existing) = read_state(&self.crew_dir) {
            if existing.status == WorkflowStatus::Running {
                return Err(Error::AlreadyRunning);
            }
        }

        let def = load_definition(workflow_name, &self.search_paths)?;
        let now = Utc::now();
        let mut state = WorkflowState {
            workflow_name: workflow_name.to_string(),
            goal: goal.to_string(),
            status: WorkflowStatus::Running,
            current_stage_index: 0,
            cycle_count: 1,
            stages: def
                .stages
                .iter()
                .map(|s| StageState {
                    name: s.name.clone(),
                    status: StageStatus::Pending,
                })
                .collect(),
            started_at: now,
            updated_at: now,
        };

        Self::activate_stage(&mut state, &def, 0);
        self.definition = Some(def);

        clog!("Workflow '{}' started", workflow_name);
        write_state(&self.crew_dir, &state)
    }

    /// Complete the current stage and move to the next, or loop/close.
    ///
    /// On `MaxCyclesExceeded` the error status is persisted before the
    /// error is returned, so callers can still inspect the run.
    pub fn advance(&mut self) -> Result<()> {
        let mut state = self.ensure_running()?;
        let def = self.ensure_definition(&state.workflow_name)?.clone();

        let current = state
            .current_stage()
            .ok_or_else(|| Error::InvalidDefinition("stage index out of bounds".into()))?;
        if current.status == StageStatus::WaitingGate {
            return Err(Error::GatePending);
        }

        if let Some(stage) = state.current_stage_mut() {
            stage.status = StageStatus::Completed;
        }

        let next_index = state.current_stage_index + 1;
        if next_index < state.stages.len() {
            state.current_stage_index = next_index;
            Self::activate_stage(&mut state, &def, next_index);
        } else if let Err(e) = Self::evaluate_loop_or_close(&mut state, &def) {
            // Persist the error state before surfacing it.
            state.touch();
            write_state(&self.crew_dir, &state)?;
            return Err(e);
        }

        state.touch();
        write_state(&self.crew_dir, &state)
    }

    /// All stages done: close the run, or wind back to stage 0 for another
    /// cycle when looping is enabled and the cap allows it.
    fn evaluate_loop_or_close(state: &mut WorkflowState, def: &WorkflowDefinition) -> Result<()> {
        if !def.loop_on_changes {
            state.status = WorkflowStatus::Completed;
            return Ok(());
        }

        if state.cycle_count >= def.max_cycles {
            state.status = WorkflowStatus::Error;
            return Err(Error::MaxCyclesExceeded);
        }

        state.cycle_count += 1;
        state.current_stage_index = 0;
        for stage in &mut state.stages {
            stage.status = StageStatus::Pending;
        }
        Self::activate_stage(state, def, 0);
        Ok(())
    }

    fn activate_stage(state: &mut WorkflowState, def: &WorkflowDefinition, index: usize) {
        if let (Some(stage), Some(stage_def)) = (state.stages.get_mut(index), def.stages.get(index))
        {
            stage.status = if stage_def.human_gate {
                StageStatus::WaitingGate
            } else {
                StageStatus::Active
            };
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        let mut state = self.ensure_running()?;
        state.status = WorkflowStatus::Paused;
        state.touch();
        write_state(&self.crew_dir, &state)
    }

    pub fn resume(&mut self) -> Result<()> {
        let mut state = read_state(&self.crew_dir)?;
        if state.status != WorkflowStatus::Paused {
            return Err(Error::NotRunning);
        }
        state.status = WorkflowStatus::Running;
        state.touch();
        write_state(&self.crew_dir, &state)
    }

    /// Resume a non-running workflow after a process restart.
    ///
    /// A completed current stage advances to the next non-completed stage;
    /// a pending one is activated in place; an active or gated one is left
    /// untouched.
    pub fn continue_workflow(&mut self) -> Result<()> {
        let mut state = read_state(&self.crew_dir)?;
        if state.status == WorkflowStatus::Running {
            return Err(Error::AlreadyRunning);
        }
        if state
            .stages
            .iter()
            .all(|s| s.status == StageStatus::Completed)
        {
            return Err(Error::WorkflowCompleted);
        }

        let def = load_definition(&state.workflow_name, &self.search_paths)?;
        state.status = WorkflowStatus::Running;

        match state.current_stage().map(|s| s.status) {
            Some(StageStatus::Completed) => {
                // Skip ahead to the first stage that still needs work.
                for i in state.current_stage_index + 1..state.stages.len() {
                    if state.stages[i].status != StageStatus::Completed {
                        state.current_stage_index = i;
                        Self::activate_stage(&mut state, &def, i);
                        break;
                    }
                }
            }
            Some(StageStatus::Pending) => {
                let idx = state.current_stage_index;
                Self::activate_stage(&mut state, &def, idx);
            }
            _ => {}
        }

        self.definition = Some(def);
        clog!(
            "Workflow '{}' continued at stage {}",
            state.workflow_name,
            state.current_stage_index + 1
        );
        state.touch();
        write_state(&self.crew_dir, &state)
    }

    /// Terminate the run. Always records `completed`, whether the workflow
    /// finished its stages or was interrupted mid-cycle.
    pub fn stop(&mut self) -> Result<()> {
        let mut state = read_state(&self.crew_dir)?;
        if state.status != WorkflowStatus::Running && state.status != WorkflowStatus::Paused {
            return Err(Error::NotRunning);
        }
        state.status = WorkflowStatus::Completed;
        state.touch();
        write_state(&self.crew_dir, &state)
    }

    /// Release a gated stage into `active`.
    pub fn approve_gate(&mut self) -> Result<()> {
        let mut state = self.ensure_running()?;
        match state.current_stage().map(|s| s.status) {
            Some(StageStatus::WaitingGate) => {}
            _ => return Err(Error::GatePending),
        }
        if let Some(stage) = state.current_stage_mut() {
            stage.status = StageStatus::Active;
        }
        clog_debug!("Gate approved at stage {}", state.current_stage_index);
        state.touch();
        write_state(&self.crew_dir, &state)
    }

    /// Reject a gated stage. This ends the workflow rather than skipping
    /// the stage.
    pub fn reject_gate(&mut self) -> Result<()> {
        let mut state = self.ensure_running()?;
        match state.current_stage().map(|s| s.status) {
            Some(StageStatus::WaitingGate) => {}
            _ => return Err(Error::GatePending),
        }
        state.status = WorkflowStatus::Completed;
        clog_debug!("Gate rejected at stage {}", state.current_stage_index);
        state.touch();
        write_state(&self.crew_dir, &state)
    }

    pub fn get_state(&self) -> Result<WorkflowState> {
        read_state(&self.crew_dir)
    }

    /// The current stage, or `None` unless the workflow is running.
    pub fn current_stage(&self) -> Result<Option<StageState>> {
        let state = read_state(&self.crew_dir)?;
        if state.status != WorkflowStatus::Running {
            return Ok(None);
        }
        Ok(state.current_stage().cloned())
    }

    /// True only when the current stage is `active`.
    pub fn can_advance(&self) -> Result<bool> {
        let state = read_state(&self.crew_dir)?;
        if state.status != WorkflowStatus::Running {
            return Ok(false);
        }
        Ok(state
            .current_stage()
            .map(|s| s.status == StageStatus::Active)
            .unwrap_or(false))
    }

    pub fn stage_definitions(&self) -> Result<&[StageDefinition]> {
        self.definition
            .as_ref()
            .map(|d| d.stages.as_slice())
            .ok_or(Error::NotRunning)
    }

    fn ensure_running(&self) -> Result<WorkflowState> {
        let state = read_state(&self.crew_dir)?;
        if state.status != WorkflowStatus::Running {
            return Err(Error::NotRunning);
        }
        Ok(state)
    }

    fn ensure_definition(&mut self, workflow_name: &str) -> Result<&WorkflowDefinition> {
        if self.definition.is_none() {
            self.definition = Some(load_definition(workflow_name, &self.search_paths)?);
        }
        self.definition.as_ref().ok_or(Error::NotRunning)
    }
}
