//! Test fixtures for integration tests.
//!
//! Provides a scripted tmux transport, a scripted process probe and a
//! scaffolded project directory with a workflow definition.

use std::path::Path;
use std::sync::Mutex;

use tempfile::TempDir;

use crew::config::CrewPaths;
use crew::probe::ProcessProbe;
use crew::runner::AgentRunner;
use crew::signal::SignalPayload;
use crew::tmux::{SplitDirection, TmuxPort};
use crew::workflow::WorkflowEngine;
use crew::{adapters::LaunchOptions, adapters::Provider, Error, Result};

/// Recording tmux fake. Pane captures are scripted; once the script runs
/// out every capture reads as an idle shell prompt.
#[derive(Default)]
pub struct MockTmux {
    pub calls: Mutex<Vec<String>>,
    pub captures: Mutex<Vec<String>>,
    pub pane_pid: Mutex<Option<u32>>,
}

impl MockTmux {
    fn log(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }

    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn prompt_files_sent(&self) -> usize {
        self.recorded()
            .iter()
            .filter(|c| c.starts_with("send-prompt-file"))
            .count()
    }
}

impl TmuxPort for &MockTmux {
    fn has_session(&self, _name: &str) -> bool {
        false
    }

    fn new_session(&self, name: &str) -> Result<()> {
        self.log(format!("new-session {}", name));
        Ok(())
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        self.log(format!("kill-session {}", name));
        Ok(())
    }

    fn split_window(&self, session: &str, direction: SplitDirection) -> Result<()> {
        self.log(format!("split-window {} {:?}", session, direction));
        Ok(())
    }

    fn select_layout(&self, session: &str, layout: &str) -> Result<()> {
        self.log(format!("select-layout {} {}", session, layout));
        Ok(())
    }

    fn send_keys(&self, target: &str, keys: &str) -> Result<()> {
        self.log(format!("send-keys {} {}", target, keys));
        Ok(())
    }

    fn send_text(&self, target: &str, text: &str) -> Result<()> {
        self.log(format!("send-text {} {}", target, text));
        Ok(())
    }

    fn send_prompt_file(&self, target: &str, file: &Path) -> Result<()> {
        self.log(format!("send-prompt-file {} {}", target, file.display()));
        Ok(())
    }

    fn capture_pane(&self, _target: &str) -> Result<String> {
        let mut captures = self.captures.lock().unwrap();
        if captures.is_empty() {
            Ok("$ ".to_string())
        } else {
            Ok(captures.remove(0))
        }
    }

    fn pane_pid(&self, _target: &str) -> Result<u32> {
        self.pane_pid
            .lock()
            .unwrap()
            .ok_or_else(|| Error::Tmux("no pane pid scripted".to_string()))
    }
}

/// Scripted process probe.
#[derive(Default)]
pub struct MockProbe {
    pub alive: Mutex<Vec<u32>>,
    pub children: Mutex<Vec<u32>>,
}

impl MockProbe {
    pub fn set_alive(&self, pids: &[u32]) {
        *self.alive.lock().unwrap() = pids.to_vec();
    }
}

impl ProcessProbe for &MockProbe {
    fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    fn child_pids(&self, _pid: u32) -> Result<Vec<u32>> {
        Ok(self.children.lock().unwrap().clone())
    }
}

/// A temporary project directory with `.crew/` and one workflow.
pub struct CrewProject {
    pub temp_dir: TempDir,
    pub paths: CrewPaths,
}

impl CrewProject {
    pub fn new(workflow_name: &str, workflow_yaml: &str) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let paths = CrewPaths::isolated(temp_dir.path());
        let workflows = paths.crew_dir.join("workflows");
        std::fs::create_dir_all(&workflows).expect("failed to create workflows dir");
        std::fs::write(workflows.join(format!("{}.yaml", workflow_name)), workflow_yaml)
            .expect("failed to write workflow definition");
        Self { temp_dir, paths }
    }

    pub fn engine(&self) -> WorkflowEngine {
        WorkflowEngine::new(&self.paths)
    }

    pub fn write_signal(&self, role: &str) {
        let dir = self.paths.signals_dir();
        std::fs::create_dir_all(&dir).expect("failed to create signals dir");
        let payload = SignalPayload {
            result: "done".to_string(),
            tasks: None,
        };
        std::fs::write(
            dir.join(format!("{}.done", role)),
            serde_json::to_string(&payload).unwrap(),
        )
        .expect("failed to write signal");
    }
}

/// Spawn one agent per role into a fresh session.
pub fn spawn_agents<'a>(
    tmux: &'a MockTmux,
    probe: &'a MockProbe,
    project: &CrewProject,
    roles: &[&str],
) -> AgentRunner<&'a MockTmux, &'a MockProbe> {
    let mut runner = AgentRunner::new(
        tmux,
        probe,
        project.paths.crew_dir.clone(),
        project.paths.cwd.clone(),
    );
    runner.create_session("crew", "proj").expect("create session");
    for role in roles {
        runner
            .spawn(role, role, Provider::ClaudeCode, Some("m1"), LaunchOptions::default())
            .expect("spawn agent");
    }
    runner
}
