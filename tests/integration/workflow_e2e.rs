//! End-to-end workflow tests.
//!
//! Drive the poll loop against scripted fakes: stages advance on signal
//! files, gates resolve through a decider, and cycle looping terminates
//! at the cap.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crew::poll::{poll_loop, AutoApproveGate, GateDecider, PollSettings};
use crew::workflow::{StageStatus, WorkflowStatus};

use crate::fixtures::{spawn_agents, CrewProject, MockProbe, MockTmux};

const LINEAR_YAML: &str = r#"
name: pipeline
stages:
  - {name: plan, role: planner, provider: claude-code, model: m1}
  - {name: review, role: reviewer, provider: claude-code, model: m1}
"#;

const GATED_YAML: &str = r#"
name: pipeline
stages:
  - {name: plan, role: planner, provider: claude-code, model: m1, human_gate: true}
  - {name: review, role: reviewer, provider: claude-code, model: m1}
"#;

const LOOPING_YAML: &str = r#"
name: pipeline
loop_on_changes: true
max_cycles: 2
stages:
  - {name: implement, role: implementer, provider: claude-code, model: m1}
  - {name: review, role: reviewer, provider: claude-code, model: m1}
"#;

struct RejectGate;
impl GateDecider for RejectGate {
    fn decide(&self, _stage_name: &str) -> bool {
        false
    }
}

fn settings() -> PollSettings {
    PollSettings {
        poll_interval: Duration::from_secs(1),
        nudge_interval: Duration::from_secs(10_000),
        max_nudges: 3,
        max_respawns: 3,
    }
}

#[tokio::test(start_paused = true)]
async fn test_linear_workflow_runs_to_completion() {
    let project = CrewProject::new("pipeline", LINEAR_YAML);
    let mut engine = project.engine();
    engine.start("pipeline", "ship the feature").unwrap();
    let stages = engine.stage_definitions().unwrap().to_vec();

    let tmux = MockTmux::default();
    let probe = MockProbe::default();
    let mut runner = spawn_agents(&tmux, &probe, &project, &["planner", "reviewer"]);

    project.write_signal("planner");
    project.write_signal("reviewer");

    let cancel = CancellationToken::new();
    poll_loop(
        &mut engine,
        &mut runner,
        &project.paths,
        &stages,
        "pipeline",
        &AutoApproveGate,
        &settings(),
        -1,
        &cancel,
    )
    .await
    .unwrap();

    let state = engine.get_state().unwrap();
    assert_eq!(state.status, WorkflowStatus::Completed);
    assert!(state.stages.iter().all(|s| s.status == StageStatus::Completed));
    // Both stages were prompted.
    assert!(tmux.prompt_files_sent() >= 2);
    // Signals were consumed.
    assert!(crew::signal::read_signal(&project.paths.crew_dir, "planner").is_none());
    assert!(crew::signal::read_signal(&project.paths.crew_dir, "reviewer").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_gate_rejection_ends_run_without_prompting() {
    let project = CrewProject::new("pipeline", GATED_YAML);
    let mut engine = project.engine();
    engine.start("pipeline", "goal").unwrap();
    let stages = engine.stage_definitions().unwrap().to_vec();

    let tmux = MockTmux::default();
    let probe = MockProbe::default();
    let mut runner = spawn_agents(&tmux, &probe, &project, &["planner", "reviewer"]);

    let cancel = CancellationToken::new();
    poll_loop(
        &mut engine,
        &mut runner,
        &project.paths,
        &stages,
        "pipeline",
        &RejectGate,
        &settings(),
        -1,
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(engine.get_state().unwrap().status, WorkflowStatus::Completed);
    assert_eq!(tmux.prompt_files_sent(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_gate_approval_prompts_and_completes() {
    let project = CrewProject::new("pipeline", GATED_YAML);
    let mut engine = project.engine();
    engine.start("pipeline", "goal").unwrap();
    let stages = engine.stage_definitions().unwrap().to_vec();

    let tmux = MockTmux::default();
    let probe = MockProbe::default();
    let mut runner = spawn_agents(&tmux, &probe, &project, &["planner", "reviewer"]);

    project.write_signal("planner");
    project.write_signal("reviewer");

    let cancel = CancellationToken::new();
    poll_loop(
        &mut engine,
        &mut runner,
        &project.paths,
        &stages,
        "pipeline",
        &AutoApproveGate,
        &settings(),
        -1,
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(engine.get_state().unwrap().status, WorkflowStatus::Completed);
    assert!(tmux.prompt_files_sent() >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_looping_workflow_stops_at_max_cycles() {
    let project = CrewProject::new("pipeline", LOOPING_YAML);
    let mut engine = project.engine();
    engine.start("pipeline", "goal").unwrap();
    let stages = engine.stage_definitions().unwrap().to_vec();

    let tmux = MockTmux::default();
    let probe = MockProbe::default();
    let mut runner = spawn_agents(&tmux, &probe, &project, &["implementer", "reviewer"]);

    let cancel = CancellationToken::new();
    let settings = settings();
    let loop_fut = poll_loop(
        &mut engine,
        &mut runner,
        &project.paths,
        &stages,
        "pipeline",
        &AutoApproveGate,
        &settings,
        -1,
        &cancel,
    );

    // Each stage of both cycles completes in order; the close of cycle 2
    // hits the cap and ends the loop.
    let driver = async {
        for role in ["implementer", "reviewer", "implementer", "reviewer"] {
            tokio::time::sleep(Duration::from_secs(30)).await;
            project.write_signal(role);
        }
    };

    let (result, ()) = tokio::join!(loop_fut, driver);
    result.unwrap();

    let state = engine.get_state().unwrap();
    assert_eq!(state.status, WorkflowStatus::Error);
    assert_eq!(state.cycle_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_loop_back_reprompts_first_stage() {
    let project = CrewProject::new("pipeline", LOOPING_YAML);
    let mut engine = project.engine();
    engine.start("pipeline", "goal").unwrap();
    let stages = engine.stage_definitions().unwrap().to_vec();

    let tmux = MockTmux::default();
    let probe = MockProbe::default();
    let mut runner = spawn_agents(&tmux, &probe, &project, &["implementer", "reviewer"]);

    let cancel = CancellationToken::new();
    let settings = settings();
    let loop_fut = poll_loop(
        &mut engine,
        &mut runner,
        &project.paths,
        &stages,
        "pipeline",
        &AutoApproveGate,
        &settings,
        -1,
        &cancel,
    );

    let driver = async {
        // Finish cycle 1; the loop winds back to stage 0 of cycle 2.
        for role in ["implementer", "reviewer"] {
            tokio::time::sleep(Duration::from_secs(30)).await;
            project.write_signal(role);
        }
        tokio::time::sleep(Duration::from_secs(60)).await;
        cancel.cancel();
    };

    let (result, ()) = tokio::join!(loop_fut, driver);
    result.unwrap();

    let state = engine.get_state().unwrap();
    assert_eq!(state.status, WorkflowStatus::Running);
    assert_eq!(state.cycle_count, 2);
    assert_eq!(state.current_stage_index, 0);
    assert_eq!(state.stages[0].status, StageStatus::Active);
    // Prompted: stage 0 and 1 of cycle 1, then stage 0 again after the
    // loop-back reset the prompt guard.
    assert!(tmux.prompt_files_sent() >= 3);
}
