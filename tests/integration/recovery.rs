//! Recovery behavior: health-driven respawn and idle nudging inside the
//! running poll loop.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crew::poll::{poll_loop, AutoApproveGate, PollSettings, NUDGE_MESSAGE};
use crew::workflow::WorkflowStatus;

use crate::fixtures::{spawn_agents, CrewProject, MockProbe, MockTmux};

const SOLO_YAML: &str = r#"
name: pipeline
stages:
  - {name: work, role: solo, provider: claude-code, model: m1}
"#;

#[tokio::test(start_paused = true)]
async fn test_dead_agent_respawned_then_workflow_completes() {
    let project = CrewProject::new("pipeline", SOLO_YAML);
    let mut engine = project.engine();
    engine.start("pipeline", "goal").unwrap();
    let stages = engine.stage_definitions().unwrap().to_vec();

    let tmux = MockTmux::default();
    let probe = MockProbe::default();
    let mut runner = spawn_agents(&tmux, &probe, &project, &["solo"]);

    // Shell PID recorded, then the process dies.
    *tmux.pane_pid.lock().unwrap() = Some(100);
    runner.record_pid("solo").unwrap();
    probe.set_alive(&[]);

    let settings = PollSettings {
        poll_interval: Duration::from_secs(1),
        nudge_interval: Duration::from_secs(10_000),
        max_nudges: 3,
        max_respawns: 1,
    };

    let cancel = CancellationToken::new();
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
        // Let the health pass respawn the agent, bring it back to life,
        // then signal completion.
        tokio::time::sleep(Duration::from_secs(60)).await;
        probe.set_alive(&[100]);
        project.write_signal("solo");
    };

    let (result, ()) = tokio::join!(loop_fut, driver);
    result.unwrap();

    assert_eq!(engine.get_state().unwrap().status, WorkflowStatus::Completed);
    let agent = runner.agent_info("solo").unwrap();
    // Respawned once, then the cap held.
    assert_eq!(agent.respawn_count, 1);
    // Initial prompt plus the post-respawn re-prompt.
    assert!(tmux.prompt_files_sent() >= 2);
    // The registry snapshot recorded the respawn.
    let data = crew::runner::registry::load_registry(&project.paths.crew_dir).unwrap();
    assert_eq!(data.agents[0].respawn_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_idle_agent_nudged_up_to_cap() {
    let project = CrewProject::new("pipeline", SOLO_YAML);
    let mut engine = project.engine();
    engine.start("pipeline", "goal").unwrap();
    let stages = engine.stage_definitions().unwrap().to_vec();

    let tmux = MockTmux::default();
    let probe = MockProbe::default();
    let mut runner = spawn_agents(&tmux, &probe, &project, &["solo"]);

    let settings = PollSettings {
        poll_interval: Duration::from_secs(1),
        nudge_interval: Duration::from_secs(30),
        max_nudges: 3,
        max_respawns: 3,
    };

    let cancel = CancellationToken::new();
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

    // The pane reads as an idle prompt the whole time; after well past
    // three nudge intervals, stop the loop.
    let driver = async {
        tokio::time::sleep(Duration::from_secs(400)).await;
        cancel.cancel();
    };

    let (result, ()) = tokio::join!(loop_fut, driver);
    result.unwrap();

    let nudges = tmux
        .recorded()
        .iter()
        .filter(|c| c.contains(NUDGE_MESSAGE))
        .count();
    assert_eq!(nudges, 3);
    // Nothing completed the stage; the workflow is still running.
    assert_eq!(engine.get_state().unwrap().status, WorkflowStatus::Running);
}
