use std::sync::Arc;
use std::time::Duration;

use agent_core::{SimulatedBackend, SimulatedConfig};
use futures::StreamExt;
use harness_kernel::{
    AgentState, BrowserSession, ControlState, HarnessError, RunConfiguration, RunPhase,
    StreamCoordinator, StreamSnapshot, TaskRunner,
};
use tempfile::{tempdir, TempDir};

fn coordinator(config: SimulatedConfig) -> (StreamCoordinator, SimulatedBackend) {
    let backend = SimulatedBackend::new(config);
    let runner = TaskRunner::new(
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        Arc::new(BrowserSession::new()),
        Arc::new(AgentState::new()),
    );
    let coordinator =
        StreamCoordinator::new(runner).with_poll_interval(Duration::from_millis(10));
    (coordinator, backend)
}

fn simulated(steps_to_finish: u32, step_ms: u64) -> SimulatedConfig {
    SimulatedConfig {
        step_delay: Duration::from_millis(step_ms),
        steps_to_finish,
        ..SimulatedConfig::default()
    }
}

fn run_config(dir: &TempDir, headless: bool) -> RunConfiguration {
    let mut config = RunConfiguration::new("compare laptop prices");
    config.browser.headless = headless;
    config.artifacts.recording_dir = Some(dir.path().join("videos"));
    config.artifacts.trace_dir = Some(dir.path().join("traces"));
    config.artifacts.history_dir = dir.path().join("history");
    config
}

async fn collect(coordinator: &StreamCoordinator, config: RunConfiguration) -> Vec<StreamSnapshot> {
    coordinator.stream(config).collect().await
}

#[tokio::test]
async fn headless_run_streams_progress_before_final_snapshot() {
    let dir = tempdir().unwrap();
    let (coordinator, backend) = coordinator(simulated(3, 40));

    let snapshots = collect(&coordinator, run_config(&dir, true)).await;

    assert!(snapshots.len() >= 2, "expected progress snapshots, got {}", snapshots.len());
    let (last, progress) = snapshots.split_last().unwrap();
    for snapshot in progress {
        assert!(!snapshot.phase.is_terminal());
        assert_eq!(snapshot.controls, ControlState::running());
        assert!(snapshot.final_result.is_none());
    }
    assert_eq!(last.phase, RunPhase::Completed);
    assert_eq!(last.controls, ControlState::armed());
    assert!(last.final_result.as_deref().unwrap().contains("compare laptop prices"));
    assert_eq!(last.model_thoughts.len(), 3);
    assert!(last.history_file.as_ref().unwrap().exists());
    assert_eq!(backend.open_browsers(), 0);
}

#[tokio::test]
async fn visible_browser_run_yields_only_the_final_snapshot() {
    let dir = tempdir().unwrap();
    let (coordinator, _) = coordinator(simulated(2, 20));

    let snapshots = collect(&coordinator, run_config(&dir, false)).await;

    assert_eq!(snapshots.len(), 1);
    let snapshot = &snapshots[0];
    assert_eq!(snapshot.phase, RunPhase::Completed);
    assert!(snapshot.html.contains("Using browser..."));
    assert!(snapshot.recording.is_some());
}

#[tokio::test]
async fn stop_request_cancels_headless_run() {
    let dir = tempdir().unwrap();
    let (coordinator, backend) = coordinator(simulated(500, 20));

    let mut stream = Box::pin(coordinator.stream(run_config(&dir, true)));
    let mut phases = Vec::new();
    while let Some(snapshot) = stream.next().await {
        if snapshot.phase == RunPhase::Running && !phases.contains(&RunPhase::Running) {
            let controls = coordinator.request_stop();
            assert_eq!(controls, ControlState::stopping());
        }
        phases.push(snapshot.phase);
        if snapshot.phase.is_terminal() {
            assert_eq!(snapshot.controls, ControlState::armed());
            assert!(snapshot.final_result.is_none());
        }
    }

    let tail: Vec<_> = phases.iter().rev().take(2).rev().copied().collect();
    assert_eq!(tail, vec![RunPhase::Cancelling, RunPhase::Cancelled]);
    assert_eq!(backend.open_browsers(), 0);
}

#[tokio::test]
async fn stop_flag_survives_the_run_until_next_start() {
    let dir = tempdir().unwrap();
    let (coordinator, _) = coordinator(simulated(500, 20));

    let mut stream = Box::pin(coordinator.stream(run_config(&dir, true)));
    let mut stopped = false;
    while let Some(snapshot) = stream.next().await {
        if snapshot.phase == RunPhase::Running && !stopped {
            coordinator.request_stop();
            stopped = true;
        }
    }
    drop(stream);
    assert!(coordinator.runner().state().is_stop_requested());

    let mut config = run_config(&dir, false);
    config.max_steps = 2;
    let snapshots = collect(&coordinator, config).await;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].phase, RunPhase::Completed);
    assert!(!coordinator.runner().state().is_stop_requested());
}

#[tokio::test]
async fn launch_failure_is_reported_with_armed_controls() {
    let dir = tempdir().unwrap();
    let (coordinator, backend) = coordinator(SimulatedConfig {
        fail_launch: true,
        ..simulated(1, 5)
    });

    let snapshots = collect(&coordinator, run_config(&dir, true)).await;

    let last = snapshots.last().unwrap();
    assert_eq!(last.phase, RunPhase::Faulted);
    assert_eq!(last.controls, ControlState::armed());
    assert!(last
        .errors
        .iter()
        .any(|error| error.contains("simulated browser refused to start")));
    assert_eq!(backend.launches(), 0);
    assert!(!coordinator.runner().session().has_browser().await);
    assert!(!coordinator.runner().session().is_running());
}

#[tokio::test]
async fn second_run_is_rejected_while_first_is_active() {
    let dir = tempdir().unwrap();
    let (coordinator, _) = coordinator(simulated(500, 20));

    let first = coordinator.clone();
    let config = run_config(&dir, false);
    let background = tokio::spawn(async move { first.stream(config).collect::<Vec<_>>().await });

    for _ in 0..200 {
        if coordinator.runner().session().is_running() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(coordinator.runner().session().is_running());

    let err = coordinator
        .runner()
        .run(run_config(&dir, false), None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::RunInProgress));

    coordinator.request_stop();
    let snapshots = background.await.unwrap();
    assert_eq!(snapshots.last().unwrap().phase, RunPhase::Cancelled);
}

#[tokio::test]
async fn keep_open_reuses_the_browser_across_streams() {
    let dir = tempdir().unwrap();
    let (coordinator, backend) = coordinator(simulated(1, 5));
    let mut config = run_config(&dir, true);
    config.browser.keep_browser_open = true;

    let first = collect(&coordinator, config.clone()).await;
    let second = collect(&coordinator, config).await;

    assert_eq!(first.last().unwrap().phase, RunPhase::Completed);
    assert_eq!(second.last().unwrap().phase, RunPhase::Completed);
    assert_eq!(backend.launches(), 1);
    assert!(coordinator.runner().session().has_browser().await);

    coordinator.runner().session().close().await.unwrap();
    assert_eq!(backend.open_browsers(), 0);
}

async fn wait_until_idle(coordinator: &StreamCoordinator) {
    for _ in 0..400 {
        if !coordinator.runner().session().is_running() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("run did not wind down after its stream was dropped");
}

#[tokio::test]
async fn dropped_headless_stream_still_tears_down_the_browser() {
    let dir = tempdir().unwrap();
    let (coordinator, backend) = coordinator(simulated(500, 20));

    let mut stream = Box::pin(coordinator.stream(run_config(&dir, true)));
    while let Some(snapshot) = stream.next().await {
        if snapshot.phase == RunPhase::Running {
            break;
        }
    }
    drop(stream);

    assert!(coordinator.runner().state().is_stop_requested());
    wait_until_idle(&coordinator).await;
    assert!(!coordinator.runner().session().has_browser().await);
    assert_eq!(backend.open_browsers(), 0);
    assert_eq!(backend.open_contexts(), 0);

    let mut config = run_config(&dir, false);
    config.max_steps = 1;
    let snapshots = collect(&coordinator, config).await;
    assert_eq!(snapshots.last().unwrap().phase, RunPhase::Completed);
    assert_eq!(backend.launches(), 2);
}

#[tokio::test]
async fn dropped_headed_stream_still_tears_down_the_browser() {
    let dir = tempdir().unwrap();
    let (coordinator, backend) = coordinator(simulated(500, 20));

    let stream = Box::pin(coordinator.stream(run_config(&dir, false)));
    let polled = tokio::time::timeout(Duration::from_millis(100), stream.into_future()).await;
    assert!(polled.is_err(), "headed run should still be in progress");

    assert!(coordinator.runner().state().is_stop_requested());
    wait_until_idle(&coordinator).await;
    assert!(!coordinator.runner().session().has_browser().await);
    assert_eq!(backend.open_browsers(), 0);
}
