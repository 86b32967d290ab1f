//! Stream coordinator: runs the task runner in the background and turns its
//! progress into a feed of UI snapshots.
//!
//! Headed runs produce a single snapshot once the run is over, since the
//! operator watches the real browser window. Headless runs are polled every
//! [`POLL_INTERVAL`]: each tick drains runner progress, grabs a screenshot from
//! the session's active context, checks the stop flag and yields a snapshot.
//! The final snapshot always re-arms the run and stop controls.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agent_core::{AgentStepRecord, AgentThought, WindowSize};
use async_stream::stream;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::agent_state::AgentState;
use crate::errors::HarnessError;
use crate::metrics;
use crate::run_config::{RunConfiguration, RunResult, RunStatus};
use crate::task_runner::{RunProgress, TaskRunner, PROGRESS_CAPACITY};

pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

const USING_BROWSER: &str = "Using browser...";
const WAITING_FOR_SESSION: &str = "Waiting for browser session...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Starting,
    Running,
    Cancelling,
    Cancelled,
    Completed,
    Faulted,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Starting => "starting",
            RunPhase::Running => "running",
            RunPhase::Cancelling => "cancelling",
            RunPhase::Cancelled => "cancelled",
            RunPhase::Completed => "completed",
            RunPhase::Faulted => "faulted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunPhase::Cancelled | RunPhase::Completed | RunPhase::Faulted
        )
    }
}

impl From<RunStatus> for RunPhase {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Completed => RunPhase::Completed,
            RunStatus::Stopped => RunPhase::Cancelled,
            RunStatus::Failed => RunPhase::Faulted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonState {
    pub label: String,
    pub interactive: bool,
}

impl ButtonState {
    fn new(label: &str, interactive: bool) -> Self {
        Self {
            label: label.to_string(),
            interactive,
        }
    }
}

/// Labels and interactivity of the run and stop buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    pub run: ButtonState,
    pub stop: ButtonState,
}

impl ControlState {
    /// Idle: both buttons usable.
    pub fn armed() -> Self {
        Self {
            run: ButtonState::new("Run Agent", true),
            stop: ButtonState::new("Stop", true),
        }
    }

    pub fn running() -> Self {
        Self {
            run: ButtonState::new("Run Agent", false),
            stop: ButtonState::new("Stop", true),
        }
    }

    /// A stop was requested and the run is winding down.
    pub fn stopping() -> Self {
        Self {
            run: ButtonState::new("Run Agent", false),
            stop: ButtonState::new("Stopping...", false),
        }
    }
}

/// Viewport-relative sizing of the live browser view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamViewport {
    pub vw: u32,
    pub vh: u32,
}

impl StreamViewport {
    pub fn for_window(window: WindowSize) -> Self {
        let vw: u32 = 80;
        let vh = if window.width == 0 {
            vw
        } else {
            vw.saturating_mul(window.height) / window.width
        };
        Self { vw, vh }
    }

    pub fn heading(&self, text: &str) -> String {
        format!(
            "<h1 style='width:{}vw; height:{}vh'>{}</h1>",
            self.vw, self.vh, text
        )
    }

    pub fn image(&self, jpeg_base64: &str) -> String {
        format!(
            "<img src=\"data:image/jpeg;base64,{}\" style=\"width:{}vw; height:{}vh ; border:1px solid #ccc;\">",
            jpeg_base64, self.vw, self.vh
        )
    }
}

/// One update of the UI feed; the last snapshot of a stream is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub phase: RunPhase,
    pub html: String,
    pub final_result: Option<String>,
    pub errors: Vec<String>,
    pub model_actions: Vec<Value>,
    pub model_thoughts: Vec<AgentThought>,
    pub recording: Option<PathBuf>,
    pub trace: Option<PathBuf>,
    pub history_file: Option<PathBuf>,
    pub controls: ControlState,
}

/// Results accumulated from runner progress before the run finishes.
#[derive(Debug, Default)]
struct PartialRun {
    browser_ready: bool,
    errors: Vec<String>,
    model_actions: Vec<Value>,
    model_thoughts: Vec<AgentThought>,
}

impl PartialRun {
    fn apply(&mut self, progress: RunProgress) {
        match progress {
            RunProgress::BrowserReady => self.browser_ready = true,
            RunProgress::Step(record) => self.push_step(record),
        }
    }

    fn push_step(&mut self, record: AgentStepRecord) {
        self.browser_ready = true;
        if let Some(error) = record.error {
            self.errors.push(error);
        }
        self.model_actions.extend(record.actions);
        if let Some(thought) = record.thought {
            self.model_thoughts.push(thought);
        }
    }

    fn phase(&self) -> RunPhase {
        if self.browser_ready {
            RunPhase::Running
        } else {
            RunPhase::Starting
        }
    }

    fn snapshot(&self, phase: RunPhase, html: &str, controls: ControlState) -> StreamSnapshot {
        StreamSnapshot {
            phase,
            html: html.to_string(),
            final_result: None,
            errors: self.errors.clone(),
            model_actions: self.model_actions.clone(),
            model_thoughts: self.model_thoughts.clone(),
            recording: None,
            trace: None,
            history_file: None,
            controls,
        }
    }

    fn into_snapshot(self, phase: RunPhase, html: String) -> StreamSnapshot {
        StreamSnapshot {
            phase,
            html,
            final_result: None,
            errors: self.errors,
            model_actions: self.model_actions,
            model_thoughts: self.model_thoughts,
            recording: None,
            trace: None,
            history_file: None,
            controls: ControlState::armed(),
        }
    }
}

fn completed_snapshot(result: RunResult, html: String) -> StreamSnapshot {
    StreamSnapshot {
        phase: result.status.into(),
        html,
        final_result: result.final_result,
        errors: result.errors,
        model_actions: result.model_actions,
        model_thoughts: result.model_thoughts,
        recording: result.recording,
        trace: result.trace,
        history_file: result.history_file,
        controls: ControlState::armed(),
    }
}

/// Maps the runner outcome onto the authoritative final snapshot.
fn final_snapshot(
    partial: PartialRun,
    outcome: Result<RunResult, HarnessError>,
    html: String,
) -> StreamSnapshot {
    match outcome {
        Ok(result) => completed_snapshot(result, html),
        Err(err) if err.is_interrupted() => partial.into_snapshot(RunPhase::Cancelled, html),
        Err(err) => {
            let mut snapshot = partial.into_snapshot(RunPhase::Faulted, html);
            snapshot.errors.push(format!("Agent error: {err}"));
            snapshot
        }
    }
}

fn joined_snapshot(
    partial: PartialRun,
    joined: Result<Result<RunResult, HarnessError>, JoinError>,
    html: String,
) -> StreamSnapshot {
    match joined {
        Ok(outcome) => final_snapshot(partial, outcome, html),
        Err(err) if err.is_cancelled() => partial.into_snapshot(RunPhase::Cancelled, html),
        Err(err) => {
            warn!(%err, "agent task panicked");
            let mut snapshot = partial.into_snapshot(RunPhase::Faulted, html);
            snapshot.errors.push(format!("Agent error: {err}"));
            snapshot
        }
    }
}

/// Background run owned by a stream.
///
/// Dropping it mid-run raises the stop flag and detaches the task, so the
/// runner still reaches its cleanup at the next step boundary.
struct DetachOnDrop<T> {
    handle: JoinHandle<T>,
    state: Arc<AgentState>,
}

impl<T> Drop for DetachOnDrop<T> {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            debug!("stream dropped mid-run; stopping the agent at the next step");
            self.state.request_stop();
        }
    }
}

#[derive(Clone)]
pub struct StreamCoordinator {
    runner: TaskRunner,
    poll_interval: Duration,
}

impl StreamCoordinator {
    pub fn new(runner: TaskRunner) -> Self {
        Self {
            runner,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// Raises the stop flag and returns the controls to show while the run winds down.
    pub fn request_stop(&self) -> ControlState {
        self.runner.state().request_stop();
        metrics::record_stop_request();
        info!("stop requested - the agent will halt at the next safe point");
        ControlState::stopping()
    }

    /// Starts a run and returns its snapshot feed.
    ///
    /// The run begins on first poll of the stream. Dropping the stream before
    /// the final snapshot raises the stop flag; the run then winds down and
    /// cleans up on its own.
    pub fn stream(
        &self,
        config: RunConfiguration,
    ) -> impl Stream<Item = StreamSnapshot> + Send + 'static {
        let runner = self.runner.clone();
        let poll_interval = self.poll_interval;

        stream! {
            let viewport = StreamViewport::for_window(config.browser.window);
            let state = Arc::clone(runner.state());
            let session = Arc::clone(runner.session());
            if !session.is_running() {
                state.clear_stop();
            }

            if !config.browser.headless {
                let task_runner = runner.clone();
                let mut task = DetachOnDrop {
                    handle: tokio::spawn(async move { task_runner.run(config, None).await }),
                    state: Arc::clone(&state),
                };
                let joined = (&mut task.handle).await;
                let snapshot = joined_snapshot(
                    PartialRun::default(),
                    joined,
                    viewport.heading(USING_BROWSER),
                );
                metrics::record_snapshot(snapshot.phase.as_str());
                yield snapshot;
                return;
            }

            let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_CAPACITY);
            let task_runner = runner.clone();
            let mut task = DetachOnDrop {
                handle: tokio::spawn(async move {
                    task_runner.run(config, Some(progress_tx)).await
                }),
                state: Arc::clone(&state),
            };

            let mut partial = PartialRun::default();
            let mut html = viewport.heading(USING_BROWSER);
            let mut cancelling = false;
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                while let Ok(progress) = progress_rx.try_recv() {
                    partial.apply(progress);
                }
                if task.handle.is_finished() {
                    break;
                }

                html = match session.capture_screenshot().await {
                    Some(frame) => viewport.image(&frame),
                    None => viewport.heading(WAITING_FOR_SESSION),
                };

                if state.is_stop_requested() {
                    debug!("stop flag observed by stream coordinator");
                    cancelling = true;
                    metrics::record_snapshot(RunPhase::Cancelling.as_str());
                    yield partial.snapshot(RunPhase::Cancelling, &html, ControlState::stopping());
                    break;
                }

                let phase = partial.phase();
                metrics::record_snapshot(phase.as_str());
                yield partial.snapshot(phase, &html, ControlState::running());
            }

            while let Ok(progress) = progress_rx.try_recv() {
                partial.apply(progress);
            }
            // the runner must never block on a coordinator that stopped reading
            drop(progress_rx);

            let joined = (&mut task.handle).await;
            let snapshot = joined_snapshot(partial, joined, html);
            if snapshot.phase == RunPhase::Cancelled && !cancelling {
                let mut notice = snapshot.clone();
                notice.phase = RunPhase::Cancelling;
                notice.controls = ControlState::stopping();
                metrics::record_snapshot(RunPhase::Cancelling.as_str());
                yield notice;
            }
            metrics::record_snapshot(snapshot.phase.as_str());
            yield snapshot;
        }
    }
}
