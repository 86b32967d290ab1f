//! Drives one agent run against the shared browser session.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use agent_core::{
    AgentFactory, AgentHistory, AgentStepRecord, BrowserBackend, BrowserOptions, ContextOptions,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::agent_state::AgentState;
use crate::artifacts::{latest_file, write_history, RecordingWatch};
use crate::errors::HarnessError;
use crate::metrics;
use crate::run_config::{RunConfiguration, RunResult, RunStatus};
use crate::session::BrowserSession;

/// Capacity of the progress channel between runner and coordinator.
pub const PROGRESS_CAPACITY: usize = 64;

/// Consecutive recoverable step failures tolerated before the run is aborted.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

pub const CHROME_PATH_ENV: &str = "CHROME_PATH";
pub const CHROME_USER_DATA_ENV: &str = "CHROME_USER_DATA";

/// Incremental progress published while a run is executing.
#[derive(Debug, Clone)]
pub enum RunProgress {
    /// Browser and context are acquired; the agent is about to start.
    BrowserReady,
    Step(AgentStepRecord),
}

type ProgressSender = mpsc::Sender<RunProgress>;

#[derive(Clone)]
pub struct TaskRunner {
    backend: Arc<dyn BrowserBackend>,
    agents: Arc<dyn AgentFactory>,
    session: Arc<BrowserSession>,
    state: Arc<AgentState>,
}

impl TaskRunner {
    pub fn new(
        backend: Arc<dyn BrowserBackend>,
        agents: Arc<dyn AgentFactory>,
        session: Arc<BrowserSession>,
        state: Arc<AgentState>,
    ) -> Self {
        Self {
            backend,
            agents,
            session,
            state,
        }
    }

    pub fn session(&self) -> &Arc<BrowserSession> {
        &self.session
    }

    pub fn state(&self) -> &Arc<AgentState> {
        &self.state
    }

    /// Runs the agent for at most `max_steps` steps.
    ///
    /// Setup and execution faults come back as a [`RunStatus::Failed`] result.
    /// Only [`HarnessError::InvalidConfiguration`], [`HarnessError::RunInProgress`]
    /// and [`HarnessError::Interrupted`] are returned as errors. The stop flag is
    /// not cleared here; callers reset it before scheduling the run.
    pub async fn run(
        &self,
        config: RunConfiguration,
        progress: Option<ProgressSender>,
    ) -> Result<RunResult, HarnessError> {
        config.validate()?;
        let _guard = self.session.try_begin_run()?;
        let started = Instant::now();
        info!(
            agent = %config.agent_type,
            provider = %config.llm.provider,
            model = %config.llm.model,
            headless = config.browser.headless,
            max_steps = config.max_steps,
            "agent run starting"
        );

        let mut watch = None;
        let outcome = self.execute(&config, progress.as_ref(), &mut watch).await;

        if !config.browser.keep_browser_open {
            if let Err(err) = self.session.close().await {
                warn!(%err, "browser cleanup failed");
            }
        }

        let mut result = match outcome {
            Ok(result) => result,
            Err(err) if err.is_interrupted() => {
                info!(%err, "agent run interrupted");
                metrics::record_run_outcome("interrupted", started.elapsed());
                return Err(err);
            }
            Err(err) => {
                warn!(error = %err, "agent run failed");
                RunResult::failed(err.report())
            }
        };

        if let Some(watch) = watch {
            match watch.finish().await {
                Ok(recording) => result.recording = recording,
                Err(err) => warn!(%err, "failed to inspect recording directory"),
            }
        }
        if let Some(dir) = config.artifacts.trace_dir() {
            match latest_file(dir, "zip").await {
                Ok(trace) => result.trace = trace,
                Err(err) => warn!(%err, "failed to inspect trace directory"),
            }
        }

        metrics::record_run_outcome(result.status.as_str(), started.elapsed());
        info!(
            status = result.status.as_str(),
            errors = result.errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "agent run finished"
        );
        Ok(result)
    }

    async fn execute(
        &self,
        config: &RunConfiguration,
        progress: Option<&ProgressSender>,
        watch: &mut Option<RecordingWatch>,
    ) -> Result<RunResult, HarnessError> {
        if let Some(dir) = config.artifacts.recording_dir() {
            *watch = Some(RecordingWatch::begin(dir).await?);
        }

        let browser = self
            .session
            .ensure_browser(self.backend.as_ref(), &browser_options(config))
            .await?;
        let context = self
            .session
            .ensure_context(&browser, &context_options(config))
            .await?;
        publish(progress, RunProgress::BrowserReady).await;

        let spec = config.agent_spec();
        if !spec.llm.has_api_key() && spec.llm.provider.requires_api_key() {
            warn!(provider = %spec.llm.provider, "no API key configured for provider");
        }
        let mut agent = self.agents.create(&spec, browser, context).await?;
        let mut history = AgentHistory::new(agent.agent_id(), &config.task);
        let mut consecutive_failures = 0;
        let mut aborted = false;

        for step in 1..=config.max_steps {
            if self.state.is_stop_requested() {
                info!(step, "stop requested; ending run at step boundary");
                history.stopped = true;
                break;
            }

            let record = match agent.step(step).await {
                Ok(outcome) => {
                    consecutive_failures = 0;
                    metrics::record_agent_step("ok");
                    outcome.record
                }
                Err(err) if err.is_step_failure() => {
                    consecutive_failures += 1;
                    metrics::record_agent_step("failed");
                    warn!(step, %err, consecutive_failures, "agent step failed");
                    AgentStepRecord::failed(step, err.to_string())
                }
                Err(err) => return Err(err.into()),
            };
            let done = record.is_done;
            debug!(step, done, actions = record.actions.len(), "agent step recorded");
            history.push(record.clone());
            publish(progress, RunProgress::Step(record)).await;

            if done {
                break;
            }
            if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                warn!(step, "too many consecutive step failures; aborting run");
                aborted = true;
                break;
            }
        }
        history.finish();

        if !history.is_done() && !history.stopped && !aborted {
            info!(max_steps = config.max_steps, "step limit reached before the agent finished");
        }

        let history_file = write_history(&config.artifacts.history_dir, &history).await?;
        let status = if history.stopped {
            RunStatus::Stopped
        } else if aborted {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        Ok(RunResult {
            status,
            final_result: history.final_result(),
            errors: history.errors(),
            model_actions: history.model_actions(),
            model_thoughts: history.model_thoughts(),
            recording: None,
            trace: None,
            history_file: Some(history_file),
        })
    }
}

async fn publish(progress: Option<&ProgressSender>, message: RunProgress) {
    if let Some(sender) = progress {
        // the coordinator may have gone away; the run continues regardless
        let _ = sender.send(message).await;
    }
}

fn read_env(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn browser_options(config: &RunConfiguration) -> BrowserOptions {
    let window = config.browser.window;
    let mut extra_args = vec![format!("--window-size={},{}", window.width, window.height)];
    let mut chrome_instance_path = None;
    if config.browser.use_own_browser {
        chrome_instance_path = read_env(CHROME_PATH_ENV).map(PathBuf::from);
        if let Some(user_data) = read_env(CHROME_USER_DATA_ENV) {
            extra_args.push(format!("--user-data-dir={user_data}"));
        }
    }
    BrowserOptions {
        headless: config.browser.headless,
        disable_security: config.browser.disable_security,
        chrome_instance_path,
        extra_args,
    }
}

fn context_options(config: &RunConfiguration) -> ContextOptions {
    ContextOptions {
        trace_path: config.artifacts.trace_dir().map(PathBuf::from),
        recording_path: config.artifacts.recording_dir().map(PathBuf::from),
        window: config.browser.window,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{SimulatedBackend, SimulatedConfig};
    use serial_test::serial;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn runner_with(config: SimulatedConfig) -> (TaskRunner, SimulatedBackend) {
        let backend = SimulatedBackend::new(config);
        let runner = TaskRunner::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            Arc::new(BrowserSession::new()),
            Arc::new(AgentState::new()),
        );
        (runner, backend)
    }

    fn fast(steps_to_finish: u32) -> SimulatedConfig {
        SimulatedConfig {
            step_delay: Duration::from_millis(5),
            steps_to_finish,
            ..SimulatedConfig::default()
        }
    }

    fn run_config(dir: &TempDir) -> RunConfiguration {
        let mut config = RunConfiguration::new("find the pricing page");
        config.artifacts.recording_dir = Some(dir.path().join("videos"));
        config.artifacts.trace_dir = Some(dir.path().join("traces"));
        config.artifacts.history_dir = dir.path().join("history");
        config
    }

    #[tokio::test]
    async fn completed_run_collects_artifacts_and_closes_browser() {
        let dir = tempdir().unwrap();
        let (runner, backend) = runner_with(fast(3));

        let result = runner.run(run_config(&dir), None).await.unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert!(result.final_result.unwrap().contains("find the pricing page"));
        assert!(result.errors.is_empty());
        assert_eq!(result.model_thoughts.len(), 3);
        let history = result.history_file.unwrap();
        assert!(history.starts_with(dir.path().join("history")));
        assert!(history.exists());
        assert!(result.recording.unwrap().starts_with(dir.path().join("videos")));
        assert!(result.trace.unwrap().starts_with(dir.path().join("traces")));
        assert_eq!(backend.open_browsers(), 0);
        assert!(!runner.session().has_browser().await);
    }

    #[tokio::test]
    async fn keep_open_leaves_session_for_next_run() {
        let dir = tempdir().unwrap();
        let (runner, backend) = runner_with(fast(1));
        let mut config = run_config(&dir);
        config.browser.keep_browser_open = true;

        runner.run(config.clone(), None).await.unwrap();
        assert!(runner.session().has_browser().await);
        runner.run(config, None).await.unwrap();

        assert_eq!(backend.launches(), 1);
        assert_eq!(backend.open_browsers(), 1);
    }

    #[tokio::test]
    async fn stop_flag_ends_run_at_step_boundary() {
        let dir = tempdir().unwrap();
        let (runner, _) = runner_with(fast(50));
        runner.state().request_stop();

        let result = runner.run(run_config(&dir), None).await.unwrap();
        assert_eq!(result.status, RunStatus::Stopped);
        assert!(result.final_result.is_none());
        assert!(result.model_actions.is_empty());
        assert!(runner.state().is_stop_requested());
    }

    #[tokio::test]
    async fn launch_failure_becomes_failed_result() {
        let dir = tempdir().unwrap();
        let (runner, _) = runner_with(SimulatedConfig {
            fail_launch: true,
            ..fast(1)
        });

        let result = runner.run(run_config(&dir), None).await.unwrap();
        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.errors[0].contains("simulated browser refused to start"));
        assert!(result.history_file.is_none());
        assert!(!runner.session().has_browser().await);
    }

    #[tokio::test]
    async fn consecutive_step_failures_abort() {
        let dir = tempdir().unwrap();
        let (runner, _) = runner_with(SimulatedConfig {
            failing_steps: vec![2, 3, 4],
            ..fast(10)
        });

        let result = runner.run(run_config(&dir), None).await.unwrap();
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.errors.len(), 3);
        assert!(result.history_file.is_some());
    }

    #[tokio::test]
    async fn isolated_step_failure_is_recorded_but_run_completes() {
        let dir = tempdir().unwrap();
        let (runner, _) = runner_with(SimulatedConfig {
            failing_steps: vec![2],
            ..fast(3)
        });

        let result = runner.run(run_config(&dir), None).await.unwrap();
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.errors, vec!["agent step failed: simulated failure at step 2"]);
    }

    #[tokio::test]
    async fn interruption_propagates_after_cleanup() {
        let dir = tempdir().unwrap();
        let (runner, backend) = runner_with(SimulatedConfig {
            interrupt_at: Some(2),
            ..fast(5)
        });

        let err = runner.run(run_config(&dir), None).await.unwrap_err();
        assert!(err.is_interrupted());
        assert_eq!(backend.open_browsers(), 0);
    }

    #[tokio::test]
    async fn concurrent_run_is_rejected() {
        let dir = tempdir().unwrap();
        let (runner, _) = runner_with(fast(1));
        let _held = runner.session().try_begin_run().unwrap();

        let err = runner.run(run_config(&dir), None).await.unwrap_err();
        assert!(matches!(err, HarnessError::RunInProgress));
    }

    #[tokio::test]
    async fn progress_reports_browser_then_steps() {
        let dir = tempdir().unwrap();
        let (runner, _) = runner_with(fast(2));
        let (tx, mut rx) = mpsc::channel(PROGRESS_CAPACITY);

        runner.run(run_config(&dir), Some(tx)).await.unwrap();

        assert!(matches!(rx.recv().await, Some(RunProgress::BrowserReady)));
        assert!(matches!(rx.recv().await, Some(RunProgress::Step(r)) if r.step == 1));
        assert!(matches!(rx.recv().await, Some(RunProgress::Step(r)) if r.is_done));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    #[serial]
    fn own_browser_reads_chrome_env() {
        env::set_var(CHROME_PATH_ENV, "");
        env::set_var(CHROME_USER_DATA_ENV, "/home/me/.config/chrome");
        let mut config = RunConfiguration::new("task");
        config.browser.use_own_browser = true;

        let options = browser_options(&config);
        assert_eq!(options.chrome_instance_path, None);
        assert_eq!(
            options.extra_args,
            vec![
                "--window-size=1280,1100".to_string(),
                "--user-data-dir=/home/me/.config/chrome".to_string(),
            ]
        );

        config.browser.use_own_browser = false;
        assert_eq!(browser_options(&config).extra_args.len(), 1);
        env::remove_var(CHROME_PATH_ENV);
        env::remove_var(CHROME_USER_DATA_ENV);
    }
}
