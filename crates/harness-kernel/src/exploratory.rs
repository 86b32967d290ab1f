//! Ad-hoc exploratory tests: one agent run against a starting URL, with the
//! run's metadata, results and recording kept in a dedicated test directory.

use std::env;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use agent_core::{AgentFactory, BrowserBackend, LlmProvider, LlmSettings, WindowSize};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::agent_state::AgentState;
use crate::artifacts::list_videos;
use crate::errors::HarnessError;
use crate::gherkin::{TEST_LLM_BASE_URL_ENV, TEST_LLM_MODEL_ENV, TEST_LLM_PROVIDER_ENV};
use crate::run_config::{RunConfiguration, RunResult};
use crate::session::BrowserSession;
use crate::task_runner::TaskRunner;
use crate::test_reports::{
    create_test_dir, timestamp, write_json, ExploratoryTestMetadata, ExploratoryTestResults,
};

pub const CATEGORIES: [&str; 5] = [
    "Navigation",
    "Search",
    "Form Interaction",
    "Visual Verification",
    "Other",
];

pub const EXPLORATORY_MAX_STEPS: u32 = 10;
pub const EXPLORATORY_TEMPERATURE: f32 = 0.5;
const DEFAULT_TEST_MODEL: &str = "gemini-2.0-flash-exp";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploratoryTest {
    pub name: String,
    pub category: String,
    pub starting_url: String,
    pub task: String,
}

impl Default for ExploratoryTest {
    fn default() -> Self {
        Self {
            name: String::new(),
            category: "Other".to_string(),
            starting_url: String::new(),
            task: String::new(),
        }
    }
}

impl ExploratoryTest {
    fn validate(&self) -> Result<(), HarnessError> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::invalid("test name must not be empty"));
        }
        if self.name.contains(['/', '\\']) {
            return Err(HarnessError::invalid("test name must not contain path separators"));
        }
        if self.starting_url.trim().is_empty() || self.task.trim().is_empty() {
            return Err(HarnessError::invalid("starting URL and task are required"));
        }
        Ok(())
    }

    /// Task handed to the agent.
    pub fn agent_task(&self) -> String {
        format!("Navigate to {} and then {}", self.starting_url, self.task)
    }
}

/// LLM used for exploratory runs, taken from the `TEST_LLM_*` variables.
pub fn test_llm_from_env() -> LlmSettings {
    let provider = env::var(TEST_LLM_PROVIDER_ENV)
        .ok()
        .and_then(|value| LlmProvider::from_str(&value).ok())
        .unwrap_or(LlmProvider::Gemini);
    let model = env::var(TEST_LLM_MODEL_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TEST_MODEL.to_string());
    let mut llm = LlmSettings::new(provider, model).with_temperature(EXPLORATORY_TEMPERATURE);
    llm.base_url = env::var(TEST_LLM_BASE_URL_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty());
    llm
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExploratoryStatus {
    Passed,
    Failed,
    Error,
}

impl ExploratoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExploratoryStatus::Passed => "Passed",
            ExploratoryStatus::Failed => "Failed",
            ExploratoryStatus::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExploratoryReport {
    pub test_dir: PathBuf,
    pub status: ExploratoryStatus,
    pub results: ExploratoryTestResults,
    pub recording: Option<PathBuf>,
    /// Markdown rendering of the results.
    pub summary: String,
}

pub struct ExploratoryRunner {
    backend: Arc<dyn BrowserBackend>,
    agents: Arc<dyn AgentFactory>,
    root: PathBuf,
    window: WindowSize,
    headless: bool,
}

impl ExploratoryRunner {
    pub fn new(
        backend: Arc<dyn BrowserBackend>,
        agents: Arc<dyn AgentFactory>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            agents,
            root: root.into(),
            window: WindowSize::new(1920, 1080),
            headless: false,
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_window(mut self, window: WindowSize) -> Self {
        self.window = window;
        self
    }

    /// Runs the test on its own browser session so it never contends with
    /// the shared UI session.
    pub async fn run(
        &self,
        test: &ExploratoryTest,
        llm: LlmSettings,
    ) -> Result<ExploratoryReport, HarnessError> {
        test.validate()?;
        let stamp = timestamp(Local::now());
        let test_dir = create_test_dir(&self.root, &test.name, &stamp).await?;
        let metadata = ExploratoryTestMetadata {
            name: test.name.clone(),
            category: test.category.clone(),
            starting_url: test.starting_url.clone(),
            task: test.task.clone(),
            timestamp: stamp,
        };
        write_json(&test_dir.join("test_info.json"), &metadata).await?;

        let recording_dir = test_dir.join("recording");
        let config = self.run_configuration(test, llm, &test_dir, &recording_dir);
        let runner = TaskRunner::new(
            self.backend.clone(),
            self.agents.clone(),
            Arc::new(BrowserSession::new()),
            Arc::new(AgentState::new()),
        );

        info!(name = %test.name, url = %test.starting_url, "exploratory test starting");
        let started = Instant::now();
        let outcome = runner.run(config, None).await;
        let duration = started.elapsed().as_secs_f64();

        let (status, results) = match outcome {
            Ok(result) => {
                let status = if result.errors.is_empty() {
                    ExploratoryStatus::Passed
                } else {
                    ExploratoryStatus::Failed
                };
                (status, results_from_run(status, duration, &result))
            }
            Err(err) => {
                warn!(name = %test.name, %err, "exploratory test errored");
                let results = ExploratoryTestResults {
                    status: ExploratoryStatus::Error.as_str().to_string(),
                    duration,
                    errors: vec![err.to_string()],
                    actions: Vec::new(),
                    thoughts: Vec::new(),
                    final_result: String::new(),
                };
                (ExploratoryStatus::Error, results)
            }
        };
        write_json(&test_dir.join("test_results.json"), &results).await?;

        let summary = summarize(&test.name, &results);
        let log_file = test_dir.join("test.log");
        fs::write(&log_file, format!("{}\n\n{summary}", test.agent_task()))
            .await
            .map_err(|err| HarnessError::io(&log_file, err))?;

        let recording = first_video(&recording_dir).await?;
        info!(name = %test.name, status = status.as_str(), duration, "exploratory test finished");
        Ok(ExploratoryReport {
            test_dir,
            status,
            results,
            recording,
            summary,
        })
    }

    fn run_configuration(
        &self,
        test: &ExploratoryTest,
        llm: LlmSettings,
        test_dir: &Path,
        recording_dir: &Path,
    ) -> RunConfiguration {
        let mut config = RunConfiguration::new(test.agent_task());
        config.llm = llm;
        config.max_steps = EXPLORATORY_MAX_STEPS;
        config.use_vision = true;
        config.browser.headless = self.headless;
        config.browser.window = self.window;
        config.artifacts.enable_recording = true;
        config.artifacts.recording_dir = Some(recording_dir.to_path_buf());
        config.artifacts.trace_dir = None;
        config.artifacts.history_dir = test_dir.join("history");
        config
    }
}

fn results_from_run(
    status: ExploratoryStatus,
    duration: f64,
    result: &RunResult,
) -> ExploratoryTestResults {
    ExploratoryTestResults {
        status: status.as_str().to_string(),
        duration,
        errors: result.errors.clone(),
        actions: result
            .model_actions
            .iter()
            .map(|action| action.to_string())
            .collect(),
        thoughts: result
            .model_thoughts
            .iter()
            .map(|thought| thought.next_goal.clone())
            .collect(),
        final_result: result.final_result.clone().unwrap_or_default(),
    }
}

async fn first_video(dir: &Path) -> Result<Option<PathBuf>, HarnessError> {
    Ok(list_videos(dir).await?.into_iter().next())
}

pub fn summarize(name: &str, results: &ExploratoryTestResults) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "### Test Results for: {name}\n");
    let _ = writeln!(out, "**Status:** {}", results.status);
    let _ = writeln!(out, "**Duration:** {:.2}s\n", results.duration);
    let sections = [
        ("Errors", &results.errors),
        ("Actions Taken", &results.actions),
        ("Agent Thoughts", &results.thoughts),
    ];
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        let _ = writeln!(out, "**{title}:**");
        for item in items {
            let _ = writeln!(out, "- {item}");
        }
        out.push('\n');
    }
    if !results.final_result.is_empty() {
        let _ = writeln!(out, "**Final Result:** {}", results.final_result);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{SimulatedBackend, SimulatedConfig};
    use serial_test::serial;
    use std::time::Duration;
    use tempfile::tempdir;

    fn runner(root: &Path, config: SimulatedConfig) -> ExploratoryRunner {
        let backend = SimulatedBackend::new(SimulatedConfig {
            step_delay: Duration::from_millis(2),
            ..config
        });
        ExploratoryRunner::new(Arc::new(backend.clone()), Arc::new(backend), root)
            .with_headless(true)
    }

    fn search_test() -> ExploratoryTest {
        ExploratoryTest {
            name: "search".to_string(),
            category: "Search".to_string(),
            starting_url: "https://example.com".to_string(),
            task: "search for rust".to_string(),
        }
    }

    #[tokio::test]
    async fn passing_test_writes_metadata_results_and_recording() {
        let dir = tempdir().unwrap();
        let runner = runner(
            dir.path(),
            SimulatedConfig {
                steps_to_finish: 2,
                ..SimulatedConfig::default()
            },
        );

        let report = runner
            .run(&search_test(), LlmSettings::new(LlmProvider::Ollama, "qwen2.5:7b"))
            .await
            .unwrap();

        assert_eq!(report.status, ExploratoryStatus::Passed);
        assert!(report.test_dir.join("test_info.json").exists());
        assert!(report.test_dir.join("test_results.json").exists());
        assert!(report.test_dir.join("test.log").exists());
        assert!(report
            .recording
            .unwrap()
            .starts_with(report.test_dir.join("recording")));

        let info: ExploratoryTestMetadata = serde_json::from_str(
            &std::fs::read_to_string(report.test_dir.join("test_info.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(info.category, "Search");
        assert!(report.summary.starts_with("### Test Results for: search"));
        assert!(report.summary.contains("**Status:** Passed"));
    }

    #[tokio::test]
    async fn step_errors_mark_test_failed() {
        let dir = tempdir().unwrap();
        let runner = runner(
            dir.path(),
            SimulatedConfig {
                steps_to_finish: 3,
                failing_steps: vec![1],
                ..SimulatedConfig::default()
            },
        );
        let report = runner
            .run(&search_test(), LlmSettings::new(LlmProvider::Ollama, "qwen2.5:7b"))
            .await
            .unwrap();
        assert_eq!(report.status, ExploratoryStatus::Failed);
        assert_eq!(report.results.errors.len(), 1);
        assert!(report.summary.contains("**Errors:**"));
    }

    #[tokio::test]
    async fn interrupted_run_is_reported_as_error() {
        let dir = tempdir().unwrap();
        let runner = runner(
            dir.path(),
            SimulatedConfig {
                steps_to_finish: 5,
                interrupt_at: Some(1),
                ..SimulatedConfig::default()
            },
        );
        let report = runner
            .run(&search_test(), LlmSettings::new(LlmProvider::Ollama, "qwen2.5:7b"))
            .await
            .unwrap();
        assert_eq!(report.status, ExploratoryStatus::Error);
        assert_eq!(report.results.status, "Error");
    }

    #[tokio::test]
    async fn rejects_unnamed_tests() {
        let dir = tempdir().unwrap();
        let runner = runner(dir.path(), SimulatedConfig::default());
        let test = ExploratoryTest {
            name: " ".to_string(),
            ..search_test()
        };
        assert!(runner.run(&test, LlmSettings::default()).await.is_err());
    }

    #[test]
    fn agent_task_prefixes_navigation() {
        assert_eq!(
            search_test().agent_task(),
            "Navigate to https://example.com and then search for rust"
        );
    }

    #[test]
    #[serial]
    fn test_llm_defaults_to_gemini() {
        env::remove_var(TEST_LLM_PROVIDER_ENV);
        env::remove_var(TEST_LLM_MODEL_ENV);
        env::remove_var(TEST_LLM_BASE_URL_ENV);
        let llm = test_llm_from_env();
        assert_eq!(llm.provider, LlmProvider::Gemini);
        assert_eq!(llm.model, "gemini-2.0-flash-exp");
        assert_eq!(llm.temperature, 0.5);

        env::set_var(TEST_LLM_PROVIDER_ENV, "deepseek");
        env::set_var(TEST_LLM_MODEL_ENV, "deepseek-chat");
        let llm = test_llm_from_env();
        assert_eq!(llm.provider, LlmProvider::DeepSeek);
        assert_eq!(llm.model, "deepseek-chat");
        env::remove_var(TEST_LLM_PROVIDER_ENV);
        env::remove_var(TEST_LLM_MODEL_ENV);
    }
}
