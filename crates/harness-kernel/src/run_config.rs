//! Per-invocation run options and the result handed back to callers.

use std::path::{Path, PathBuf};

use agent_core::{
    AgentSpec, AgentThought, AgentVariant, LlmSettings, ToolCallingMethod, WindowSize,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::HarnessError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Reuse the operator's Chrome install (`CHROME_PATH`, `CHROME_USER_DATA`).
    pub use_own_browser: bool,
    /// Leave browser and context running after the run for the next one.
    pub keep_browser_open: bool,
    pub headless: bool,
    pub disable_security: bool,
    pub window: WindowSize,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            use_own_browser: false,
            keep_browser_open: false,
            headless: false,
            disable_security: true,
            window: WindowSize::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    pub enable_recording: bool,
    pub recording_dir: Option<PathBuf>,
    pub trace_dir: Option<PathBuf>,
    pub history_dir: PathBuf,
}

impl ArtifactPaths {
    /// Recording directory, when recording is enabled and a directory is set.
    pub fn recording_dir(&self) -> Option<&Path> {
        if !self.enable_recording {
            return None;
        }
        non_empty(self.recording_dir.as_deref())
    }

    pub fn trace_dir(&self) -> Option<&Path> {
        non_empty(self.trace_dir.as_deref())
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            enable_recording: true,
            recording_dir: Some(PathBuf::from("./tmp/record_videos")),
            trace_dir: Some(PathBuf::from("./tmp/traces")),
            history_dir: PathBuf::from("./tmp/agent_history"),
        }
    }
}

fn non_empty(path: Option<&Path>) -> Option<&Path> {
    path.filter(|path| !path.as_os_str().is_empty())
}

/// Snapshot of every option recognised for one agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfiguration {
    pub agent_type: AgentVariant,
    pub llm: LlmSettings,
    pub browser: BrowserSettings,
    pub artifacts: ArtifactPaths,
    pub task: String,
    /// Extra hints for the agent; only the custom variant forwards them.
    pub add_infos: String,
    pub max_steps: u32,
    pub use_vision: bool,
    pub max_actions_per_step: u32,
    pub tool_calling_method: ToolCallingMethod,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            agent_type: AgentVariant::Custom,
            llm: LlmSettings::default(),
            browser: BrowserSettings::default(),
            artifacts: ArtifactPaths::default(),
            task: String::new(),
            add_infos: String::new(),
            max_steps: 100,
            use_vision: true,
            max_actions_per_step: 10,
            tool_calling_method: ToolCallingMethod::Auto,
        }
    }
}

impl RunConfiguration {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.max_steps < 1 {
            return Err(HarnessError::invalid("max_steps must be at least 1"));
        }
        if self.max_actions_per_step < 1 {
            return Err(HarnessError::invalid(
                "max_actions_per_step must be at least 1",
            ));
        }
        if !self.browser.window.is_valid() {
            return Err(HarnessError::invalid(format!(
                "window size must be positive (got {}x{})",
                self.browser.window.width, self.browser.window.height
            )));
        }
        if self.artifacts.history_dir.as_os_str().is_empty() {
            return Err(HarnessError::invalid("history directory must be set"));
        }
        Ok(())
    }

    /// Agent construction request, with provider credentials resolved from the environment.
    pub fn agent_spec(&self) -> AgentSpec {
        AgentSpec {
            task: self.task.clone(),
            variant: self.agent_type,
            extra_context: self.agent_type.extra_context(&self.add_infos),
            llm: self.llm.clone().resolve_from_env(),
            use_vision: self.use_vision,
            max_actions_per_step: self.max_actions_per_step,
            tool_calling_method: self.tool_calling_method,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Stopped,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Stopped => "stopped",
            RunStatus::Failed => "failed",
        }
    }
}

/// Outcome of one run; produced once and never mutated by consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub final_result: Option<String>,
    pub errors: Vec<String>,
    pub model_actions: Vec<Value>,
    pub model_thoughts: Vec<AgentThought>,
    pub recording: Option<PathBuf>,
    pub trace: Option<PathBuf>,
    pub history_file: Option<PathBuf>,
}

impl RunResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            final_result: None,
            errors: vec![error.into()],
            model_actions: Vec::new(),
            model_thoughts: Vec::new(),
            recording: None,
            trace: None,
            history_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(RunConfiguration::new("open docs").validate().is_ok());
    }

    #[test]
    fn rejects_zero_limits_and_window() {
        let mut config = RunConfiguration::new("task");
        config.max_steps = 0;
        assert!(matches!(
            config.validate(),
            Err(HarnessError::InvalidConfiguration(_))
        ));

        let mut config = RunConfiguration::new("task");
        config.max_actions_per_step = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfiguration::new("task");
        config.browser.window = WindowSize::new(0, 800);
        assert!(config.validate().is_err());
    }

    #[test]
    fn recording_dir_respects_toggle() {
        let mut paths = ArtifactPaths::default();
        assert!(paths.recording_dir().is_some());
        paths.enable_recording = false;
        assert!(paths.recording_dir().is_none());
        paths.enable_recording = true;
        paths.recording_dir = Some(PathBuf::new());
        assert!(paths.recording_dir().is_none());
    }

    #[test]
    fn add_infos_only_reach_custom_agents() {
        let mut config = RunConfiguration::new("book a table");
        config.add_infos = "prefer window seats".to_string();
        assert_eq!(
            config.agent_spec().extra_context.as_deref(),
            Some("prefer window seats")
        );

        config.agent_type = AgentVariant::Standard;
        assert_eq!(config.agent_spec().extra_context, None);
    }

    #[test]
    fn partial_json_payload_fills_defaults() {
        let config: RunConfiguration = serde_json::from_str(
            r#"{"task": "search rust", "browser": {"headless": true}, "max_steps": 5}"#,
        )
        .unwrap();
        assert!(config.browser.headless);
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.max_actions_per_step, 10);
        assert_eq!(config.browser.window, WindowSize::new(1280, 1100));
    }
}
