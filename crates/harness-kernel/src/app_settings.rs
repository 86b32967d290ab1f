use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use agent_core::{AgentVariant, LlmSettings, ToolCallingMethod};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use crate::errors::HarnessError;
use crate::run_config::{ArtifactPaths, BrowserSettings, RunConfiguration};

pub const DEFAULT_TASK: &str =
    "go to google.com and type 'OpenAI' click search and give me the first url";

/// Persisted UI defaults; every section falls back to its default when absent.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub agent: AgentDefaults,
    pub llm: LlmSettings,
    pub browser: BrowserSettings,
    pub paths: PathsConfig,
    pub serve: ServeConfig,
    pub backend: BackendConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AgentDefaults {
    pub agent_type: AgentVariant,
    pub task: String,
    pub add_infos: String,
    pub max_steps: u32,
    pub max_actions_per_step: u32,
    pub use_vision: bool,
    pub tool_calling_method: ToolCallingMethod,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            agent_type: AgentVariant::Custom,
            task: DEFAULT_TASK.to_string(),
            add_infos: String::new(),
            max_steps: 100,
            max_actions_per_step: 10,
            use_vision: true,
            tool_calling_method: ToolCallingMethod::Auto,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub enable_recording: bool,
    pub recording_dir: PathBuf,
    pub trace_dir: PathBuf,
    pub history_dir: PathBuf,
    pub exploratory_dir: PathBuf,
    pub features_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub settings_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            enable_recording: true,
            recording_dir: PathBuf::from("./tmp/record_videos"),
            trace_dir: PathBuf::from("./tmp/traces"),
            history_dir: PathBuf::from("./tmp/agent_history"),
            exploratory_dir: PathBuf::from("./test-results"),
            features_dir: PathBuf::from("./features"),
            reports_dir: PathBuf::from("./test-reports"),
            settings_dir: PathBuf::from("./tmp/webui_settings"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UiTheme {
    Default,
    Soft,
    Monochrome,
    Glass,
    Origin,
    Citrus,
    #[default]
    Ocean,
    Base,
}

impl UiTheme {
    pub const ALL: [UiTheme; 8] = [
        UiTheme::Default,
        UiTheme::Soft,
        UiTheme::Monochrome,
        UiTheme::Glass,
        UiTheme::Origin,
        UiTheme::Citrus,
        UiTheme::Ocean,
        UiTheme::Base,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UiTheme::Default => "Default",
            UiTheme::Soft => "Soft",
            UiTheme::Monochrome => "Monochrome",
            UiTheme::Glass => "Glass",
            UiTheme::Origin => "Origin",
            UiTheme::Citrus => "Citrus",
            UiTheme::Ocean => "Ocean",
            UiTheme::Base => "Base",
        }
    }
}

impl fmt::Display for UiTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UiTheme {
    type Err = HarnessError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        UiTheme::ALL
            .into_iter()
            .find(|theme| theme.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| HarnessError::invalid(format!("unknown theme '{value}'")))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    pub theme: UiTheme,
    pub dark_mode: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7788,
            theme: UiTheme::Ocean,
            dark_mode: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Simulated,
    Bridge,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Simulated => "simulated",
            BackendKind::Bridge => "bridge",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub bridge_url: Option<String>,
    pub request_timeout_secs: u64,
    /// Delay of each scripted step for the simulated backend.
    pub simulated_step_ms: u64,
    pub simulated_steps: u32,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Simulated,
            bridge_url: None,
            request_timeout_secs: 120,
            simulated_step_ms: 400,
            simulated_steps: 4,
        }
    }
}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self, HarnessError> {
        serde_yaml::from_str(content)
            .map_err(|err| HarnessError::settings(format!("invalid settings: {err}")))
    }

    pub fn to_yaml(&self) -> Result<String, HarnessError> {
        serde_yaml::to_string(self)
            .map_err(|err| HarnessError::settings(format!("failed to encode settings: {err}")))
    }

    pub async fn load(path: &Path) -> Result<Self, HarnessError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|err| HarnessError::io(path, err))?;
        let config = Self::from_yaml(&content)?;
        info!(path = %path.display(), "settings loaded");
        Ok(config)
    }

    /// Writes the settings to a fresh file under `paths.settings_dir` and returns its path.
    pub async fn save(&self) -> Result<PathBuf, HarnessError> {
        let dir = &self.paths.settings_dir;
        fs::create_dir_all(dir)
            .await
            .map_err(|err| HarnessError::io(dir, err))?;
        let path = dir.join(format!("{}.yaml", Uuid::new_v4()));
        fs::write(&path, self.to_yaml()?)
            .await
            .map_err(|err| HarnessError::io(&path, err))?;
        info!(path = %path.display(), "settings saved");
        Ok(path)
    }

    /// Run options for `task`, seeded from these defaults.
    pub fn run_configuration(&self, task: impl Into<String>) -> RunConfiguration {
        let paths = &self.paths;
        RunConfiguration {
            agent_type: self.agent.agent_type,
            llm: self.llm.clone(),
            browser: self.browser.clone(),
            artifacts: ArtifactPaths {
                enable_recording: paths.enable_recording,
                recording_dir: Some(paths.recording_dir.clone()),
                trace_dir: Some(paths.trace_dir.clone()),
                history_dir: paths.history_dir.clone(),
            },
            task: task.into(),
            add_infos: self.agent.add_infos.clone(),
            max_steps: self.agent.max_steps,
            use_vision: self.agent.use_vision,
            max_actions_per_step: self.agent.max_actions_per_step,
            tool_calling_method: self.agent.tool_calling_method,
        }
    }
}
