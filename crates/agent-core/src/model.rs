use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::llm_provider::LlmSettings;

/// Which agent flavour to construct.
///
/// Both variants share one construction path; they only differ in whether
/// the operator's additional instructions reach the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentVariant {
    #[serde(alias = "org")]
    Standard,
    #[default]
    Custom,
}

impl AgentVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentVariant::Standard => "standard",
            AgentVariant::Custom => "custom",
        }
    }

    /// Additional instructions forwarded to the agent, if this variant accepts them.
    pub fn extra_context(self, add_infos: &str) -> Option<String> {
        match self {
            AgentVariant::Standard => None,
            AgentVariant::Custom => {
                let trimmed = add_infos.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
        }
    }
}

impl fmt::Display for AgentVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentVariant {
    type Err = AgentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" | "org" => Ok(AgentVariant::Standard),
            "custom" => Ok(AgentVariant::Custom),
            other => Err(AgentError::invalid_request(format!(
                "invalid agent type: {other}"
            ))),
        }
    }
}

/// How the agent asks the model for structured actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallingMethod {
    #[default]
    Auto,
    JsonSchema,
    FunctionCalling,
}

impl ToolCallingMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolCallingMethod::Auto => "auto",
            ToolCallingMethod::JsonSchema => "json_schema",
            ToolCallingMethod::FunctionCalling => "function_calling",
        }
    }
}

impl FromStr for ToolCallingMethod {
    type Err = AgentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ToolCallingMethod::Auto),
            "json_schema" => Ok(ToolCallingMethod::JsonSchema),
            "function_calling" => Ok(ToolCallingMethod::FunctionCalling),
            other => Err(AgentError::invalid_request(format!(
                "unsupported tool calling method: {other}"
            ))),
        }
    }
}

/// Everything an [`AgentFactory`](crate::AgentFactory) needs to build an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub task: String,
    pub variant: AgentVariant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_context: Option<String>,
    pub llm: LlmSettings,
    pub use_vision: bool,
    pub max_actions_per_step: u32,
    pub tool_calling_method: ToolCallingMethod,
}

impl AgentSpec {
    pub fn new(task: impl Into<String>, llm: LlmSettings) -> Self {
        Self {
            task: task.into(),
            variant: AgentVariant::default(),
            extra_context: None,
            llm,
            use_vision: true,
            max_actions_per_step: 10,
            tool_calling_method: ToolCallingMethod::default(),
        }
    }
}
