//! LLM provider catalog and connection settings.
//!
//! The harness never talks to a model directly; it resolves which provider,
//! model and credentials the external agent should use and hands them over.

use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Mistral,
    #[serde(rename = "deepseek")]
    DeepSeek,
    Gemini,
    Ollama,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
}

impl LlmProvider {
    pub const ALL: [LlmProvider; 7] = [
        LlmProvider::Anthropic,
        LlmProvider::OpenAi,
        LlmProvider::DeepSeek,
        LlmProvider::Gemini,
        LlmProvider::Ollama,
        LlmProvider::AzureOpenAi,
        LlmProvider::Mistral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Mistral => "mistral",
            LlmProvider::DeepSeek => "deepseek",
            LlmProvider::Gemini => "gemini",
            LlmProvider::Ollama => "ollama",
            LlmProvider::AzureOpenAi => "azure_openai",
        }
    }

    /// Known model names offered for the provider.
    pub fn models(self) -> &'static [&'static str] {
        match self {
            LlmProvider::Anthropic => &["claude-3-5-sonnet-20240620", "claude-3-opus-20240229"],
            LlmProvider::OpenAi => &["gpt-4o", "gpt-4", "gpt-3.5-turbo", "o3-mini"],
            LlmProvider::DeepSeek => &["deepseek-chat", "deepseek-reasoner"],
            LlmProvider::Gemini => &[
                "gemini-2.0-flash-exp",
                "gemini-2.0-flash-thinking-exp",
                "gemini-1.5-flash-latest",
                "gemini-1.5-flash-8b-latest",
                "gemini-2.0-flash-thinking-exp-1219",
            ],
            LlmProvider::Ollama => &["qwen2.5:7b", "llama2:7b", "deepseek-r1:14b", "deepseek-r1:32b"],
            LlmProvider::AzureOpenAi => &["gpt-4o", "gpt-4", "gpt-3.5-turbo"],
            LlmProvider::Mistral => &[
                "pixtral-large-latest",
                "mistral-large-latest",
                "mistral-small-latest",
                "ministral-8b-latest",
            ],
        }
    }

    pub fn is_known_model(self, model: &str) -> bool {
        self.models().iter().any(|known| *known == model)
    }

    pub fn requires_api_key(self) -> bool {
        !matches!(self, LlmProvider::Ollama)
    }

    /// Environment variable holding the API key, if the provider uses one.
    pub fn api_key_var(self) -> Option<&'static str> {
        match self {
            LlmProvider::OpenAi => Some("OPENAI_API_KEY"),
            LlmProvider::Anthropic => Some("ANTHROPIC_API_KEY"),
            LlmProvider::Mistral => Some("MISTRAL_API_KEY"),
            LlmProvider::DeepSeek => Some("DEEPSEEK_API_KEY"),
            LlmProvider::Gemini => Some("GOOGLE_API_KEY"),
            LlmProvider::AzureOpenAi => Some("AZURE_OPENAI_API_KEY"),
            LlmProvider::Ollama => None,
        }
    }

    /// Environment variable holding the endpoint override.
    pub fn endpoint_var(self) -> Option<&'static str> {
        match self {
            LlmProvider::OpenAi => Some("OPENAI_ENDPOINT"),
            LlmProvider::Anthropic => Some("ANTHROPIC_ENDPOINT"),
            LlmProvider::Mistral => Some("MISTRAL_ENDPOINT"),
            LlmProvider::DeepSeek => Some("DEEPSEEK_ENDPOINT"),
            LlmProvider::Ollama => Some("OLLAMA_ENDPOINT"),
            LlmProvider::AzureOpenAi => Some("AZURE_OPENAI_ENDPOINT"),
            LlmProvider::Gemini => None,
        }
    }

    pub fn default_endpoint(self) -> Option<&'static str> {
        match self {
            LlmProvider::OpenAi => Some("https://api.openai.com/v1"),
            LlmProvider::Anthropic => Some("https://api.anthropic.com"),
            LlmProvider::Mistral => Some("https://api.mistral.ai/v1"),
            LlmProvider::DeepSeek => Some("https://api.deepseek.com"),
            LlmProvider::Ollama => Some("http://localhost:11434"),
            LlmProvider::Gemini | LlmProvider::AzureOpenAi => None,
        }
    }

    pub fn env_api_key(self) -> Option<String> {
        self.api_key_var().and_then(read_non_empty)
    }

    pub fn env_endpoint(self) -> Option<String> {
        self.endpoint_var()
            .and_then(read_non_empty)
            .or_else(|| self.default_endpoint().map(str::to_string))
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = AgentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "anthropic" => Ok(LlmProvider::Anthropic),
            "mistral" => Ok(LlmProvider::Mistral),
            "deepseek" => Ok(LlmProvider::DeepSeek),
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            "ollama" => Ok(LlmProvider::Ollama),
            "azure_openai" | "azure-openai" => Ok(LlmProvider::AzureOpenAi),
            other => Err(AgentError::invalid_request(format!(
                "unknown LLM provider '{other}'"
            ))),
        }
    }
}

/// Connection settings handed to the agent for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl LlmSettings {
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 1.0,
            base_url: None,
            api_key: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Fill a missing key or endpoint from the provider's environment.
    pub fn resolve_from_env(mut self) -> Self {
        if self.api_key.as_deref().map_or(true, |key| key.trim().is_empty()) {
            self.api_key = self.provider.env_api_key();
        }
        if self
            .base_url
            .as_deref()
            .map_or(true, |url| url.trim().is_empty())
        {
            self.base_url = self.provider.env_endpoint();
        }
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .map_or(false, |key| !key.trim().is_empty())
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self::new(LlmProvider::OpenAi, "gpt-4o")
    }
}

fn read_non_empty(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
