//! Step-by-step record of an agent run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The model's reasoning for one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentThought {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_previous_goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default)]
    pub next_goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

/// Outcome of a single observe-think-act iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStepRecord {
    pub step: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<AgentThought>,
    #[serde(default)]
    pub actions: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub is_done: bool,
}

impl AgentStepRecord {
    pub fn new(step: u32) -> Self {
        Self {
            step,
            timestamp: Utc::now(),
            url: None,
            thought: None,
            actions: Vec::new(),
            extracted_content: None,
            error: None,
            is_done: false,
        }
    }

    pub fn failed(step: u32, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(step)
        }
    }
}

/// Full history persisted as the run's history artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHistory {
    pub agent_id: String,
    pub task: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stopped: bool,
    #[serde(default)]
    pub steps: Vec<AgentStepRecord>,
}

impl AgentHistory {
    pub fn new(agent_id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            task: task.into(),
            started_at: Utc::now(),
            finished_at: None,
            stopped: false,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, record: AgentStepRecord) {
        self.steps.push(record);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn is_done(&self) -> bool {
        self.steps.last().map_or(false, |step| step.is_done)
    }

    /// Extracted content of the final step, when the agent declared completion.
    pub fn final_result(&self) -> Option<String> {
        self.steps
            .last()
            .filter(|step| step.is_done)
            .and_then(|step| step.extracted_content.clone())
    }

    pub fn errors(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|step| step.error.clone())
            .collect()
    }

    pub fn model_actions(&self) -> Vec<Value> {
        self.steps
            .iter()
            .flat_map(|step| step.actions.iter().cloned())
            .collect()
    }

    pub fn model_thoughts(&self) -> Vec<AgentThought> {
        self.steps
            .iter()
            .filter_map(|step| step.thought.clone())
            .collect()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
