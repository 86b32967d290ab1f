//! Contracts for the external agent layer.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::browser::{BrowserContextHandle, BrowserHandle};
use crate::errors::AgentError;
use crate::history::AgentStepRecord;
use crate::model::AgentSpec;

/// Result of driving the agent through one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStepOutcome {
    pub record: AgentStepRecord,
}

impl AgentStepOutcome {
    pub fn is_done(&self) -> bool {
        self.record.is_done
    }
}

/// A constructed agent bound to a browser context.
///
/// The caller owns the step loop, which lets it honour stop requests and
/// step limits between steps.
#[async_trait]
pub trait BrowserAgent: Send {
    fn agent_id(&self) -> &str;

    async fn step(&mut self, step: u32) -> Result<AgentStepOutcome, AgentError>;
}

/// Builds agents for an [`AgentSpec`] and a browser/context pair.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn create(
        &self,
        spec: &AgentSpec,
        browser: Arc<dyn BrowserHandle>,
        context: Arc<dyn BrowserContextHandle>,
    ) -> Result<Box<dyn BrowserAgent>, AgentError>;
}
