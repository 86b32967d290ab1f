//! Agent and browser primitives shared by the harness.
//!
//! Defines the contracts the harness drives (browser backends, contexts and
//! step-wise agents), the LLM provider catalogue, run history records, and two
//! backends: an in-process simulation and an HTTP bridge to an external agent
//! service.

pub mod agent;
pub mod bridge;
pub mod browser;
pub mod errors;
pub mod history;
pub mod llm_provider;
pub mod model;
pub mod simulated;

pub use agent::{AgentFactory, AgentStepOutcome, BrowserAgent};
pub use bridge::{BridgeBackend, BridgeConfig, BRIDGE_URL_ENV};
pub use browser::{
    BrowserBackend, BrowserContextHandle, BrowserHandle, BrowserOptions, ContextOptions,
    WindowSize,
};
pub use errors::AgentError;
pub use history::{AgentHistory, AgentStepRecord, AgentThought};
pub use llm_provider::{LlmProvider, LlmSettings};
pub use model::{AgentSpec, AgentVariant, ToolCallingMethod};
pub use simulated::{SimulatedBackend, SimulatedConfig};
