//! Contracts for the external browser layer.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(1280, 1100)
    }
}

/// Options used when starting a browser process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowserOptions {
    pub headless: bool,
    pub disable_security: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_instance_path: Option<PathBuf>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Options used when opening a context inside a running browser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_path: Option<PathBuf>,
    pub window: WindowSize,
}

/// Starts browser processes.
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    async fn launch(&self, options: &BrowserOptions) -> Result<Arc<dyn BrowserHandle>, AgentError>;
}

/// A running browser process.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    fn id(&self) -> &str;

    async fn new_context(
        &self,
        options: &ContextOptions,
    ) -> Result<Arc<dyn BrowserContextHandle>, AgentError>;

    async fn close(&self) -> Result<(), AgentError>;
}

/// An isolated browsing session inside a browser.
#[async_trait]
pub trait BrowserContextHandle: Send + Sync {
    fn id(&self) -> &str;

    /// Base64-encoded JPEG of the current page; `None` while no page is open.
    async fn screenshot(&self) -> Result<Option<String>, AgentError>;

    /// Closing flushes recordings and traces to their configured paths.
    async fn close(&self) -> Result<(), AgentError>;
}
