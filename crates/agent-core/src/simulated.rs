//! Deterministic in-process backend used for tests and offline development.
//!
//! Each agent step sleeps for `step_delay` and emits a scripted record; the
//! agent declares completion once `steps_to_finish` steps have run. Closing a
//! context writes a placeholder video and trace archive, mirroring how real
//! browsers flush recordings on close.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::agent::{AgentFactory, AgentStepOutcome, BrowserAgent};
use crate::browser::{
    BrowserBackend, BrowserContextHandle, BrowserHandle, BrowserOptions, ContextOptions,
};
use crate::errors::AgentError;
use crate::history::{AgentStepRecord, AgentThought};
use crate::model::AgentSpec;

const PLACEHOLDER_FRAME: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0xFF, 0xD9,
];

#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    pub step_delay: Duration,
    pub steps_to_finish: u32,
    pub fail_launch: bool,
    /// Steps that report a recoverable step failure.
    pub failing_steps: Vec<u32>,
    /// Step at which the agent reports a host interruption.
    pub interrupt_at: Option<u32>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(250),
            steps_to_finish: 3,
            fail_launch: false,
            failing_steps: Vec::new(),
            interrupt_at: None,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    launches: AtomicUsize,
    open_browsers: AtomicUsize,
    open_contexts: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct SimulatedBackend {
    config: Arc<SimulatedConfig>,
    counters: Arc<Counters>,
}

impl SimulatedBackend {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config: Arc::new(config),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &SimulatedConfig {
        &self.config
    }

    pub fn launches(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }

    pub fn open_browsers(&self) -> usize {
        self.counters.open_browsers.load(Ordering::SeqCst)
    }

    pub fn open_contexts(&self) -> usize {
        self.counters.open_contexts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserBackend for SimulatedBackend {
    async fn launch(&self, options: &BrowserOptions) -> Result<Arc<dyn BrowserHandle>, AgentError> {
        if self.config.fail_launch {
            return Err(AgentError::launch("simulated browser refused to start"));
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        self.counters.open_browsers.fetch_add(1, Ordering::SeqCst);
        debug!(headless = options.headless, args = ?options.extra_args, "simulated browser launched");
        Ok(Arc::new(SimulatedBrowser {
            id: Uuid::new_v4().simple().to_string(),
            counters: Arc::clone(&self.counters),
            closed: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl AgentFactory for SimulatedBackend {
    async fn create(
        &self,
        spec: &AgentSpec,
        _browser: Arc<dyn BrowserHandle>,
        context: Arc<dyn BrowserContextHandle>,
    ) -> Result<Box<dyn BrowserAgent>, AgentError> {
        // the context starts rendering as soon as an agent drives it
        context.screenshot().await?;
        Ok(Box::new(SimulatedAgent {
            agent_id: Uuid::new_v4().to_string(),
            task: spec.task.clone(),
            config: Arc::clone(&self.config),
        }))
    }
}

struct SimulatedBrowser {
    id: String,
    counters: Arc<Counters>,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserHandle for SimulatedBrowser {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_context(
        &self,
        options: &ContextOptions,
    ) -> Result<Arc<dyn BrowserContextHandle>, AgentError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AgentError::context("browser already closed"));
        }
        self.counters.open_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SimulatedContext {
            id: Uuid::new_v4().simple().to_string(),
            options: options.clone(),
            counters: Arc::clone(&self.counters),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), AgentError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.open_browsers.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct SimulatedContext {
    id: String,
    options: ContextOptions,
    counters: Arc<Counters>,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserContextHandle for SimulatedContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn screenshot(&self) -> Result<Option<String>, AgentError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AgentError::context("context closed"));
        }
        Ok(Some(BASE64.encode(PLACEHOLDER_FRAME)))
    }

    async fn close(&self) -> Result<(), AgentError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.counters.open_contexts.fetch_sub(1, Ordering::SeqCst);
        if let Some(dir) = self.options.recording_path.as_deref() {
            write_placeholder(dir, &format!("{}.webm", self.id)).await?;
        }
        if let Some(dir) = self.options.trace_path.as_deref() {
            write_placeholder(dir, &format!("{}.zip", self.id)).await?;
        }
        Ok(())
    }
}

async fn write_placeholder(dir: &Path, name: &str) -> Result<(), AgentError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|err| AgentError::context(format!("{}: {err}", dir.display())))?;
    fs::write(dir.join(name), PLACEHOLDER_FRAME)
        .await
        .map_err(|err| AgentError::context(format!("{}: {err}", dir.display())))
}

struct SimulatedAgent {
    agent_id: String,
    task: String,
    config: Arc<SimulatedConfig>,
}

#[async_trait]
impl BrowserAgent for SimulatedAgent {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    async fn step(&mut self, step: u32) -> Result<AgentStepOutcome, AgentError> {
        tokio::time::sleep(self.config.step_delay).await;

        if self.config.interrupt_at == Some(step) {
            return Err(AgentError::interrupted(format!("host interrupted step {step}")));
        }
        if self.config.failing_steps.contains(&step) {
            return Err(AgentError::step(format!("simulated failure at step {step}")));
        }

        let mut record = AgentStepRecord::new(step);
        record.url = Some("about:blank".to_string());
        if step >= self.config.steps_to_finish {
            let summary = format!("Completed '{}' after {step} steps", self.task);
            record.thought = Some(AgentThought {
                evaluation_previous_goal: Some("Success".to_string()),
                next_goal: "Report the result".to_string(),
                ..AgentThought::default()
            });
            record.actions = vec![json!({ "done": { "text": summary } })];
            record.extracted_content = Some(summary);
            record.is_done = true;
        } else {
            record.thought = Some(AgentThought {
                memory: Some(format!("{step} of {} steps done", self.config.steps_to_finish)),
                next_goal: format!("Advance '{}'", self.task),
                ..AgentThought::default()
            });
            record.actions = vec![json!({ "click_element": { "index": step } })];
        }
        Ok(AgentStepOutcome { record })
    }
}
