use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

use crate::agent_state::AgentState;
use crate::app_settings::{Config, UiTheme};
use crate::backends::Backends;
use crate::runtime::HarnessRuntime;
use crate::session::BrowserSession;
use crate::stream::StreamCoordinator;

/// Shared state behind every route: one browser session, one stop flag and
/// the settings the console was started with (replaceable through the settings routes).
#[derive(Clone)]
pub struct ServeState {
    runtime: HarnessRuntime,
    config: Arc<RwLock<Config>>,
    health: Arc<ServeHealth>,
    appearance: Appearance,
}

#[derive(Debug, Clone, Copy)]
pub struct Appearance {
    pub theme: UiTheme,
    pub dark_mode: bool,
}

impl ServeState {
    pub fn new(runtime: HarnessRuntime, config: Config) -> Self {
        let appearance = Appearance {
            theme: config.serve.theme,
            dark_mode: config.serve.dark_mode,
        };
        Self {
            runtime,
            config: Arc::new(RwLock::new(config)),
            health: Arc::new(ServeHealth::new()),
            appearance,
        }
    }

    pub fn with_appearance(mut self, theme: UiTheme, dark_mode: bool) -> Self {
        self.appearance = Appearance { theme, dark_mode };
        self
    }

    pub fn coordinator(&self) -> &StreamCoordinator {
        &self.runtime.coordinator
    }

    pub fn session(&self) -> &Arc<BrowserSession> {
        self.runtime.coordinator.runner().session()
    }

    pub fn agent_state(&self) -> &Arc<AgentState> {
        self.runtime.coordinator.runner().state()
    }

    pub fn backends(&self) -> &Backends {
        &self.runtime.backends
    }

    pub fn appearance(&self) -> Appearance {
        self.appearance
    }

    /// Copy of the current settings.
    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    pub fn replace_config(&self, config: Config) {
        *self.config.write() = config;
    }

    pub(crate) fn health_snapshot(&self) -> ServeHealthSnapshot {
        self.health.snapshot()
    }

    pub fn mark_live(&self) {
        self.health.mark_live();
    }

    pub fn mark_ready(&self) {
        self.health.mark_ready();
    }

    pub fn mark_unready(&self, error: impl Into<String>) {
        self.health.mark_unready(error);
    }
}

#[derive(Default)]
pub struct ServeHealth {
    live: AtomicBool,
    ready: AtomicBool,
    last_ready_check: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl ServeHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_live(&self) {
        self.live.store(true, Ordering::SeqCst);
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
        self.update_last_check();
        *self.last_error.lock() = None;
    }

    pub fn mark_unready(&self, error: impl Into<String>) {
        self.ready.store(false, Ordering::SeqCst);
        self.update_last_check();
        *self.last_error.lock() = Some(error.into());
    }

    pub(crate) fn snapshot(&self) -> ServeHealthSnapshot {
        ServeHealthSnapshot {
            ready: self.ready.load(Ordering::SeqCst),
            live: self.live.load(Ordering::SeqCst),
            last_ready_check: self.last_ready_check(),
            last_error: self.last_error.lock().clone(),
        }
    }

    fn update_last_check(&self) {
        if let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) {
            self.last_ready_check
                .store(duration.as_secs(), Ordering::SeqCst);
        }
    }

    fn last_ready_check(&self) -> Option<u64> {
        match self.last_ready_check.load(Ordering::SeqCst) {
            0 => None,
            value => Some(value),
        }
    }
}

pub(crate) struct ServeHealthSnapshot {
    pub(crate) ready: bool,
    pub(crate) live: bool,
    pub(crate) last_ready_check: Option<u64>,
    pub(crate) last_error: Option<String>,
}
