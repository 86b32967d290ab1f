//! Shared browser/context pairing reused across runs.

use std::sync::Arc;

use agent_core::{
    AgentError, BrowserBackend, BrowserContextHandle, BrowserHandle, BrowserOptions,
    ContextOptions,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::errors::HarnessError;

/// Holds the browser and context that outlive a single run when
/// `keep_browser_open` is set.
///
/// Only one run may drive the session at a time; the run lock is held for the
/// whole run and released when the [`RunGuard`] drops.
#[derive(Default)]
pub struct BrowserSession {
    browser: RwLock<Option<Arc<dyn BrowserHandle>>>,
    context: RwLock<Option<Arc<dyn BrowserContextHandle>>>,
    run_lock: Arc<Mutex<()>>,
}

/// Exclusive claim on the session for the duration of a run.
pub struct RunGuard {
    _guard: OwnedMutexGuard<()>,
}

impl BrowserSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin_run(&self) -> Result<RunGuard, HarnessError> {
        Arc::clone(&self.run_lock)
            .try_lock_owned()
            .map(|guard| RunGuard { _guard: guard })
            .map_err(|_| HarnessError::RunInProgress)
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Returns the live browser, launching one when none is held.
    pub async fn ensure_browser(
        &self,
        backend: &dyn BrowserBackend,
        options: &BrowserOptions,
    ) -> Result<Arc<dyn BrowserHandle>, AgentError> {
        let mut slot = self.browser.write().await;
        if let Some(browser) = slot.as_ref() {
            debug!(browser = browser.id(), "reusing browser");
            return Ok(Arc::clone(browser));
        }
        let browser = backend.launch(options).await?;
        info!(browser = browser.id(), headless = options.headless, "browser launched");
        *slot = Some(Arc::clone(&browser));
        Ok(browser)
    }

    /// Returns the live context, opening one on `browser` when none is held.
    pub async fn ensure_context(
        &self,
        browser: &Arc<dyn BrowserHandle>,
        options: &ContextOptions,
    ) -> Result<Arc<dyn BrowserContextHandle>, AgentError> {
        let mut slot = self.context.write().await;
        if let Some(context) = slot.as_ref() {
            debug!(context = context.id(), "reusing browser context");
            return Ok(Arc::clone(context));
        }
        let context = browser.new_context(options).await?;
        info!(context = context.id(), "browser context opened");
        *slot = Some(Arc::clone(&context));
        Ok(context)
    }

    pub async fn active_context(&self) -> Option<Arc<dyn BrowserContextHandle>> {
        self.context.read().await.clone()
    }

    pub async fn has_browser(&self) -> bool {
        self.browser.read().await.is_some()
    }

    /// Screenshot of the active context; `None` when no context is open or capture fails.
    pub async fn capture_screenshot(&self) -> Option<String> {
        let context = self.active_context().await?;
        match context.screenshot().await {
            Ok(frame) => frame,
            Err(err) => {
                debug!(%err, "screenshot unavailable");
                None
            }
        }
    }

    /// Closes context then browser and clears both references.
    ///
    /// References are cleared even when a close call fails; the first failure
    /// is returned.
    pub async fn close(&self) -> Result<(), AgentError> {
        let context = self.context.write().await.take();
        let browser = self.browser.write().await.take();
        let mut first_error = None;

        if let Some(context) = context {
            if let Err(err) = context.close().await {
                warn!(%err, "failed to close browser context");
                first_error.get_or_insert(err);
            }
        }
        if let Some(browser) = browser {
            if let Err(err) = browser.close().await {
                warn!(%err, "failed to close browser");
                first_error.get_or_insert(err);
            }
            info!("browser session closed");
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{SimulatedBackend, SimulatedConfig};

    #[tokio::test]
    async fn second_run_is_rejected_while_guard_held() {
        let session = BrowserSession::new();
        let guard = session.try_begin_run().unwrap();
        assert!(session.is_running());
        assert!(matches!(
            session.try_begin_run(),
            Err(HarnessError::RunInProgress)
        ));
        drop(guard);
        assert!(!session.is_running());
        assert!(session.try_begin_run().is_ok());
    }

    #[tokio::test]
    async fn browser_and_context_are_reused_until_closed() {
        let backend = SimulatedBackend::new(SimulatedConfig::default());
        let session = BrowserSession::new();
        assert!(session.capture_screenshot().await.is_none());

        let browser = session
            .ensure_browser(&backend, &BrowserOptions::default())
            .await
            .unwrap();
        let again = session
            .ensure_browser(&backend, &BrowserOptions::default())
            .await
            .unwrap();
        assert_eq!(browser.id(), again.id());
        assert_eq!(backend.launches(), 1);

        session
            .ensure_context(&browser, &ContextOptions::default())
            .await
            .unwrap();
        assert!(session.capture_screenshot().await.is_some());

        session.close().await.unwrap();
        assert!(!session.has_browser().await);
        assert!(session.active_context().await.is_none());
        assert_eq!(backend.open_browsers(), 0);
        assert_eq!(backend.open_contexts(), 0);
    }
}
