//! Selects the browser/agent backend from configuration.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use agent_core::{
    AgentFactory, BridgeBackend, BridgeConfig, BrowserBackend, SimulatedBackend, SimulatedConfig,
    BRIDGE_URL_ENV,
};
use tracing::info;

use crate::app_settings::{BackendConfig, BackendKind};
use crate::errors::HarnessError;

/// Browser launcher and agent factory; both roles come from one backend.
#[derive(Clone)]
pub struct Backends {
    pub kind: BackendKind,
    pub browsers: Arc<dyn BrowserBackend>,
    pub agents: Arc<dyn AgentFactory>,
    /// Human readable target, e.g. the bridge URL.
    pub description: String,
}

/// `HARNESS_AGENT_BRIDGE_URL` wins over the configured backend.
pub fn build_backends(config: &BackendConfig) -> Result<Backends, HarnessError> {
    let env_url = env::var(BRIDGE_URL_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    match (env_url, config.kind) {
        (Some(url), _) => bridge(&url, config),
        (None, BackendKind::Bridge) => match config.bridge_url.as_deref() {
            Some(url) if !url.trim().is_empty() => bridge(url, config),
            _ => Err(HarnessError::invalid(format!(
                "bridge backend selected but no URL configured (set backend.bridge_url or {BRIDGE_URL_ENV})"
            ))),
        },
        (None, BackendKind::Simulated) => {
            let backend = SimulatedBackend::new(SimulatedConfig {
                step_delay: Duration::from_millis(config.simulated_step_ms),
                steps_to_finish: config.simulated_steps.max(1),
                ..SimulatedConfig::default()
            });
            info!(steps = config.simulated_steps, "using simulated agent backend");
            Ok(Backends {
                kind: BackendKind::Simulated,
                browsers: Arc::new(backend.clone()),
                agents: Arc::new(backend),
                description: "simulated (offline)".to_string(),
            })
        }
    }
}

fn bridge(url: &str, config: &BackendConfig) -> Result<Backends, HarnessError> {
    let mut bridge_config = BridgeConfig::new(url)?;
    bridge_config.request_timeout = config.request_timeout();
    let backend = BridgeBackend::new(bridge_config)?;
    let description = backend.base_url().to_string();
    info!(url = %description, "using agent bridge backend");
    Ok(Backends {
        kind: BackendKind::Bridge,
        browsers: Arc::new(backend.clone()),
        agents: Arc::new(backend),
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_to_simulated() {
        env::remove_var(BRIDGE_URL_ENV);
        let backends = build_backends(&BackendConfig::default()).unwrap();
        assert_eq!(backends.kind, BackendKind::Simulated);
    }

    #[test]
    #[serial]
    fn env_url_selects_bridge() {
        env::set_var(BRIDGE_URL_ENV, "http://127.0.0.1:9300/");
        let backends = build_backends(&BackendConfig::default()).unwrap();
        env::remove_var(BRIDGE_URL_ENV);
        assert_eq!(backends.kind, BackendKind::Bridge);
        assert_eq!(backends.description, "http://127.0.0.1:9300/");
    }

    #[test]
    #[serial]
    fn bridge_without_url_is_rejected() {
        env::remove_var(BRIDGE_URL_ENV);
        let config = BackendConfig {
            kind: BackendKind::Bridge,
            ..BackendConfig::default()
        };
        assert!(matches!(
            build_backends(&config),
            Err(HarnessError::InvalidConfiguration(_))
        ));
    }
}
