use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::app_settings::{Config, UiTheme};
use crate::runtime::RuntimeHandle;
use crate::server::{build_console_router, ServeState};

/// Facade owning the configuration snapshot the harness was started with.
pub struct Kernel {
    config: Arc<Config>,
}

impl Kernel {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn from_shared(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Serve entry point used by the CLI and tests.
    pub async fn serve(&self, options: ServeOptions) -> Result<()> {
        let runtime = self.start_runtime().await?;
        self.launch_runtime(runtime, &options).await
    }

    async fn launch_runtime(&self, runtime: RuntimeHandle, options: &ServeOptions) -> Result<()> {
        let state = runtime
            .state
            .with_appearance(options.theme, options.dark_mode);
        let router = self.compose_router().with_state(state);
        self.start_http(router, options.host, options.port).await
    }

    /// Console shell, JSON API and recording media, still awaiting state.
    pub fn compose_router(&self) -> Router<ServeState> {
        build_console_router(&self.config.paths.recording_dir)
    }

    async fn start_http(&self, router: Router, host: IpAddr, port: u16) -> Result<()> {
        let addr = SocketAddr::new(host, port);
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind harness console on {}", addr))?;
        let bound = listener.local_addr().unwrap_or(addr);
        info!("Harness console available at http://{}:{}", bound.ip(), bound.port());
        if host.is_unspecified() {
            info!(
                "Listening on all interfaces; try http://127.0.0.1:{} locally",
                bound.port()
            );
            warn!("Console has no authentication; do not expose this port publicly");
        }

        info!("Server starting, waiting for requests...");
        axum::serve(listener, router.into_make_service())
            .await
            .context("harness console exited unexpectedly")
    }
}

/// Options accepted by [`Kernel::serve`].
#[derive(Clone, Debug)]
pub struct ServeOptions {
    pub host: IpAddr,
    pub port: u16,
    pub theme: UiTheme,
    pub dark_mode: bool,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 7788,
            theme: UiTheme::Ocean,
            dark_mode: false,
        }
    }
}

impl ServeOptions {
    /// Options taken from the `serve` section of the settings.
    pub fn from_config(config: &Config) -> Result<Self> {
        let host = config
            .serve
            .host
            .parse()
            .with_context(|| format!("invalid serve host '{}'", config.serve.host))?;
        Ok(Self {
            host,
            port: config.serve.port,
            theme: config.serve.theme,
            dark_mode: config.serve.dark_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_options_follow_config() {
        let mut config = Config::default();
        config.serve.host = "0.0.0.0".to_string();
        config.serve.theme = UiTheme::Glass;
        let options = ServeOptions::from_config(&config).unwrap();
        assert!(options.host.is_unspecified());
        assert_eq!(options.port, 7788);
        assert_eq!(options.theme, UiTheme::Glass);

        config.serve.host = "not-an-ip".to_string();
        assert!(ServeOptions::from_config(&config).is_err());
    }
}
