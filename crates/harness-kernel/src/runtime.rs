use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::fs;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, warn};
use url::Url;

use crate::agent_state::AgentState;
use crate::app_settings::{BackendKind, Config};
use crate::backends::{build_backends, Backends};
use crate::server::ServeState;
use crate::session::BrowserSession;
use crate::stream::StreamCoordinator;
use crate::task_runner::TaskRunner;
use crate::Kernel;

const BRIDGE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Backend plus the coordinator wired to one session and one stop flag.
#[derive(Clone)]
pub struct HarnessRuntime {
    pub backends: Backends,
    pub coordinator: StreamCoordinator,
}

impl HarnessRuntime {
    pub fn new(backends: Backends) -> Self {
        let runner = TaskRunner::new(
            Arc::clone(&backends.browsers),
            Arc::clone(&backends.agents),
            Arc::new(BrowserSession::new()),
            Arc::new(AgentState::new()),
        );
        Self {
            backends,
            coordinator: StreamCoordinator::new(runner),
        }
    }

    pub fn session(&self) -> &Arc<BrowserSession> {
        self.coordinator.runner().session()
    }

    pub fn agent_state(&self) -> &Arc<AgentState> {
        self.coordinator.runner().state()
    }
}

pub struct RuntimeHandle {
    pub state: ServeState,
}

impl Kernel {
    pub fn build_runtime(&self) -> Result<HarnessRuntime> {
        let backends = build_backends(&self.config().backend)
            .context("failed to configure the agent backend")?;
        Ok(HarnessRuntime::new(backends))
    }

    pub async fn start_runtime(&self) -> Result<RuntimeHandle> {
        let config = self.config();
        let runtime = self.build_runtime()?;
        prepare_artifact_dirs(&config).await?;

        let state = ServeState::new(runtime, config.as_ref().clone());
        state.mark_live();
        match run_startup_readiness_checks(&state).await {
            Ok(()) => state.mark_ready(),
            Err(err) => {
                warn!(error = %err, "startup readiness check failed; serving anyway");
                state.mark_unready(err.to_string());
            }
        }
        Ok(RuntimeHandle { state })
    }
}

async fn prepare_artifact_dirs(config: &Config) -> Result<()> {
    let paths = &config.paths;
    let mut dirs: Vec<&Path> = vec![paths.history_dir.as_path(), paths.trace_dir.as_path()];
    if paths.enable_recording {
        dirs.push(paths.recording_dir.as_path());
    }
    for dir in dirs {
        if dir.as_os_str().is_empty() {
            continue;
        }
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to prepare artifact directory {}", dir.display()))?;
    }
    info!(
        history = %paths.history_dir.display(),
        recordings = %paths.recording_dir.display(),
        "artifact directories prepared"
    );
    Ok(())
}

pub async fn run_startup_readiness_checks(state: &ServeState) -> Result<()> {
    let backends = state.backends();
    match backends.kind {
        BackendKind::Bridge => check_bridge(&backends.description).await,
        BackendKind::Simulated => Ok(()),
    }
}

async fn check_bridge(bridge_url: &str) -> Result<()> {
    let url = Url::parse(bridge_url).context("parsing agent bridge URL")?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => bail!("agent bridge URL must start with http:// or https:// (got {scheme})"),
    }

    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("agent bridge URL missing host: {bridge_url}"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("agent bridge URL missing port: {bridge_url}"))?;
    let addr = format!("{host}:{port}");
    match timeout(BRIDGE_PROBE_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(err)) => Err(anyhow!("failed to connect to agent bridge {addr}: {err}")),
        Err(_) => Err(anyhow!("timeout while probing agent bridge {addr}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn refused_bridge_check_reports_address() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = check_bridge(&format!("http://127.0.0.1:{port}/"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
        assert!(check_bridge("ftp://127.0.0.1/").await.is_err());
    }

    #[tokio::test]
    async fn artifact_dirs_are_created() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.paths.history_dir = dir.path().join("history");
        config.paths.trace_dir = dir.path().join("traces");
        config.paths.recording_dir = dir.path().join("videos");
        config.paths.enable_recording = false;

        prepare_artifact_dirs(&config).await.unwrap();
        assert!(dir.path().join("history").is_dir());
        assert!(dir.path().join("traces").is_dir());
        assert!(!dir.path().join("videos").exists());
    }
}
