use std::error::Error as StdError;
use std::path::PathBuf;

use agent_core::AgentError;
use thiserror::Error;

/// Errors surfaced by the orchestration layer.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid run configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Agent(AgentError),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another run currently holds the shared browser session.
    #[error("a run is already in progress on the shared browser session")]
    RunInProgress,

    /// The host tore the run down; callers report partial results.
    #[error("run interrupted: {0}")]
    Interrupted(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("failed to run {program}: {message}")]
    Process { program: String, message: String },
}

impl HarnessError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings(message.into())
    }

    pub fn process(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Process {
            program: program.into(),
            message: message.into(),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }

    /// Message followed by every nested cause, one per line.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        let mut source = StdError::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !out.contains(&text) {
                out.push_str("\ncaused by: ");
                out.push_str(&text);
            }
            source = cause.source();
        }
        out
    }
}

impl From<AgentError> for HarnessError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Interrupted(message) => Self::Interrupted(message),
            other => Self::Agent(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_agent_errors_stay_distinguishable() {
        let err: HarnessError = AgentError::interrupted("tab closed").into();
        assert!(err.is_interrupted());

        let err: HarnessError = AgentError::launch("no chrome").into();
        assert!(!err.is_interrupted());
        assert_eq!(err.to_string(), "failed to launch browser: no chrome");
    }

    #[test]
    fn report_includes_cause_chain() {
        let err = HarnessError::io(
            "/tmp/history/a.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let report = err.report();
        assert!(report.starts_with("io error at /tmp/history/a.json"));
        assert!(report.contains("denied"));
    }
}
