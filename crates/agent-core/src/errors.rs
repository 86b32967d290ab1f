use thiserror::Error;

/// Errors emitted by browser and agent backends.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The browser process could not be started or attached.
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// A browser context could not be created, queried or closed.
    #[error("browser context failure: {0}")]
    Context(String),

    /// A single agent step failed; the run may continue.
    #[error("agent step failed: {0}")]
    Step(String),

    /// Communication with a remote agent service failed.
    #[error("agent transport error: {0}")]
    Transport(String),

    /// The host interrupted the run (e.g. the UI tore the request down).
    #[error("run interrupted: {0}")]
    Interrupted(String),

    /// Raised when an agent request is malformed or missing required fields.
    #[error("invalid agent request: {0}")]
    InvalidRequest(String),
}

impl AgentError {
    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch(message.into())
    }

    pub fn context(message: impl Into<String>) -> Self {
        Self::Context(message.into())
    }

    pub fn step(message: impl Into<String>) -> Self {
        Self::Step(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::Interrupted(message.into())
    }

    /// Helper for wrapping static string errors.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Step failures are recorded in history instead of aborting the run.
    pub fn is_step_failure(&self) -> bool {
        matches!(self, Self::Step(_))
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
