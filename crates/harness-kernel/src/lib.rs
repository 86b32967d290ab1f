//! Orchestration shell around an external browser agent: run scheduling,
//! snapshot streaming, artifact collection, the console server and the
//! BDD test launcher.

pub mod agent_state;
pub mod app_settings;
pub mod artifacts;
pub mod backends;
pub mod errors;
pub mod exploratory;
pub mod gherkin;
pub mod kernel;
pub mod metrics;
pub mod run_config;
pub mod runtime;
pub mod server;
pub mod session;
pub mod stream;
pub mod task_runner;
pub mod test_reports;

pub use agent_state::AgentState;
pub use app_settings::{BackendKind, Config, UiTheme};
pub use backends::{build_backends, Backends};
pub use errors::HarnessError;
pub use kernel::{Kernel, ServeOptions};
pub use run_config::{RunConfiguration, RunResult, RunStatus};
pub use runtime::HarnessRuntime;
pub use session::BrowserSession;
pub use stream::{ControlState, RunPhase, StreamCoordinator, StreamSnapshot};
pub use task_runner::{RunProgress, TaskRunner};

pub const CONSOLE_HTML: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../../static/console.html"
));
