use clap::Subcommand;

use super::recordings::RecordingsArgs;
use super::run::RunArgs;
use super::serve::ServeArgs;
use super::test::TestArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Start the web console
    Serve(ServeArgs),

    /// Run the behave suite
    Test(TestArgs),

    /// Run one agent task and stream its progress
    Run(RunArgs),

    /// List recorded videos
    Recordings(RecordingsArgs),

    /// Show version and backend information
    Info,
}
