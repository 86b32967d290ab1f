use super::env::CliArgs;
use super::info::cmd_info;
use super::recordings::cmd_recordings;
use super::run::cmd_run;
use super::serve::cmd_serve;
use super::test::cmd_test;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Serve(args) => cmd_serve(args, ctx).await,
        Commands::Test(args) => cmd_test(args, ctx, &cli.log_level, cli.output).await,
        Commands::Run(args) => cmd_run(args, ctx, cli.output).await,
        Commands::Recordings(args) => cmd_recordings(args, ctx, cli.output).await,
        Commands::Info => cmd_info(ctx, cli.output),
    }
}
