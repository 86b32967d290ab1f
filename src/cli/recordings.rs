use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use harness_kernel::artifacts::list_recordings;

use super::context::CliContext;
use super::output::{print_json_line, OutputFormat};

#[derive(Args, Clone)]
pub struct RecordingsArgs {
    /// Directory to scan (defaults to the configured recording directory)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

pub async fn cmd_recordings(
    args: RecordingsArgs,
    ctx: &CliContext,
    output: OutputFormat,
) -> Result<()> {
    let dir = args
        .dir
        .unwrap_or_else(|| ctx.config().paths.recording_dir.clone());
    let recordings = list_recordings(&dir).await?;

    if output.is_json() {
        return print_json_line(&recordings);
    }
    if recordings.is_empty() {
        println!("No recordings in {}", dir.display());
        return Ok(());
    }
    println!("Recordings in {}:", dir.display());
    for entry in recordings {
        println!("  {}  ({})", entry.label, entry.path.display());
    }
    Ok(())
}
