use anyhow::Result;
use harness_kernel::backends::build_backends;
use serde_json::json;

use super::context::CliContext;
use super::output::{print_json_line, OutputFormat};

pub fn cmd_info(ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let config = ctx.config();
    let backend = match build_backends(&config.backend) {
        Ok(backends) => format!("{} ({})", backends.kind.as_str(), backends.description),
        Err(err) => format!("unavailable: {err}"),
    };

    if output.is_json() {
        return print_json_line(&json!({
            "version": env!("CARGO_PKG_VERSION"),
            "build_date": env!("BUILD_DATE"),
            "git_hash": env!("GIT_HASH"),
            "config": ctx.config_path(),
            "backend": backend,
            "recording_dir": config.paths.recording_dir,
            "features_dir": config.paths.features_dir,
        }));
    }

    println!("Browser Harness System Information");
    println!("==================================");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Build Date: {}", env!("BUILD_DATE"));
    println!("Git Hash: {}", env!("GIT_HASH"));
    println!("Config: {}", ctx.config_path().display());
    println!("Backend: {backend}");
    println!("Recordings: {}", config.paths.recording_dir.display());
    println!("Features: {}", config.paths.features_dir.display());
    Ok(())
}
