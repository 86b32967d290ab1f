use std::net::IpAddr;

use anyhow::Result;
use clap::Args;
use harness_kernel::{ServeOptions, UiTheme};
use tracing::info;

use super::context::CliContext;

#[derive(Args, Clone)]
pub struct ServeArgs {
    /// IP address to bind to (defaults to the configured host)
    #[arg(long)]
    pub ip: Option<IpAddr>,

    /// Port to listen on (defaults to the configured port)
    #[arg(long)]
    pub port: Option<u16>,

    /// Console colour theme
    #[arg(long)]
    pub theme: Option<UiTheme>,

    /// Render the console with a dark colour scheme
    #[arg(long)]
    pub dark_mode: bool,
}

pub async fn cmd_serve(args: ServeArgs, ctx: &CliContext) -> Result<()> {
    let mut options = ServeOptions::from_config(ctx.config())?;
    apply_serve_args(&mut options, &args);

    info!(
        host = %options.host,
        port = options.port,
        theme = %options.theme,
        config = %ctx.config_path().display(),
        "starting harness console"
    );
    ctx.kernel().serve(options).await
}

fn apply_serve_args(options: &mut ServeOptions, args: &ServeArgs) {
    if let Some(ip) = args.ip {
        options.host = ip;
    }
    if let Some(port) = args.port {
        options.port = port;
    }
    if let Some(theme) = args.theme {
        options.theme = theme;
    }
    options.dark_mode |= args.dark_mode;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_configured_options() {
        let mut options = ServeOptions::default();
        let args = ServeArgs {
            ip: Some(IpAddr::from([0, 0, 0, 0])),
            port: Some(9000),
            theme: Some(UiTheme::Citrus),
            dark_mode: true,
        };
        apply_serve_args(&mut options, &args);
        assert!(options.host.is_unspecified());
        assert_eq!(options.port, 9000);
        assert_eq!(options.theme, UiTheme::Citrus);
        assert!(options.dark_mode);
    }

    #[test]
    fn missing_flags_keep_configured_options() {
        let mut options = ServeOptions::default();
        let args = ServeArgs {
            ip: None,
            port: None,
            theme: None,
            dark_mode: false,
        };
        apply_serve_args(&mut options, &args);
        assert_eq!(options.port, 7788);
        assert_eq!(options.theme, UiTheme::Ocean);
        assert!(!options.dark_mode);
    }
}
