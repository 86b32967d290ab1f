use std::path::PathBuf;

use agent_core::{AgentVariant, LlmProvider, ToolCallingMethod, WindowSize};
use anyhow::{bail, Context, Result};
use clap::Args;
use futures::StreamExt;
use harness_kernel::{RunConfiguration, RunPhase, StreamSnapshot};
use tokio::signal;
use tracing::{info, warn};

use super::context::CliContext;
use super::output::{print_json_line, OutputFormat};

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Task for the agent (defaults to the configured task)
    #[arg(short, long)]
    pub task: Option<String>,

    /// Hints passed to the custom agent
    #[arg(long)]
    pub add_infos: Option<String>,

    /// Agent variant
    #[arg(long)]
    pub agent_type: Option<AgentVariant>,

    /// Run without a visible window and stream screenshots
    #[arg(long)]
    pub headless: bool,

    /// Keep the browser open for the next run
    #[arg(long)]
    pub keep_open: bool,

    /// Use the locally installed Chrome (CHROME_PATH)
    #[arg(long)]
    pub own_browser: bool,

    #[arg(long)]
    pub provider: Option<LlmProvider>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(long, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Step budget for the agent
    #[arg(long)]
    pub max_steps: Option<u32>,

    /// Actions the agent may take per step
    #[arg(long)]
    pub max_actions: Option<u32>,

    /// Do not send screenshots to the model
    #[arg(long)]
    pub no_vision: bool,

    #[arg(long)]
    pub tool_calling_method: Option<ToolCallingMethod>,

    /// Skip video and trace capture
    #[arg(long)]
    pub no_recording: bool,

    #[arg(long)]
    pub window_width: Option<u32>,

    #[arg(long)]
    pub window_height: Option<u32>,

    /// Write agent history here instead of the configured directory
    #[arg(long)]
    pub history_dir: Option<PathBuf>,
}

impl RunArgs {
    fn apply(self, config: &mut RunConfiguration) {
        if let Some(add_infos) = self.add_infos {
            config.add_infos = add_infos;
        }
        if let Some(agent_type) = self.agent_type {
            config.agent_type = agent_type;
        }
        config.browser.headless |= self.headless;
        config.browser.keep_browser_open |= self.keep_open;
        config.browser.use_own_browser |= self.own_browser;

        if let Some(provider) = self.provider {
            if provider != config.llm.provider {
                config.llm.provider = provider;
                config.llm.base_url = None;
                config.llm.api_key = None;
                if let Some(model) = provider.models().first() {
                    config.llm.model = (*model).to_string();
                }
            }
        }
        if let Some(model) = self.model {
            config.llm.model = model;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }
        if self.base_url.is_some() {
            config.llm.base_url = self.base_url;
        }
        if self.api_key.is_some() {
            config.llm.api_key = self.api_key;
        }

        if let Some(max_steps) = self.max_steps {
            config.max_steps = max_steps;
        }
        if let Some(max_actions) = self.max_actions {
            config.max_actions_per_step = max_actions;
        }
        config.use_vision &= !self.no_vision;
        if let Some(method) = self.tool_calling_method {
            config.tool_calling_method = method;
        }

        if self.no_recording {
            config.artifacts.enable_recording = false;
        }
        let window = config.browser.window;
        config.browser.window = WindowSize::new(
            self.window_width.unwrap_or(window.width),
            self.window_height.unwrap_or(window.height),
        );
        if let Some(dir) = self.history_dir {
            config.artifacts.history_dir = dir;
        }
    }
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let config = ctx.config();
    let task = args.task.clone().unwrap_or_else(|| config.agent.task.clone());
    let mut run_config = config.run_configuration(task);
    args.apply(&mut run_config);
    run_config.validate().context("invalid run options")?;

    let runtime = ctx.kernel().build_runtime()?;
    info!(
        backend = %runtime.backends.description,
        provider = %run_config.llm.provider,
        model = %run_config.llm.model,
        headless = run_config.browser.headless,
        "starting agent run"
    );
    runtime.agent_state().clear_stop();

    let coordinator = runtime.coordinator.clone();
    let mut stream = Box::pin(coordinator.stream(run_config));
    let mut last: Option<StreamSnapshot> = None;
    let mut interrupts = 0u32;

    loop {
        tokio::select! {
            next = stream.next() => {
                let Some(snapshot) = next else { break };
                report_snapshot(&snapshot, output)?;
                last = Some(snapshot);
            }
            interrupt = signal::ctrl_c() => {
                interrupt.context("failed to listen for ctrl-c")?;
                interrupts += 1;
                match on_interrupt(interrupts) {
                    Interrupt::Stop => {
                        warn!("interrupt received; asking the agent to stop (press ctrl-c again to quit)");
                        coordinator.request_stop();
                    }
                    Interrupt::Exit => {
                        warn!("second interrupt received; exiting without waiting for the agent");
                        bail!("run interrupted");
                    }
                }
            }
        }
    }

    let Some(snapshot) = last else {
        bail!("run ended without producing a result");
    };
    if !output.is_json() {
        print_summary(&snapshot);
    }
    if snapshot.phase == RunPhase::Faulted {
        bail!(
            "agent run failed: {}",
            snapshot.errors.last().map(String::as_str).unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Raise the stop flag and let the run finish its current step.
    Stop,
    Exit,
}

fn on_interrupt(count: u32) -> Interrupt {
    if count <= 1 {
        Interrupt::Stop
    } else {
        Interrupt::Exit
    }
}

fn report_snapshot(snapshot: &StreamSnapshot, output: OutputFormat) -> Result<()> {
    if output.is_json() {
        return print_json_line(snapshot);
    }
    println!(
        "[{}] actions={} thoughts={} errors={}",
        snapshot.phase.as_str(),
        snapshot.model_actions.len(),
        snapshot.model_thoughts.len(),
        snapshot.errors.len()
    );
    Ok(())
}

fn print_summary(snapshot: &StreamSnapshot) {
    println!();
    match &snapshot.final_result {
        Some(result) => println!("Final result: {result}"),
        None => println!("Final result: (none)"),
    }
    for error in &snapshot.errors {
        println!("Error: {error}");
    }
    for (label, path) in [
        ("Recording", &snapshot.recording),
        ("Trace", &snapshot.trace),
        ("History", &snapshot.history_file),
    ] {
        if let Some(path) = path {
            println!("{label}: {}", path.display());
        }
    }
}
