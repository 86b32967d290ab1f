use std::path::PathBuf;

use agent_core::LlmProvider;
use anyhow::{bail, Result};
use clap::Args;
use harness_kernel::gherkin::{
    discover_features, provider_catalog, run_gherkin, GherkinRunOptions, ProviderCatalogEntry,
    TestLlmSelection, TestType,
};
use tracing::{info, warn};

use super::context::CliContext;
use super::output::{print_json_line, OutputFormat};

#[derive(Args, Clone)]
pub struct TestArgs {
    /// Which scenarios to run
    #[arg(long, env = "TEST_TYPE", default_value = "all")]
    pub test_type: TestType,

    /// LLM provider used by the step definitions
    #[arg(long, env = "TEST_LLM_PROVIDER")]
    pub provider: Option<LlmProvider>,

    /// Model name for the selected provider
    #[arg(long, env = "TEST_LLM_MODEL")]
    pub model: Option<String>,

    /// Override the provider endpoint
    #[arg(long, env = "TEST_LLM_BASE_URL")]
    pub base_url: Option<String>,

    /// Override the provider API key
    #[arg(long, env = "TEST_LLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// List providers and their models, then exit
    #[arg(long)]
    pub list_models: bool,

    /// Feature files or directories (defaults to the configured features directory)
    #[arg(long)]
    pub features: Vec<PathBuf>,

    /// HTML report location
    #[arg(long, default_value = "test-reports/behave-report.html")]
    pub report: PathBuf,

    /// Save the complete behave output next to the report
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

pub async fn cmd_test(
    args: TestArgs,
    ctx: &CliContext,
    log_level: &str,
    output: OutputFormat,
) -> Result<()> {
    if args.list_models {
        let catalog = provider_catalog();
        if output.is_json() {
            return print_json_line(&catalog);
        }
        print!("{}", render_catalog(&catalog));
        return Ok(());
    }

    let llm = TestLlmSelection {
        provider: args.provider,
        model: args.model,
        base_url: args.base_url,
        api_key: args.api_key,
    };
    let features = if args.features.is_empty() {
        let root = &ctx.config().paths.features_dir;
        if discover_features(root)?.is_empty() {
            bail!("no feature files found under {}", root.display());
        }
        vec![root.clone()]
    } else {
        args.features
    };

    if !output.is_json() {
        print!("{}", render_selection(args.test_type, &llm.resolved()));
    }
    let options = GherkinRunOptions {
        features,
        test_type: args.test_type,
        llm,
        log_level: log_level.to_uppercase(),
        log_file: args.log_file,
        html_report: Some(args.report),
        ..GherkinRunOptions::default()
    };
    info!(test_type = %options.test_type, "running behave");
    let report = run_gherkin(&options).await?;
    for warning in &report.warnings {
        warn!("{warning}");
    }

    if output.is_json() {
        print_json_line(&report)?;
    } else {
        println!("{}", report.output);
        if let Some(path) = &report.html_report {
            println!("HTML report: {}", path.display());
        }
        if let Some(path) = &report.log_file {
            println!("Log file: {}", path.display());
        }
    }

    if !report.success {
        bail!("behave exited with status {:?}", report.exit_code);
    }
    Ok(())
}

pub(crate) fn render_catalog(catalog: &[ProviderCatalogEntry]) -> String {
    let mut out = String::from("\nAvailable LLM Providers and Models:\n");
    out.push_str(&"=".repeat(50));
    out.push('\n');
    for entry in catalog {
        out.push_str(&format!("\n{}:\n", entry.provider.as_str().to_uppercase()));
        if entry.requires_api_key {
            let status = if entry.api_key_set { "✓ Set" } else { "✗ Not Set" };
            out.push_str(&format!("  API Key Required ({status})\n"));
        } else {
            out.push_str("  No API Key Required\n");
        }
        out.push_str("  Models:\n");
        for model in &entry.models {
            out.push_str(&format!("    - {model}\n"));
        }
    }
    out
}

fn render_selection(test_type: TestType, llm: &TestLlmSelection) -> String {
    let mut out = format!("Test type: {test_type}\n");
    if let Some(provider) = llm.provider {
        out.push_str(&format!("LLM provider: {provider}\n"));
    }
    if let Some(model) = &llm.model {
        out.push_str(&format!("LLM model: {model}\n"));
    }
    if let Some(url) = &llm.base_url {
        out.push_str(&format!("LLM base URL: {url}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_key_requirements() {
        let catalog = vec![
            ProviderCatalogEntry {
                provider: LlmProvider::OpenAi,
                requires_api_key: true,
                api_key_set: false,
                models: vec!["gpt-4o"],
            },
            ProviderCatalogEntry {
                provider: LlmProvider::Ollama,
                requires_api_key: false,
                api_key_set: false,
                models: vec!["qwen2.5:7b"],
            },
        ];
        let text = render_catalog(&catalog);
        assert!(text.contains("OPENAI:\n  API Key Required (✗ Not Set)"));
        assert!(text.contains("OLLAMA:\n  No API Key Required"));
        assert!(text.contains("    - qwen2.5:7b"));
    }

    #[test]
    fn selection_skips_unset_fields() {
        let text = render_selection(
            TestType::NonLlm,
            &TestLlmSelection {
                provider: Some(LlmProvider::Gemini),
                ..TestLlmSelection::default()
            },
        );
        assert_eq!(text, "Test type: non-llm\nLLM provider: gemini\n");
    }
}
