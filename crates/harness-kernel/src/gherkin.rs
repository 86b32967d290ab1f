//! Launcher for the behave BDD suite.
//!
//! The harness does not execute scenarios itself. It discovers feature files,
//! exports the LLM settings the step definitions read from the environment,
//! invokes `behave` as a child process and post-processes its reports.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;

use agent_core::LlmProvider;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::process::Command;
use tracing::{info, warn};

use crate::errors::HarnessError;
use crate::test_reports::{ensure_parent, style_report, timestamp, timestamped_path};

pub const BEHAVE_PROGRAM: &str = "behave";
pub const HTML_FORMATTER: &str = "behave_html_formatter:HTMLFormatter";
pub const NON_LLM_TAG: &str = "non-llm";

pub const TEST_TYPE_ENV: &str = "TEST_TYPE";
pub const TEST_LLM_PROVIDER_ENV: &str = "TEST_LLM_PROVIDER";
pub const TEST_LLM_MODEL_ENV: &str = "TEST_LLM_MODEL";
pub const TEST_LLM_BASE_URL_ENV: &str = "TEST_LLM_BASE_URL";
pub const TEST_LLM_API_KEY_ENV: &str = "TEST_LLM_API_KEY";

/// Which scenarios the suite should run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestType {
    Llm,
    NonLlm,
    #[default]
    All,
}

impl TestType {
    pub fn as_str(self) -> &'static str {
        match self {
            TestType::Llm => "llm",
            TestType::NonLlm => "non-llm",
            TestType::All => "all",
        }
    }

    /// behave tag expression selecting the matching scenarios.
    fn tag_filter(self) -> Option<String> {
        match self {
            TestType::Llm => Some(format!("--tags=~@{NON_LLM_TAG}")),
            TestType::NonLlm => Some(format!("--tags=@{NON_LLM_TAG}")),
            TestType::All => None,
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = HarnessError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "llm" => Ok(TestType::Llm),
            "non-llm" | "non_llm" => Ok(TestType::NonLlm),
            "all" => Ok(TestType::All),
            other => Err(HarnessError::invalid(format!("unknown test type '{other}'"))),
        }
    }
}

/// LLM selection exported to the step definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestLlmSelection {
    pub provider: Option<LlmProvider>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl TestLlmSelection {
    /// Fills a missing key or base URL from the provider's environment.
    pub fn resolved(&self) -> TestLlmSelection {
        let mut resolved = self.clone();
        if let Some(provider) = self.provider {
            if blank(resolved.api_key.as_deref()) {
                resolved.api_key = provider.env_api_key();
            }
            if blank(resolved.base_url.as_deref()) {
                resolved.base_url = provider.env_endpoint();
            }
        }
        resolved
    }

    /// Environment exported to behave, plus warnings worth surfacing to the operator.
    pub fn environment(&self, test_type: TestType) -> (Vec<(String, String)>, Vec<String>) {
        let resolved = self.resolved();
        let mut vars = vec![(TEST_TYPE_ENV.to_string(), test_type.as_str().to_string())];
        let mut warnings = Vec::new();

        if let Some(provider) = resolved.provider {
            vars.push((TEST_LLM_PROVIDER_ENV.to_string(), provider.as_str().to_string()));
            if let Some(key) = resolved.api_key.clone().filter(|key| !key.trim().is_empty()) {
                vars.push((TEST_LLM_API_KEY_ENV.to_string(), key));
            } else if provider.requires_api_key() {
                let var = provider.api_key_var().unwrap_or("<PROVIDER>_API_KEY");
                warnings.push(format!(
                    "No API key found for {provider}. Make sure to set {var} in your .env file"
                ));
            }
            if let Some(url) = resolved.base_url.clone().filter(|url| !url.trim().is_empty()) {
                vars.push((TEST_LLM_BASE_URL_ENV.to_string(), url));
            }
        }
        if let Some(model) = resolved.model.clone().filter(|model| !model.trim().is_empty()) {
            if let Some(provider) = resolved.provider {
                if !provider.is_known_model(&model) {
                    warnings.push(format!(
                        "Model '{model}' is not in the list of known models for provider '{provider}'"
                    ));
                }
            }
            vars.push((TEST_LLM_MODEL_ENV.to_string(), model));
        }
        (vars, warnings)
    }
}

fn blank(value: Option<&str>) -> bool {
    value.map_or(true, |value| value.trim().is_empty())
}

/// One provider's entry in the model catalogue.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderCatalogEntry {
    pub provider: LlmProvider,
    pub requires_api_key: bool,
    pub api_key_set: bool,
    pub models: Vec<&'static str>,
}

pub fn provider_catalog() -> Vec<ProviderCatalogEntry> {
    LlmProvider::ALL
        .iter()
        .map(|provider| ProviderCatalogEntry {
            provider: *provider,
            requires_api_key: provider.requires_api_key(),
            api_key_set: provider.env_api_key().is_some(),
            models: provider.models().to_vec(),
        })
        .collect()
}

/// Every `*.feature` file below `root`, sorted.
pub fn discover_features(root: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    let mut found = Vec::new();
    if root.is_dir() {
        walk_features(root, &mut found)?;
    }
    found.sort();
    Ok(found)
}

fn walk_features(dir: &Path, found: &mut Vec<PathBuf>) -> Result<(), HarnessError> {
    let entries = std::fs::read_dir(dir).map_err(|err| HarnessError::io(dir, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| HarnessError::io(dir, err))?;
        let path = entry.path();
        if path.is_dir() {
            walk_features(&path, found)?;
        } else if path.extension().and_then(|ext| ext.to_str()) == Some("feature") {
            found.push(path);
        }
    }
    Ok(())
}

pub async fn read_feature(path: &Path) -> Result<String, HarnessError> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("feature") {
        return Err(HarnessError::invalid(format!(
            "{} is not a feature file",
            path.display()
        )));
    }
    fs::read_to_string(path)
        .await
        .map_err(|err| HarnessError::io(path, err))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GherkinRunOptions {
    pub features: Vec<PathBuf>,
    pub test_type: TestType,
    pub llm: TestLlmSelection,
    /// behave logging level (`INFO`, `DEBUG`, `WARNING`, `ERROR`).
    pub log_level: String,
    /// Where to save the complete behave output.
    pub log_file: Option<PathBuf>,
    pub html_report: Option<PathBuf>,
    /// Suffix log and report names with the run timestamp.
    pub timestamp_outputs: bool,
    pub program: String,
}

impl Default for GherkinRunOptions {
    fn default() -> Self {
        Self {
            features: vec![PathBuf::from("features/")],
            test_type: TestType::All,
            llm: TestLlmSelection::default(),
            log_level: "INFO".to_string(),
            log_file: None,
            html_report: Some(PathBuf::from("test-reports/behave-report.html")),
            timestamp_outputs: false,
            program: BEHAVE_PROGRAM.to_string(),
        }
    }
}

/// Command-line arguments for behave.
pub fn behave_args(options: &GherkinRunOptions, report: Option<&Path>) -> Vec<String> {
    let level = options.log_level.trim().to_ascii_lowercase();
    let mut args = vec![
        "--format=pretty".to_string(),
        format!("--logging-level={level}"),
        "--define".to_string(),
        format!("logging.level={level}"),
    ];
    if let Some(report) = report {
        args.push(format!("--format={HTML_FORMATTER}"));
        args.push(format!("--outfile={}", report.display()));
    }
    if let Some(filter) = options.test_type.tag_filter() {
        args.push(filter);
    }
    args.extend(
        options
            .features
            .iter()
            .map(|feature| feature.display().to_string()),
    );
    args
}

#[derive(Debug, Clone, Serialize)]
pub struct GherkinRunReport {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub log_file: Option<PathBuf>,
    pub html_report: Option<PathBuf>,
    pub warnings: Vec<String>,
    pub output: String,
    /// Markdown summary for display.
    pub summary: String,
}

pub async fn run_gherkin(options: &GherkinRunOptions) -> Result<GherkinRunReport, HarnessError> {
    if options.features.is_empty() {
        return Err(HarnessError::invalid("no feature files selected"));
    }
    let stamp = timestamp(Local::now());
    let place = |path: &PathBuf| {
        if options.timestamp_outputs {
            timestamped_path(path, &stamp)
        } else {
            path.clone()
        }
    };
    let report = options.html_report.as_ref().map(place);
    let log_file = options.log_file.as_ref().map(place);
    if let Some(report) = report.as_deref() {
        ensure_parent(report).await?;
    }

    let (vars, warnings) = options.llm.environment(options.test_type);
    for warning in &warnings {
        warn!("{warning}");
    }
    let args = behave_args(options, report.as_deref());
    info!(program = %options.program, ?args, test_type = %options.test_type, "running behave");

    let output = Command::new(&options.program)
        .args(&args)
        .envs(vars)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|err| HarnessError::process(&options.program, err.to_string()))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        text.push_str(&stderr);
    }

    if let Some(log_file) = log_file.as_deref() {
        ensure_parent(log_file).await?;
        fs::write(log_file, &text)
            .await
            .map_err(|err| HarnessError::io(log_file, err))?;
        info!(path = %log_file.display(), "behave log saved");
    }

    let html_report = match report {
        Some(report) if report.exists() => {
            style_report(&report).await?;
            Some(report)
        }
        Some(report) => {
            warn!(path = %report.display(), "behave did not produce an HTML report");
            None
        }
        None => None,
    };

    let mut summary = vec!["### Test Execution Summary\n".to_string()];
    if let Some(log_file) = log_file.as_deref() {
        summary.push(format!("Complete logs saved to: {}\n", log_file.display()));
    }
    if let Some(report) = html_report.as_deref() {
        summary.push(format!("HTML report generated at: {}\n", report.display()));
    }
    summary.extend(warnings.iter().map(|warning| format!("Warning: {warning}\n")));

    Ok(GherkinRunReport {
        success: output.status.success(),
        exit_code: output.status.code(),
        log_file,
        html_report,
        warnings,
        output: text,
        summary: summary.join("\n"),
    })
}
