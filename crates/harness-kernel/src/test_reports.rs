//! Report files produced by test runs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::errors::HarnessError;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub const REPORT_CSS: &str = r#"
<style>
    body { font-family: Arial, sans-serif; margin: 20px; }
    .feature { margin-bottom: 30px; }
    .scenario { margin: 20px 0; padding: 10px; background: #f5f5f5; }
    .passed { color: green; }
    .failed { color: red; }
    .skipped { color: orange; }
    .step { margin: 5px 0; }
    .description { font-style: italic; color: #666; }
</style>
"#;

pub fn timestamp(now: DateTime<Local>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// `<base>_<timestamp><ext>`, keeping the original extension.
pub fn timestamped_path(path: &Path, stamp: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{stamp}"),
    };
    path.with_file_name(name)
}

/// Inserts the report stylesheet right before `</head>`; documents without a head are unchanged.
pub fn inject_report_css(html: &str) -> String {
    html.replacen("</head>", &format!("{REPORT_CSS}</head>"), 1)
}

pub async fn style_report(path: &Path) -> Result<(), HarnessError> {
    let html = fs::read_to_string(path)
        .await
        .map_err(|err| HarnessError::io(path, err))?;
    fs::write(path, inject_report_css(&html))
        .await
        .map_err(|err| HarnessError::io(path, err))
}

pub async fn ensure_parent(path: &Path) -> Result<(), HarnessError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|err| HarnessError::io(parent, err)),
        _ => Ok(()),
    }
}

pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), HarnessError> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body)
        .await
        .map_err(|err| HarnessError::io(path, err))
}

/// Contents of `test_info.json` for an exploratory test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploratoryTestMetadata {
    pub name: String,
    pub category: String,
    pub starting_url: String,
    pub task: String,
    pub timestamp: String,
}

/// Contents of `test_results.json` for an exploratory test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploratoryTestResults {
    pub status: String,
    pub duration: f64,
    pub errors: Vec<String>,
    pub actions: Vec<String>,
    pub thoughts: Vec<String>,
    pub final_result: String,
}

/// `<root>/<name>_<timestamp>/`, created on demand.
pub async fn create_test_dir(root: &Path, name: &str, stamp: &str) -> Result<PathBuf, HarnessError> {
    let dir = root.join(format!("{name}_{stamp}"));
    fs::create_dir_all(&dir)
        .await
        .map_err(|err| HarnessError::io(&dir, err))?;
    Ok(dir)
}
