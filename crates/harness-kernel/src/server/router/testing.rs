use std::path::PathBuf;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{harness_error, ApiError};
use crate::exploratory::{test_llm_from_env, ExploratoryRunner, ExploratoryTest};
use crate::gherkin::{
    discover_features, read_feature, run_gherkin, GherkinRunOptions, TestLlmSelection, TestType,
};
use crate::server::ServeState;

pub(crate) fn router() -> Router<ServeState> {
    Router::new()
        .route("/api/tests/features", get(features_handler))
        .route("/api/tests/feature", get(feature_handler))
        .route("/api/tests/gherkin", post(gherkin_handler))
        .route("/api/tests/exploratory", post(exploratory_handler))
}

async fn features_handler(State(state): State<ServeState>) -> Result<Json<Value>, ApiError> {
    let root = state.config().paths.features_dir;
    let features = discover_features(&root).map_err(harness_error)?;
    Ok(Json(json!({
        "success": true,
        "root": root,
        "features": features,
    })))
}

#[derive(Deserialize)]
struct FeatureQuery {
    path: PathBuf,
}

async fn feature_handler(Query(query): Query<FeatureQuery>) -> Result<Json<Value>, ApiError> {
    let content = read_feature(&query.path).await.map_err(harness_error)?;
    Ok(Json(json!({
        "success": true,
        "path": query.path,
        "content": content,
    })))
}

#[derive(Deserialize)]
#[serde(default)]
struct GherkinRequest {
    features: Vec<PathBuf>,
    test_type: TestType,
    llm: TestLlmSelection,
    log_level: String,
    save_logs: bool,
    generate_report: bool,
}

impl Default for GherkinRequest {
    fn default() -> Self {
        Self {
            features: Vec::new(),
            test_type: TestType::All,
            llm: TestLlmSelection::default(),
            log_level: "INFO".to_string(),
            save_logs: true,
            generate_report: true,
        }
    }
}

/// Runs behave over the selected features, or every discovered one when none are selected.
async fn gherkin_handler(
    State(state): State<ServeState>,
    Json(request): Json<GherkinRequest>,
) -> Result<Json<Value>, ApiError> {
    let paths = state.config().paths;
    let features = if request.features.is_empty() {
        discover_features(&paths.features_dir).map_err(harness_error)?
    } else {
        request.features
    };
    let options = GherkinRunOptions {
        features,
        test_type: request.test_type,
        llm: request.llm,
        log_level: request.log_level,
        log_file: request
            .save_logs
            .then(|| paths.reports_dir.join("test.log")),
        html_report: request
            .generate_report
            .then(|| paths.reports_dir.join("report.html")),
        timestamp_outputs: true,
        ..GherkinRunOptions::default()
    };
    let report = run_gherkin(&options).await.map_err(harness_error)?;
    Ok(Json(json!({
        "success": report.success,
        "report": report,
    })))
}

#[derive(Deserialize)]
struct ExploratoryRequest {
    #[serde(flatten)]
    test: ExploratoryTest,
    #[serde(default)]
    headless: bool,
}

async fn exploratory_handler(
    State(state): State<ServeState>,
    Json(request): Json<ExploratoryRequest>,
) -> Result<Json<Value>, ApiError> {
    let backends = state.backends();
    let runner = ExploratoryRunner::new(
        backends.browsers.clone(),
        backends.agents.clone(),
        state.config().paths.exploratory_dir,
    )
    .with_headless(request.headless);
    let report = runner
        .run(&request.test, test_llm_from_env())
        .await
        .map_err(harness_error)?;
    Ok(Json(json!({
        "success": true,
        "report": report,
    })))
}
