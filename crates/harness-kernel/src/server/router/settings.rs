use std::path::PathBuf;
use std::str::FromStr;

use agent_core::LlmProvider;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{error_body, harness_error, ApiError};
use crate::app_settings::{Config, UiTheme};
use crate::exploratory::CATEGORIES;
use crate::gherkin::provider_catalog;
use crate::server::ServeState;

pub(crate) fn router() -> Router<ServeState> {
    Router::new()
        .route("/api/settings", get(get_settings_handler))
        .route("/api/settings/save", post(save_settings_handler))
        .route("/api/settings/load", post(load_settings_handler))
        .route("/api/llm/models", get(models_handler))
}

async fn get_settings_handler(State(state): State<ServeState>) -> Json<Value> {
    let config = state.config();
    let run_defaults = config.run_configuration(config.agent.task.clone());
    Json(json!({
        "success": true,
        "config": config,
        "run_defaults": run_defaults,
        "themes": UiTheme::ALL,
        "exploratory_categories": CATEGORIES,
    }))
}

/// Persists the posted settings and makes them the console's current settings.
async fn save_settings_handler(
    State(state): State<ServeState>,
    Json(config): Json<Config>,
) -> Result<Json<Value>, ApiError> {
    let path = config.save().await.map_err(harness_error)?;
    state.replace_config(config);
    Ok(Json(json!({
        "success": true,
        "path": path,
    })))
}

#[derive(Deserialize)]
struct LoadSettingsRequest {
    path: PathBuf,
}

async fn load_settings_handler(
    State(state): State<ServeState>,
    Json(request): Json<LoadSettingsRequest>,
) -> Result<Json<Value>, ApiError> {
    let config = Config::load(&request.path).await.map_err(harness_error)?;
    state.replace_config(config.clone());
    Ok(Json(json!({
        "success": true,
        "config": config,
    })))
}

#[derive(Deserialize)]
struct ModelsQuery {
    provider: Option<String>,
}

async fn models_handler(Query(query): Query<ModelsQuery>) -> Result<Json<Value>, ApiError> {
    let Some(raw) = query.provider.filter(|value| !value.trim().is_empty()) else {
        return Ok(Json(json!({
            "success": true,
            "providers": provider_catalog(),
        })));
    };
    let provider = LlmProvider::from_str(&raw)
        .map_err(|err| error_body(StatusCode::BAD_REQUEST, err.to_string()))?;
    Ok(Json(json!({
        "success": true,
        "provider": provider,
        "models": provider.models(),
        "requires_api_key": provider.requires_api_key(),
        "api_key_set": provider.env_api_key().is_some(),
    })))
}
