use std::path::Path;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::error;

use crate::errors::HarnessError;
use crate::{metrics, CONSOLE_HTML};

mod agent;
mod recordings;
mod settings;
mod testing;

use super::state::{Appearance, ServeState};

/// Route prefix under which the recording directory is served.
pub const MEDIA_PREFIX: &str = "/media/recordings";

pub(crate) type ApiError = (StatusCode, Json<Value>);

pub fn build_console_router(recording_dir: &Path) -> Router<ServeState> {
    console_shell_router()
        .merge(build_api_router())
        .merge(media_router(recording_dir))
}

pub fn console_shell_router() -> Router<ServeState> {
    Router::new()
        .route("/", get(console_handler))
        .route("/health", get(health_handler))
        .route("/livez", get(live_handler))
        .route("/readyz", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .layer(cors_layer())
}

pub fn build_api_router() -> Router<ServeState> {
    Router::new()
        .merge(agent::router())
        .merge(recordings::router())
        .merge(settings::router())
        .merge(testing::router())
        .layer(cors_layer())
}

pub fn media_router(recording_dir: &Path) -> Router<ServeState> {
    Router::new().nest_service(MEDIA_PREFIX, ServeDir::new(recording_dir))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Console page with the configured theme applied.
pub fn render_console(appearance: Appearance) -> String {
    let scheme = if appearance.dark_mode { "dark" } else { "light" };
    CONSOLE_HTML
        .replace("{{THEME}}", appearance.theme.as_str())
        .replace("{{COLOR_SCHEME}}", scheme)
}

pub(crate) fn error_body(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(json!({
            "success": false,
            "error": message.into(),
        })),
    )
}

pub(crate) fn harness_error(err: HarnessError) -> ApiError {
    let status = match &err {
        HarnessError::InvalidConfiguration(_) | HarnessError::Settings(_) => {
            StatusCode::BAD_REQUEST
        }
        HarnessError::RunInProgress => StatusCode::CONFLICT,
        HarnessError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
            StatusCode::NOT_FOUND
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %err.report(), "request failed");
    }
    error_body(status, err.to_string())
}

async fn console_handler(State(state): State<ServeState>) -> Html<String> {
    Html(render_console(state.appearance()))
}

async fn health_handler(State(state): State<ServeState>) -> Json<Value> {
    let snapshot = state.health_snapshot();
    Json(json!({
        "status": "ok",
        "backend": state.backends().kind.as_str(),
        "backend_target": state.backends().description,
        "running": state.session().is_running(),
        "stop_requested": state.agent_state().is_stop_requested(),
        "ready": snapshot.ready,
        "live": snapshot.live,
        "last_ready_check_ts": snapshot.last_ready_check,
        "last_error": snapshot.last_error,
    }))
}

async fn live_handler(State(state): State<ServeState>) -> impl IntoResponse {
    let snapshot = state.health_snapshot();
    let status = if snapshot.live {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "live": snapshot.live,
            "ready": snapshot.ready,
        })),
    )
}

async fn ready_handler(State(state): State<ServeState>) -> impl IntoResponse {
    let snapshot = state.health_snapshot();
    let status = if snapshot.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "ready": snapshot.ready,
            "last_ready_check_ts": snapshot.last_ready_check,
            "last_error": snapshot.last_error,
        })),
    )
}

async fn metrics_handler() -> Response {
    match metrics::render() {
        Ok((content_type, body)) => match HeaderValue::from_str(&content_type) {
            Ok(content_type) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
            Err(err) => {
                error!(?err, "failed to build content-type header for metrics");
                (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error").into_response()
            }
        },
        Err(err) => {
            error!(?err, "failed to encode prometheus metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metric encode error").into_response()
        }
    }
}
