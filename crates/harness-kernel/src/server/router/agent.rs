use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{error_body, harness_error, ApiError};
use crate::run_config::RunConfiguration;
use crate::server::ServeState;

pub(crate) fn router() -> Router<ServeState> {
    Router::new()
        .route("/api/agent/run", post(run_handler))
        .route("/api/agent/stop", post(stop_handler))
        .route("/api/browser/close", post(close_browser_handler))
}

/// Starts a run and streams its snapshots; each SSE event is named after the snapshot phase.
async fn run_handler(
    State(state): State<ServeState>,
    Json(config): Json<RunConfiguration>,
) -> Result<impl IntoResponse, ApiError> {
    config.validate().map_err(harness_error)?;
    if state.session().is_running() {
        return Err(error_body(
            StatusCode::CONFLICT,
            "an agent run is already in progress",
        ));
    }

    info!(task = %config.task, headless = config.browser.headless, "run requested from console");
    let mut snapshots = Box::pin(state.coordinator().stream(config));
    let stream = stream! {
        while let Some(snapshot) = snapshots.next().await {
            match serde_json::to_string(&snapshot) {
                Ok(data) => {
                    yield Ok::<Event, Infallible>(
                        Event::default().event(snapshot.phase.as_str()).data(data),
                    );
                }
                Err(err) => warn!(?err, "failed to encode stream snapshot"),
            }
        }
    };
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

async fn stop_handler(State(state): State<ServeState>) -> Json<Value> {
    let controls = state.coordinator().request_stop();
    Json(json!({
        "success": true,
        "message": "Stop requested - the agent will halt at the next safe point",
        "controls": controls,
    }))
}

async fn close_browser_handler(State(state): State<ServeState>) -> Result<Json<Value>, ApiError> {
    if state.session().is_running() {
        return Err(error_body(
            StatusCode::CONFLICT,
            "cannot close the browser while a run is in progress",
        ));
    }
    let had_browser = state.session().has_browser().await;
    state
        .session()
        .close()
        .await
        .map_err(|err| harness_error(err.into()))?;
    Ok(Json(json!({
        "success": true,
        "closed": had_browser,
    })))
}
