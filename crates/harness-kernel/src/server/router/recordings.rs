use std::path::PathBuf;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::{harness_error, ApiError, MEDIA_PREFIX};
use crate::artifacts::{list_recordings, RecordingEntry};
use crate::server::ServeState;

pub(crate) fn router() -> Router<ServeState> {
    Router::new().route("/api/recordings", get(list_recordings_handler))
}

#[derive(Deserialize)]
struct RecordingsQuery {
    dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct GalleryItem {
    #[serde(flatten)]
    entry: RecordingEntry,
    /// Playback URL, present for files inside the served recording directory.
    url: Option<String>,
}

#[derive(Serialize)]
struct RecordingsResponse {
    success: bool,
    dir: PathBuf,
    recordings: Vec<GalleryItem>,
}

async fn list_recordings_handler(
    State(state): State<ServeState>,
    Query(query): Query<RecordingsQuery>,
) -> Result<Json<RecordingsResponse>, ApiError> {
    let served_dir = state.config().paths.recording_dir;
    let dir = query
        .dir
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| served_dir.clone());
    let servable = dir == served_dir;
    let entries = list_recordings(&dir).await.map_err(harness_error)?;
    let recordings = entries
        .into_iter()
        .map(|entry| {
            let url = servable
                .then(|| entry.path.file_name().map(|name| name.to_string_lossy().into_owned()))
                .flatten()
                .map(|name| format!("{MEDIA_PREFIX}/{name}"));
            GalleryItem { entry, url }
        })
        .collect();
    Ok(Json(RecordingsResponse {
        success: true,
        dir,
        recordings,
    }))
}
