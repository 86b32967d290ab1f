//! Session artifacts on disk: history JSON, video recordings and trace archives.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use agent_core::AgentHistory;
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::errors::HarnessError;

const VIDEO_EXTENSIONS: [&str; 2] = ["mp4", "webm"];

pub fn is_video(path: &Path) -> bool {
    has_extension(path, &VIDEO_EXTENSIONS)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Files directly inside `dir` matching `keep`, with their metadata.
/// A missing directory yields an empty listing.
async fn scan_dir<F>(dir: &Path, keep: F) -> Result<Vec<(PathBuf, std::fs::Metadata)>, HarnessError>
where
    F: Fn(&Path) -> bool,
{
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(HarnessError::io(dir, err)),
    };
    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| HarnessError::io(dir, err))?
    {
        let path = entry.path();
        if !keep(&path) {
            continue;
        }
        let metadata = entry
            .metadata()
            .await
            .map_err(|err| HarnessError::io(&path, err))?;
        if metadata.is_file() {
            found.push((path, metadata));
        }
    }
    Ok(found)
}

pub async fn list_videos(dir: &Path) -> Result<BTreeSet<PathBuf>, HarnessError> {
    Ok(scan_dir(dir, is_video)
        .await?
        .into_iter()
        .map(|(path, _)| path)
        .collect())
}

/// Snapshot of a recording directory taken before a run.
#[derive(Debug, Clone)]
pub struct RecordingWatch {
    dir: PathBuf,
    before: BTreeSet<PathBuf>,
}

impl RecordingWatch {
    /// Creates the directory if needed and records the videos already present.
    pub async fn begin(dir: &Path) -> Result<Self, HarnessError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|err| HarnessError::io(dir, err))?;
        let before = list_videos(dir).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            before,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First (lexicographically) video that appeared since [`RecordingWatch::begin`].
    pub async fn finish(&self) -> Result<Option<PathBuf>, HarnessError> {
        let after = list_videos(&self.dir).await?;
        let created = after.difference(&self.before).next().cloned();
        debug!(dir = %self.dir.display(), recording = ?created, "recording diff computed");
        Ok(created)
    }
}

/// Most recently modified file in `dir` with the given extension.
pub async fn latest_file(dir: &Path, extension: &str) -> Result<Option<PathBuf>, HarnessError> {
    let files = scan_dir(dir, |path| has_extension(path, &[extension])).await?;
    Ok(files
        .into_iter()
        .max_by_key(|(path, metadata)| {
            (
                metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                path.clone(),
            )
        })
        .map(|(path, _)| path))
}

/// Writes `<dir>/<agent_id>.json`, creating `dir` first.
pub async fn write_history(dir: &Path, history: &AgentHistory) -> Result<PathBuf, HarnessError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|err| HarnessError::io(dir, err))?;
    let path = dir.join(format!("{}.json", history.agent_id));
    let body = history.to_json_pretty()?;
    fs::write(&path, body)
        .await
        .map_err(|err| HarnessError::io(&path, err))?;
    debug!(path = %path.display(), steps = history.steps.len(), "agent history saved");
    Ok(path)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecordingEntry {
    pub path: PathBuf,
    pub label: String,
}

/// Every video in `dir`, oldest first, labelled `"<n>. <file name>"`.
pub async fn list_recordings(dir: &Path) -> Result<Vec<RecordingEntry>, HarnessError> {
    let mut videos = scan_dir(dir, is_video).await?;
    videos.sort_by_key(|(path, metadata)| {
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        (created, path.clone())
    });
    Ok(videos
        .into_iter()
        .enumerate()
        .map(|(idx, (path, _))| {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            RecordingEntry {
                label: format!("{}. {}", idx + 1, name),
                path,
            }
        })
        .collect())
}
