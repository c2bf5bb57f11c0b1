use chrono::{DateTime, Utc};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::client::LogBackend;
use crate::api::query::{LogQuery, EXPORT_LIMIT};
use crate::models::filter::FilterState;
use crate::utils::error::{AppError, AppResult};

/// Serialized export, ready to be saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub contents: String,
    pub record_count: usize,
}

/// Where finished exports go
pub trait FileSaver: Send + Sync {
    /// Persist `contents` under `file_name`, returning where it ended up
    fn save(&self, file_name: &str, contents: &[u8]) -> AppResult<PathBuf>;
}

/// Saves exports into a directory on disk
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    dir: PathBuf,
}

impl DirectorySaver {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl FileSaver for DirectorySaver {
    fn save(&self, file_name: &str, contents: &[u8]) -> AppResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        fs::write(&path, contents)?;
        Ok(path)
    }
}

/// Runs the current filter as one large query and serializes the result
pub struct ExportCoordinator {
    backend: Arc<dyn LogBackend>,
}

impl ExportCoordinator {
    pub fn new(backend: Arc<dyn LogBackend>) -> Self {
        Self { backend }
    }

    /// Build the artifact for `filter` as of `now`
    pub async fn build(&self, filter: &FilterState, now: DateTime<Utc>) -> AppResult<ExportArtifact> {
        let query = LogQuery::export(filter);
        let mut items = self.backend.export_logs(&query).await?;
        items.truncate(EXPORT_LIMIT);

        let contents = serde_json::to_string_pretty(&items)?;

        Ok(ExportArtifact {
            file_name: export_file_name(now),
            contents,
            record_count: items.len(),
        })
    }

    /// Export everything `filter` matches and hand it to `saver`
    pub async fn export(&self, filter: &FilterState, saver: &dyn FileSaver) -> AppResult<(ExportArtifact, PathBuf)> {
        let artifact = self.build(filter, Utc::now()).await?;
        let path = saver
            .save(&artifact.file_name, artifact.contents.as_bytes())
            .map_err(|e| AppError::ExportError(format!("failed to save {}: {}", artifact.file_name, e)))?;

        info!("Exported {} records to {}", artifact.record_count, path.display());
        Ok((artifact, path))
    }
}

/// File name for an export taken at `now`
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("proxy-logs-{}.json", now.format("%Y-%m-%dT%H-%M-%S"))
}
