// File-backed storage for the outstanding operation, so a restarted process can resume polling

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::soda::PendingOperation;

pub const STATE_FORMAT_VERSION: &str = "1";

/// Errors that can occur while saving or loading the outstanding operation
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },
}

/// What goes on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedOperation {
    pub version: String,
    pub saved_at: DateTime<Utc>,
    /// Free-form note on what started the operation, e.g. "copy abcd-1234"
    pub label: Option<String>,
    pub pending: PendingOperation,
}

#[derive(Debug, Clone)]
pub struct OutstandingStore {
    path: PathBuf,
}

impl OutstandingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the operation, replacing any earlier one. The file is written
    /// beside the target and renamed into place.
    pub async fn save(
        &self,
        pending: &PendingOperation,
        label: Option<&str>,
    ) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let saved = SavedOperation {
            version: STATE_FORMAT_VERSION.to_string(),
            saved_at: Utc::now(),
            label: label.map(str::to_string),
            pending: pending.clone(),
        };
        let content = serde_json::to_string_pretty(&saved)?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, &self.path).await?;

        info!(
            path = %self.path.display(),
            poll_location = %pending.describe_location(),
            attempts_remaining = pending.attempts_remaining,
            "Saved outstanding operation"
        );
        Ok(())
    }

    /// Load the saved operation; `None` when nothing was saved
    pub async fn load(&self) -> Result<Option<SavedOperation>, PersistenceError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No saved operation");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let saved: SavedOperation = serde_json::from_str(&content)?;
        if saved.version != STATE_FORMAT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: STATE_FORMAT_VERSION.to_string(),
                found: saved.version,
            });
        }
        Ok(Some(saved))
    }

    pub async fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Cleared saved operation");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
