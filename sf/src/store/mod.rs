//! Artifact and snapshot persistence
//!
//! Every write goes to a temporary file in the target directory and is then
//! renamed over the destination, so readers only ever see complete content.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::domain::ArtifactLocation;

mod fs;
mod state;

pub use fs::FsArtifactStore;
pub use state::StateStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Refusing to write outside the store: {0}")]
    UnsafePath(String),

    #[error("{path} was modified after it was recorded")]
    Modified { path: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return StoreError::NotFound(path.display().to_string());
        }
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Named text storage for seeds, artifacts and extracted files
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write `content` under the store-relative `name`
    async fn persist(&self, name: &str, content: &str) -> Result<ArtifactLocation, StoreError>;

    /// Read the store-relative `name`
    async fn read(&self, name: &str) -> Result<String, StoreError>;

    /// Read `location` and check it still has the recorded digest
    async fn read_verified(&self, location: &ArtifactLocation) -> Result<String, StoreError> {
        let content = self.read(&location.path).await?;
        if !location.matches(&content) {
            return Err(StoreError::Modified {
                path: location.path.clone(),
            });
        }
        Ok(content)
    }
}

/// Write-then-rename on a blocking thread
pub(crate) async fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> Result<(), StoreError> {
    debug!(?path, len = bytes.len(), "write_atomic: called");
    let target = path.clone();
    tokio::task::spawn_blocking(move || {
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
        tmp.write_all(&bytes).map_err(|e| StoreError::io(&target, e))?;
        tmp.as_file().sync_all().map_err(|e| StoreError::io(&target, e))?;
        tmp.persist(&target).map_err(|e| StoreError::io(&target, e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| StoreError::Io {
        path: path.display().to_string(),
        source: std::io::Error::other(e),
    })?
}
