//! Filesystem artifact store rooted at the working directory

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::{ArtifactStore, StoreError, write_atomic};
use crate::domain::ArtifactLocation;
use crate::validation::is_safe_relative;

pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!(?root, "FsArtifactStore::new: called");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        if !is_safe_relative(name) {
            return Err(StoreError::UnsafePath(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn persist(&self, name: &str, content: &str) -> Result<ArtifactLocation, StoreError> {
        debug!(%name, len = content.len(), "FsArtifactStore::persist: called");
        let path = self.resolve(name)?;
        write_atomic(path, content.as_bytes().to_vec()).await?;
        Ok(ArtifactLocation::for_content(name, content))
    }

    async fn read(&self, name: &str) -> Result<String, StoreError> {
        debug!(%name, "FsArtifactStore::read: called");
        let path = self.resolve(name)?;
        fs::read_to_string(&path).await.map_err(|e| StoreError::io(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_persist_then_read() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::new(temp.path());

        let loc = store.persist("outputs/plan.md", "# Plan\n").await.unwrap();
        assert_eq!(loc.path, "outputs/plan.md");
        assert_eq!(loc.bytes, 7);
        assert!(temp.path().join("outputs/plan.md").exists());

        let text = store.read_verified(&loc).await.unwrap();
        assert_eq!(text, "# Plan\n");
    }

    #[tokio::test]
    async fn test_read_verified_detects_modification() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::new(temp.path());
        let loc = store.persist("tasks.md", "- [ ] T001 x").await.unwrap();

        std::fs::write(temp.path().join("tasks.md"), "- [ ] T001 y").unwrap();
        let err = store.read_verified(&loc).await.unwrap_err();
        assert!(matches!(err, StoreError::Modified { .. }));
    }

    #[tokio::test]
    async fn test_missing_and_unsafe() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::new(temp.path());

        assert!(matches!(store.read("spec.md").await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.persist("../escape.md", "x").await,
            Err(StoreError::UnsafePath(_))
        ));
        assert!(matches!(store.read("/etc/hostname").await, Err(StoreError::UnsafePath(_))));
    }
}
