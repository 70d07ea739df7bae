//! Snapshot persistence
//!
//! One JSON file per run under `<state-dir>/runs/`, rewritten atomically at
//! every checkpoint.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{StoreError, write_atomic};
use crate::engine::WorkflowSnapshot;

pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Store snapshots under `state_dir/runs`
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        let dir = state_dir.as_ref().join("runs");
        debug!(?dir, "StateStore::new: called");
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    pub async fn save(&self, snapshot: &WorkflowSnapshot) -> Result<(), StoreError> {
        debug!(run_id = %snapshot.run_id, phase = %snapshot.phase, "StateStore::save: called");
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(self.path_for(snapshot.run_id), bytes).await
    }

    pub async fn load(&self, run_id: Uuid) -> Result<WorkflowSnapshot, StoreError> {
        debug!(%run_id, "StateStore::load: called");
        let path = self.path_for(run_id);
        let content = fs::read_to_string(&path).await.map_err(|e| StoreError::io(&path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// All readable snapshots, oldest run first
    pub async fn list(&self) -> Result<Vec<WorkflowSnapshot>, StoreError> {
        debug!(dir = ?self.dir, "StateStore::list: called");
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut snapshots = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::io(&self.dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = match fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(?path, error = %e, "StateStore::list: unreadable snapshot");
                    continue;
                }
            };
            match serde_json::from_str::<WorkflowSnapshot>(&content) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(?path, error = %e, "StateStore::list: skipping bad snapshot"),
            }
        }
        // v7 ids sort by creation time
        snapshots.sort_by_key(|s| s.run_id);
        Ok(snapshots)
    }
}
