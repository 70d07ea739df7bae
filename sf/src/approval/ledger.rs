//! Approval ledger
//!
//! Append-only record of issued and resolved approval requests. Backed by
//! `<state-dir>/approvals.jsonl` so a second decision for the same request is
//! refused even after a restart.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{ApprovalDecision, ApprovalRequest};
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Issued,
    Resolved,
}

/// One line of the ledger file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub request_id: Uuid,
    pub run_id: Uuid,
    pub status: LedgerStatus,
    #[serde(default)]
    pub approved: Option<bool>,
    pub at: DateTime<Utc>,
}

pub struct ApprovalLedger {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<Uuid, LedgerStatus>>,
}

impl ApprovalLedger {
    /// Ledger that lives only as long as this value
    pub fn in_memory() -> Self {
        debug!("ApprovalLedger::in_memory: called");
        Self {
            path: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Open (or start) the ledger file at `path`, replaying existing entries
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        debug!(?path, "ApprovalLedger::open: called");
        let mut entries = HashMap::new();

        match fs::read_to_string(&path).await {
            Ok(content) => {
                for (idx, line) in content.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<LedgerEntry>(line) {
                        Ok(entry) => {
                            let status = entries.entry(entry.request_id).or_insert(entry.status);
                            if entry.status == LedgerStatus::Resolved {
                                *status = LedgerStatus::Resolved;
                            }
                        }
                        Err(e) => warn!(line = idx + 1, error = %e, "ApprovalLedger::open: skipping bad line"),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("ApprovalLedger::open: no ledger yet");
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        }

        debug!(count = entries.len(), "ApprovalLedger::open: loaded");
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    pub async fn status(&self, request_id: Uuid) -> Option<LedgerStatus> {
        self.entries.lock().await.get(&request_id).copied()
    }

    pub async fn is_resolved(&self, request_id: Uuid) -> bool {
        self.status(request_id).await == Some(LedgerStatus::Resolved)
    }

    /// Record that `request` was issued
    pub async fn issue(&self, request: &ApprovalRequest) -> Result<(), StoreError> {
        debug!(request_id = %request.id, "ApprovalLedger::issue: called");
        let mut entries = self.entries.lock().await;
        entries.entry(request.id).or_insert(LedgerStatus::Issued);
        self.append(&LedgerEntry {
            request_id: request.id,
            run_id: request.run_id,
            status: LedgerStatus::Issued,
            approved: None,
            at: request.issued_at,
        })
        .await
    }

    /// Mark the decision's request resolved; `false` if it already was
    pub async fn try_resolve(&self, run_id: Uuid, decision: &ApprovalDecision) -> Result<bool, StoreError> {
        self.try_resolve_with(run_id, decision, || async { Ok::<(), StoreError>(()) })
            .await
    }

    /// Like [`try_resolve`](Self::try_resolve), but only once `persist` succeeds
    ///
    /// `persist` runs while the ledger is locked, so two answers to one
    /// request never both get past it. If it fails, the request stays open
    /// and its error is returned. A decision that was persisted but could not
    /// be appended to the file is still held as resolved in memory.
    pub async fn try_resolve_with<F, Fut, E>(
        &self,
        run_id: Uuid,
        decision: &ApprovalDecision,
        persist: F,
    ) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let request_id = decision.request_id();
        debug!(%request_id, "ApprovalLedger::try_resolve_with: called");
        let mut entries = self.entries.lock().await;
        if entries.get(&request_id) == Some(&LedgerStatus::Resolved) {
            debug!(%request_id, "ApprovalLedger::try_resolve_with: already resolved");
            return Ok(false);
        }
        persist().await?;
        let entry = LedgerEntry {
            request_id,
            run_id,
            status: LedgerStatus::Resolved,
            approved: Some(decision.approved()),
            at: decision.responded_at(),
        };
        if let Err(e) = self.append(&entry).await {
            warn!(%request_id, error = %e, "ApprovalLedger::try_resolve_with: decision not written to ledger file");
        }
        entries.insert(request_id, LedgerStatus::Resolved);
        Ok(true)
    }

    async fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| StoreError::io(parent, e))?;
        }
        let line = serde_json::to_string(entry)? + "\n";
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        file.write_all(line.as_bytes()).await.map_err(|e| StoreError::io(path, e))?;
        file.flush().await.map_err(|e| StoreError::io(path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ApprovalResponse;
    use tempfile::TempDir;

    fn request() -> ApprovalRequest {
        ApprovalRequest {
            id: Uuid::now_v7(),
            run_id: Uuid::now_v7(),
            message: "review".to_string(),
            task_count: 1,
            preview: "- [ ] T001".to_string(),
            tasks_path: "outputs/tasks.md".to_string(),
            issued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_resolves_once() {
        let ledger = ApprovalLedger::in_memory();
        let req = request();
        ledger.issue(&req).await.unwrap();
        assert_eq!(ledger.status(req.id).await, Some(LedgerStatus::Issued));

        let decision = ApprovalDecision::from_response(&ApprovalResponse::approve(req.id), Utc::now());
        assert!(ledger.try_resolve(req.run_id, &decision).await.unwrap());
        assert!(!ledger.try_resolve(req.run_id, &decision).await.unwrap());
        assert!(ledger.is_resolved(req.id).await);
    }

    #[tokio::test]
    async fn test_file_ledger_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state/approvals.jsonl");
        let req = request();

        {
            let ledger = ApprovalLedger::open(&path).await.unwrap();
            ledger.issue(&req).await.unwrap();
            let decision = ApprovalDecision::from_response(&ApprovalResponse::reject(req.id), Utc::now());
            assert!(ledger.try_resolve(req.run_id, &decision).await.unwrap());
        }

        let reopened = ApprovalLedger::open(&path).await.unwrap();
        assert!(reopened.is_resolved(req.id).await);
        let lines = std::fs::read_to_string(&path).unwrap();
        assert_eq!(lines.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_request_open() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("approvals.jsonl");
        let ledger = ApprovalLedger::open(&path).await.unwrap();
        let req = request();
        ledger.issue(&req).await.unwrap();
        let decision = ApprovalDecision::from_response(&ApprovalResponse::approve(req.id), Utc::now());

        let err = ledger
            .try_resolve_with(req.run_id, &decision, || async { Err::<(), _>("disk full") })
            .await
            .unwrap_err();
        assert_eq!(err, "disk full");
        assert_eq!(ledger.status(req.id).await, Some(LedgerStatus::Issued));
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);

        let resolved = ledger
            .try_resolve_with(req.run_id, &decision, || async { Ok::<(), &str>(()) })
            .await
            .unwrap();
        assert!(resolved);
        assert!(ApprovalLedger::open(&path).await.unwrap().is_resolved(req.id).await);
    }

    #[tokio::test]
    async fn test_open_skips_corrupt_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("approvals.jsonl");
        std::fs::write(&path, "not json\n\n").unwrap();

        let ledger = ApprovalLedger::open(&path).await.unwrap();
        assert_eq!(ledger.status(Uuid::nil()).await, None);
    }
}
