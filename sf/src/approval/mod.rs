//! Approval gate
//!
//! Builds the request a human reviews once the task list is ready and checks
//! each response against it before a decision is recorded.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{ApprovalDecision, ApprovalRequest, ApprovalResponse, TaskArtifact};
use crate::error::WorkflowError;

mod ledger;

pub use ledger::{ApprovalLedger, LedgerEntry, LedgerStatus};

const TRUNCATION_MARKER: &str = "\n... (truncated)";

pub struct ApprovalGate {
    preview_chars: usize,
    ledger: Arc<ApprovalLedger>,
}

impl ApprovalGate {
    pub fn new(preview_chars: usize, ledger: Arc<ApprovalLedger>) -> Self {
        debug!(preview_chars, "ApprovalGate::new: called");
        Self { preview_chars, ledger }
    }

    pub fn ledger(&self) -> &Arc<ApprovalLedger> {
        &self.ledger
    }

    /// Describe `tasks` for review
    pub fn request(&self, run_id: Uuid, tasks: &TaskArtifact) -> ApprovalRequest {
        let task_count = tasks.structured().tasks.len();
        let tasks_path = tasks.location().path.clone();
        debug!(%run_id, task_count, %tasks_path, "ApprovalGate::request: called");
        ApprovalRequest {
            id: Uuid::now_v7(),
            run_id,
            message: format!(
                "Generated {} tasks. Review {} and approve to start implementation.",
                task_count, tasks_path
            ),
            task_count,
            preview: preview(tasks.raw(), self.preview_chars),
            tasks_path,
            issued_at: Utc::now(),
        }
    }

    /// Record that `request` is outstanding
    pub async fn issue(&self, request: &ApprovalRequest) -> Result<(), WorkflowError> {
        info!(request_id = %request.id, run_id = %request.run_id, "Approval requested");
        self.ledger.issue(request).await?;
        Ok(())
    }

    /// Turn `response` into a decision if it answers `pending`
    ///
    /// Nothing is recorded yet; see [`commit`](Self::commit). A response to a
    /// request that already has a decision is `DuplicateResponse`; a response
    /// to any other id is `UnknownApprovalRequest`.
    pub async fn check(
        &self,
        pending: Option<&ApprovalRequest>,
        response: &ApprovalResponse,
    ) -> Result<ApprovalDecision, WorkflowError> {
        debug!(request_id = %response.request_id, approved = response.approved, "ApprovalGate::check: called");
        if self.ledger.is_resolved(response.request_id).await {
            return Err(WorkflowError::DuplicateResponse(response.request_id));
        }
        match pending {
            Some(request) if request.id == response.request_id => {}
            _ => return Err(WorkflowError::UnknownApprovalRequest(response.request_id)),
        }
        Ok(ApprovalDecision::from_response(response, Utc::now()))
    }

    /// Persist the run with `persist`, then mark the decision's request resolved
    ///
    /// When `persist` fails the request stays open and can be answered again.
    pub async fn commit<F, Fut>(
        &self,
        run_id: Uuid,
        decision: &ApprovalDecision,
        persist: F,
    ) -> Result<(), WorkflowError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), WorkflowError>>,
    {
        let request_id = decision.request_id();
        debug!(%run_id, %request_id, "ApprovalGate::commit: called");
        if !self.ledger.try_resolve_with(run_id, decision, persist).await? {
            // another resumer got there first
            return Err(WorkflowError::DuplicateResponse(request_id));
        }
        info!(%request_id, approved = decision.approved(), "Approval decision recorded");
        Ok(())
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}
