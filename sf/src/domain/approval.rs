//! Approval request/response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request for a human decision, issued when the task list is ready
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique request id; the response must echo it
    pub id: Uuid,
    /// Run this request belongs to
    pub run_id: Uuid,
    /// Human-readable prompt
    pub message: String,
    /// Number of tasks in the list under review
    pub task_count: usize,
    /// Truncated task list content
    pub preview: String,
    /// Where the full task list was persisted
    pub tasks_path: String,
    pub issued_at: DateTime<Utc>,
}

/// What the caller sends back through the approval channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub request_id: Uuid,
    pub approved: bool,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl ApprovalResponse {
    pub fn approve(request_id: Uuid) -> Self {
        Self {
            request_id,
            approved: true,
            rationale: None,
        }
    }

    pub fn reject(request_id: Uuid) -> Self {
        Self {
            request_id,
            approved: false,
            rationale: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// A recorded human decision; immutable once created by the approval gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    request_id: Uuid,
    approved: bool,
    responded_at: DateTime<Utc>,
    rationale: Option<String>,
}

impl ApprovalDecision {
    pub(crate) fn from_response(response: &ApprovalResponse, responded_at: DateTime<Utc>) -> Self {
        Self {
            request_id: response.request_id,
            approved: response.approved,
            responded_at,
            rationale: response.rationale.clone(),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn approved(&self) -> bool {
        self.approved
    }

    pub fn responded_at(&self) -> DateTime<Utc> {
        self.responded_at
    }

    pub fn rationale(&self) -> Option<&str> {
        self.rationale.as_deref()
    }
}
