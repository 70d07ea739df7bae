//! Workflow error taxonomy
//!
//! Every failure the engine can surface maps onto one `WorkflowError` variant.
//! `ErrorKind` is the serializable projection recorded in history entries and
//! terminal events.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::Phase;
use crate::gateway::GatewayError;
use crate::store::StoreError;
use crate::validation::ValidationReport;

/// Errors produced by the workflow core
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Missing input: {name} is absent or empty")]
    MissingInput { name: String },

    #[error("Generation failed for {phase} after {attempts} attempt(s): {last_error}")]
    GenerationFailed {
        phase: Phase,
        attempts: u32,
        last_error: GatewayError,
    },

    #[error("Validation failed for {phase}: {} violation(s)", report.errors().count())]
    ValidationFailed { phase: Phase, report: ValidationReport },

    #[error("Unknown approval request: {0}")]
    UnknownApprovalRequest(Uuid),

    #[error("Duplicate response for approval request {0}")]
    DuplicateResponse(Uuid),

    #[error("Cannot resume a workflow in phase {phase}; expected AWAITING_APPROVAL")]
    InvalidResume { phase: Phase },

    #[error("Cancelled during {phase}")]
    Cancelled { phase: Phase },

    #[error("Invalid transition {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Run aborted: {0}")]
    Aborted(String),
}

impl WorkflowError {
    /// Serializable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingInput { .. } => ErrorKind::MissingInput,
            Self::GenerationFailed { .. } => ErrorKind::GenerationFailed,
            Self::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Self::UnknownApprovalRequest(_) => ErrorKind::UnknownApprovalRequest,
            Self::DuplicateResponse(_) => ErrorKind::DuplicateResponse,
            Self::InvalidResume { .. } => ErrorKind::InvalidResume,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Prompt(_) => ErrorKind::Prompt,
            Self::Snapshot(_) => ErrorKind::Snapshot,
            Self::Store(_) => ErrorKind::Store,
            Self::Aborted(_) => ErrorKind::Aborted,
        }
    }

    /// Phase the error is about, when it names one
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::GenerationFailed { phase, .. }
            | Self::ValidationFailed { phase, .. }
            | Self::InvalidResume { phase }
            | Self::Cancelled { phase } => Some(*phase),
            _ => None,
        }
    }

    /// The validation report carried by this error, if any
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            Self::ValidationFailed { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Kind of a workflow error, as recorded in history and terminal events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingInput,
    GenerationFailed,
    ValidationFailed,
    UnknownApprovalRequest,
    DuplicateResponse,
    InvalidResume,
    Cancelled,
    InvalidTransition,
    Prompt,
    Snapshot,
    Store,
    Aborted,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::MissingInput => "MissingInputError",
            Self::GenerationFailed => "GenerationFailedError",
            Self::ValidationFailed => "ValidationFailedError",
            Self::UnknownApprovalRequest => "UnknownApprovalRequestError",
            Self::DuplicateResponse => "DuplicateResponseError",
            Self::InvalidResume => "InvalidResumeError",
            Self::Cancelled => "Cancelled",
            Self::InvalidTransition => "InvalidTransition",
            Self::Prompt => "PromptError",
            Self::Snapshot => "SnapshotError",
            Self::Store => "StoreError",
            Self::Aborted => "Aborted",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_kind_projection() {
        let err = WorkflowError::InvalidResume { phase: Phase::Rejected };
        assert_eq!(err.kind(), ErrorKind::InvalidResume);

        let err = WorkflowError::GenerationFailed {
            phase: Phase::PlanReady,
            attempts: 3,
            last_error: GatewayError::Timeout(Duration::from_secs(5)),
        };
        assert_eq!(err.kind(), ErrorKind::GenerationFailed);
        assert!(err.to_string().contains("3 attempt(s)"));
        assert!(err.report().is_none());
    }

    #[test]
    fn test_kind_display_names() {
        assert_eq!(ErrorKind::MissingInput.to_string(), "MissingInputError");
        assert_eq!(ErrorKind::DuplicateResponse.to_string(), "DuplicateResponseError");
    }

    #[test]
    fn test_kind_serde_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnknownApprovalRequest).unwrap();
        assert_eq!(json, "\"unknown_approval_request\"");
    }
}
