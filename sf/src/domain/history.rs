//! Append-only workflow history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Phase;
use crate::error::ErrorKind;
use crate::validation::Violation;

/// One entry of the audit trail: what happened, at which phase, when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub phase: Phase,
    pub at: DateTime<Utc>,
    pub outcome: Outcome,
}

impl HistoryEntry {
    pub fn new(phase: Phase, outcome: Outcome) -> Self {
        Self {
            phase,
            at: Utc::now(),
            outcome,
        }
    }
}

/// Outcome recorded by a history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The phase's artifact was produced and attached
    Completed { summary: String, duration_ms: u64 },
    /// A gateway call failed; the generator may try again
    AttemptFailed { attempt: u32, error: String },
    /// Validation failed and a single corrective re-prompt was issued
    CorrectiveRetry { violations: Vec<Violation> },
    /// The human decision at the approval gate
    Decision {
        request_id: Uuid,
        approved: bool,
        rationale: Option<String>,
    },
    /// The run failed; terminal
    Failed {
        kind: ErrorKind,
        message: String,
        violations: Vec<Violation>,
    },
}

impl Outcome {
    pub fn is_completion(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }

    pub fn is_failed_attempt(&self) -> bool {
        matches!(self, Outcome::AttemptFailed { .. })
    }

    /// Short label for listings
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed { .. } => "completed",
            Outcome::AttemptFailed { .. } => "attempt-failed",
            Outcome::CorrectiveRetry { .. } => "corrective-retry",
            Outcome::Decision { approved: true, .. } => "approved",
            Outcome::Decision { approved: false, .. } => "rejected",
            Outcome::Failed { .. } => "failed",
        }
    }
}
