//! Event types for workflow progress streaming

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ApprovalRequest, GeneratedArtifact, Phase};
use crate::error::ErrorKind;
use crate::validation::Violation;

/// Redacted description of a completed phase; never carries full artifact text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub phase: Phase,
    /// Where the artifact was written, if the phase produced one
    pub path: Option<String>,
    /// Components, tasks, or code blocks
    pub items: usize,
    /// Extracted source files
    pub files: usize,
    pub warnings: usize,
    pub duration_ms: u64,
    /// First line of the artifact, truncated
    pub headline: String,
}

const HEADLINE_CHARS: usize = 80;

impl ArtifactSummary {
    pub fn of(phase: Phase, artifact: &GeneratedArtifact, duration_ms: u64) -> Self {
        Self {
            phase,
            path: Some(artifact.location().path.clone()),
            items: artifact.item_count(),
            files: artifact.extracted().len(),
            warnings: artifact.report().warnings().count(),
            duration_ms,
            headline: headline(artifact.raw()),
        }
    }

    /// Summary for context loading, which writes nothing
    pub fn context(principles: usize, duration_ms: u64, headline_text: &str) -> Self {
        Self {
            phase: Phase::ContextLoaded,
            path: None,
            items: principles,
            files: 0,
            warnings: 0,
            duration_ms,
            headline: headline(headline_text),
        }
    }
}

impl std::fmt::Display for ArtifactSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let noun = match self.phase {
            Phase::ContextLoaded => "principles",
            Phase::PlanReady => "components",
            Phase::TasksReady => "tasks",
            Phase::Implemented => "code blocks",
            _ => "items",
        };
        write!(f, "{} {}", self.items, noun)?;
        if self.files > 0 {
            write!(f, ", {} files", self.files)?;
        }
        if self.warnings > 0 {
            write!(f, ", {} warnings", self.warnings)?;
        }
        if let Some(path) = &self.path {
            write!(f, " -> {}", path)?;
        }
        write!(f, " ({:.1}s)", self.duration_ms as f64 / 1000.0)
    }
}

fn headline(text: &str) -> String {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
    let mut out: String = line.chars().take(HEADLINE_CHARS).collect();
    if line.chars().count() > HEADLINE_CHARS {
        out.push_str("...");
    }
    out
}

/// The vocabulary of workflow progress
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkflowEvent {
    /// Generation of `phase`'s artifact has begun
    PhaseStarted { run_id: Uuid, phase: Phase },
    /// One gateway call failed
    AttemptFailed {
        run_id: Uuid,
        phase: Phase,
        attempt: u32,
        error: String,
        /// Delay before the next attempt, if there is one
        retry_in_ms: Option<u64>,
    },
    /// Validation failed; re-prompting once with the violations
    CorrectiveRetry {
        run_id: Uuid,
        phase: Phase,
        violations: Vec<Violation>,
    },
    /// A phase marker was reached
    PhaseCompleted {
        run_id: Uuid,
        phase: Phase,
        summary: ArtifactSummary,
    },
    /// The run is suspended waiting on a human decision
    RequestInfo { run_id: Uuid, request: ApprovalRequest },
    /// A decision was accepted at the approval gate
    DecisionRecorded {
        run_id: Uuid,
        request_id: Uuid,
        approved: bool,
        rationale: Option<String>,
    },
    /// IMPLEMENTED reached
    Completed { run_id: Uuid, files: Vec<String> },
    /// REJECTED reached
    Rejected { run_id: Uuid, rationale: Option<String> },
    /// FAILED reached
    Failed {
        run_id: Uuid,
        phase: Phase,
        kind: ErrorKind,
        message: String,
        violations: Vec<Violation>,
    },
}

impl WorkflowEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PhaseStarted { .. } => "PhaseStarted",
            Self::AttemptFailed { .. } => "AttemptFailed",
            Self::CorrectiveRetry { .. } => "CorrectiveRetry",
            Self::PhaseCompleted { .. } => "PhaseCompleted",
            Self::RequestInfo { .. } => "RequestInfo",
            Self::DecisionRecorded { .. } => "DecisionRecorded",
            Self::Completed { .. } => "Completed",
            Self::Rejected { .. } => "Rejected",
            Self::Failed { .. } => "Failed",
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            Self::PhaseStarted { run_id, .. }
            | Self::AttemptFailed { run_id, .. }
            | Self::CorrectiveRetry { run_id, .. }
            | Self::PhaseCompleted { run_id, .. }
            | Self::RequestInfo { run_id, .. }
            | Self::DecisionRecorded { run_id, .. }
            | Self::Completed { run_id, .. }
            | Self::Rejected { run_id, .. }
            | Self::Failed { run_id, .. } => *run_id,
        }
    }

    /// Whether the stream ends after this event
    pub fn ends_stream(&self) -> bool {
        matches!(
            self,
            Self::RequestInfo { .. } | Self::Completed { .. } | Self::Rejected { .. } | Self::Failed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headline_truncates() {
        assert_eq!(headline("\n\n  # Plan  \nbody"), "# Plan");
        let long = "x".repeat(200);
        let h = headline(&long);
        assert_eq!(h.chars().count(), HEADLINE_CHARS + 3);
        assert!(h.ends_with("..."));
    }

    #[test]
    fn test_summary_display() {
        let summary = ArtifactSummary {
            phase: Phase::TasksReady,
            path: Some("outputs/tasks.md".to_string()),
            items: 12,
            files: 0,
            warnings: 2,
            duration_ms: 1500,
            headline: "# Tasks".to_string(),
        };
        assert_eq!(summary.to_string(), "12 tasks, 2 warnings -> outputs/tasks.md (1.5s)");
    }

    #[test]
    fn test_event_serde_tagged() {
        let event = WorkflowEvent::Rejected {
            run_id: Uuid::nil(),
            rationale: Some("scope".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Rejected");
        assert!(event.ends_stream());
        assert_eq!(event.event_type(), "Rejected");

        let started = WorkflowEvent::PhaseStarted {
            run_id: Uuid::nil(),
            phase: Phase::PlanReady,
        };
        assert!(!started.ends_stream());
    }
}
