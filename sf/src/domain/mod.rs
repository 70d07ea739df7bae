//! Domain types for specflow
//!
//! Core domain types: Phase, WorkflowState, ContextData, Artifact, approval
//! request/decision, and the append-only history.

mod approval;
mod artifact;
mod context;
mod history;
mod phase;
mod state;

pub use approval::{ApprovalDecision, ApprovalRequest, ApprovalResponse};
pub use artifact::{
    Artifact, ArtifactLocation, GeneratedArtifact, ImplementationArtifact, PlanArtifact, TaskArtifact, content_digest,
};
pub use context::{ContextData, ContextRef};
pub use history::{HistoryEntry, Outcome};
pub use phase::Phase;
pub use state::WorkflowState;
