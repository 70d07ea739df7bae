//! specflow - spec-driven workflow engine
//!
//! specflow drives an external agent through a fixed pipeline: the
//! principles and specification documents become an implementation plan, the
//! plan becomes an ordered task list, a human approves or rejects the tasks,
//! and approved tasks become an implementation with extracted source files.
//!
//! # Core Concepts
//!
//! - **Explicit state machine**: every run is a [`WorkflowState`] that only moves
//!   along the edges of the phase graph
//! - **Validated artifacts**: each generated document is parsed and checked
//!   before it is attached; one corrective re-prompt at most
//! - **Two-call approval**: `start` ends at the approval request, `resume`
//!   picks up from a snapshot, possibly in another process
//! - **Atomic checkpoints**: snapshots hold artifact locations and digests,
//!   never inline content
//!
//! # Modules
//!
//! - [`engine`] - start/resume/snapshot/restore and the run event stream
//! - [`generator`] - phase generators and the shared retry scaffolding
//! - [`approval`] - approval gate and ledger
//! - [`validation`] - the four artifact validators
//! - [`parse`] - markdown decomposition of artifacts
//! - [`gateway`] - the external agent
//! - [`store`] - artifact and snapshot persistence
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod approval;
pub mod cli;
pub mod config;
pub mod context;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod generator;
pub mod parse;
pub mod prompts;
pub mod store;
pub mod validation;

// Re-export commonly used types
pub use approval::{ApprovalGate, ApprovalLedger};
pub use config::Config;
pub use context::ContextLoader;
pub use domain::{
    ApprovalDecision, ApprovalRequest, ApprovalResponse, ArtifactLocation, ContextData, GeneratedArtifact,
    HistoryEntry, Outcome, Phase, WorkflowState,
};
pub use engine::{CancelHandle, WorkflowEngine, WorkflowRun, WorkflowSnapshot};
pub use error::{ErrorKind, WorkflowError};
pub use events::{ArtifactSummary, EventBus, WorkflowEvent};
pub use gateway::{AgentGateway, CommandGateway, GatewayError, create_gateway};
pub use generator::{GeneratorTable, PhaseGenerator};
pub use store::{ArtifactStore, FsArtifactStore, StateStore, StoreError};
pub use validation::{CoveragePolicy, ValidationReport, Violation};
