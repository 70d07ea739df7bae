//! Workflow engine
//!
//! Owns the phase state machine: starting runs, resuming suspended ones,
//! snapshotting and restoring state across processes.

mod core;
mod run;
mod snapshot;

pub use core::WorkflowEngine;
pub use run::{CancelHandle, WorkflowRun};
pub use snapshot::{SNAPSHOT_VERSION, SnapshotReports, WorkflowSnapshot};
