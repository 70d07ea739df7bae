//! Workflow progress events
//!
//! Every phase start, failed attempt, completion, approval request and
//! terminal outcome is emitted as a [`WorkflowEvent`]. A run's caller reads
//! them from the run stream; other consumers subscribe to an [`EventBus`].

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter};
pub use types::{ArtifactSummary, WorkflowEvent};
