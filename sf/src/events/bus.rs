//! Event Bus - pub/sub for workflow progress
//!
//! Each run streams its own events to its caller through an unbounded channel.
//! When an `EventBus` is attached to the engine, every event is also broadcast
//! to all bus subscribers (loggers, dashboards) across runs.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use super::types::{ArtifactSummary, WorkflowEvent};
use crate::domain::{ApprovalRequest, Phase};
use crate::error::WorkflowError;
use crate::validation::Violation;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_000;

/// Broadcast of events from every run
pub struct EventBus {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Fire-and-forget: dropped when nobody is subscribed
    pub fn emit(&self, event: WorkflowEvent) {
        debug!(event_type = event.event_type(), run_id = %event.run_id(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Receives events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle bound to one run; feeds the run's stream and the shared bus
#[derive(Clone)]
pub struct EventEmitter {
    run_tx: mpsc::UnboundedSender<WorkflowEvent>,
    bus: Option<Arc<EventBus>>,
    run_id: Uuid,
}

impl EventEmitter {
    /// Create an emitter and the receiving end of its run stream
    pub fn channel(run_id: Uuid, bus: Option<Arc<EventBus>>) -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        debug!(%run_id, "EventEmitter::channel: called");
        let (run_tx, run_rx) = mpsc::unbounded_channel();
        (Self { run_tx, bus, run_id }, run_rx)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Emit a raw event; a dropped run stream is not an error
    pub fn emit(&self, event: WorkflowEvent) {
        debug!(event_type = event.event_type(), "EventEmitter::emit");
        if let Some(bus) = &self.bus {
            bus.emit(event.clone());
        }
        let _ = self.run_tx.send(event);
    }

    // === Convenience methods ===

    pub fn phase_started(&self, phase: Phase) {
        self.emit(WorkflowEvent::PhaseStarted {
            run_id: self.run_id,
            phase,
        });
    }

    pub fn attempt_failed(&self, phase: Phase, attempt: u32, error: &str, retry_in_ms: Option<u64>) {
        self.emit(WorkflowEvent::AttemptFailed {
            run_id: self.run_id,
            phase,
            attempt,
            error: error.to_string(),
            retry_in_ms,
        });
    }

    pub fn corrective_retry(&self, phase: Phase, violations: &[Violation]) {
        self.emit(WorkflowEvent::CorrectiveRetry {
            run_id: self.run_id,
            phase,
            violations: violations.to_vec(),
        });
    }

    pub fn phase_completed(&self, summary: ArtifactSummary) {
        self.emit(WorkflowEvent::PhaseCompleted {
            run_id: self.run_id,
            phase: summary.phase,
            summary,
        });
    }

    pub fn request_info(&self, request: &ApprovalRequest) {
        self.emit(WorkflowEvent::RequestInfo {
            run_id: self.run_id,
            request: request.clone(),
        });
    }

    pub fn decision_recorded(&self, request_id: Uuid, approved: bool, rationale: Option<&str>) {
        self.emit(WorkflowEvent::DecisionRecorded {
            run_id: self.run_id,
            request_id,
            approved,
            rationale: rationale.map(str::to_string),
        });
    }

    pub fn completed(&self, files: Vec<String>) {
        self.emit(WorkflowEvent::Completed {
            run_id: self.run_id,
            files,
        });
    }

    pub fn rejected(&self, rationale: Option<&str>) {
        self.emit(WorkflowEvent::Rejected {
            run_id: self.run_id,
            rationale: rationale.map(str::to_string),
        });
    }

    /// Terminal failure event naming the phase, the error kind and any violations
    pub fn failed(&self, phase: Phase, error: &WorkflowError) {
        self.emit(WorkflowEvent::Failed {
            run_id: self.run_id,
            phase,
            kind: error.kind(),
            message: error.to_string(),
            violations: error.report().map(|r| r.violations().to_vec()).unwrap_or_default(),
        });
    }
}
