//! Handle to one executing stretch of a workflow run
//!
//! A `WorkflowRun` is a stream of [`WorkflowEvent`]s that ends after the
//! terminal or `RequestInfo` event, plus the task that owns the state.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::domain::WorkflowState;
use crate::error::WorkflowError;
use crate::events::WorkflowEvent;

/// Trips the cancel switch of a run; cloneable
#[derive(Debug, Clone)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Cancel any in-flight gateway call; the run ends FAILED with a `Cancelled` cause
    pub fn cancel(&self) {
        debug!("CancelHandle::cancel: called");
        let _ = self.0.send(true);
    }
}

#[derive(Debug)]
pub struct WorkflowRun {
    run_id: Uuid,
    events: mpsc::UnboundedReceiver<WorkflowEvent>,
    handle: JoinHandle<WorkflowState>,
    cancel: CancelHandle,
}

impl WorkflowRun {
    pub(crate) fn new(
        run_id: Uuid,
        events: mpsc::UnboundedReceiver<WorkflowEvent>,
        handle: JoinHandle<WorkflowState>,
        cancel: watch::Sender<bool>,
    ) -> Self {
        Self {
            run_id,
            events,
            handle,
            cancel: CancelHandle(cancel),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Next event, or `None` once the stream has ended
    pub async fn next_event(&mut self) -> Option<WorkflowEvent> {
        self.events.recv().await
    }

    /// Wait for the run task and take its final state
    pub async fn finish(self) -> Result<WorkflowState, WorkflowError> {
        debug!(run_id = %self.run_id, "WorkflowRun::finish: called");
        self.handle.await.map_err(|e| WorkflowError::Aborted(e.to_string()))
    }

    /// Drain every remaining event, then take the final state
    pub async fn collect(mut self) -> Result<(Vec<WorkflowEvent>, WorkflowState), WorkflowError> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let state = self.finish().await?;
        Ok((events, state))
    }
}

impl Stream for WorkflowRun {
    type Item = WorkflowEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}
