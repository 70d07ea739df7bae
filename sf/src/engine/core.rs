//! WorkflowEngine - the phase sequencer
//!
//! `start` loads the seeds and drives generation until the run suspends at the
//! approval gate or ends. `resume` takes a suspended state plus a human
//! decision and drives the rest. Each call hands back a [`WorkflowRun`] whose
//! event stream ends with `RequestInfo` or a terminal event. After every
//! transition the state is checkpointed to the state store, if one is set.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::run::WorkflowRun;
use super::snapshot::WorkflowSnapshot;
use crate::approval::{ApprovalGate, ApprovalLedger};
use crate::config::Config;
use crate::context::ContextLoader;
use crate::domain::{ApprovalResponse, Phase, WorkflowState};
use crate::error::WorkflowError;
use crate::events::{ArtifactSummary, EventBus, EventEmitter, WorkflowEvent};
use crate::gateway::AgentGateway;
use crate::generator::{CancelSignal, GenerationPolicy, GeneratorTable, Scaffold, Upstream, next_target};
use crate::parse::extract_principles;
use crate::prompts::PromptLoader;
use crate::store::{ArtifactStore, StateStore};
use crate::validation::{Structured, ValidationContext, validate};

#[derive(Clone)]
pub struct WorkflowEngine {
    config: Arc<Config>,
    gateway: Arc<dyn AgentGateway>,
    store: Arc<dyn ArtifactStore>,
    state_store: Option<Arc<StateStore>>,
    prompts: Arc<PromptLoader>,
    generators: GeneratorTable,
    gate: Arc<ApprovalGate>,
    bus: Option<Arc<EventBus>>,
    policy: GenerationPolicy,
}

impl WorkflowEngine {
    /// Engine with embedded prompts, the default generators and an in-memory ledger
    pub fn new(config: Config, gateway: Arc<dyn AgentGateway>, store: Arc<dyn ArtifactStore>) -> Self {
        debug!(program = %config.gateway.program, "WorkflowEngine::new: called");
        let policy = GenerationPolicy::from_config(&config);
        let gate = ApprovalGate::new(config.approval.preview_chars, Arc::new(ApprovalLedger::in_memory()));
        Self {
            config: Arc::new(config),
            gateway,
            store,
            state_store: None,
            prompts: Arc::new(PromptLoader::embedded_only()),
            generators: GeneratorTable::default(),
            gate: Arc::new(gate),
            bus: None,
            policy,
        }
    }

    pub fn with_state_store(mut self, state_store: StateStore) -> Self {
        self.state_store = Some(Arc::new(state_store));
        self
    }

    pub fn with_prompts(mut self, prompts: PromptLoader) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    pub fn with_generators(mut self, generators: GeneratorTable) -> Self {
        self.generators = generators;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<ApprovalLedger>) -> Self {
        self.gate = Arc::new(ApprovalGate::new(self.config.approval.preview_chars, ledger));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Begin a run for `tech_stack`
    ///
    /// Missing seeds fail with `MissingInput` before any state exists. Every
    /// later failure ends the run FAILED and is reported on its stream.
    pub async fn start(&self, tech_stack: &str) -> Result<WorkflowRun, WorkflowError> {
        let started = Instant::now();
        let layout = &self.config.layout;
        debug!(%tech_stack, "WorkflowEngine::start: called");

        let context = ContextLoader::new(self.store.clone())
            .load(&layout.principles, &layout.specification, tech_stack)
            .await?;

        let run_id = Uuid::now_v7();
        info!(%run_id, %tech_stack, "Starting workflow run");
        let (emitter, events) = EventEmitter::channel(run_id, self.bus.clone());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut state = WorkflowState::new(run_id, Arc::new(context));

        let principles = extract_principles(state.context().principles_text());
        let report = validate(
            state.context().principles_text(),
            Structured::Principles(&principles),
            &ValidationContext::default(),
        );
        if !report.is_valid() {
            let err = WorkflowError::ValidationFailed {
                phase: Phase::ContextLoaded,
                report,
            };
            self.fail(&mut state, &err, &emitter).await;
            return Ok(WorkflowRun::new(run_id, events, tokio::spawn(async move { state }), cancel_tx));
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let summary = ArtifactSummary::context(principles.len(), duration_ms, state.context().specification_text());
        state.mark_context_loaded(summary.to_string(), duration_ms)?;
        if let Err(err) = self.checkpoint(&state).await {
            self.fail(&mut state, &err, &emitter).await;
            return Ok(WorkflowRun::new(run_id, events, tokio::spawn(async move { state }), cancel_tx));
        }
        emitter.phase_completed(summary);

        Ok(self.spawn(state, emitter, events, cancel_tx, cancel_rx))
    }

    /// Continue a suspended run with a human decision
    ///
    /// `state` is never modified. Rejected input (wrong phase, unknown or
    /// already-answered request) is returned as an error and leaves the
    /// persisted snapshot untouched. The decision is saved before the request
    /// is marked answered, so a failed save can be retried with the same
    /// response.
    pub async fn resume(
        &self,
        state: &WorkflowState,
        response: ApprovalResponse,
    ) -> Result<WorkflowRun, WorkflowError> {
        let run_id = state.run_id();
        debug!(%run_id, phase = %state.phase(), request_id = %response.request_id, "WorkflowEngine::resume: called");
        if state.phase() != Phase::AwaitingApproval {
            return Err(WorkflowError::InvalidResume { phase: state.phase() });
        }

        let decision = self.gate.check(state.pending_request(), &response).await?;
        let mut next = state.clone();
        next.record_decision(decision.clone())?;
        self.gate.commit(run_id, &decision, || self.checkpoint(&next)).await?;

        let (emitter, events) = EventEmitter::channel(run_id, self.bus.clone());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        emitter.decision_recorded(response.request_id, response.approved, response.rationale.as_deref());

        Ok(self.spawn(next, emitter, events, cancel_tx, cancel_rx))
    }

    /// Serializable record of `state`
    pub fn snapshot(&self, state: &WorkflowState) -> WorkflowSnapshot {
        WorkflowSnapshot::capture(state)
    }

    /// Rebuild a state from a snapshot, re-reading and re-validating its artifacts
    pub async fn restore(&self, snapshot: &WorkflowSnapshot) -> Result<WorkflowState, WorkflowError> {
        snapshot.restore(self.store.as_ref(), &self.generators).await
    }

    /// Restore the last checkpoint of `run_id`
    pub async fn load(&self, run_id: Uuid) -> Result<WorkflowState, WorkflowError> {
        let snapshot = self.state_store()?.load(run_id).await?;
        self.restore(&snapshot).await
    }

    /// Every checkpointed run
    pub async fn list_runs(&self) -> Result<Vec<WorkflowSnapshot>, WorkflowError> {
        Ok(self.state_store()?.list().await?)
    }

    fn state_store(&self) -> Result<&StateStore, WorkflowError> {
        self.state_store
            .as_deref()
            .ok_or_else(|| WorkflowError::Snapshot("no state directory configured".to_string()))
    }

    fn spawn(
        &self,
        state: WorkflowState,
        emitter: EventEmitter,
        events: mpsc::UnboundedReceiver<WorkflowEvent>,
        cancel_tx: watch::Sender<bool>,
        cancel_rx: watch::Receiver<bool>,
    ) -> WorkflowRun {
        let run_id = state.run_id();
        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.drive(state, emitter, CancelSignal::new(cancel_rx)).await });
        WorkflowRun::new(run_id, events, handle, cancel_tx)
    }

    async fn drive(&self, mut state: WorkflowState, emitter: EventEmitter, mut cancel: CancelSignal) -> WorkflowState {
        debug!(run_id = %state.run_id(), phase = %state.phase(), "WorkflowEngine::drive: called");
        loop {
            match self.step(&mut state, &emitter, &mut cancel).await {
                Ok(true) => continue,
                Ok(false) => return state,
                Err(e) => {
                    self.fail(&mut state, &e, &emitter).await;
                    return state;
                }
            }
        }
    }

    /// Advance one phase; `false` when the run stops here
    async fn step(
        &self,
        state: &mut WorkflowState,
        emitter: &EventEmitter,
        cancel: &mut CancelSignal,
    ) -> Result<bool, WorkflowError> {
        match state.phase() {
            Phase::TasksReady => {
                self.suspend(state, emitter).await?;
                Ok(false)
            }
            Phase::Implemented => {
                let files = state
                    .implementation()
                    .map(|a| a.extracted().iter().map(|l| l.path.clone()).collect())
                    .unwrap_or_default();
                info!(run_id = %state.run_id(), "Workflow implemented");
                emitter.completed(files);
                Ok(false)
            }
            Phase::Rejected => {
                info!(run_id = %state.run_id(), "Workflow rejected");
                emitter.rejected(state.approval().and_then(|d| d.rationale()));
                Ok(false)
            }
            Phase::Init | Phase::AwaitingApproval | Phase::Failed => Ok(false),
            phase @ (Phase::ContextLoaded | Phase::PlanReady | Phase::Approved) => {
                if cancel.is_cancelled() {
                    return Err(WorkflowError::Cancelled { phase });
                }
                self.generate(state, emitter, cancel).await?;
                Ok(true)
            }
        }
    }

    async fn generate(
        &self,
        state: &mut WorkflowState,
        emitter: &EventEmitter,
        cancel: &mut CancelSignal,
    ) -> Result<(), WorkflowError> {
        let phase = state.phase();
        let generator = self
            .generators
            .next_for(phase)
            .cloned()
            .ok_or_else(|| WorkflowError::InvalidTransition {
                from: phase,
                to: next_target(phase).unwrap_or(Phase::Failed),
            })?;

        let outcome = {
            let scaffold = Scaffold {
                gateway: self.gateway.as_ref(),
                store: self.store.as_ref(),
                prompts: self.prompts.as_ref(),
                layout: self.config.layout.for_run(state.run_id()),
                policy: &self.policy,
                emitter,
            };
            scaffold
                .run(generator.as_ref(), &Upstream::from_state(state), cancel)
                .await
        };
        state.record(outcome.journal);
        let generation = outcome.result?;

        let target = generator.target();
        let summary = ArtifactSummary::of(target, &generation.artifact, generation.duration_ms);
        state.attach(generation.artifact, summary.to_string(), generation.duration_ms)?;
        self.checkpoint(state).await?;
        emitter.phase_completed(summary);
        Ok(())
    }

    /// TASKS_READY -> AWAITING_APPROVAL: issue the request and stop
    async fn suspend(&self, state: &mut WorkflowState, emitter: &EventEmitter) -> Result<(), WorkflowError> {
        let request = {
            let tasks = state.tasks().ok_or_else(|| WorkflowError::MissingInput {
                name: "tasks".to_string(),
            })?;
            self.gate.request(state.run_id(), tasks)
        };
        state.suspend(request.clone())?;
        self.checkpoint(state).await?;
        self.gate.issue(&request).await?;
        info!(run_id = %state.run_id(), request_id = %request.id, "Workflow suspended for approval");
        emitter.request_info(&request);
        Ok(())
    }

    /// Record `err`, move to FAILED, checkpoint, and emit the terminal event
    async fn fail(&self, state: &mut WorkflowState, err: &WorkflowError, emitter: &EventEmitter) {
        let phase = err.phase().unwrap_or(state.phase());
        error!(run_id = %state.run_id(), %phase, kind = %err.kind(), error = %err, "Workflow run failed");
        if let Err(e) = state.fail(err) {
            warn!(run_id = %state.run_id(), error = %e, "Run was already terminal");
        }
        if let Err(e) = self.checkpoint(state).await {
            warn!(run_id = %state.run_id(), error = %e, "Failed to save snapshot of failed run");
        }
        emitter.failed(phase, err);
    }

    async fn checkpoint(&self, state: &WorkflowState) -> Result<(), WorkflowError> {
        if let Some(store) = &self.state_store {
            store.save(&WorkflowSnapshot::capture(state)).await?;
        }
        Ok(())
    }
}
