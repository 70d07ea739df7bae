//! WorkflowState - the authoritative record of pipeline progress
//!
//! All mutation goes through crate-private transition methods that check the
//! edge against the phase graph first, so a state can never sit on a phase it
//! did not reach by a legal path.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::{
    ApprovalDecision, ApprovalRequest, ContextData, GeneratedArtifact, HistoryEntry, ImplementationArtifact, Outcome,
    Phase, PlanArtifact, TaskArtifact,
};
use crate::error::WorkflowError;

/// Progress of one workflow run
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowState {
    run_id: Uuid,
    phase: Phase,
    context: Arc<ContextData>,
    plan: Option<PlanArtifact>,
    tasks: Option<TaskArtifact>,
    approval_request: Option<ApprovalRequest>,
    approval: Option<ApprovalDecision>,
    implementation: Option<ImplementationArtifact>,
    history: Vec<HistoryEntry>,
}

impl WorkflowState {
    /// Fresh state at INIT
    pub(crate) fn new(run_id: Uuid, context: Arc<ContextData>) -> Self {
        debug!(%run_id, "WorkflowState::new: called");
        Self {
            run_id,
            phase: Phase::Init,
            context,
            plan: None,
            tasks: None,
            approval_request: None,
            approval: None,
            implementation: None,
            history: Vec::new(),
        }
    }

    /// Reassemble a state from restored parts, checking the artifact invariant
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        run_id: Uuid,
        phase: Phase,
        context: Arc<ContextData>,
        plan: Option<PlanArtifact>,
        tasks: Option<TaskArtifact>,
        approval_request: Option<ApprovalRequest>,
        approval: Option<ApprovalDecision>,
        implementation: Option<ImplementationArtifact>,
        history: Vec<HistoryEntry>,
    ) -> Result<Self, WorkflowError> {
        let state = Self {
            run_id,
            phase,
            context,
            plan,
            tasks,
            approval_request,
            approval,
            implementation,
            history,
        };
        state.check_invariants()?;
        Ok(state)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn context(&self) -> &Arc<ContextData> {
        &self.context
    }

    pub fn plan(&self) -> Option<&PlanArtifact> {
        self.plan.as_ref()
    }

    pub fn tasks(&self) -> Option<&TaskArtifact> {
        self.tasks.as_ref()
    }

    /// The approval request issued when the run suspended, if it got that far
    pub fn approval_request(&self) -> Option<&ApprovalRequest> {
        self.approval_request.as_ref()
    }

    /// The request still waiting on a decision
    pub fn pending_request(&self) -> Option<&ApprovalRequest> {
        if self.phase == Phase::AwaitingApproval {
            self.approval_request.as_ref()
        } else {
            None
        }
    }

    pub fn approval(&self) -> Option<&ApprovalDecision> {
        self.approval.as_ref()
    }

    pub fn implementation(&self) -> Option<&ImplementationArtifact> {
        self.implementation.as_ref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    fn transition(&mut self, to: Phase) -> Result<(), WorkflowError> {
        if !self.phase.can_transition_to(to) {
            return Err(WorkflowError::InvalidTransition { from: self.phase, to });
        }
        info!(run_id = %self.run_id, from = %self.phase, %to, "Phase transition");
        self.phase = to;
        Ok(())
    }

    /// INIT -> CONTEXT_LOADED
    pub(crate) fn mark_context_loaded(&mut self, summary: String, duration_ms: u64) -> Result<(), WorkflowError> {
        self.transition(Phase::ContextLoaded)?;
        self.history.push(HistoryEntry::new(
            Phase::ContextLoaded,
            Outcome::Completed { summary, duration_ms },
        ));
        Ok(())
    }

    /// Attach a generated artifact, advancing to its phase marker
    pub(crate) fn attach(
        &mut self,
        artifact: GeneratedArtifact,
        summary: String,
        duration_ms: u64,
    ) -> Result<Phase, WorkflowError> {
        let target = match &artifact {
            GeneratedArtifact::Plan(_) => Phase::PlanReady,
            GeneratedArtifact::Tasks(_) => Phase::TasksReady,
            GeneratedArtifact::Implementation(_) => Phase::Implemented,
        };
        debug!(run_id = %self.run_id, %target, "WorkflowState::attach: called");
        self.transition(target)?;
        match artifact {
            GeneratedArtifact::Plan(a) => self.plan = Some(a),
            GeneratedArtifact::Tasks(a) => self.tasks = Some(a),
            GeneratedArtifact::Implementation(a) => self.implementation = Some(a),
        }
        self.history
            .push(HistoryEntry::new(target, Outcome::Completed { summary, duration_ms }));
        Ok(target)
    }

    /// TASKS_READY -> AWAITING_APPROVAL
    pub(crate) fn suspend(&mut self, request: ApprovalRequest) -> Result<(), WorkflowError> {
        self.transition(Phase::AwaitingApproval)?;
        self.approval_request = Some(request);
        Ok(())
    }

    /// AWAITING_APPROVAL -> APPROVED | REJECTED
    pub(crate) fn record_decision(&mut self, decision: ApprovalDecision) -> Result<Phase, WorkflowError> {
        let target = if decision.approved() {
            Phase::Approved
        } else {
            Phase::Rejected
        };
        self.transition(target)?;
        self.history.push(HistoryEntry::new(
            target,
            Outcome::Decision {
                request_id: decision.request_id(),
                approved: decision.approved(),
                rationale: decision.rationale().map(str::to_string),
            },
        ));
        self.approval = Some(decision);
        Ok(target)
    }

    /// Append non-transition entries (failed attempts, corrective retries)
    pub(crate) fn record(&mut self, entries: impl IntoIterator<Item = HistoryEntry>) {
        self.history.extend(entries);
    }

    /// Any non-terminal phase -> FAILED, with the cause recorded first
    pub(crate) fn fail(&mut self, error: &WorkflowError) -> Result<(), WorkflowError> {
        let from = self.phase;
        self.transition(Phase::Failed)?;
        let violations = error
            .report()
            .map(|r| r.violations().to_vec())
            .unwrap_or_default();
        self.history.push(HistoryEntry::new(
            Phase::Failed,
            Outcome::Failed {
                kind: error.kind(),
                message: format!("{} (during {})", error, from),
                violations,
            },
        ));
        Ok(())
    }

    /// Artifact fields are populated iff their phase marker has been passed
    fn check_invariants(&self) -> Result<(), WorkflowError> {
        let bad = |what: &str| Err(WorkflowError::Snapshot(format!("{} inconsistent with phase {}", what, self.phase)));

        if self.phase == Phase::Failed {
            // the run may have stopped anywhere, but the prefix must be contiguous
            if self.implementation.is_some() && self.approval.is_none() {
                return bad("implementation");
            }
            if self.approval.is_some() && self.approval_request.is_none() {
                return bad("approval");
            }
            if self.approval_request.is_some() && self.tasks.is_none() {
                return bad("approval request");
            }
            if self.tasks.is_some() && self.plan.is_none() {
                return bad("tasks");
            }
            return Ok(());
        }

        if self.plan.is_some() != self.phase.has_passed(Phase::PlanReady) {
            return bad("plan");
        }
        if self.tasks.is_some() != self.phase.has_passed(Phase::TasksReady) {
            return bad("tasks");
        }
        if self.approval_request.is_some() != self.phase.has_passed(Phase::AwaitingApproval) {
            return bad("approval request");
        }
        let decided = self.phase.has_passed(Phase::Approved) || self.phase == Phase::Rejected;
        if self.approval.is_some() != decided {
            return bad("approval");
        }
        if self.implementation.is_some() != self.phase.has_passed(Phase::Implemented) {
            return bad("implementation");
        }
        Ok(())
    }
}
