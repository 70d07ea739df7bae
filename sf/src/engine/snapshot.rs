//! Serializable projection of a WorkflowState
//!
//! Artifacts are stored as location handles, not content, next to the
//! validation report they had when captured. Restoring re-reads each one,
//! checks its digest, and re-parses it. Reports are taken from the snapshot,
//! never recomputed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    ApprovalDecision, ApprovalRequest, ArtifactLocation, ContextData, ContextRef, GeneratedArtifact, HistoryEntry,
    Phase, WorkflowState,
};
use crate::error::WorkflowError;
use crate::generator::{GeneratorTable, Upstream};
use crate::store::{ArtifactStore, StoreError};
use crate::validation::{CoveragePolicy, ValidationReport};

pub const SNAPSHOT_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub version: u32,
    pub run_id: Uuid,
    pub phase: Phase,
    pub context_ref: ContextRef,
    #[serde(default)]
    pub plan_ref: Option<ArtifactLocation>,
    #[serde(default)]
    pub tasks_ref: Option<ArtifactLocation>,
    #[serde(default)]
    pub reports: SnapshotReports,
    #[serde(default)]
    pub approval_request: Option<ApprovalRequest>,
    #[serde(default)]
    pub approval: Option<ApprovalDecision>,
    #[serde(default)]
    pub implementation_ref: Option<ArtifactLocation>,
    /// Files extracted from the implementation
    #[serde(default)]
    pub implementation_files: Vec<ArtifactLocation>,
    pub history: Vec<HistoryEntry>,
}

/// Validation reports of the captured artifacts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotReports {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ValidationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<ValidationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<ValidationReport>,
}

impl WorkflowSnapshot {
    pub fn capture(state: &WorkflowState) -> Self {
        debug!(run_id = %state.run_id(), phase = %state.phase(), "WorkflowSnapshot::capture: called");
        Self {
            version: SNAPSHOT_VERSION,
            run_id: state.run_id(),
            phase: state.phase(),
            context_ref: state.context().to_ref(),
            plan_ref: state.plan().map(|a| a.location().clone()),
            tasks_ref: state.tasks().map(|a| a.location().clone()),
            reports: SnapshotReports {
                plan: state.plan().map(|a| a.report().clone()),
                tasks: state.tasks().map(|a| a.report().clone()),
                implementation: state.implementation().map(|a| a.report().clone()),
            },
            approval_request: state.approval_request().cloned(),
            approval: state.approval().cloned(),
            implementation_ref: state.implementation().map(|a| a.location().clone()),
            implementation_files: state
                .implementation()
                .map(|a| a.extracted().to_vec())
                .unwrap_or_default(),
            history: state.history().to_vec(),
        }
    }

    /// Time of the most recent history entry
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.history
            .last()
            .map(|e| e.at)
            .unwrap_or(self.context_ref.loaded_at)
    }

    /// Rebuild the state this snapshot was captured from
    pub async fn restore(
        &self,
        store: &dyn ArtifactStore,
        generators: &GeneratorTable,
    ) -> Result<WorkflowState, WorkflowError> {
        debug!(run_id = %self.run_id, phase = %self.phase, "WorkflowSnapshot::restore: called");
        if self.version != SNAPSHOT_VERSION {
            return Err(WorkflowError::Snapshot(format!(
                "unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            )));
        }

        let ctx = &self.context_ref;
        let context = Arc::new(ContextData::new(
            read(store, &ctx.principles).await?,
            read(store, &ctx.specification).await?,
            ctx.tech_stack.clone(),
            ctx.loaded_at,
            ctx.principles.clone(),
            ctx.specification.clone(),
        ));

        let reports = &self.reports;
        let upstream = Upstream::new(&context);
        let plan = match &self.plan_ref {
            Some(loc) => {
                let saved = Saved::new(Phase::PlanReady, loc, reports.plan.as_ref())?;
                match reassemble(store, generators, &upstream, saved, Vec::new()).await? {
                    GeneratedArtifact::Plan(a) => Some(a),
                    _ => return Err(mismatch(Phase::PlanReady)),
                }
            }
            None => None,
        };

        let upstream = upstream.with_plan(plan.as_ref());
        let tasks = match &self.tasks_ref {
            Some(loc) => {
                let saved = Saved::new(Phase::TasksReady, loc, reports.tasks.as_ref())?;
                match reassemble(store, generators, &upstream, saved, Vec::new()).await? {
                    GeneratedArtifact::Tasks(a) => Some(a),
                    _ => return Err(mismatch(Phase::TasksReady)),
                }
            }
            None => None,
        };

        let upstream = upstream.with_tasks(tasks.as_ref());
        let implementation = match &self.implementation_ref {
            Some(loc) => {
                let saved = Saved::new(Phase::Implemented, loc, reports.implementation.as_ref())?;
                let files = self.implementation_files.clone();
                match reassemble(store, generators, &upstream, saved, files).await? {
                    GeneratedArtifact::Implementation(a) => Some(a),
                    _ => return Err(mismatch(Phase::Implemented)),
                }
            }
            None => None,
        };

        WorkflowState::from_parts(
            self.run_id,
            self.phase,
            context,
            plan,
            tasks,
            self.approval_request.clone(),
            self.approval.clone(),
            implementation,
            self.history.clone(),
        )
    }
}

async fn read(store: &dyn ArtifactStore, location: &ArtifactLocation) -> Result<String, WorkflowError> {
    store.read_verified(location).await.map_err(|e| match e {
        StoreError::Modified { path } => {
            WorkflowError::Snapshot(format!("{} changed since the snapshot was taken", path))
        }
        StoreError::NotFound(path) => WorkflowError::Snapshot(format!("{} is missing", path)),
        other => WorkflowError::Store(other),
    })
}

/// One captured artifact: where it lives and the report it had
struct Saved<'a> {
    target: Phase,
    location: &'a ArtifactLocation,
    report: &'a ValidationReport,
}

impl<'a> Saved<'a> {
    fn new(
        target: Phase,
        location: &'a ArtifactLocation,
        report: Option<&'a ValidationReport>,
    ) -> Result<Self, WorkflowError> {
        let report = report
            .ok_or_else(|| WorkflowError::Snapshot(format!("no validation report stored for {}", location.path)))?;
        Ok(Self { target, location, report })
    }
}

/// Re-read an artifact and run it back through its generator's parser
async fn reassemble(
    store: &dyn ArtifactStore,
    generators: &GeneratorTable,
    upstream: &Upstream<'_>,
    saved: Saved<'_>,
    extracted: Vec<ArtifactLocation>,
) -> Result<GeneratedArtifact, WorkflowError> {
    let generator = generators
        .get(saved.target)
        .ok_or_else(|| WorkflowError::Snapshot(format!("no generator registered for {}", saved.target)))?;
    let raw = read(store, saved.location).await?;
    // the fresh report is discarded
    let assessment = generator.assess(&raw, &upstream.validation_context(CoveragePolicy::default()));
    Ok(assessment
        .decomposition
        .into_artifact(raw, saved.report.clone(), saved.location.clone(), extracted))
}

fn mismatch(target: Phase) -> WorkflowError {
    WorkflowError::Snapshot(format!("generator for {} produced the wrong artifact kind", target))
}
