//! Phase generators
//!
//! One generator per artifact phase, all driven by the shared scaffold in
//! [`scaffold`]: render the prompt, call the gateway within the attempt
//! budget, parse and validate, re-prompt once with the violations, persist.
//! The engine looks generators up by target phase in a [`GeneratorTable`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use crate::config::{BackoffKind, Config, RunLayout};
use crate::domain::{
    Artifact, ArtifactLocation, ContextData, GeneratedArtifact, Phase, PlanArtifact, TaskArtifact, WorkflowState,
};
use crate::error::WorkflowError;
use crate::parse::{ImplementationBundle, PlanOutline, TaskList};
use crate::prompts::PromptContext;
use crate::store::ArtifactStore;
use crate::validation::{CoveragePolicy, ValidationContext, ValidationReport};

mod implementation;
mod plan;
mod scaffold;
mod tasks;

pub use implementation::ImplementationGenerator;
pub use plan::PlanGenerator;
pub use scaffold::{Generation, GenerationOutcome, Scaffold};
pub use tasks::TaskGenerator;

/// Everything a generator may read: the seed context and prior artifacts
#[derive(Debug, Clone, Copy)]
pub struct Upstream<'a> {
    pub context: &'a ContextData,
    pub plan: Option<&'a PlanArtifact>,
    pub tasks: Option<&'a TaskArtifact>,
}

impl<'a> Upstream<'a> {
    pub fn new(context: &'a ContextData) -> Self {
        Self {
            context,
            plan: None,
            tasks: None,
        }
    }

    pub fn from_state(state: &'a WorkflowState) -> Self {
        Self {
            context: state.context().as_ref(),
            plan: state.plan(),
            tasks: state.tasks(),
        }
    }

    pub fn with_plan(mut self, plan: Option<&'a PlanArtifact>) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_tasks(mut self, tasks: Option<&'a TaskArtifact>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Validation context for artifacts built on this upstream
    pub fn validation_context(&self, coverage: CoveragePolicy) -> ValidationContext {
        let ctx = ValidationContext::from_context(self.context, coverage);
        match self.tasks {
            Some(tasks) => ctx.with_tasks(tasks.structured().clone()),
            None => ctx,
        }
    }

    pub(crate) fn require_plan(&self) -> Result<&'a PlanArtifact, WorkflowError> {
        self.plan.ok_or_else(|| WorkflowError::MissingInput {
            name: "plan".to_string(),
        })
    }

    pub(crate) fn require_tasks(&self) -> Result<&'a TaskArtifact, WorkflowError> {
        self.tasks.ok_or_else(|| WorkflowError::MissingInput {
            name: "tasks".to_string(),
        })
    }
}

/// Structured decomposition of generated text, tagged by kind
#[derive(Debug, Clone, PartialEq)]
pub enum Decomposition {
    Plan(PlanOutline),
    Tasks(TaskList),
    Implementation(ImplementationBundle),
}

impl Decomposition {
    pub fn into_artifact(
        self,
        raw: String,
        report: ValidationReport,
        location: ArtifactLocation,
        extracted: Vec<ArtifactLocation>,
    ) -> GeneratedArtifact {
        match self {
            Self::Plan(s) => GeneratedArtifact::Plan(Artifact::new(raw, s, report, location, extracted)),
            Self::Tasks(s) => GeneratedArtifact::Tasks(Artifact::new(raw, s, report, location, extracted)),
            Self::Implementation(s) => {
                GeneratedArtifact::Implementation(Artifact::new(raw, s, report, location, extracted))
            }
        }
    }
}

/// Parse plus validation of one piece of generated text
#[derive(Debug, Clone)]
pub struct Assessment {
    pub decomposition: Decomposition,
    pub report: ValidationReport,
}

/// Shared contract of the plan, task and implementation generators
#[async_trait]
pub trait PhaseGenerator: Send + Sync {
    /// Phase marker reached when this generator's artifact is attached
    fn target(&self) -> Phase;

    /// Prompt template name
    fn template(&self) -> &'static str;

    /// File name of the artifact under the run's output directory
    fn artifact_name(&self) -> &'static str;

    /// Prompt inputs built from upstream data
    fn prompt_context(&self, upstream: &Upstream<'_>) -> Result<PromptContext, WorkflowError>;

    /// Parse `raw` and run the matching validator; never fails
    fn assess(&self, raw: &str, ctx: &ValidationContext) -> Assessment;

    /// Persist any files carried inside the artifact
    async fn extract(
        &self,
        _decomposition: &Decomposition,
        _store: &dyn ArtifactStore,
        _layout: &RunLayout<'_>,
    ) -> Result<Vec<ArtifactLocation>, WorkflowError> {
        Ok(Vec::new())
    }
}

/// Phase key -> generator
#[derive(Clone)]
pub struct GeneratorTable {
    generators: HashMap<Phase, Arc<dyn PhaseGenerator>>,
}

impl GeneratorTable {
    pub fn empty() -> Self {
        Self {
            generators: HashMap::new(),
        }
    }

    /// Register `generator` under its target phase, replacing any previous one
    pub fn with(mut self, generator: Arc<dyn PhaseGenerator>) -> Self {
        debug!(target = %generator.target(), "GeneratorTable::with: called");
        self.generators.insert(generator.target(), generator);
        self
    }

    pub fn get(&self, target: Phase) -> Option<&Arc<dyn PhaseGenerator>> {
        self.generators.get(&target)
    }

    /// The generator that runs when a state sits at `phase`
    pub fn next_for(&self, phase: Phase) -> Option<&Arc<dyn PhaseGenerator>> {
        next_target(phase).and_then(|target| self.get(target))
    }
}

impl Default for GeneratorTable {
    fn default() -> Self {
        Self::empty()
            .with(Arc::new(PlanGenerator))
            .with(Arc::new(TaskGenerator))
            .with(Arc::new(ImplementationGenerator))
    }
}

/// Artifact marker that follows `phase`, if `phase` leads into generation
pub fn next_target(phase: Phase) -> Option<Phase> {
    match phase {
        Phase::ContextLoaded => Some(Phase::PlanReady),
        Phase::PlanReady => Some(Phase::TasksReady),
        Phase::Approved => Some(Phase::Implemented),
        _ => None,
    }
}

/// Delay between failed gateway attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    None,
    Fixed(Duration),
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the `attempt`th failure (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(d) => d,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Retry and correction policy handed to every generation
#[derive(Debug, Clone)]
pub struct GenerationPolicy {
    pub attempt_budget: u32,
    pub backoff: Backoff,
    pub corrective_retry: bool,
    pub timeout: Duration,
    pub coverage: CoveragePolicy,
}

impl GenerationPolicy {
    pub fn from_config(config: &Config) -> Self {
        let g = &config.generation;
        let backoff = match g.backoff {
            BackoffKind::None => Backoff::None,
            BackoffKind::Fixed => Backoff::Fixed(Duration::from_millis(g.backoff_ms)),
            BackoffKind::Exponential => Backoff::Exponential {
                base: Duration::from_millis(g.backoff_ms),
                max: Duration::from_millis(g.backoff_max_ms),
            },
        };
        Self {
            attempt_budget: g.attempt_budget.max(1),
            backoff,
            corrective_retry: g.corrective_retry,
            timeout: config.gateway.timeout(),
            coverage: config.validation.coverage_policy,
        }
    }
}

/// Receiving side of a run's cancel switch
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self(rx)
    }

    /// A signal nobody can trip
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if the switch is gone
    pub async fn cancelled(&mut self) {
        if self.0.wait_for(|c| *c).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
