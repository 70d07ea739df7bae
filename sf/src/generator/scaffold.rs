//! Shared generation scaffolding
//!
//! Control decisions depend only on gateway results and validation reports:
//! the same report always leads to the same retry or fail decision.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::{CancelSignal, GenerationPolicy, PhaseGenerator, Upstream};
use crate::config::RunLayout;
use crate::domain::{GeneratedArtifact, HistoryEntry, Outcome, Phase};
use crate::error::WorkflowError;
use crate::events::EventEmitter;
use crate::gateway::AgentGateway;
use crate::prompts::{PromptContext, PromptLoader};
use crate::store::ArtifactStore;
use crate::validation::Violation;

/// A successful generation
#[derive(Debug)]
pub struct Generation {
    pub artifact: GeneratedArtifact,
    /// Gateway calls made, including the corrective one
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Result of a generation plus the history entries it produced either way
#[derive(Debug)]
pub struct GenerationOutcome {
    pub result: Result<Generation, WorkflowError>,
    /// Failed attempts and corrective retries, in order
    pub journal: Vec<HistoryEntry>,
}

/// Collaborators borrowed for one generation
pub struct Scaffold<'a> {
    pub gateway: &'a dyn AgentGateway,
    pub store: &'a dyn ArtifactStore,
    pub prompts: &'a PromptLoader,
    pub layout: RunLayout<'a>,
    pub policy: &'a GenerationPolicy,
    pub emitter: &'a EventEmitter,
}

impl Scaffold<'_> {
    /// Produce `generator`'s artifact from `upstream`
    pub async fn run(
        &self,
        generator: &dyn PhaseGenerator,
        upstream: &Upstream<'_>,
        cancel: &mut CancelSignal,
    ) -> GenerationOutcome {
        let mut journal = Vec::new();
        let result = self.generate(generator, upstream, cancel, &mut journal).await;
        GenerationOutcome { result, journal }
    }

    async fn generate(
        &self,
        generator: &dyn PhaseGenerator,
        upstream: &Upstream<'_>,
        cancel: &mut CancelSignal,
        journal: &mut Vec<HistoryEntry>,
    ) -> Result<Generation, WorkflowError> {
        let phase = generator.target();
        let started = Instant::now();
        debug!(%phase, "Scaffold::generate: called");
        self.emitter.phase_started(phase);

        let base = generator.prompt_context(upstream)?;
        let vctx = upstream.validation_context(self.policy.coverage);

        let prompt = self.render(generator, &base)?;
        let (mut raw, mut attempts) = self.call(phase, &prompt, cancel, journal).await?;
        let mut assessment = generator.assess(&raw, &vctx);

        if !assessment.report.is_valid() {
            if !self.policy.corrective_retry {
                return Err(WorkflowError::ValidationFailed {
                    phase,
                    report: assessment.report,
                });
            }

            let violations: Vec<Violation> = assessment.report.errors().cloned().collect();
            warn!(%phase, errors = violations.len(), "Validation failed, re-prompting with corrections");
            journal.push(HistoryEntry::new(
                phase,
                Outcome::CorrectiveRetry {
                    violations: violations.clone(),
                },
            ));
            self.emitter.corrective_retry(phase, &violations);

            let prompt = self.render(generator, &base.clone().with_correction(&violations, &raw))?;
            let (corrected, used) = self.call(phase, &prompt, cancel, journal).await?;
            raw = corrected;
            attempts += used;
            assessment = generator.assess(&raw, &vctx);

            if !assessment.report.is_valid() {
                return Err(WorkflowError::ValidationFailed {
                    phase,
                    report: assessment.report,
                });
            }
        }

        if cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled { phase });
        }

        let location = self
            .store
            .persist(&self.layout.output(generator.artifact_name()), &raw)
            .await?;
        let extracted = generator
            .extract(&assessment.decomposition, self.store, &self.layout)
            .await?;
        let artifact = assessment
            .decomposition
            .into_artifact(raw, assessment.report, location, extracted);

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(%phase, attempts, duration_ms, path = %artifact.location(), "Artifact generated");
        Ok(Generation {
            artifact,
            attempts,
            duration_ms,
        })
    }

    fn render(&self, generator: &dyn PhaseGenerator, ctx: &PromptContext) -> Result<String, WorkflowError> {
        self.prompts
            .render(generator.template(), ctx)
            .map_err(|e| WorkflowError::Prompt(e.to_string()))
    }

    /// Call the gateway until it answers or the attempt budget runs out
    async fn call(
        &self,
        phase: Phase,
        prompt: &str,
        cancel: &mut CancelSignal,
        journal: &mut Vec<HistoryEntry>,
    ) -> Result<(String, u32), WorkflowError> {
        let budget = self.policy.attempt_budget.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(%phase, attempt, budget, "Scaffold::call: calling gateway");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WorkflowError::Cancelled { phase }),
                r = self.gateway.generate(prompt, self.policy.timeout) => r,
            };

            let error = match result {
                Ok(text) => return Ok((text, attempt)),
                Err(e) => e,
            };

            let exhausted = attempt >= budget || !error.is_retryable();
            let delay = (!exhausted).then(|| self.policy.backoff.delay(attempt));
            warn!(%phase, attempt, budget, error = %error, "Gateway attempt failed");
            journal.push(HistoryEntry::new(
                phase,
                Outcome::AttemptFailed {
                    attempt,
                    error: error.to_string(),
                },
            ));
            self.emitter.attempt_failed(
                phase,
                attempt,
                &error.to_string(),
                delay.map(|d| d.as_millis() as u64),
            );

            if exhausted {
                return Err(WorkflowError::GenerationFailed {
                    phase,
                    attempts: attempt,
                    last_error: error,
                });
            }
            if let Some(delay) = delay
                && !delay.is_zero()
            {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(WorkflowError::Cancelled { phase }),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
