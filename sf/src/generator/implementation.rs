//! Implementation generator: approved tasks -> code blocks and extracted files

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Assessment, Decomposition, PhaseGenerator, Upstream};
use crate::config::RunLayout;
use crate::domain::{ArtifactLocation, Phase};
use crate::error::WorkflowError;
use crate::parse::parse_implementation;
use crate::prompts::PromptContext;
use crate::store::ArtifactStore;
use crate::validation::{Structured, ValidationContext, is_safe_relative, validate};

#[derive(Debug, Clone, Copy, Default)]
pub struct ImplementationGenerator;

#[async_trait]
impl PhaseGenerator for ImplementationGenerator {
    fn target(&self) -> Phase {
        Phase::Implemented
    }

    fn template(&self) -> &'static str {
        "implement"
    }

    fn artifact_name(&self) -> &'static str {
        "implementation.md"
    }

    fn prompt_context(&self, upstream: &Upstream<'_>) -> Result<PromptContext, WorkflowError> {
        let plan = upstream.require_plan()?;
        let tasks = upstream.require_tasks()?;
        Ok(PromptContext::new(upstream.context)
            .with_plan(plan.raw())
            .with_tasks(tasks.raw()))
    }

    fn assess(&self, raw: &str, ctx: &ValidationContext) -> Assessment {
        let bundle = parse_implementation(raw);
        let report = validate(raw, Structured::Implementation(&bundle), ctx);
        Assessment {
            decomposition: Decomposition::Implementation(bundle),
            report,
        }
    }

    /// Write every file block; unsafe paths were already reported and are skipped
    ///
    /// A path written twice keeps the later block and is listed once.
    async fn extract(
        &self,
        decomposition: &Decomposition,
        store: &dyn ArtifactStore,
        layout: &RunLayout<'_>,
    ) -> Result<Vec<ArtifactLocation>, WorkflowError> {
        let Decomposition::Implementation(bundle) = decomposition else {
            return Ok(Vec::new());
        };
        debug!(files = bundle.files().count(), "ImplementationGenerator::extract: called");

        let mut written: Vec<ArtifactLocation> = Vec::new();
        for block in bundle.files() {
            let Some(file) = &block.file else {
                continue;
            };
            if !is_safe_relative(file) {
                warn!(%file, "Skipping file outside the output directory");
                continue;
            }
            let location = store.persist(&layout.extracted(file), &block.code).await?;
            match written.iter().position(|l| l.path == location.path) {
                Some(idx) => {
                    warn!(path = %location.path, "Extracted file overwritten by a later block");
                    written[idx] = location;
                }
                None => written.push(location),
            }
        }
        Ok(written)
    }
}
