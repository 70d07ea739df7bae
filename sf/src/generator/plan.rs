//! Plan generator: seed context -> implementation plan

use async_trait::async_trait;

use super::{Assessment, Decomposition, PhaseGenerator, Upstream};
use crate::domain::Phase;
use crate::error::WorkflowError;
use crate::parse::parse_plan;
use crate::prompts::PromptContext;
use crate::validation::{Structured, ValidationContext, validate};

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanGenerator;

#[async_trait]
impl PhaseGenerator for PlanGenerator {
    fn target(&self) -> Phase {
        Phase::PlanReady
    }

    fn template(&self) -> &'static str {
        "plan"
    }

    fn artifact_name(&self) -> &'static str {
        "plan.md"
    }

    fn prompt_context(&self, upstream: &Upstream<'_>) -> Result<PromptContext, WorkflowError> {
        Ok(PromptContext::new(upstream.context))
    }

    fn assess(&self, raw: &str, ctx: &ValidationContext) -> Assessment {
        let outline = parse_plan(raw);
        let report = validate(raw, Structured::Plan(&outline), ctx);
        Assessment {
            decomposition: Decomposition::Plan(outline),
            report,
        }
    }
}
