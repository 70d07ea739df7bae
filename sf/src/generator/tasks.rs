//! Task generator: plan -> ordered task list

use async_trait::async_trait;

use super::{Assessment, Decomposition, PhaseGenerator, Upstream};
use crate::domain::Phase;
use crate::error::WorkflowError;
use crate::parse::parse_tasks;
use crate::prompts::PromptContext;
use crate::validation::{Structured, ValidationContext, validate};

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskGenerator;

#[async_trait]
impl PhaseGenerator for TaskGenerator {
    fn target(&self) -> Phase {
        Phase::TasksReady
    }

    fn template(&self) -> &'static str {
        "tasks"
    }

    fn artifact_name(&self) -> &'static str {
        "tasks.md"
    }

    fn prompt_context(&self, upstream: &Upstream<'_>) -> Result<PromptContext, WorkflowError> {
        let plan = upstream.require_plan()?;
        Ok(PromptContext::new(upstream.context).with_plan(plan.raw()))
    }

    fn assess(&self, raw: &str, ctx: &ValidationContext) -> Assessment {
        let list = parse_tasks(raw);
        let report = validate(raw, Structured::Tasks(&list), ctx);
        Assessment {
            decomposition: Decomposition::Tasks(list),
            report,
        }
    }
}
