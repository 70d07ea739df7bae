//! Prompt Loader
//!
//! Loads prompt templates from the user override directory or falls back to
//! embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, info};

use super::embedded;
use crate::domain::ContextData;
use crate::parse::extract_principles;
use crate::validation::Violation;

/// Context for rendering prompt templates
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    pub principles: String,
    pub specification: String,
    pub tech_stack: String,
    /// One entry per principle heading, for compliance checklists
    pub principle_checks: Vec<String>,
    /// Raw plan text (tasks and implementation prompts)
    pub plan: Option<String>,
    /// Raw task list text (implementation prompt)
    pub tasks: Option<String>,
    /// Set on the single corrective re-prompt
    pub is_correction: bool,
    pub violations: Vec<String>,
    /// The output that failed validation
    pub previous: Option<String>,
}

impl PromptContext {
    /// Seed-only context
    pub fn new(context: &ContextData) -> Self {
        debug!(tech_stack = %context.tech_stack(), "PromptContext::new: called");
        let mut principle_checks = extract_principles(context.principles_text()).0;
        if principle_checks.is_empty() {
            principle_checks.push("Review all constitution principles for compliance".to_string());
        }
        Self {
            principles: context.principles_text().to_string(),
            specification: context.specification_text().to_string(),
            tech_stack: context.tech_stack().to_string(),
            principle_checks,
            plan: None,
            tasks: None,
            is_correction: false,
            violations: Vec::new(),
            previous: None,
        }
    }

    pub fn with_plan(mut self, plan: &str) -> Self {
        self.plan = Some(plan.to_string());
        self
    }

    pub fn with_tasks(mut self, tasks: &str) -> Self {
        self.tasks = Some(tasks.to_string());
        self
    }

    /// Turn this into a corrective re-prompt
    pub fn with_correction(mut self, violations: &[Violation], previous: &str) -> Self {
        debug!(violations = violations.len(), "PromptContext::with_correction: called");
        self.is_correction = true;
        self.violations = violations.iter().map(ToString::to_string).collect();
        self.previous = Some(previous.to_string());
        self
    }
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory (e.g., `.specflow/prompts/`)
    user_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader for `workdir`, honouring `<workdir>/<state_dir>/prompts/` overrides
    pub fn new(workdir: impl AsRef<Path>, state_dir: &str) -> Self {
        let user_dir = workdir.as_ref().join(state_dir).join("prompts");
        let user_dir_exists = user_dir.exists();
        debug!(?user_dir, %user_dir_exists, "PromptLoader::new: called");

        Self {
            hbs: Handlebars::new(),
            user_dir: if user_dir_exists { Some(user_dir) } else { None },
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Handlebars::new(),
            user_dir: None,
        }
    }

    /// Load a template by name: user override first, then embedded
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(user_dir) = &self.user_dir {
            let path = user_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in user override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read user prompt {}: {}", path.display(), e));
            }
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "PromptLoader::load_template: found in embedded");
            return Ok(content.to_string());
        }

        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render(&self, template_name: &str, context: &PromptContext) -> Result<String> {
        debug!(%template_name, is_correction = context.is_correction, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        info!(
            "Rendering template '{}'{}",
            template_name,
            if context.is_correction { " (correction)" } else { "" }
        );

        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}
