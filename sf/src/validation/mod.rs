//! Structural validation of seed documents and generated artifacts
//!
//! Every validator implements [`Validate`]: a pure function of the raw text,
//! its structured decomposition and a [`ValidationContext`]. Validators never
//! fail; malformed input becomes violations in the report.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::ContextData;
use crate::parse::{ImplementationBundle, PlanOutline, Principles, TaskList, extract_principles, named_entities};

mod constitution;
mod implementation;
mod plan;
mod tasks;

pub use constitution::ConstitutionValidator;
pub use implementation::ImplementationValidator;
pub use plan::PlanValidator;
pub use tasks::TaskValidator;
pub(crate) use implementation::is_safe_relative;

/// Rule identifiers
pub mod rules {
    pub const EMPTY_DOCUMENT: &str = "EMPTY_DOCUMENT";
    pub const NO_PRINCIPLES: &str = "NO_PRINCIPLES";

    pub const MISSING_TECHNICAL_CONTEXT: &str = "MISSING_TECHNICAL_CONTEXT";
    pub const MISSING_COMPONENT_LIST: &str = "MISSING_COMPONENT_LIST";
    pub const NO_ENTITY_REFERENCES: &str = "NO_ENTITY_REFERENCES";
    pub const ENTITY_NOT_REFERENCED: &str = "ENTITY_NOT_REFERENCED";
    pub const MISSING_CONSTITUTION_CHECK: &str = "MISSING_CONSTITUTION_CHECK";
    pub const PRINCIPLE_NOT_REFERENCED: &str = "PRINCIPLE_NOT_REFERENCED";

    pub const NO_TASKS: &str = "NO_TASKS";
    pub const MALFORMED_TASK_LINE: &str = "MALFORMED_TASK_LINE";
    pub const MISSING_TASK_ID: &str = "MISSING_TASK_ID";
    pub const DUPLICATE_TASK_ID: &str = "DUPLICATE_TASK_ID";
    pub const MISSING_PHASE_TAG: &str = "MISSING_PHASE_TAG";
    pub const FORWARD_DEPENDENCY: &str = "FORWARD_DEPENDENCY";
    pub const UNKNOWN_DEPENDENCY: &str = "UNKNOWN_DEPENDENCY";
    pub const MISSING_SETUP_PHASE: &str = "MISSING_SETUP_PHASE";
    pub const MISSING_FOUNDATIONAL_PHASE: &str = "MISSING_FOUNDATIONAL_PHASE";
    pub const MISSING_FILE_PATH: &str = "MISSING_FILE_PATH";

    pub const NO_CODE_BLOCKS: &str = "NO_CODE_BLOCKS";
    pub const MISSING_TASK_COVERAGE: &str = "MISSING_TASK_COVERAGE";
    pub const ORPHAN_FILE: &str = "ORPHAN_FILE";
    pub const UNSAFE_FILE_PATH: &str = "UNSAFE_FILE_PATH";
    pub const DUPLICATE_FILE_PATH: &str = "DUPLICATE_FILE_PATH";
    pub const MISSING_LANGUAGE: &str = "MISSING_LANGUAGE";
    pub const UNTERMINATED_CODE_BLOCK: &str = "UNTERMINATED_CODE_BLOCK";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Flips `is_valid` to false
    Error,
    /// Reported only
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// One rule violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Violation {
    pub fn error(rule_id: &str, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity: Severity::Error,
            message: message.into(),
            line: None,
        }
    }

    pub fn warning(rule_id: &str, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity: Severity::Warning,
            message: message.into(),
            line: None,
        }
    }

    pub fn at(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.rule_id, self.message)?;
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        Ok(())
    }
}

/// Pass/fail outcome with itemized violations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    is_valid: bool,
    violations: Vec<Violation>,
}

impl ValidationReport {
    /// Valid iff no violation has error severity
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        let is_valid = !violations.iter().any(Violation::is_error);
        Self { is_valid, violations }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.is_error())
    }

    /// Number of violations with the given rule id
    pub fn count(&self, rule_id: &str) -> usize {
        self.violations.iter().filter(|v| v.rule_id == rule_id).count()
    }

    pub fn has(&self, rule_id: &str) -> bool {
        self.count(rule_id) > 0
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} error(s), {} warning(s))",
            if self.is_valid { "valid" } else { "invalid" },
            self.errors().count(),
            self.warnings().count()
        )
    }
}

/// Whether missing implementation coverage blocks the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoveragePolicy {
    /// Missing coverage is a warning
    #[default]
    Advisory,
    /// Missing coverage is an error
    Strict,
}

/// What validators may consult beyond the artifact itself
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub principles: Principles,
    /// Named entities of the seed specification
    pub entities: Vec<String>,
    /// The accepted task list, for implementation coverage
    pub tasks: Option<TaskList>,
    pub coverage: CoveragePolicy,
}

impl ValidationContext {
    pub fn from_context(context: &ContextData, coverage: CoveragePolicy) -> Self {
        Self {
            principles: extract_principles(context.principles_text()),
            entities: named_entities(context.specification_text()),
            tasks: None,
            coverage,
        }
    }

    pub fn with_tasks(mut self, tasks: TaskList) -> Self {
        self.tasks = Some(tasks);
        self
    }
}

/// One validator per artifact kind
pub trait Validate {
    type Structured;

    fn validate(&self, text: &str, structured: &Self::Structured, ctx: &ValidationContext) -> ValidationReport;
}

/// Structured form of any validatable document
#[derive(Debug, Clone, Copy)]
pub enum Structured<'a> {
    Principles(&'a Principles),
    Plan(&'a PlanOutline),
    Tasks(&'a TaskList),
    Implementation(&'a ImplementationBundle),
}

/// Dispatch to the validator matching the structured form
pub fn validate(text: &str, structured: Structured<'_>, ctx: &ValidationContext) -> ValidationReport {
    let report = match structured {
        Structured::Principles(p) => ConstitutionValidator.validate(text, p, ctx),
        Structured::Plan(p) => PlanValidator.validate(text, p, ctx),
        Structured::Tasks(t) => TaskValidator.validate(text, t, ctx),
        Structured::Implementation(b) => ImplementationValidator.validate(text, b, ctx),
    };
    tracing::debug!(%report, "validate: done");
    report
}
