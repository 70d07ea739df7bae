use tracing::debug;

use super::{Validate, ValidationContext, ValidationReport, Violation, rules};
use crate::parse::PlanOutline;

/// Implementation plan structure and its ties to the seed documents
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanValidator;

impl Validate for PlanValidator {
    type Structured = PlanOutline;

    fn validate(&self, text: &str, outline: &PlanOutline, ctx: &ValidationContext) -> ValidationReport {
        debug!(components = outline.components.len(), "PlanValidator::validate: called");
        let mut violations = Vec::new();

        if text.trim().is_empty() {
            violations.push(Violation::error(rules::EMPTY_DOCUMENT, "plan is empty"));
            return ValidationReport::from_violations(violations);
        }
        if !outline.has_technical_context {
            violations.push(Violation::error(
                rules::MISSING_TECHNICAL_CONTEXT,
                "plan has no Technical Context section",
            ));
        }
        if outline.components.is_empty() {
            violations.push(Violation::error(
                rules::MISSING_COMPONENT_LIST,
                "plan has no enumerated component or module list",
            ));
        }

        let lower = text.to_lowercase();
        let missing: Vec<&String> = ctx
            .entities
            .iter()
            .filter(|e| !lower.contains(&e.to_lowercase()))
            .collect();
        if !ctx.entities.is_empty() && missing.len() == ctx.entities.len() {
            violations.push(Violation::error(
                rules::NO_ENTITY_REFERENCES,
                "plan references none of the specification's named entities",
            ));
        } else {
            for entity in missing {
                violations.push(Violation::warning(
                    rules::ENTITY_NOT_REFERENCED,
                    format!("specification entity '{}' is not mentioned", entity),
                ));
            }
        }

        if !outline.has_constitution_check {
            violations.push(Violation::warning(
                rules::MISSING_CONSTITUTION_CHECK,
                "plan has no Constitution Check section",
            ));
        }
        for principle in ctx.principles.iter() {
            if !lower.contains(&principle_keyword(principle).to_lowercase()) {
                violations.push(Violation::warning(
                    rules::PRINCIPLE_NOT_REFERENCED,
                    format!("principle '{}' is not referenced", principle),
                ));
            }
        }

        ValidationReport::from_violations(violations)
    }
}

/// `II. Test-First` -> `Test-First`
fn principle_keyword(principle: &str) -> &str {
    match principle.split_once(". ") {
        Some((prefix, rest)) if prefix.chars().all(|c| c.is_ascii_alphanumeric()) && prefix.len() <= 5 => rest.trim(),
        _ => principle.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{Principles, parse_plan};

    const PLAN: &str = "\
# Plan

## Technical Context
Rust with tokio. Honors Test-First.

## Constitution Check
All good.

## Components
- TaskStore: keeps every Task
- Scheduler
";

    fn ctx(entities: &[&str], principles: &[&str]) -> ValidationContext {
        ValidationContext {
            principles: Principles(principles.iter().map(|s| s.to_string()).collect()),
            entities: entities.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_plan() {
        let report = PlanValidator.validate(PLAN, &parse_plan(PLAN), &ctx(&["Task"], &["II. Test-First"]));
        assert!(report.is_valid(), "{:?}", report.violations());
        assert!(report.violations().is_empty());
    }

    #[test]
    fn test_missing_sections() {
        let text = "# Plan\n\nJust prose about nothing.\n";
        let report = PlanValidator.validate(text, &parse_plan(text), &ctx(&[], &[]));
        assert!(!report.is_valid());
        assert!(report.has(rules::MISSING_TECHNICAL_CONTEXT));
        assert!(report.has(rules::MISSING_COMPONENT_LIST));
        assert!(report.has(rules::MISSING_CONSTITUTION_CHECK));
    }

    #[test]
    fn test_entity_references() {
        let outline = parse_plan(PLAN);
        let report = PlanValidator.validate(PLAN, &outline, &ctx(&["Task", "Reminder"], &[]));
        assert!(report.is_valid());
        assert_eq!(report.count(rules::ENTITY_NOT_REFERENCED), 1);

        let report = PlanValidator.validate(PLAN, &outline, &ctx(&["Invoice", "Reminder"], &[]));
        assert!(!report.is_valid());
        assert_eq!(report.count(rules::NO_ENTITY_REFERENCES), 1);
        assert_eq!(report.count(rules::ENTITY_NOT_REFERENCED), 0);
    }

    #[test]
    fn test_principle_not_referenced_is_warning() {
        let report = PlanValidator.validate(PLAN, &parse_plan(PLAN), &ctx(&[], &["I. Library-First"]));
        assert!(report.is_valid());
        assert_eq!(report.count(rules::PRINCIPLE_NOT_REFERENCED), 1);
    }

    #[test]
    fn test_principle_keyword() {
        assert_eq!(principle_keyword("II. Test-First"), "Test-First");
        assert_eq!(principle_keyword("Simplicity"), "Simplicity");
    }
}
