use super::{Validate, ValidationContext, ValidationReport, Violation, rules};
use crate::parse::Principles;

/// Principles document: non-empty, at least one principle heading
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstitutionValidator;

impl Validate for ConstitutionValidator {
    type Structured = Principles;

    fn validate(&self, text: &str, principles: &Principles, _ctx: &ValidationContext) -> ValidationReport {
        let mut violations = Vec::new();
        if text.trim().is_empty() {
            violations.push(Violation::error(rules::EMPTY_DOCUMENT, "principles document is empty"));
        }
        if principles.is_empty() {
            violations.push(Violation::error(
                rules::NO_PRINCIPLES,
                "no principle headings found (expected `## Name` or `### Name` sections)",
            ));
        }
        ValidationReport::from_violations(violations)
    }
}
