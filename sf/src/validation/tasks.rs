use std::collections::HashSet;

use tracing::debug;

use super::{Validate, ValidationContext, ValidationReport, Violation, rules};
use crate::parse::TaskList;

/// Task list: identifiers, phase tags and forward-only dependencies
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskValidator;

impl Validate for TaskValidator {
    type Structured = TaskList;

    fn validate(&self, _text: &str, list: &TaskList, _ctx: &ValidationContext) -> ValidationReport {
        debug!(tasks = list.tasks.len(), "TaskValidator::validate: called");
        let mut violations = Vec::new();

        if list.tasks.is_empty() {
            violations.push(Violation::error(rules::NO_TASKS, "no task items found"));
        }
        for bad in &list.malformed {
            violations.push(
                Violation::error(rules::MALFORMED_TASK_LINE, format!("unreadable task line '{}'", bad.text))
                    .at(bad.line),
            );
        }

        let known: HashSet<_> = list.ids().collect();
        let mut seen = HashSet::new();
        for task in &list.tasks {
            let Some(id) = task.id else {
                violations.push(
                    Violation::error(rules::MISSING_TASK_ID, format!("task '{}' has no T-number", task.description))
                        .at(task.line),
                );
                continue;
            };
            if !seen.insert(id) {
                violations.push(
                    Violation::error(rules::DUPLICATE_TASK_ID, format!("{} is declared more than once", id))
                        .at(task.line),
                );
            }
            if !task.has_phase_tag() {
                violations.push(
                    Violation::error(rules::MISSING_PHASE_TAG, format!("{} has no phase or story tag", id))
                        .at(task.line),
                );
            }
            for dep in &task.depends_on {
                if *dep >= id {
                    violations.push(
                        Violation::error(rules::FORWARD_DEPENDENCY, format!("{} depends on later task {}", id, dep))
                            .at(task.line),
                    );
                } else if !known.contains(dep) {
                    violations.push(
                        Violation::warning(rules::UNKNOWN_DEPENDENCY, format!("{} depends on undeclared {}", id, dep))
                            .at(task.line),
                    );
                }
            }
            if task.file_paths.is_empty() {
                violations.push(
                    Violation::warning(rules::MISSING_FILE_PATH, format!("{} names no file path", id)).at(task.line),
                );
            }
        }

        for edge in &list.dangling {
            violations.push(
                Violation::warning(
                    rules::UNKNOWN_DEPENDENCY,
                    format!("dependency {} -> {} names undeclared task {}", edge.depends_on, edge.task, edge.task),
                )
                .at(edge.line),
            );
        }

        if !list.tasks.is_empty() {
            if !list.has_phase("setup") {
                violations.push(Violation::warning(rules::MISSING_SETUP_PHASE, "no Setup phase section"));
            }
            if !list.has_phase("foundational") {
                violations.push(Violation::warning(rules::MISSING_FOUNDATIONAL_PHASE, "no Foundational phase section"));
            }
        }

        ValidationReport::from_violations(violations)
    }
}
