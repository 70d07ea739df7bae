use std::collections::HashMap;
use std::path::{Component, Path};

use tracing::debug;

use super::{CoveragePolicy, Validate, ValidationContext, ValidationReport, Violation, rules};
use crate::parse::ImplementationBundle;

/// Implementation bundle: every task covered by a file, files safe to write
#[derive(Debug, Clone, Copy, Default)]
pub struct ImplementationValidator;

impl Validate for ImplementationValidator {
    type Structured = ImplementationBundle;

    fn validate(&self, text: &str, bundle: &ImplementationBundle, ctx: &ValidationContext) -> ValidationReport {
        debug!(
            blocks = bundle.blocks.len(),
            policy = ?ctx.coverage,
            "ImplementationValidator::validate: called"
        );
        let mut violations = Vec::new();

        if text.trim().is_empty() {
            violations.push(Violation::error(rules::EMPTY_DOCUMENT, "implementation is empty"));
            return ValidationReport::from_violations(violations);
        }
        if bundle.blocks.is_empty() {
            violations.push(Violation::error(rules::NO_CODE_BLOCKS, "no fenced code blocks found"));
        }

        if let Some(tasks) = &ctx.tasks {
            for id in tasks.ids() {
                if bundle.covers(id) {
                    continue;
                }
                let message = format!("{} has no generated file marker", id);
                violations.push(match ctx.coverage {
                    CoveragePolicy::Advisory => Violation::warning(rules::MISSING_TASK_COVERAGE, message),
                    CoveragePolicy::Strict => Violation::error(rules::MISSING_TASK_COVERAGE, message),
                });
            }
        }

        // normalized path -> line of the first block writing it
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for block in &bundle.blocks {
            if block.language.is_none() {
                violations.push(
                    Violation::warning(rules::MISSING_LANGUAGE, "code block has no language").at(block.line),
                );
            }
            let Some(file) = &block.file else {
                continue;
            };
            if block.task_ids.is_empty() {
                violations.push(
                    Violation::warning(rules::ORPHAN_FILE, format!("{} is not attributed to any task", file))
                        .at(block.line),
                );
            }
            if let Some(first) = seen.insert(normalized(file), block.line) {
                violations.push(
                    Violation::warning(
                        rules::DUPLICATE_FILE_PATH,
                        format!("{} is also written by the block at line {}; the later block wins", file, first),
                    )
                    .at(block.line),
                );
            }
            if !is_safe_relative(file) {
                violations.push(
                    Violation::warning(rules::UNSAFE_FILE_PATH, format!("{} escapes the output directory", file))
                        .at(block.line),
                );
            }
        }

        if let Some(line) = bundle.unterminated {
            violations.push(
                Violation::warning(rules::UNTERMINATED_CODE_BLOCK, "code fence is never closed").at(line),
            );
        }

        ValidationReport::from_violations(violations)
    }
}

/// `./src/main.rs` and `src/main.rs` name the same file
fn normalized(path: &str) -> &str {
    let mut path = path.trim();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path
}

/// Relative, with no `..` or root components
pub(crate) fn is_safe_relative(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty() && path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
