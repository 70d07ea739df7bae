//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Implementation plan prompt
pub const PLAN: &str = include_str!("../../prompts/plan.pmt");

/// Task breakdown prompt
pub const TASKS: &str = include_str!("../../prompts/tasks.pmt");

/// Implementation prompt
pub const IMPLEMENT: &str = include_str!("../../prompts/implement.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "plan" => Some(PLAN),
        "tasks" => Some(TASKS),
        "implement" => Some(IMPLEMENT),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_embedded_plan() {
        let plan = get_embedded("plan").unwrap();
        assert!(plan.contains("Technical Context"));
        assert!(plan.contains("Constitution Check"));
        assert!(plan.contains("{{{specification}}}"));
    }

    #[test]
    fn test_get_embedded_tasks() {
        let tasks = get_embedded("tasks").unwrap();
        assert!(tasks.contains("T001"));
        assert!(tasks.contains("Phase 1: Setup"));
        assert!(tasks.contains("{{{plan}}}"));
    }

    #[test]
    fn test_get_embedded_implement() {
        let implement = get_embedded("implement").unwrap();
        assert!(implement.contains("**File**:"));
        assert!(implement.contains("{{{tasks}}}"));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
