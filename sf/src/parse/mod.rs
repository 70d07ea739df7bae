//! Markdown decomposition of generated artifacts
//!
//! Parsers never fail: anything they cannot make sense of is recorded on the
//! structured output so the validators can report it as a violation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

mod blocks;
mod plan;
mod principles;
mod tasks;

pub use blocks::{CodeBlock, ImplementationBundle, parse_implementation};
pub use plan::{PlanOutline, parse_plan};
pub use principles::{Principles, extract_principles, named_entities};
pub use tasks::{DependencyEdge, MalformedLine, TaskId, TaskList, TaskRecord, parse_tasks};

static TASK_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bT(\d+)\b").expect("valid regex"));

/// A markdown heading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: usize,
    pub title: String,
    /// 1-based line number
    pub line: usize,
}

/// Parse a heading line; tolerates bold wrapping like `**## Phase 1: Setup**`
pub(crate) fn heading(line: &str, line_no: usize) -> Option<Heading> {
    let trimmed = line.trim().trim_start_matches("**").trim_end_matches("**").trim();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.starts_with(' ') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim().to_string();
    if title.is_empty() {
        return None;
    }
    Some(Heading {
        level,
        title,
        line: line_no,
    })
}

/// Whether a line opens or closes a fenced code block
pub(crate) fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// All `T<number>` task identifiers mentioned in `text`, in order of appearance
pub(crate) fn task_ids_in(text: &str) -> Vec<TaskId> {
    TASK_ID_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .map(TaskId)
        .collect()
}

/// Strip markdown emphasis and code markers from a short inline fragment
pub(crate) fn plain(text: &str) -> String {
    text.replace("**", "").replace('`', "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_levels() {
        let h = heading("## Technical Context", 4).unwrap();
        assert_eq!(h.level, 2);
        assert_eq!(h.title, "Technical Context");
        assert_eq!(h.line, 4);

        assert!(heading("#NoSpace", 1).is_none());
        assert!(heading("plain text", 1).is_none());
        assert!(heading("##   ", 1).is_none());
    }

    #[test]
    fn test_heading_bold_wrapped() {
        let h = heading("**## Phase 1: Setup (Shared Infrastructure)**", 1).unwrap();
        assert_eq!(h.level, 2);
        assert_eq!(h.title, "Phase 1: Setup (Shared Infrastructure)");
    }

    #[test]
    fn test_task_ids_in() {
        let ids = task_ids_in("T001 then T12, not AT3 or T");
        assert_eq!(ids, vec![TaskId(1), TaskId(12)]);
    }
}
