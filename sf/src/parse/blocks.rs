//! Fenced code blocks of an implementation document
//!
//! A block preceded by a `**File**: path` (or `File: path`) line is a file.
//! It is attributed to the nearest preceding `Task T...` heading plus any task
//! ids named on the file line itself.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{TaskId, heading, is_fence, task_ids_in};

static TASK_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bTask\s+T\d+").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub file: Option<String>,
    pub task_ids: Vec<TaskId>,
    pub code: String,
    /// 1-based line of the opening fence
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationBundle {
    pub blocks: Vec<CodeBlock>,
    /// Task ids named in `Task T...` headings, in order
    pub task_headings: Vec<TaskId>,
    /// Line of a fence that was never closed
    pub unterminated: Option<usize>,
}

impl ImplementationBundle {
    /// Blocks that declare a target file
    pub fn files(&self) -> impl Iterator<Item = &CodeBlock> {
        self.blocks.iter().filter(|b| b.file.is_some())
    }

    /// Whether some file block is attributed to `id`
    pub fn covers(&self, id: TaskId) -> bool {
        self.files().any(|b| b.task_ids.contains(&id))
    }
}

pub fn parse_implementation(text: &str) -> ImplementationBundle {
    let mut bundle = ImplementationBundle::default();
    let mut current_tasks: Vec<TaskId> = Vec::new();
    let mut last_text_line: Option<&str> = None;
    let mut open: Option<(usize, Option<String>, Option<String>, Vec<TaskId>)> = None;
    let mut code = String::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;

        if let Some((start, language, file, task_ids)) = open.take() {
            if is_fence(line) && line.trim() == "```" {
                bundle.blocks.push(CodeBlock {
                    language,
                    file,
                    task_ids,
                    code: std::mem::take(&mut code),
                    line: start,
                });
                last_text_line = None;
            } else {
                code.push_str(line);
                code.push('\n');
                open = Some((start, language, file, task_ids));
            }
            continue;
        }

        if is_fence(line) {
            let language = line.trim().trim_start_matches('`').trim();
            let language = (!language.is_empty()).then(|| language.to_string());
            let (file, task_ids) = match last_text_line.and_then(file_marker) {
                Some((path, named)) => {
                    let mut ids = current_tasks.clone();
                    for id in named {
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                    (Some(path), ids)
                }
                None => (None, Vec::new()),
            };
            open = Some((line_no, language, file, task_ids));
            continue;
        }

        if let Some(h) = heading(line, line_no) {
            if TASK_HEADING_RE.is_match(&h.title) {
                current_tasks = task_ids_in(&h.title);
                for id in &current_tasks {
                    if !bundle.task_headings.contains(id) {
                        bundle.task_headings.push(*id);
                    }
                }
            } else if h.level <= 2 {
                current_tasks.clear();
            }
        }

        if !line.trim().is_empty() {
            last_text_line = Some(line);
        }
    }

    if let Some((start, language, file, task_ids)) = open {
        bundle.unterminated = Some(start);
        bundle.blocks.push(CodeBlock {
            language,
            file,
            task_ids,
            code,
            line: start,
        });
    }

    tracing::debug!(
        blocks = bundle.blocks.len(),
        tasks = bundle.task_headings.len(),
        "parse_implementation: done"
    );
    bundle
}

/// `**File**: src/lib.rs (T003)` -> (`src/lib.rs`, [T003])
fn file_marker(line: &str) -> Option<(String, Vec<TaskId>)> {
    let text = line.trim().trim_start_matches(['-', '*', ' ']).replace("**", "");
    let rest = text
        .strip_prefix("File:")
        .or_else(|| text.strip_prefix("file:"))
        .or_else(|| text.strip_prefix("FILE:"))?;
    let rest = rest.trim();
    let path = rest
        .split_whitespace()
        .next()?
        .trim_matches(['`', '"', '\''])
        .to_string();
    if path.is_empty() {
        return None;
    }
    let ids = task_ids_in(&rest[rest.find(char::is_whitespace).unwrap_or(rest.len())..]);
    Some((path, ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMPL: &str = "\
# Implementation

## Task T001: Skeleton

**File**: `src/main.rs`
```rust
fn main() {}
```

### Task T002 and T003

File: src/store.rs (also T004)
```rust
pub struct Store;
```

```
loose snippet
```
";

    #[test]
    fn test_file_blocks_attributed_to_tasks() {
        let bundle = parse_implementation(IMPL);
        assert_eq!(bundle.blocks.len(), 3);
        assert_eq!(bundle.task_headings, vec![TaskId(1), TaskId(2), TaskId(3)]);

        let main = &bundle.blocks[0];
        assert_eq!(main.file.as_deref(), Some("src/main.rs"));
        assert_eq!(main.language.as_deref(), Some("rust"));
        assert_eq!(main.task_ids, vec![TaskId(1)]);
        assert_eq!(main.code, "fn main() {}\n");

        let store = &bundle.blocks[1];
        assert_eq!(store.file.as_deref(), Some("src/store.rs"));
        assert_eq!(store.task_ids, vec![TaskId(2), TaskId(3), TaskId(4)]);

        let loose = &bundle.blocks[2];
        assert!(loose.file.is_none());
        assert!(loose.language.is_none());
        assert!(loose.task_ids.is_empty());
        assert_eq!(bundle.files().count(), 2);
    }

    #[test]
    fn test_covers() {
        let bundle = parse_implementation(IMPL);
        assert!(bundle.covers(TaskId(1)));
        assert!(bundle.covers(TaskId(4)));
        assert!(!bundle.covers(TaskId(5)));
    }

    #[test]
    fn test_unterminated_fence() {
        let bundle = parse_implementation("File: a.py\n```python\nprint(1)\n");
        assert_eq!(bundle.unterminated, Some(2));
        assert_eq!(bundle.blocks.len(), 1);
        assert_eq!(bundle.blocks[0].code, "print(1)\n");
    }
}
