//! Task list grammar
//!
//! `- [ ] T001 [P] [US1] Description naming src/file.rs (depends on T000)`
//!
//! The phase of a task is the enclosing `## Phase N: ...` heading. Edges may
//! also come from a dependencies section with lines like `T001 → T002, T003`
//! or `T005 depends on T003`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{heading, is_fence, task_ids_in};

static CHECKBOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*]\s+\[([ xX])\]\s*(.*)$").expect("valid regex"));
static LEADING_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^T(\d+)\b\s*").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[([^\]]+)\]\s*").expect("valid regex"));
static STORY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^US\d+$").expect("valid regex"));
static PHASE_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^phase\s+\d+\s*:?\s*").expect("valid regex"));
static DEPENDS_ON_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)depends\s+on\b").expect("valid regex"));
static ARROW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(→|->)").expect("valid regex"));
static FILE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`?([A-Za-z0-9_.\-]+(?:/[A-Za-z0-9_.\-]+)+|[A-Za-z0-9_\-]+\.[A-Za-z]{1,5})`?").expect("valid regex")
});

/// Numeric task identifier, displayed as `T001`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u32);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{:03}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix('T')
            .and_then(|n| n.parse::<u32>().ok())
            .map(TaskId)
            .ok_or_else(|| format!("not a task id: {}", s))
    }
}

/// One checkbox line of a task list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Option<TaskId>,
    pub description: String,
    /// Enclosing `Phase N:` heading title
    pub phase: Option<String>,
    /// `[USn]` story tag
    pub story: Option<String>,
    /// `[P]` marker
    pub parallel: bool,
    /// Any other bracketed tags
    pub tags: Vec<String>,
    pub depends_on: Vec<TaskId>,
    pub file_paths: Vec<String>,
    pub completed: bool,
    pub line: usize,
}

impl TaskRecord {
    /// Whether the task carries any phase or category tag
    pub fn has_phase_tag(&self) -> bool {
        self.phase.is_some() || self.story.is_some() || !self.tags.is_empty()
    }
}

/// Dependency declared outside a task line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub task: TaskId,
    pub depends_on: TaskId,
    pub line: usize,
}

/// Checkbox line that could not be read as a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedLine {
    pub line: usize,
    pub text: String,
}

/// Structured task list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList {
    pub tasks: Vec<TaskRecord>,
    /// Phase heading titles in document order
    pub phases: Vec<String>,
    /// Section edges whose dependent task does not exist
    pub dangling: Vec<DependencyEdge>,
    pub malformed: Vec<MalformedLine>,
}

impl TaskList {
    pub fn get(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.id == Some(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.iter().filter_map(|t| t.id)
    }

    /// Whether a phase heading containing `needle` (case-insensitive) exists
    pub fn has_phase(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.phases.iter().any(|p| p.to_lowercase().contains(&needle))
    }
}

/// Parse a task list document
pub fn parse_tasks(text: &str) -> TaskList {
    let mut list = TaskList::default();
    let mut current_phase: Option<String> = None;
    let mut in_dependency_section: Option<usize> = None;
    let mut section_edges = Vec::new();
    let mut in_fence = false;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        if let Some(h) = heading(line, line_no) {
            if in_dependency_section.is_some_and(|level| h.level <= level) {
                in_dependency_section = None;
            }
            if PHASE_HEADING_RE.is_match(&h.title) {
                list.phases.push(h.title.clone());
                current_phase = Some(h.title);
            } else if h.title.to_lowercase().contains("dependenc") {
                in_dependency_section = Some(h.level);
            } else if h.level <= 2 {
                current_phase = None;
            }
            continue;
        }

        if let Some(cap) = CHECKBOX_RE.captures(line) {
            let completed = cap.get(1).is_some_and(|m| m.as_str() != " ");
            let body = cap.get(2).map(|m| m.as_str()).unwrap_or_default();
            match parse_task_body(body, line_no, completed, current_phase.clone()) {
                Some(task) => list.tasks.push(task),
                None => list.malformed.push(MalformedLine {
                    line: line_no,
                    text: line.trim().to_string(),
                }),
            }
            continue;
        }

        if in_dependency_section.is_some() {
            section_edges.extend(parse_edge_line(line, line_no));
        }
    }

    for edge in section_edges {
        match list.tasks.iter_mut().find(|t| t.id == Some(edge.task)) {
            Some(task) => {
                if !task.depends_on.contains(&edge.depends_on) {
                    task.depends_on.push(edge.depends_on);
                }
            }
            None => list.dangling.push(edge),
        }
    }

    tracing::debug!(
        tasks = list.tasks.len(),
        phases = list.phases.len(),
        malformed = list.malformed.len(),
        "parse_tasks: done"
    );
    list
}

fn parse_task_body(body: &str, line: usize, completed: bool, phase: Option<String>) -> Option<TaskRecord> {
    let mut rest = body.trim();
    let mut id = None;
    if let Some(cap) = LEADING_ID_RE.captures(rest) {
        id = cap.get(1).and_then(|m| m.as_str().parse::<u32>().ok()).map(TaskId);
        rest = &rest[cap.get(0).map(|m| m.end()).unwrap_or(0)..];
    }

    let mut parallel = false;
    let mut story = None;
    let mut tags = Vec::new();
    while let Some(cap) = TAG_RE.captures(rest) {
        let tag = cap.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if tag == "P" {
            parallel = true;
        } else if STORY_RE.is_match(tag) {
            story = Some(tag.to_string());
        } else {
            tags.push(tag.to_string());
        }
        rest = &rest[cap.get(0).map(|m| m.end()).unwrap_or(0)..];
    }

    let (description, depends_on) = match DEPENDS_ON_RE.find(rest) {
        Some(m) => {
            let deps = task_ids_in(&rest[m.end()..]);
            let desc = rest[..m.start()].trim_end().trim_end_matches('(').trim_end();
            (desc.to_string(), deps)
        }
        None => (rest.trim().to_string(), Vec::new()),
    };
    if description.is_empty() {
        return None;
    }

    let file_paths = FILE_PATH_RE
        .captures_iter(&description)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .filter(|p| !p.is_empty() && !p.chars().all(|c| c.is_ascii_digit() || c == '.'))
        .collect();

    let mut unique = Vec::new();
    for dep in depends_on {
        if !unique.contains(&dep) {
            unique.push(dep);
        }
    }

    Some(TaskRecord {
        id,
        description,
        phase,
        story,
        parallel,
        tags,
        depends_on: unique,
        file_paths,
        completed,
        line,
    })
}

fn parse_edge_line(line: &str, line_no: usize) -> Vec<DependencyEdge> {
    let text = line.trim().trim_start_matches(['-', '*']).trim();

    if let Some(m) = DEPENDS_ON_RE.find(text) {
        let lhs = task_ids_in(&text[..m.start()]);
        let Some(task) = lhs.first().copied() else {
            return Vec::new();
        };
        return task_ids_in(&text[m.end()..])
            .into_iter()
            .map(|depends_on| DependencyEdge {
                task,
                depends_on,
                line: line_no,
            })
            .collect();
    }

    if let Some(m) = ARROW_RE.find(text) {
        let Some(prerequisite) = task_ids_in(&text[..m.start()]).last().copied() else {
            return Vec::new();
        };
        return task_ids_in(&text[m.end()..])
            .into_iter()
            .map(|task| DependencyEdge {
                task,
                depends_on: prerequisite,
                line: line_no,
            })
            .collect();
    }

    Vec::new()
}
