//! Principle and entity extraction from seed documents

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{heading, is_fence, plain};

/// Section titles that organise a constitution but are not principles themselves
const GENERIC_SECTIONS: &[&str] = &[
    "core principles",
    "principles",
    "governance",
    "additional constraints",
    "sections",
];

/// Headings in a specification that name structure rather than entities
const GENERIC_SPEC_HEADINGS: &[&str] = &[
    "overview",
    "summary",
    "introduction",
    "purpose",
    "scope",
    "purpose & scope",
    "requirements",
    "functional requirements",
    "non-functional requirements",
    "user stories",
    "user scenarios",
    "glossary",
    "notes",
    "open questions",
    "edge cases",
    "success criteria",
    "assumptions",
];

static BOLD_TERM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*\n]{2,60})\*\*").expect("valid regex"));

/// Principle names found in a constitution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principles(pub Vec<String>);

impl Principles {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

/// Level 2 and 3 headings that are not generic organising sections
pub fn extract_principles(constitution: &str) -> Principles {
    let mut principles = Vec::new();
    let mut in_fence = false;
    for (idx, line) in constitution.lines().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(h) = heading(line, idx + 1)
            && (2..=3).contains(&h.level)
        {
            let title = plain(&h.title);
            if !GENERIC_SECTIONS.contains(&title.to_lowercase().as_str()) {
                principles.push(title);
            }
        }
    }
    Principles(principles)
}

/// Named entities of a specification: non-generic headings and bold terms
///
/// Heading numbering like `3.` or `4.1` is stripped. Result is sorted and
/// deduplicated case-insensitively.
pub fn named_entities(specification: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut entities = Vec::new();
    let mut push = |candidate: String| {
        let key = candidate.to_lowercase();
        if candidate.len() >= 3 && !GENERIC_SPEC_HEADINGS.contains(&key.as_str()) && seen.insert(key) {
            entities.push(candidate);
        }
    };

    let mut in_fence = false;
    for (idx, line) in specification.lines().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(h) = heading(line, idx + 1) {
            if h.level >= 2 {
                push(strip_numbering(&plain(&h.title)));
            }
            continue;
        }
        for cap in BOLD_TERM_RE.captures_iter(line) {
            if let Some(m) = cap.get(1) {
                push(plain(m.as_str()).trim_end_matches(':').trim().to_string());
            }
        }
    }
    entities.sort_by_key(|e| e.to_lowercase());
    entities
}

fn strip_numbering(title: &str) -> String {
    title
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.')
        .trim()
        .to_string()
}
