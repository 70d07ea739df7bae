//! Implementation plan outline

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{Heading, heading, is_fence, plain};

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*+]|\d+\.)\s+(.+)$").expect("valid regex"));

const COMPONENT_SECTIONS: &[&str] = &["component", "module", "architecture", "structure"];
const TECHNICAL_CONTEXT: &[&str] = &["technical context", "tech stack", "technology stack"];

/// Headings and component list of a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOutline {
    pub headings: Vec<Heading>,
    /// Top-level list items under component, module, architecture or structure sections
    pub components: Vec<String>,
    pub has_technical_context: bool,
    pub has_constitution_check: bool,
}

impl PlanOutline {
    /// Case-insensitive search over headings and components
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.headings.iter().any(|h| h.title.to_lowercase().contains(&needle))
            || self.components.iter().any(|c| c.to_lowercase().contains(&needle))
    }
}

pub fn parse_plan(text: &str) -> PlanOutline {
    let mut outline = PlanOutline::default();
    let mut component_section: Option<usize> = None;
    let mut in_fence = false;

    for (idx, line) in text.lines().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        if let Some(h) = heading(line, idx + 1) {
            let lower = h.title.to_lowercase();
            if TECHNICAL_CONTEXT.iter().any(|t| lower.contains(t)) {
                outline.has_technical_context = true;
            }
            if lower.contains("constitution") {
                outline.has_constitution_check = true;
            }
            if component_section.is_some_and(|level| h.level <= level) {
                component_section = None;
            }
            if COMPONENT_SECTIONS.iter().any(|c| lower.contains(c)) {
                component_section = Some(h.level);
            }
            outline.headings.push(h);
            continue;
        }

        if component_section.is_some()
            && let Some(cap) = LIST_ITEM_RE.captures(line)
            && let Some(item) = cap.get(1)
        {
            let name = component_name(item.as_str());
            if !name.is_empty() {
                outline.components.push(name);
            }
        }
    }

    tracing::debug!(
        headings = outline.headings.len(),
        components = outline.components.len(),
        "parse_plan: done"
    );
    outline
}

/// `**Store**: persists tasks` -> `Store`
fn component_name(item: &str) -> String {
    let text = plain(item);
    let head = text
        .split_once(": ")
        .map(|(h, _)| h)
        .or_else(|| text.split_once(" - ").map(|(h, _)| h))
        .unwrap_or(&text);
    head.trim().trim_end_matches(':').trim().to_string()
}
