//! Artifact domain types
//!
//! An artifact is the validated, persisted output of one generation phase.
//! It is built once, right after a successful gateway call, and never patched:
//! regenerating produces a new value.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::parse::{ImplementationBundle, PlanOutline, TaskList};
use crate::validation::ValidationReport;

/// SHA-256 of `content`, lowercase hex
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Handle to persisted content: a store-relative path plus its digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactLocation {
    /// Path relative to the artifact store root
    pub path: String,
    /// SHA-256 of the content at the time it was written or read
    pub sha256: String,
    /// Content length in bytes
    pub bytes: usize,
}

impl ArtifactLocation {
    /// Describe `content` stored at `path`
    pub fn for_content(path: impl Into<String>, content: &str) -> Self {
        Self {
            path: path.into(),
            sha256: content_digest(content),
            bytes: content.len(),
        }
    }

    /// Whether `content` is what this location recorded
    pub fn matches(&self, content: &str) -> bool {
        self.bytes == content.len() && self.sha256 == content_digest(content)
    }
}

impl std::fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Generated text, its structured decomposition, validation report, and where it lives
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact<T> {
    raw: String,
    structured: T,
    report: ValidationReport,
    location: ArtifactLocation,
    extracted: Vec<ArtifactLocation>,
}

impl<T> Artifact<T> {
    pub fn new(
        raw: String,
        structured: T,
        report: ValidationReport,
        location: ArtifactLocation,
        extracted: Vec<ArtifactLocation>,
    ) -> Self {
        Self {
            raw,
            structured,
            report,
            location,
            extracted,
        }
    }

    /// Raw generated text
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Structured decomposition of the raw text
    pub fn structured(&self) -> &T {
        &self.structured
    }

    /// Validation report attached at creation
    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    /// Where the raw text was persisted
    pub fn location(&self) -> &ArtifactLocation {
        &self.location
    }

    /// Additional files extracted from the artifact (implementation only)
    pub fn extracted(&self) -> &[ArtifactLocation] {
        &self.extracted
    }
}

/// Implementation plan artifact
pub type PlanArtifact = Artifact<PlanOutline>;

/// Task list artifact
pub type TaskArtifact = Artifact<TaskList>;

/// Implementation bundle artifact
pub type ImplementationArtifact = Artifact<ImplementationBundle>;

/// Output of any phase generator, tagged by kind
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedArtifact {
    Plan(PlanArtifact),
    Tasks(TaskArtifact),
    Implementation(ImplementationArtifact),
}

impl GeneratedArtifact {
    pub fn raw(&self) -> &str {
        match self {
            Self::Plan(a) => a.raw(),
            Self::Tasks(a) => a.raw(),
            Self::Implementation(a) => a.raw(),
        }
    }

    pub fn report(&self) -> &ValidationReport {
        match self {
            Self::Plan(a) => a.report(),
            Self::Tasks(a) => a.report(),
            Self::Implementation(a) => a.report(),
        }
    }

    pub fn location(&self) -> &ArtifactLocation {
        match self {
            Self::Plan(a) => a.location(),
            Self::Tasks(a) => a.location(),
            Self::Implementation(a) => a.location(),
        }
    }

    pub fn extracted(&self) -> &[ArtifactLocation] {
        match self {
            Self::Plan(a) => a.extracted(),
            Self::Tasks(a) => a.extracted(),
            Self::Implementation(a) => a.extracted(),
        }
    }

    /// Count of structured items (components, tasks, or code blocks)
    pub fn item_count(&self) -> usize {
        match self {
            Self::Plan(a) => a.structured().components.len(),
            Self::Tasks(a) => a.structured().tasks.len(),
            Self::Implementation(a) => a.structured().blocks.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_hex() {
        let a = content_digest("hello");
        assert_eq!(a.len(), 64);
        assert_eq!(a, content_digest("hello"));
        assert_ne!(a, content_digest("hello "));
        assert_eq!(a, "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
    }

    #[test]
    fn test_location_matches() {
        let loc = ArtifactLocation::for_content("outputs/plan.md", "# Plan");
        assert!(loc.matches("# Plan"));
        assert!(!loc.matches("# Plan v2"));
        assert_eq!(loc.to_string(), "outputs/plan.md");
    }
}
