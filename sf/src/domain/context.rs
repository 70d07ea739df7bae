//! Seed context shared read-only by every phase

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ArtifactLocation;

/// The two seed documents plus the target technology descriptor
///
/// Created once by the context loader and shared behind an `Arc`; nothing
/// mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextData {
    principles_text: String,
    specification_text: String,
    tech_stack: String,
    loaded_at: DateTime<Utc>,
    principles_location: ArtifactLocation,
    specification_location: ArtifactLocation,
}

impl ContextData {
    pub fn new(
        principles_text: String,
        specification_text: String,
        tech_stack: String,
        loaded_at: DateTime<Utc>,
        principles_location: ArtifactLocation,
        specification_location: ArtifactLocation,
    ) -> Self {
        Self {
            principles_text,
            specification_text,
            tech_stack,
            loaded_at,
            principles_location,
            specification_location,
        }
    }

    pub fn principles_text(&self) -> &str {
        &self.principles_text
    }

    pub fn specification_text(&self) -> &str {
        &self.specification_text
    }

    pub fn tech_stack(&self) -> &str {
        &self.tech_stack
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn principles_location(&self) -> &ArtifactLocation {
        &self.principles_location
    }

    pub fn specification_location(&self) -> &ArtifactLocation {
        &self.specification_location
    }

    /// Reference form used in snapshots
    pub fn to_ref(&self) -> ContextRef {
        ContextRef {
            principles: self.principles_location.clone(),
            specification: self.specification_location.clone(),
            tech_stack: self.tech_stack.clone(),
            loaded_at: self.loaded_at,
        }
    }
}

/// Snapshot projection of `ContextData`: locations instead of content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRef {
    pub principles: ArtifactLocation,
    pub specification: ArtifactLocation,
    pub tech_stack: String,
    pub loaded_at: DateTime<Utc>,
}
