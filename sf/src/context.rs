//! Context loader: reads the two seed documents into an immutable `ContextData`

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::domain::{ArtifactLocation, ContextData};
use crate::error::WorkflowError;
use crate::store::{ArtifactStore, StoreError};

/// Stateless; safe to share between concurrent runs
#[derive(Clone)]
pub struct ContextLoader {
    store: Arc<dyn ArtifactStore>,
}

impl ContextLoader {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Read both seeds; absent or whitespace-only input is `MissingInput`
    pub async fn load(
        &self,
        principles: &str,
        specification: &str,
        tech_stack: &str,
    ) -> Result<ContextData, WorkflowError> {
        debug!(%principles, %specification, %tech_stack, "ContextLoader::load: called");
        let (principles_text, principles_location) = self.read_seed(principles).await?;
        let (specification_text, specification_location) = self.read_seed(specification).await?;

        Ok(ContextData::new(
            principles_text,
            specification_text,
            tech_stack.to_string(),
            Utc::now(),
            principles_location,
            specification_location,
        ))
    }

    async fn read_seed(&self, name: &str) -> Result<(String, ArtifactLocation), WorkflowError> {
        let text = match self.store.read(name).await {
            Ok(text) => text,
            Err(StoreError::NotFound(_)) => {
                debug!(%name, "ContextLoader::read_seed: not found");
                return Err(WorkflowError::MissingInput { name: name.to_string() });
            }
            Err(e) => return Err(e.into()),
        };
        if text.trim().is_empty() {
            debug!(%name, "ContextLoader::read_seed: empty");
            return Err(WorkflowError::MissingInput { name: name.to_string() });
        }
        let location = ArtifactLocation::for_content(name, &text);
        Ok((text, location))
    }
}
