//! Agent gateway
//!
//! The external text generator: a prompt goes in, markdown comes out. The
//! workflow core only depends on the [`AgentGateway`] trait.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

mod command;
mod error;

pub use command::CommandGateway;
pub use error::GatewayError;

use crate::config::GatewayConfig;

/// Stateless generation call - each prompt starts a fresh conversation
#[async_trait]
pub trait AgentGateway: Send + Sync {
    /// Send `prompt`, wait at most `timeout` for the generated text
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GatewayError>;
}

/// Build the configured gateway, running the agent inside `workdir`
pub fn create_gateway(config: &GatewayConfig, workdir: &Path) -> Arc<dyn AgentGateway> {
    debug!(program = %config.program, ?workdir, "create_gateway: called");
    Arc::new(CommandGateway::from_config(config).with_working_dir(workdir))
}
