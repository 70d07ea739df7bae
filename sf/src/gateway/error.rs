//! Agent gateway error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during an agent call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Agent exited with {status}: {message}")]
    Failed { status: i32, message: String },

    #[error("Failed to start agent: {0}")]
    Spawn(String),

    #[error("Agent returned no output")]
    Empty,
}

impl GatewayError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout(_))
    }

    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Timeout(_) => true,
            GatewayError::Failed { .. } => true,
            GatewayError::Empty => true,
            GatewayError::Spawn(_) => false,
        }
    }
}
