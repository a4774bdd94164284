//! Control server error types

use thiserror::Error;

/// Errors that can occur while running the control server
#[derive(Debug, Error)]
pub enum ControlError {
    /// Failed to bind to the specified address
    #[error("Failed to bind control server to {address}: {source}")]
    BindError {
        address: String,
        source: std::io::Error,
    },

    /// Control server encountered a runtime error
    #[error("Control server error: {0}")]
    ServerError(String),
}
