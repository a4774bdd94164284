//! Error types for the courier-queue crate.
//!
//! Queue errors are delivery-relevant: a failed claim abandons the cycle and a
//! failed mark leaves the message undelivered. Cache errors never affect
//! delivery correctness and callers are expected to swallow them.

use courier_common::{MessageId, ValidationError};
use thiserror::Error;

/// Top-level queue error type.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No message with this identifier exists.
    #[error("Message not found: {0}")]
    NotFound(MessageId),

    /// The message violates the shape limits and was not stored.
    #[error("Invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// The backing store is unreachable or rejected the operation.
    #[error("Queue backend error: {0}")]
    Backend(String),

    /// Internal error (task join failure, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Returns `true` if the store itself is failing, as opposed to the request
    /// being wrong.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Internal(_))
    }
}

/// Errors from the best-effort delivery cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache is unreachable or rejected the operation.
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// A record could not be encoded or decoded.
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<tokio::task::JoinError> for QueueError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Store task failed: {e}"))
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<tokio::task::JoinError> for CacheError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Backend(format!("Cache task failed: {e}"))
    }
}

/// Specialized `Result` type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
