//! Typed error handling for delivery operations.
//!
//! This module provides structured error types that distinguish between:
//! - Permanent failures (provider rejected the message) - resending will not help
//! - Temporary failures (provider outage, timeouts) - a later cycle may succeed
//! - System errors - misconfiguration and internal errors
//!
//! Queue and lock failures abort a cycle; per-message failures are logged and
//! counted but never cross the batch boundary.

use std::time::Duration;

use courier_common::ValidationError;
use courier_lock::LockError;
use courier_queue::QueueError;
use thiserror::Error;

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Permanent failure that resending will not fix.
    #[error("Permanent failure: {0}")]
    Permanent(#[from] PermanentError),

    /// Temporary failure that a later cycle may get past.
    #[error("Temporary failure: {0}")]
    Temporary(#[from] TemporaryError),

    /// System-level error (configuration, internal errors, etc.).
    #[error("System error: {0}")]
    System(#[from] SystemError),

    /// The batch did not finish within the processing timeout.
    #[error("Batch processing timed out after {0:?}")]
    Timeout(Duration),

    /// Some messages in the batch failed.
    #[error("Batch partially failed: {succeeded} delivered, {failed} failed")]
    PartialFailure { succeeded: usize, failed: usize },

    /// The queue could not be read or updated.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// The distributed lock could not be taken or kept.
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),
}

/// Permanent errors: the provider will keep refusing this message.
#[derive(Debug, Error)]
pub enum PermanentError {
    /// The provider rejected the request (4xx other than rate limiting).
    #[error("Rejected by provider with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The message violates the shape limits.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// The provider accepted the request but its reply could not be read.
    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Temporary errors: the provider or network is struggling.
#[derive(Debug, Error)]
pub enum TemporaryError {
    /// Failed to reach the provider.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The provider did not answer within the request timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The provider asked us to slow down.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The provider failed with a 5xx status.
    #[error("Provider error with status {status}: {body}")]
    ServerError { status: u16, body: String },
}

/// System-level errors that indicate internal problems.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Other internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// Returns `true` if this error is temporary and a later cycle may succeed.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Returns `true` if this error is permanent.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Returns `true` if this is a system error.
    #[must_use]
    pub const fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }

    /// Returns `true` if the batch was cut short by the processing timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns `true` if another instance holds the lock for this cycle.
    #[must_use]
    pub const fn is_lock_contended(&self) -> bool {
        matches!(self, Self::Lock(LockError::Contended))
    }
}

impl From<ValidationError> for DeliveryError {
    fn from(error: ValidationError) -> Self {
        Self::Permanent(PermanentError::InvalidMessage(error.to_string()))
    }
}

/// Transport errors are classified by what went wrong:
///
/// - **Timeouts** → Temporary
/// - **Connect failures** → Temporary
/// - **Undecodable bodies** → Permanent
/// - **Request building** → System
impl From<reqwest::Error> for DeliveryError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Temporary(TemporaryError::Timeout(error.to_string()))
        } else if error.is_connect() {
            Self::Temporary(TemporaryError::ConnectionFailed(error.to_string()))
        } else if error.is_decode() {
            Self::Permanent(PermanentError::InvalidResponse(error.to_string()))
        } else if error.is_builder() {
            Self::System(SystemError::Configuration(error.to_string()))
        } else {
            Self::Temporary(TemporaryError::ConnectionFailed(error.to_string()))
        }
    }
}
