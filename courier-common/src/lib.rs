//! Shared building blocks for the courier dispatcher
//!
//! This crate holds the pieces every other courier crate agrees on:
//! - The outbound [`Message`] and the cached [`DeliveryRecord`]
//! - Message shape limits and validation
//! - The process-wide shutdown [`Signal`]
//! - Logging initialisation and the `internal!` family of macros

pub mod error;
pub mod logging;
pub mod message;

pub use error::ValidationError;
pub use message::{
    DEFAULT_CACHE_TTL, DeliveryRecord, MAX_BODY_LEN, MAX_DESTINATION_LEN, Message, MessageId, SentMessage,
};
pub use tracing;

/// Process-wide lifecycle signal broadcast to long-running services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Stop accepting new work and wind down
    Shutdown,
    /// Everything has wound down
    Finalised,
}
