//! Delivery of queued messages to an outbound provider
//!
//! This crate provides functionality to:
//! - Claim batches of pending messages and send them through a provider
//! - Record deliveries in the queue and the delivery cache
//! - Run batches on a schedule, optionally behind a distributed lock
//! - Report delivered messages with their cached delivery metadata

mod error;
mod processor;
pub mod provider;
mod scheduler;
mod service;

// Re-export error types
pub use error::{DeliveryError, PermanentError, SystemError, TemporaryError};
// Re-export core types
pub use processor::{BatchOutcome, BatchProcessor, DeliveryConfig};
pub use provider::{DeliveryProvider, HttpDeliveryProvider, ProviderConfig, ProviderReceipt};
pub use scheduler::{Scheduler, SchedulerStatus};
pub use service::DeliveryQueryService;
