use std::time::Duration;

pub mod backends;
pub mod config;
pub mod error;
pub mod r#trait;

pub use backends::{MemoryCacheStore, MemoryQueueStore, SqliteStore, TestQueueStore};
pub use config::{MemoryConfig, QueueConfig, SqliteConfig, Stores};
pub use error::{CacheError, QueueError, Result};
pub use r#trait::{CacheStore, QueueStore};

/// Default time a claim hides a message from other claimants
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(60);
