//! Batch delivery processing

mod batch;

use std::{sync::Arc, time::Duration};

use courier_queue::{CacheStore, QueueStore};
use serde::Deserialize;

use crate::provider::DeliveryProvider;

pub use batch::BatchOutcome;

const fn default_batch_size() -> usize {
    2
}

const fn default_interval() -> u64 {
    120
}

const fn default_processing_timeout() -> u64 {
    30
}

const fn default_cache_ttl() -> u64 {
    courier_common::DEFAULT_CACHE_TTL.as_secs()
}

/// Delivery cadence and batch limits
///
/// # Example
/// ```ron
/// delivery: (
///     batch_size: 2,
///     interval_secs: 120,
///     processing_timeout_secs: 30,
///     autostart: true,
/// ),
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Messages claimed per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Time between cycles (seconds)
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Upper bound on one batch, which also bounds how long a stop can block
    /// (seconds)
    #[serde(default = "default_processing_timeout")]
    pub processing_timeout_secs: u64,

    /// How long delivery records stay in the cache (seconds)
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Start the scheduler as soon as the service is up
    #[serde(default)]
    pub autostart: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            interval_secs: default_interval(),
            processing_timeout_secs: default_processing_timeout(),
            cache_ttl_secs: default_cache_ttl(),
            autostart: false,
        }
    }
}

impl DeliveryConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }

    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Claims a batch of messages, sends each, and records the results
///
/// Holds no lock and no schedule of its own; the [`crate::Scheduler`] decides
/// when a batch runs and whether this instance may run it.
#[derive(Debug)]
pub struct BatchProcessor {
    pub(crate) queue: Arc<dyn QueueStore>,
    pub(crate) cache: Arc<dyn CacheStore>,
    pub(crate) provider: Arc<dyn DeliveryProvider>,
    batch_size: usize,
    processing_timeout: Duration,
    cache_ttl: Duration,
}

impl BatchProcessor {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        cache: Arc<dyn CacheStore>,
        provider: Arc<dyn DeliveryProvider>,
        config: &DeliveryConfig,
    ) -> Self {
        Self {
            queue,
            cache,
            provider,
            batch_size: config.batch_size,
            processing_timeout: config.processing_timeout(),
            cache_ttl: config.cache_ttl(),
        }
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub const fn processing_timeout(&self) -> Duration {
        self.processing_timeout
    }

    pub fn queue(&self) -> &Arc<dyn QueueStore> {
        &self.queue
    }
}
