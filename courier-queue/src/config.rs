use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::Deserialize;

use crate::{
    DEFAULT_CLAIM_LEASE,
    backends::{MemoryCacheStore, MemoryQueueStore, SqliteStore},
    r#trait::{CacheStore, QueueStore},
};

/// Configuration for the queue and delivery cache
///
/// Selects the backing implementation at runtime from configuration files.
///
/// # Examples
///
/// Memory-backed queue (single process, lost on restart):
/// ```ron
/// Courier (
///     queue: (
///         type: "Memory",
///     ),
/// )
/// ```
///
/// SQLite-backed queue shared by every instance opening the same file:
/// ```ron
/// Courier (
///     queue: (
///         type: "Sqlite",
///         path: "/var/lib/courier/courier.db",
///         claim_lease_secs: 60,
///     ),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum QueueConfig {
    /// In-process queue and cache
    Memory(MemoryConfig),
    /// SQLite database file holding both the queue and the cache
    Sqlite(SqliteConfig),
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::Memory(MemoryConfig::default())
    }
}

/// Configuration for the memory-backed queue
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// How long a claim hides a message from other claimants
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            claim_lease_secs: default_claim_lease_secs(),
        }
    }
}

/// Configuration for the SQLite-backed queue
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Database file; created if missing
    pub path: PathBuf,

    /// How long a claim hides a message from other claimants
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
}

const fn default_claim_lease_secs() -> u64 {
    DEFAULT_CLAIM_LEASE.as_secs()
}

/// Queue and cache handles built from a [`QueueConfig`]
#[derive(Debug, Clone)]
pub struct Stores {
    pub queue: Arc<dyn QueueStore>,
    pub cache: Arc<dyn CacheStore>,
}

impl QueueConfig {
    /// The configured claim lease
    #[must_use]
    pub const fn claim_lease(&self) -> Duration {
        match self {
            Self::Memory(config) => Duration::from_secs(config.claim_lease_secs),
            Self::Sqlite(config) => Duration::from_secs(config.claim_lease_secs),
        }
    }

    /// Database path for SQLite-backed queues
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Memory(_) => None,
            Self::Sqlite(config) => Some(&config.path),
        }
    }

    /// Open the configured backend
    ///
    /// # Errors
    /// If the SQLite database cannot be opened or initialised
    pub fn into_stores(self) -> crate::Result<Stores> {
        let claim_lease = self.claim_lease();
        match self {
            Self::Memory(_) => Ok(Stores {
                queue: Arc::new(MemoryQueueStore::with_claim_lease(claim_lease)),
                cache: Arc::new(MemoryCacheStore::new()),
            }),
            Self::Sqlite(config) => {
                let store = SqliteStore::open_with_claim_lease(&config.path, claim_lease)?;
                Ok(Stores {
                    queue: Arc::new(store.clone()),
                    cache: Arc::new(store),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config_defaults() {
        let config: QueueConfig = ron::from_str(r#"(type: "Memory")"#).unwrap();
        assert!(matches!(config, QueueConfig::Memory(_)));
        assert_eq!(config.claim_lease(), DEFAULT_CLAIM_LEASE);
        assert!(config.path().is_none());
    }

    #[test]
    fn test_sqlite_config() {
        let config: QueueConfig =
            ron::from_str(r#"(type: "Sqlite", path: "/tmp/courier.db", claim_lease_secs: 5)"#)
                .unwrap();
        assert_eq!(config.claim_lease(), Duration::from_secs(5));
        assert_eq!(
            config.path(),
            Some(std::path::Path::new("/tmp/courier.db"))
        );
    }

    #[tokio::test]
    async fn test_into_stores_shares_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = QueueConfig::Sqlite(SqliteConfig {
            path: dir.path().join("courier.db"),
            claim_lease_secs: 60,
        });

        let stores = config.into_stores().unwrap();
        let message = stores.queue.enqueue("+15550000000", "hi").await.unwrap();
        assert_eq!(stores.queue.claim_unsent(1).await.unwrap()[0].id, message.id);
    }
}
