use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Result, store::LockStore};

#[derive(Debug, Clone)]
struct Entry {
    token: String,
    expires_at: Instant,
}

/// In-process lock store
///
/// Every operation runs under a single mutex, which makes compare-and-act
/// atomic. Handles only exclude each other when they share one store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryLockStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current live token for `key`, if any
    #[must_use]
    pub fn token(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.token.clone())
    }

    /// Drop `key` regardless of holder, as if its TTL had run out
    pub fn expire(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if entries.get(key).is_some_and(|entry| entry.expires_at > now) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                token: token.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let matches = entries
            .get(key)
            .is_some_and(|entry| entry.token == token && entry.expires_at > now);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn compare_and_expire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get_mut(key) {
            Some(entry) if entry.token == token && entry.expires_at > now => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
