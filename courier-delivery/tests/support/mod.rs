#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use courier_common::{DeliveryRecord, MessageId};
use courier_delivery::{
    BatchProcessor, DeliveryConfig, DeliveryError, DeliveryProvider, PermanentError,
    ProviderReceipt, TemporaryError,
};
use courier_lock::{LockError, LockStore, MemoryLockStore};
use courier_queue::{CacheError, CacheStore, MemoryCacheStore, QueueStore};
use parking_lot::Mutex;

/// Provider that succeeds unless told otherwise, optionally slowly
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    rejected: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
    delay: Mutex<Option<Duration>>,
    sent: Mutex<Vec<(String, String)>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject every send to `destination`
    pub fn reject(&self, destination: &str) {
        self.rejected.lock().insert(destination.to_string());
    }

    pub fn accept(&self, destination: &str) {
        self.rejected.lock().remove(destination);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Accepted sends as `(destination, body)`
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    /// Every call, accepted or not
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryProvider for ScriptedProvider {
    async fn send(&self, destination: &str, body: &str) -> Result<ProviderReceipt, DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TemporaryError::ConnectionFailed("connection refused".to_string()).into());
        }
        if self.rejected.lock().contains(destination) {
            return Err(PermanentError::Rejected {
                status: 400,
                body: "invalid destination".to_string(),
            }
            .into());
        }

        let mut sent = self.sent.lock();
        sent.push((destination.to_string(), body.to_string()));
        Ok(ProviderReceipt {
            message: "Accepted".to_string(),
            message_id: format!("provider-{}", sent.len()),
        })
    }
}

/// Cache that is always down
#[derive(Debug, Default)]
pub struct FailingCache;

#[async_trait]
impl CacheStore for FailingCache {
    async fn put(
        &self,
        _id: &MessageId,
        _record: &DeliveryRecord,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn get_many(
        &self,
        _ids: &[MessageId],
    ) -> Result<HashMap<MessageId, DeliveryRecord>, CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        Err(CacheError::Backend("connection refused".to_string()))
    }
}

/// Lock store whose extensions and releases can be made to fail
#[derive(Debug, Default)]
pub struct FlakyLockStore {
    pub inner: MemoryLockStore,
    fail_extend: AtomicBool,
    fail_release: AtomicBool,
    acquire_attempts: AtomicUsize,
    extend_attempts: AtomicUsize,
}

impl FlakyLockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_extensions(&self, fail: bool) {
        self.fail_extend.store(fail, Ordering::SeqCst);
    }

    /// Fail the next release with a store error
    pub fn fail_next_release(&self) {
        self.fail_release.store(true, Ordering::SeqCst);
    }

    pub fn acquire_attempts(&self) -> usize {
        self.acquire_attempts.load(Ordering::SeqCst)
    }

    pub fn extend_attempts(&self) -> usize {
        self.extend_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LockStore for FlakyLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> courier_lock::Result<bool> {
        self.acquire_attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.set_if_absent(key, token, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> courier_lock::Result<bool> {
        if self.fail_release.swap(false, Ordering::SeqCst) {
            return Err(LockError::Store("connection reset".to_string()));
        }
        self.inner.compare_and_delete(key, token).await
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> courier_lock::Result<bool> {
        self.extend_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_extend.load(Ordering::SeqCst) {
            return Err(LockError::Store("connection refused".to_string()));
        }
        self.inner.compare_and_expire(key, token, ttl).await
    }
}

pub fn config(batch_size: usize) -> DeliveryConfig {
    DeliveryConfig {
        batch_size,
        interval_secs: 10,
        ..DeliveryConfig::default()
    }
}

pub fn processor(
    queue: Arc<dyn QueueStore>,
    provider: Arc<ScriptedProvider>,
    config: &DeliveryConfig,
) -> Arc<BatchProcessor> {
    Arc::new(BatchProcessor::new(
        queue,
        Arc::new(MemoryCacheStore::new()),
        provider,
        config,
    ))
}
