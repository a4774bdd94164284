use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use courier_common::{DeliveryRecord, Message, MessageId};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::{
    DEFAULT_CLAIM_LEASE, QueueError,
    error::CacheError,
    r#trait::{CacheStore, QueueStore},
};

#[derive(Debug, Clone)]
struct Entry {
    message: Message,
    claimed_until: Option<Instant>,
}

impl Entry {
    fn is_claimable(&self, now: Instant) -> bool {
        !self.message.delivered
            && self.claimed_until.is_none_or(|until| until <= now)
            && self.message.is_valid()
    }
}

/// In-memory queue store
///
/// Messages live in a `Vec` in insertion order behind a single mutex, which
/// makes every claim atomic with respect to every other claim on the same
/// store. Only useful within one process: two processes each holding their own
/// `MemoryQueueStore` share nothing.
///
/// # Claim leases
/// A claimed message stays invisible to other claimants until it is marked
/// delivered, released, or `claim_lease` elapses. Lease expiry is what recovers
/// messages abandoned by a crashed or timed-out batch.
#[derive(Debug, Clone)]
pub struct MemoryQueueStore {
    entries: Arc<Mutex<Vec<Entry>>>,
    claim_lease: Duration,
}

impl MemoryQueueStore {
    /// Create a new empty store with the default claim lease
    #[must_use]
    pub fn new() -> Self {
        Self::with_claim_lease(DEFAULT_CLAIM_LEASE)
    }

    /// Create a new empty store with a custom claim lease
    #[must_use]
    pub fn with_claim_lease(claim_lease: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            claim_lease,
        }
    }

    /// Insert a message as-is, bypassing validation
    ///
    /// Used to seed stores with pre-existing rows, including malformed ones
    /// that claims must skip.
    pub fn insert(&self, message: Message) {
        self.entries.lock().push(Entry {
            message,
            claimed_until: None,
        });
    }

    /// Look up a message by id
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<Message> {
        self.entries
            .lock()
            .iter()
            .find(|entry| entry.message.id == *id)
            .map(|entry| entry.message.clone())
    }

    /// Number of messages in the store, delivered or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of messages not yet delivered
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| !entry.message.delivered)
            .count()
    }

    /// Number of delivered messages
    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.len() - self.pending_count()
    }

    /// The configured claim lease
    #[must_use]
    pub const fn claim_lease(&self) -> Duration {
        self.claim_lease
    }
}

impl Default for MemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue(&self, destination: &str, body: &str) -> crate::Result<Message> {
        let message = Message::new(destination, body)?;
        self.insert(message.clone());
        Ok(message)
    }

    async fn claim_unsent(&self, limit: usize) -> crate::Result<Vec<Message>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = Instant::now();
        let mut entries = self.entries.lock();

        let mut candidates: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_claimable(now))
            .map(|(index, _)| index)
            .collect();

        // Stable sort keeps insertion order for equal timestamps
        candidates.sort_by_key(|&index| entries[index].message.created_at);
        candidates.truncate(limit);

        let claimed_until = now + self.claim_lease;
        let claimed = candidates
            .into_iter()
            .map(|index| {
                let entry = &mut entries[index];
                entry.claimed_until = Some(claimed_until);
                entry.message.clone()
            })
            .collect();

        Ok(claimed)
    }

    async fn mark_delivered(&self, id: &MessageId) -> crate::Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.message.id == *id)
            .ok_or(QueueError::NotFound(*id))?;

        entry.message.delivered = true;
        entry.claimed_until = None;
        Ok(())
    }

    async fn release_claim(&self, id: &MessageId) -> crate::Result<()> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries
            .iter_mut()
            .find(|entry| entry.message.id == *id && !entry.message.delivered)
        {
            entry.claimed_until = None;
        }
        Ok(())
    }

    async fn delivered_messages(&self) -> crate::Result<Vec<Message>> {
        let mut delivered: Vec<Message> = self
            .entries
            .lock()
            .iter()
            .filter(|entry| entry.message.delivered)
            .map(|entry| entry.message.clone())
            .collect();

        delivered.sort_by_key(|message| message.created_at);
        Ok(delivered)
    }

    async fn clear(&self) -> crate::Result<usize> {
        let mut entries = self.entries.lock();
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }
}

/// In-memory delivery cache with per-entry expiry
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<DashMap<MessageId, (DeliveryRecord, Instant)>>,
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included until they are read
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn put(
        &self,
        id: &MessageId,
        record: &DeliveryRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries
            .insert(*id, (record.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn get_many(
        &self,
        ids: &[MessageId],
    ) -> Result<HashMap<MessageId, DeliveryRecord>, CacheError> {
        let now = Instant::now();
        let mut found = HashMap::with_capacity(ids.len());

        for id in ids {
            let live = self.entries.get(id).and_then(|entry| {
                let (record, expires_at) = entry.value();
                (*expires_at > now).then(|| record.clone())
            });

            match live {
                Some(record) => {
                    found.insert(*id, record);
                }
                None => {
                    self.entries.remove_if(id, |_, (_, expires_at)| *expires_at <= now);
                }
            }
        }

        Ok(found)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};

    use super::*;

    fn seeded(store: &MemoryQueueStore, count: usize) -> Vec<Message> {
        let base = Utc::now();
        (0..count)
            .map(|i| {
                let mut message = Message::new("+15550000000", format!("message {i}")).unwrap();
                message.created_at = base + ChronoDuration::milliseconds(i64::try_from(i).unwrap());
                store.insert(message.clone());
                message
            })
            .collect()
    }

    #[tokio::test]
    async fn test_claim_returns_oldest_first() {
        let store = MemoryQueueStore::new();
        let messages = seeded(&store, 3);

        let claimed = store.claim_unsent(2).await.unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].id, messages[0].id);
        assert_eq!(claimed[1].id, messages[1].id);
    }

    #[tokio::test]
    async fn test_claim_orders_by_creation_time_not_insertion() {
        let store = MemoryQueueStore::new();
        let mut newer = Message::new("+15550000000", "newer").unwrap();
        let older = Message::new("+15550000000", "older").unwrap();
        newer.created_at = older.created_at + ChronoDuration::seconds(5);
        store.insert(newer);
        store.insert(older.clone());

        let claimed = store.claim_unsent(1).await.unwrap();
        assert_eq!(claimed[0].id, older.id);
    }

    #[tokio::test]
    async fn test_claimed_messages_are_invisible_to_other_claims() {
        let store = MemoryQueueStore::new();
        seeded(&store, 3);

        let first = store.claim_unsent(2).await.unwrap();
        let second = store.claim_unsent(2).await.unwrap();

        assert_eq!(second.len(), 1);
        assert!(first.iter().all(|m| m.id != second[0].id));
        assert!(store.claim_unsent(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_makes_message_claimable_again() {
        let store = MemoryQueueStore::new();
        let messages = seeded(&store, 1);

        store.claim_unsent(1).await.unwrap();
        store.release_claim(&messages[0].id).await.unwrap();

        let reclaimed = store.claim_unsent(1).await.unwrap();
        assert_eq!(reclaimed[0].id, messages[0].id);
    }

    #[tokio::test]
    async fn test_expired_lease_makes_message_claimable_again() {
        let store = MemoryQueueStore::with_claim_lease(Duration::ZERO);
        let messages = seeded(&store, 1);

        store.claim_unsent(1).await.unwrap();
        let reclaimed = store.claim_unsent(1).await.unwrap();
        assert_eq!(reclaimed[0].id, messages[0].id);
    }

    #[tokio::test]
    async fn test_malformed_rows_are_skipped() {
        let store = MemoryQueueStore::new();
        let mut too_long = Message::new("+15550000000", "placeholder").unwrap();
        too_long.body = "x".repeat(courier_common::MAX_BODY_LEN + 1);
        let mut empty = Message::new("+15550000000", "placeholder").unwrap();
        empty.destination = String::new();
        store.insert(too_long);
        store.insert(empty);
        let valid = seeded(&store, 1);

        let claimed = store.claim_unsent(5).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, valid[0].id);
    }

    #[tokio::test]
    async fn test_mark_delivered_is_idempotent_and_monotonic() {
        let store = MemoryQueueStore::new();
        let messages = seeded(&store, 1);
        let id = messages[0].id;

        store.claim_unsent(1).await.unwrap();
        store.mark_delivered(&id).await.unwrap();
        store.mark_delivered(&id).await.unwrap();

        // Releasing a delivered message must not make it claimable
        store.release_claim(&id).await.unwrap();
        assert!(store.claim_unsent(1).await.unwrap().is_empty());
        assert!(store.get(&id).unwrap().delivered);
        assert_eq!(store.delivered_count(), 1);
    }

    #[tokio::test]
    async fn test_mark_unknown_message_is_not_found() {
        let store = MemoryQueueStore::new();
        let result = store.mark_delivered(&MessageId::generate()).await;
        assert!(matches!(result, Err(QueueError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid_shape() {
        let store = MemoryQueueStore::new();
        let result = store.enqueue("", "body").await;
        assert!(matches!(result, Err(QueueError::Validation(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_claim_zero_is_empty() {
        let store = MemoryQueueStore::new();
        seeded(&store, 2);
        assert!(store.claim_unsent(0).await.unwrap().is_empty());
        assert_eq!(store.claim_unsent(5).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_removes_pending_and_delivered() {
        let store = MemoryQueueStore::new();
        let messages = seeded(&store, 3);
        store.claim_unsent(1).await.unwrap();
        store.mark_delivered(&messages[0].id).await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 3);
        assert!(store.is_empty());
        assert!(store.claim_unsent(5).await.unwrap().is_empty());
        assert!(store.delivered_messages().await.unwrap().is_empty());
        assert_eq!(store.clear().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_clear() {
        let cache = MemoryCacheStore::new();
        let id = MessageId::generate();
        cache
            .put(&id, &DeliveryRecord::now("provider-1"), Duration::from_secs(60))
            .await
            .unwrap();

        cache.clear().await.unwrap();
        assert!(cache.is_empty());
        assert!(cache.get_many(&[id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_round_trip_and_misses() {
        let cache = MemoryCacheStore::new();
        let hit = MessageId::generate();
        let miss = MessageId::generate();
        let record = DeliveryRecord::now("provider-1");

        cache
            .put(&hit, &record, Duration::from_secs(60))
            .await
            .unwrap();

        let found = cache.get_many(&[hit, miss]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[&hit], record);
    }

    #[tokio::test]
    async fn test_cache_entries_expire() {
        let cache = MemoryCacheStore::new();
        let id = MessageId::generate();

        cache
            .put(&id, &DeliveryRecord::now("provider-1"), Duration::ZERO)
            .await
            .unwrap();

        assert!(cache.get_many(&[id]).await.unwrap().is_empty());
        assert!(cache.is_empty());
    }
}
