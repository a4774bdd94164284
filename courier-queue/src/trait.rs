use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use courier_common::{DeliveryRecord, Message, MessageId};

use crate::error::{CacheError, Result};

/// Durable, ordered store of outbound messages
///
/// Implementations must provide claim-and-skip semantics: a message returned
/// by [`QueueStore::claim_unsent`] is invisible to every other claimant until
/// it is marked delivered, released, or its claim lease runs out. Two
/// concurrent claims therefore never return overlapping sets.
#[async_trait]
pub trait QueueStore: Send + Sync + std::fmt::Debug {
    /// Insert a new, undelivered message and return it with its assigned id
    ///
    /// # Errors
    /// If the message fails shape validation or the store rejects the write
    async fn enqueue(&self, destination: &str, body: &str) -> Result<Message>;

    /// Claim up to `limit` undelivered messages, oldest first
    ///
    /// Rows failing the shape limits are never returned. Fewer than `limit`
    /// (including zero) is a normal outcome.
    ///
    /// # Errors
    /// If the store is unreachable
    async fn claim_unsent(&self, limit: usize) -> Result<Vec<Message>>;

    /// Mark a message as delivered
    ///
    /// Idempotent: marking an already-delivered message succeeds without
    /// changing anything.
    ///
    /// # Errors
    /// [`crate::QueueError::NotFound`] for unknown ids, or a backend error
    async fn mark_delivered(&self, id: &MessageId) -> Result<()>;

    /// Give up a claim so the message is eligible for the next claim
    ///
    /// A no-op for delivered, unclaimed, or unknown messages.
    ///
    /// # Errors
    /// If the store is unreachable
    async fn release_claim(&self, id: &MessageId) -> Result<()>;

    /// All delivered messages, oldest first
    ///
    /// # Errors
    /// If the store is unreachable
    async fn delivered_messages(&self) -> Result<Vec<Message>>;

    /// Remove every message, delivered or not, and return how many were removed
    ///
    /// # Errors
    /// If the store is unreachable
    async fn clear(&self) -> Result<usize>;
}

/// Best-effort key-value store for delivery metadata
///
/// Absence on read is never an error: it means a miss, an outage, or a
/// message sent before caching was available.
#[async_trait]
pub trait CacheStore: Send + Sync + std::fmt::Debug {
    /// Store a delivery record that expires after `ttl`
    ///
    /// # Errors
    /// If the cache is unreachable or the record cannot be encoded
    async fn put(
        &self,
        id: &MessageId,
        record: &DeliveryRecord,
        ttl: Duration,
    ) -> std::result::Result<(), CacheError>;

    /// Fetch the live records for `ids`; missing ids are simply absent
    ///
    /// # Errors
    /// If the cache is unreachable or a record cannot be decoded
    async fn get_many(
        &self,
        ids: &[MessageId],
    ) -> std::result::Result<HashMap<MessageId, DeliveryRecord>, CacheError>;

    /// Drop every record
    ///
    /// # Errors
    /// If the cache is unreachable
    async fn clear(&self) -> std::result::Result<(), CacheError>;
}
