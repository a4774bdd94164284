//! Service trait abstraction for delivery reporting
//!
//! Decouples the control surface from the concrete [`BatchProcessor`], so
//! handlers can be tested against a stub.

use std::collections::HashMap;

use async_trait::async_trait;
use courier_common::{SentMessage, tracing};

use crate::{error::DeliveryError, processor::BatchProcessor};

/// Read-side queries over delivered messages
#[async_trait]
pub trait DeliveryQueryService: Send + Sync {
    /// All delivered messages, oldest first, enriched with whatever delivery
    /// metadata the cache still holds
    ///
    /// Cache outages degrade to unenriched results rather than failing.
    ///
    /// # Errors
    /// If the queue cannot be read
    async fn sent_messages(&self) -> Result<Vec<SentMessage>, DeliveryError>;
}

#[async_trait]
impl DeliveryQueryService for BatchProcessor {
    async fn sent_messages(&self) -> Result<Vec<SentMessage>, DeliveryError> {
        let messages = self.queue.delivered_messages().await?;
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<_> = messages.iter().map(|message| message.id).collect();
        let mut records = self.cache.get_many(&ids).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Delivery cache unavailable, returning unenriched results");
            HashMap::new()
        });

        Ok(messages
            .into_iter()
            .map(|message| {
                let record = records.remove(&message.id);
                SentMessage::new(message, record)
            })
            .collect())
    }
}
