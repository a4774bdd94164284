use courier_common::{DeliveryRecord, Message, tracing};
use serde::Serialize;

use super::BatchProcessor;
use crate::error::DeliveryError;

/// Counts from one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Messages claimed from the queue
    pub claimed: usize,
    /// Messages sent and marked delivered
    pub delivered: usize,
    /// Messages whose send or mark failed
    pub failed: usize,
}

impl BatchOutcome {
    /// Whether every claimed message was delivered
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Treat any per-message failure as an error
    ///
    /// # Errors
    /// [`DeliveryError::PartialFailure`] if any message failed
    pub fn into_result(self) -> Result<Self, DeliveryError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(DeliveryError::PartialFailure {
                succeeded: self.delivered,
                failed: self.failed,
            })
        }
    }
}

impl BatchProcessor {
    /// Process one batch now
    ///
    /// Claims up to `batch_size` messages oldest-first and delivers them one
    /// at a time. A failure on one message never affects the others: it is
    /// logged, counted, and its claim released so the next cycle can retry it.
    /// Messages delivered before a later failure stay delivered.
    ///
    /// # Errors
    /// If the claim fails, or the batch exceeds the processing timeout. On
    /// timeout, messages still in flight keep their claim until the lease runs
    /// out.
    pub async fn process_batch(&self) -> Result<BatchOutcome, DeliveryError> {
        tokio::time::timeout(self.processing_timeout, self.run_batch())
            .await
            .map_err(|_| DeliveryError::Timeout(self.processing_timeout))?
    }

    async fn run_batch(&self) -> Result<BatchOutcome, DeliveryError> {
        let messages = self.queue.claim_unsent(self.batch_size).await?;

        let mut outcome = BatchOutcome {
            claimed: messages.len(),
            ..BatchOutcome::default()
        };

        if messages.is_empty() {
            tracing::debug!("No pending messages");
            return Ok(outcome);
        }

        for message in &messages {
            match self.deliver_one(message).await {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        message_id = %message.id,
                        destination = %message.destination,
                        error = %e,
                        "Failed to deliver message"
                    );

                    if let Err(e) = self.queue.release_claim(&message.id).await {
                        tracing::warn!(
                            message_id = %message.id,
                            error = %e,
                            "Failed to release claim, message waits for lease expiry"
                        );
                    }
                }
            }
        }

        Ok(outcome)
    }

    async fn deliver_one(&self, message: &Message) -> Result<(), DeliveryError> {
        message.validate()?;

        let receipt = self
            .provider
            .send(&message.destination, &message.body)
            .await?;

        if let Err(e) = self.queue.mark_delivered(&message.id).await {
            // Sent but not recorded; the next claim will send it again
            tracing::error!(
                message_id = %message.id,
                provider_message_id = %receipt.message_id,
                error = %e,
                "Message sent but could not be marked delivered"
            );
            return Err(e.into());
        }

        tracing::info!(
            message_id = %message.id,
            provider_message_id = %receipt.message_id,
            "Message delivered"
        );

        let record = DeliveryRecord::now(receipt.message_id);
        if let Err(e) = self.cache.put(&message.id, &record, self.cache_ttl).await {
            tracing::warn!(
                message_id = %message.id,
                error = %e,
                "Failed to cache delivery record"
            );
        }

        Ok(())
    }
}
