//! Outbound delivery providers

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

pub use http::{HttpDeliveryProvider, ProviderConfig};

/// Acknowledgement returned by a provider for an accepted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderReceipt {
    /// Free-form status text from the provider
    pub message: String,
    /// Identifier the provider assigned to this send
    #[serde(rename = "messageId")]
    pub message_id: String,
}

/// Sends one message to its destination
///
/// Any failure (rejection, timeout, transport error) is an error; callers
/// treat success as "the provider accepted the message".
#[async_trait]
pub trait DeliveryProvider: Send + Sync + std::fmt::Debug {
    /// Send `body` to `destination`
    ///
    /// # Errors
    /// If the provider rejects the message or cannot be reached
    async fn send(&self, destination: &str, body: &str) -> Result<ProviderReceipt, DeliveryError>;
}
