//! Outbound messages and their delivery metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Maximum length of a destination address, in characters
pub const MAX_DESTINATION_LEN: usize = 20;

/// Maximum length of a message body, in characters
pub const MAX_BODY_LEN: usize = 160;

/// How long a delivery record stays in the cache
pub const DEFAULT_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

/// Identifier for a queued message
///
/// A ULID assigned by the queue on insert. ULIDs sort lexicographically by
/// creation time, which keeps identifiers and FIFO order aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(ulid::Ulid);

impl MessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Create a message ID from an existing ULID
    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self(id)
    }

    /// Parse a message ID from its canonical string form
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        ulid::Ulid::from_string(value).ok().map(Self)
    }

    /// Get the underlying ULID
    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message waiting in (or drained from) the outbound queue
///
/// `id` and `created_at` never change after insertion. `delivered` only ever
/// moves from `false` to `true`, and only through the queue's mark-delivered
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub destination: String,
    pub body: String,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a fresh, undelivered message
    ///
    /// # Errors
    /// If the destination or body violate the shape limits
    pub fn new(
        destination: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let message = Self {
            id: MessageId::generate(),
            destination: destination.into(),
            body: body.into(),
            delivered: false,
            created_at: Utc::now(),
        };
        message.validate()?;
        Ok(message)
    }

    /// Check the destination and body against the shape limits
    ///
    /// # Errors
    /// The first violated constraint
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_destination(&self.destination)?;
        validate_body(&self.body)
    }

    /// Whether this message satisfies the shape limits
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Validate a destination address
///
/// # Errors
/// If the destination is empty or longer than [`MAX_DESTINATION_LEN`]
pub fn validate_destination(destination: &str) -> Result<(), ValidationError> {
    let len = destination.chars().count();
    if len == 0 {
        return Err(ValidationError::EmptyDestination);
    }
    if len > MAX_DESTINATION_LEN {
        return Err(ValidationError::DestinationTooLong {
            len,
            max: MAX_DESTINATION_LEN,
        });
    }
    Ok(())
}

/// Validate a message body
///
/// # Errors
/// If the body is empty or longer than [`MAX_BODY_LEN`]
pub fn validate_body(body: &str) -> Result<(), ValidationError> {
    let len = body.chars().count();
    if len == 0 {
        return Err(ValidationError::EmptyBody);
    }
    if len > MAX_BODY_LEN {
        return Err(ValidationError::BodyTooLong {
            len,
            max: MAX_BODY_LEN,
        });
    }
    Ok(())
}

/// Metadata cached after a successful send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Identifier the delivery provider assigned to the send
    #[serde(rename = "message_id")]
    pub provider_message_id: String,
    /// When the provider accepted the message
    #[serde(rename = "timestamp")]
    pub delivered_at: DateTime<Utc>,
}

impl DeliveryRecord {
    /// Record a send accepted just now
    #[must_use]
    pub fn now(provider_message_id: impl Into<String>) -> Self {
        Self {
            provider_message_id: provider_message_id.into(),
            delivered_at: Utc::now(),
        }
    }
}

/// A delivered message enriched with whatever the cache still remembers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    #[serde(flatten)]
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

impl SentMessage {
    /// Combine a message with its (possibly missing) delivery record
    #[must_use]
    pub fn new(message: Message, record: Option<DeliveryRecord>) -> Self {
        let (message_id, cached_at) = record.map_or((None, None), |record| {
            (Some(record.provider_message_id), Some(record.delivered_at))
        });

        Self {
            message,
            message_id,
            cached_at,
        }
    }
}
