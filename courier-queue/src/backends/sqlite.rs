use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_common::{DeliveryRecord, MAX_BODY_LEN, MAX_DESTINATION_LEN, Message, MessageId};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::{
    DEFAULT_CLAIM_LEASE, QueueError,
    error::CacheError,
    r#trait::{CacheStore, QueueStore},
};

const SCHEMA: &str = "PRAGMA journal_mode=WAL;\
    CREATE TABLE IF NOT EXISTS messages (\
        id TEXT PRIMARY KEY NOT NULL,\
        destination TEXT NOT NULL,\
        body TEXT NOT NULL,\
        delivered INTEGER NOT NULL DEFAULT 0,\
        created_at INTEGER NOT NULL,\
        claimed_until INTEGER\
    );\
    CREATE INDEX IF NOT EXISTS idx_messages_unsent ON messages(delivered, created_at);\
    CREATE TABLE IF NOT EXISTS delivery_cache (\
        message_id TEXT PRIMARY KEY NOT NULL,\
        record TEXT NOT NULL,\
        expires_at INTEGER NOT NULL\
    );";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed queue and delivery cache
///
/// Every process that opens the same database file shares one queue. Claims
/// run inside a `BEGIN IMMEDIATE` transaction, which takes the database write
/// lock before selecting, so concurrent claimants (in this process or any
/// other) never receive the same row.
///
/// Timestamps are stored as integers: `created_at` in microseconds and
/// `claimed_until`/`expires_at` in milliseconds since the Unix epoch.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    connection: Arc<Mutex<Connection>>,
    path: PathBuf,
    claim_lease: Duration,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema
    ///
    /// # Errors
    /// If the database cannot be opened or the schema cannot be applied
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        Self::open_with_claim_lease(path, DEFAULT_CLAIM_LEASE)
    }

    /// Open the database with a custom claim lease
    ///
    /// # Errors
    /// If the database cannot be opened or the schema cannot be applied
    pub fn open_with_claim_lease(
        path: impl AsRef<Path>,
        claim_lease: Duration,
    ) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let connection = Connection::open(&path)?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        connection.execute_batch(SCHEMA)?;

        tracing::debug!(path = %path.display(), "Opened SQLite queue store");

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            path,
            claim_lease,
        })
    }

    /// Path of the underlying database file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a message as-is, bypassing validation
    ///
    /// # Errors
    /// If the row cannot be written
    pub async fn insert(&self, message: Message) -> crate::Result<()> {
        self.with_connection(move |conn| {
            insert_message(conn, &message)?;
            Ok(())
        })
        .await
    }

    async fn with_connection<T, F>(&self, f: F) -> crate::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> crate::Result<T> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let mut conn = connection.lock();
            f(&mut conn)
        })
        .await?
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn insert_message(conn: &Connection, message: &Message) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO messages (id, destination, body, delivered, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            message.id.to_string(),
            message.destination,
            message.body,
            message.delivered,
            message.created_at.timestamp_micros(),
        ],
    )
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let raw_id: String = row.get(0)?;
    let id = MessageId::parse(&raw_id).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("invalid message id {raw_id}").into(),
        )
    })?;

    let created_micros: i64 = row.get(4)?;
    let created_at = DateTime::from_timestamp_micros(created_micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Integer,
            format!("invalid timestamp {created_micros}").into(),
        )
    })?;

    Ok(Message {
        id,
        destination: row.get(1)?,
        body: row.get(2)?,
        delivered: row.get(3)?,
        created_at,
    })
}

#[async_trait]
impl QueueStore for SqliteStore {
    async fn enqueue(&self, destination: &str, body: &str) -> crate::Result<Message> {
        let mut message = Message::new(destination, body)?;

        // Truncate to the stored precision so the returned value matches reads
        let micros = message.created_at.timestamp_micros();
        message.created_at = DateTime::from_timestamp_micros(micros).unwrap_or(message.created_at);

        let stored = message.clone();
        self.with_connection(move |conn| {
            insert_message(conn, &stored)?;
            Ok(())
        })
        .await?;

        Ok(message)
    }

    async fn claim_unsent(&self, limit: usize) -> crate::Result<Vec<Message>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let lease = duration_millis(self.claim_lease);
        self.with_connection(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = now_millis();

            let claimed = {
                let mut stmt = tx.prepare(
                    "SELECT id, destination, body, delivered, created_at FROM messages \
                     WHERE delivered = 0 \
                       AND (claimed_until IS NULL OR claimed_until <= ?1) \
                       AND length(destination) BETWEEN 1 AND ?2 \
                       AND length(body) BETWEEN 1 AND ?3 \
                     ORDER BY created_at ASC, rowid ASC \
                     LIMIT ?4",
                )?;
                let rows = stmt.query_map(
                    params![
                        now,
                        i64::try_from(MAX_DESTINATION_LEN).unwrap_or(i64::MAX),
                        i64::try_from(MAX_BODY_LEN).unwrap_or(i64::MAX),
                        i64::try_from(limit).unwrap_or(i64::MAX),
                    ],
                    message_from_row,
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            for message in &claimed {
                tx.execute(
                    "UPDATE messages SET claimed_until = ?1 WHERE id = ?2",
                    params![now.saturating_add(lease), message.id.to_string()],
                )?;
            }

            tx.commit()?;
            Ok(claimed)
        })
        .await
    }

    async fn mark_delivered(&self, id: &MessageId) -> crate::Result<()> {
        let id = *id;
        self.with_connection(move |conn| {
            let changed = conn.execute(
                "UPDATE messages SET delivered = 1, claimed_until = NULL \
                 WHERE id = ?1 AND delivered = 0",
                params![id.to_string()],
            )?;

            if changed == 0 {
                let exists = conn
                    .query_row(
                        "SELECT 1 FROM messages WHERE id = ?1",
                        params![id.to_string()],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();

                if !exists {
                    return Err(QueueError::NotFound(id));
                }
            }

            Ok(())
        })
        .await
    }

    async fn release_claim(&self, id: &MessageId) -> crate::Result<()> {
        let id = *id;
        self.with_connection(move |conn| {
            conn.execute(
                "UPDATE messages SET claimed_until = NULL WHERE id = ?1 AND delivered = 0",
                params![id.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    async fn delivered_messages(&self) -> crate::Result<Vec<Message>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, destination, body, delivered, created_at FROM messages \
                 WHERE delivered = 1 ORDER BY created_at ASC, rowid ASC",
            )?;
            let messages = stmt
                .query_map([], message_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(messages)
        })
        .await
    }

    async fn clear(&self) -> crate::Result<usize> {
        self.with_connection(|conn| Ok(conn.execute("DELETE FROM messages", [])?))
            .await
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn put(
        &self,
        id: &MessageId,
        record: &DeliveryRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = id.to_string();
        let encoded = serde_json::to_string(record)?;
        let expires_at = now_millis().saturating_add(duration_millis(ttl));
        let connection = Arc::clone(&self.connection);

        tokio::task::spawn_blocking(move || -> Result<(), CacheError> {
            connection.lock().execute(
                "INSERT OR REPLACE INTO delivery_cache (message_id, record, expires_at) \
                 VALUES (?1, ?2, ?3)",
                params![key, encoded, expires_at],
            )?;
            Ok(())
        })
        .await?
    }

    async fn get_many(
        &self,
        ids: &[MessageId],
    ) -> Result<HashMap<MessageId, DeliveryRecord>, CacheError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids = ids.to_vec();
        let connection = Arc::clone(&self.connection);

        tokio::task::spawn_blocking(move || -> Result<_, CacheError> {
            let conn = connection.lock();
            let now = now_millis();
            let mut stmt = conn.prepare(
                "SELECT record FROM delivery_cache WHERE message_id = ?1 AND expires_at > ?2",
            )?;

            let mut found = HashMap::with_capacity(ids.len());
            for id in ids {
                let encoded: Option<String> = stmt
                    .query_row(params![id.to_string(), now], |row| row.get(0))
                    .optional()?;

                if let Some(encoded) = encoded {
                    found.insert(id, serde_json::from_str(&encoded)?);
                }
            }

            drop(stmt);
            conn.execute(
                "DELETE FROM delivery_cache WHERE expires_at <= ?1",
                params![now],
            )?;

            Ok(found)
        })
        .await?
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let connection = Arc::clone(&self.connection);

        tokio::task::spawn_blocking(move || -> Result<(), CacheError> {
            connection.lock().execute("DELETE FROM delivery_cache", [])?;
            Ok(())
        })
        .await?
    }
}
