use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, params};

use crate::{Result, store::LockStore};

const SCHEMA: &str = "PRAGMA journal_mode=WAL;\
    CREATE TABLE IF NOT EXISTS locks (\
        key TEXT PRIMARY KEY NOT NULL,\
        token TEXT NOT NULL,\
        expires_at INTEGER NOT NULL\
    );";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed lock store
///
/// Each compare-and-act is a single conditional statement, which SQLite
/// executes atomically under its write lock. Every process opening the same
/// database file contends for the same keys. Expiry is stored in milliseconds
/// since the Unix epoch, so holders on one host share a clock.
#[derive(Debug, Clone)]
pub struct SqliteLockStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteLockStore {
    /// Open (or create) the database at `path` and apply the schema
    ///
    /// # Errors
    /// If the database cannot be opened or the schema cannot be applied
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let connection = Connection::open(path)?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        connection.execute_batch(SCHEMA)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    async fn execute<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&Connection, i64) -> rusqlite::Result<usize> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        let changed = tokio::task::spawn_blocking(move || {
            let conn = connection.lock();
            f(&conn, Utc::now().timestamp_millis())
        })
        .await??;

        Ok(changed == 1)
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl LockStore for SqliteLockStore {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let (key, token, ttl) = (key.to_string(), token.to_string(), ttl_millis(ttl));
        self.execute(move |conn, now| {
            conn.execute(
                "INSERT INTO locks (key, token, expires_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(key) DO UPDATE SET token = excluded.token, \
                 expires_at = excluded.expires_at WHERE locks.expires_at <= ?4",
                params![key, token, now.saturating_add(ttl), now],
            )
        })
        .await
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool> {
        let (key, token) = (key.to_string(), token.to_string());
        self.execute(move |conn, now| {
            conn.execute(
                "DELETE FROM locks WHERE key = ?1 AND token = ?2 AND expires_at > ?3",
                params![key, token, now],
            )
        })
        .await
    }

    async fn compare_and_expire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let (key, token, ttl) = (key.to_string(), token.to_string(), ttl_millis(ttl));
        self.execute(move |conn, now| {
            conn.execute(
                "UPDATE locks SET expires_at = ?3 WHERE key = ?1 AND token = ?2 AND expires_at > ?4",
                params![key, token, now.saturating_add(ttl), now],
            )
        })
        .await
    }
}
