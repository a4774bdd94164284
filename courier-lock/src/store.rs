use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Key-value store with atomic compare-and-act primitives
///
/// Entries expire on their own after their TTL. The compare operations must be
/// atomic with respect to each other and to `set_if_absent`: there is no
/// window in which one caller can observe a matching token and another caller
/// replace it before the first caller acts.
#[async_trait]
pub trait LockStore: Send + Sync + std::fmt::Debug {
    /// Store `token` under `key` only if no live entry exists
    ///
    /// Returns `true` if the entry was written.
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` only if its live value equals `token`
    ///
    /// Returns `true` if the entry was deleted.
    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool>;

    /// Reset the TTL of `key` only if its live value equals `token`
    ///
    /// Returns `true` if the expiry was updated.
    async fn compare_and_expire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;
}
