//! Distributed mutual exclusion over a [`LockStore`]
//!
//! One logical key is shared by every instance. The holder stores a random
//! token under it; release and extension only act while the stored value still
//! equals that token, so an instance whose lease lapsed can never delete or
//! prolong a newer holder's entry.

use std::{sync::Arc, time::Duration};

use courier_common::tracing;
use parking_lot::Mutex;

use crate::{LockError, Result, store::LockStore};

#[derive(Debug, Default)]
struct LockState {
    held: bool,
    token: String,
}

/// A handle on the distributed lock
///
/// The handle caches whether it believes it holds the lock. The cache is
/// shared behind a mutex so the scheduler loop and the extension task can use
/// one `Arc<DistributedLock>`.
#[derive(Debug)]
pub struct DistributedLock {
    store: Arc<dyn LockStore>,
    key: String,
    ttl: Duration,
    state: Mutex<LockState>,
}

/// 16 random bytes, hex-encoded
fn generate_token() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

impl DistributedLock {
    pub fn new(store: Arc<dyn LockStore>, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            ttl,
            state: Mutex::new(LockState::default()),
        }
    }

    /// Try to become the holder
    ///
    /// A handle that already believes it holds the lock refreshes the TTL
    /// instead of contending with itself.
    ///
    /// # Errors
    /// [`LockError::Contended`] if another instance holds the lock, or a store
    /// error
    pub async fn acquire(&self) -> Result<()> {
        if self.is_held() {
            return self.extend().await;
        }

        let token = generate_token();
        match self.store.set_if_absent(&self.key, &token, self.ttl).await {
            Ok(true) => {
                *self.state.lock() = LockState { held: true, token };
                tracing::debug!(key = %self.key, ttl = ?self.ttl, "Acquired lock");
                Ok(())
            }
            Ok(false) => Err(LockError::Contended),
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "Failed to acquire lock");
                Err(e)
            }
        }
    }

    /// Give up the lock
    ///
    /// Never deletes an entry written by another holder.
    ///
    /// # Errors
    /// [`LockError::NotHeld`] if this handle is not the holder, or a store error
    pub async fn release(&self) -> Result<()> {
        let token = self.held_token().ok_or(LockError::NotHeld)?;

        match self.store.compare_and_delete(&self.key, &token).await {
            Ok(true) => {
                self.mark_not_held(&token);
                tracing::debug!(key = %self.key, "Released lock");
                Ok(())
            }
            Ok(false) => {
                self.mark_not_held(&token);
                tracing::warn!(key = %self.key, "Lock was lost before release");
                Err(LockError::NotHeld)
            }
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "Failed to release lock");
                Err(e)
            }
        }
    }

    /// Reset the lock TTL while still the holder
    ///
    /// On any failure the handle stops believing it holds the lock, since it
    /// can no longer vouch for ownership.
    ///
    /// # Errors
    /// [`LockError::NotHeld`] if this handle is not (or no longer) the holder,
    /// or a store error
    pub async fn extend(&self) -> Result<()> {
        let token = self.held_token().ok_or(LockError::NotHeld)?;

        match self
            .store
            .compare_and_expire(&self.key, &token, self.ttl)
            .await
        {
            Ok(true) => {
                tracing::trace!(key = %self.key, ttl = ?self.ttl, "Extended lock");
                Ok(())
            }
            Ok(false) => {
                self.mark_not_held(&token);
                tracing::warn!(key = %self.key, "Lock was lost before extension");
                Err(LockError::NotHeld)
            }
            Err(e) => {
                self.mark_not_held(&token);
                tracing::error!(key = %self.key, error = %e, "Failed to extend lock");
                Err(e)
            }
        }
    }

    /// Whether this handle believes it holds the lock
    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    fn held_token(&self) -> Option<String> {
        let state = self.state.lock();
        state.held.then(|| state.token.clone())
    }

    fn mark_not_held(&self, token: &str) {
        let mut state = self.state.lock();
        // A concurrent acquire may already have replaced the token
        if state.token == token {
            state.held = false;
        }
    }
}
