use thiserror::Error;

/// Errors from lock operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    /// Another holder currently owns the lock
    #[error("Lock is held by another instance")]
    Contended,

    /// This handle does not (or no longer) hold the lock
    #[error("Lock is not held by this instance")]
    NotHeld,

    /// The lock store is unreachable or rejected the operation
    #[error("Lock store error: {0}")]
    Store(String),
}

impl LockError {
    /// Returns `true` if another instance owns the lock
    #[must_use]
    pub const fn is_contended(&self) -> bool {
        matches!(self, Self::Contended)
    }

    /// Returns `true` if the backing store failed
    #[must_use]
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl From<rusqlite::Error> for LockError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<tokio::task::JoinError> for LockError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Store(format!("Lock store task failed: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
