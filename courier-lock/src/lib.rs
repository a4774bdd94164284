pub mod backends;
pub mod config;
pub mod error;
pub mod lock;
pub mod store;

pub use backends::{MemoryLockStore, SqliteLockStore};
pub use config::LockConfig;
pub use error::{LockError, Result};
pub use lock::DistributedLock;
pub use store::LockStore;
