//! Backend implementations for the queue and delivery cache
//!
//! - `memory`: In-process queue and cache, for tests and single-instance runs
//! - `test`: Test utilities with synchronization and fault injection
//! - `sqlite`: SQLite database shared by every instance opening the same file

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryCacheStore, MemoryQueueStore};
pub use sqlite::SqliteStore;
pub use test::TestQueueStore;
