pub mod memory;
pub mod sqlite;

pub use memory::MemoryLockStore;
pub use sqlite::SqliteLockStore;
