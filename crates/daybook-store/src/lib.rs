pub mod coordination;
pub mod memory;
pub mod sqlite;

use std::path::PathBuf;
use std::time::Duration;

pub use coordination::{CoordinationStore, SummaryStore, Ttls};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("refusing to persist {key}: {reason}")]
    FormatGuard { key: String, reason: String },
    #[error("store lock poisoned")]
    Poisoned,
}

/// Key-level read/write/delete with optional per-key expiry.
///
/// No atomic increment, no cross-key transactions, no compare-and-swap.
/// Expired keys read as absent.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value`, replacing any previous value. `None` never expires.
    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Delete `key`. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Return the per-user data root: `<data_dir>/daybook/`.
pub fn store_root() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("daybook")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".daybook")
    } else {
        PathBuf::from(".daybook-store")
    }
}

/// Default SQLite file shared by the store and the queue.
pub fn default_db_path() -> PathBuf {
    store_root().join("daybook.db")
}
