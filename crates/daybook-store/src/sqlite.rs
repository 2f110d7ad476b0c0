//! SQLite-backed coordination store.
//!
//! One `kv` table keyed by `(namespace, key)`. Several processes may share the
//! file; WAL mode plus a busy timeout keeps concurrent workers from failing on
//! lock contention.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use crate::{KvStore, StoreError};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS kv (
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    expires_at INTEGER,
    PRIMARY KEY (namespace, key)
);

CREATE INDEX IF NOT EXISTS idx_kv_expires ON kv(expires_at);
";

/// Namespace for structured state: reports, partial results, progress.
pub const REPORTS_NAMESPACE: &str = "reports";
/// Namespace for human-readable summaries.
pub const SUMMARIES_NAMESPACE: &str = "summaries";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    namespace: String,
}

impl SqliteStore {
    /// Open or create the database file and scope this handle to `namespace`.
    pub fn open(db_path: &Path, namespace: &str) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                // Surfaced by the subsequent open if it fails.
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn, namespace)
    }

    pub fn open_in_memory(namespace: &str) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, namespace)
    }

    fn init(conn: Connection, namespace: &str) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            namespace: namespace.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Delete expired rows in this namespace. Returns the number removed.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let n = conn.execute(
            "DELETE FROM kv WHERE namespace = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
            params![self.namespace, now_millis()],
        )?;
        Ok(n)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let value = conn
            .query_row(
                "SELECT value FROM kv
                 WHERE namespace = ?1 AND key = ?2
                   AND (expires_at IS NULL OR expires_at > ?3)",
                params![self.namespace, key, now_millis()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(|t| now_millis().saturating_add(t.as_millis() as i64));
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO kv (namespace, key, value, expires_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![self.namespace, key, value, expires_at],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "DELETE FROM kv WHERE namespace = ?1 AND key = ?2",
            params![self.namespace, key],
        )?;
        Ok(())
    }
}

fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_overwrite_delete() {
        let store = SqliteStore::open_in_memory(REPORTS_NAMESPACE).unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        store.put("k", "v1", None).unwrap();
        store.put("k", "v2", Some(Duration::from_secs(60))).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        store.delete("k").unwrap();
    }

    #[test]
    fn expired_rows_are_invisible_and_purged() {
        let store = SqliteStore::open_in_memory(REPORTS_NAMESPACE).unwrap();
        store.put("gone", "v", Some(Duration::ZERO)).unwrap();
        store.put("kept", "v", None).unwrap();
        assert_eq!(store.get("gone").unwrap(), None);
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.get("kept").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn namespaces_are_disjoint() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("daybook.db");
        let reports = SqliteStore::open(&path, REPORTS_NAMESPACE).unwrap();
        let summaries = SqliteStore::open(&path, SUMMARIES_NAMESPACE).unwrap();

        reports.put("report:2024-01-05", "{}", None).unwrap();
        summaries
            .put("report:2024-01-05", "Date: 2024-01-05\n\nNONE", None)
            .unwrap();

        assert_eq!(reports.get("report:2024-01-05").unwrap().as_deref(), Some("{}"));
        assert!(summaries
            .get("report:2024-01-05")
            .unwrap()
            .unwrap()
            .starts_with("Date:"));

        reports.delete("report:2024-01-05").unwrap();
        assert!(summaries.contains("report:2024-01-05").unwrap());
    }

    #[test]
    fn data_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("daybook.db");
        {
            let store = SqliteStore::open(&path, REPORTS_NAMESPACE).unwrap();
            store.put("k", "v", None).unwrap();
        }
        let store = SqliteStore::open(&path, REPORTS_NAMESPACE).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
