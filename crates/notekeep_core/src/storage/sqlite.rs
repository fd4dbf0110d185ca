//! Durable SQLite-backed key-value provider.
//!
//! # Responsibility
//! - Persist provider key-value pairs in one SQLite table.
//! - Apply schema bootstrap via `PRAGMA user_version` before any access.
//! - Enforce the same byte-quota contract as the in-memory provider.
//!
//! # Invariants
//! - Connections are bootstrapped (pragmas + schema) before first use.
//! - A database with a newer `user_version` than this binary supports is
//!   rejected instead of silently read.
//! - Quota checks run before the INSERT, so a failed write never replaces
//!   the previous value.

use super::{StorageError, StorageProvider, StorageResult, DEFAULT_QUOTA_BYTES};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::{Duration, Instant};

const SCHEMA_VERSION: u32 = 1;
const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);";

/// SQLite-backed storage provider.
pub struct SqliteStorage {
    conn: Connection,
    quota_bytes: u64,
}

impl SqliteStorage {
    /// Opens (or creates) a database file and bootstraps the schema.
    ///
    /// # Side effects
    /// - Emits `storage_open` log events with duration and status.
    pub fn open(path: impl AsRef<Path>, quota_bytes: Option<u64>) -> StorageResult<Self> {
        let started_at = Instant::now();
        info!("event=storage_open module=storage status=start mode=file");
        let conn = Connection::open(path).map_err(backend)?;
        Self::from_connection(conn, quota_bytes, started_at, "file")
    }

    /// Opens an in-memory database, mainly for tests.
    pub fn open_in_memory(quota_bytes: Option<u64>) -> StorageResult<Self> {
        let started_at = Instant::now();
        info!("event=storage_open module=storage status=start mode=memory");
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::from_connection(conn, quota_bytes, started_at, "memory")
    }

    fn from_connection(
        conn: Connection,
        quota_bytes: Option<u64>,
        started_at: Instant,
        mode: &str,
    ) -> StorageResult<Self> {
        match bootstrap(&conn) {
            Ok(()) => {
                info!(
                    "event=storage_open module=storage status=ok mode={} duration_ms={}",
                    mode,
                    started_at.elapsed().as_millis()
                );
                Ok(Self {
                    conn,
                    quota_bytes: quota_bytes.unwrap_or(DEFAULT_QUOTA_BYTES),
                })
            }
            Err(err) => {
                error!(
                    "event=storage_open module=storage status=error mode={} duration_ms={} error={}",
                    mode,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn used_bytes(&self) -> StorageResult<u64> {
        let total: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) FROM kv;",
                [],
                |row| row.get(0),
            )
            .map_err(backend)?;
        Ok(total.max(0) as u64)
    }
}

fn bootstrap(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(backend)?;
    conn.busy_timeout(Duration::from_secs(5)).map_err(backend)?;

    let version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .map_err(backend)?;
    if version > SCHEMA_VERSION {
        return Err(StorageError::Backend(format!(
            "kv schema version {version} is newer than supported {SCHEMA_VERSION}"
        )));
    }
    if version < SCHEMA_VERSION {
        conn.execute_batch(SCHEMA_SQL).map_err(backend)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(backend)?;
    }
    Ok(())
}

fn backend(err: rusqlite::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

impl StorageProvider for SqliteStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1;", [key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(backend)
    }

    fn set_item(&mut self, key: &str, value: &str) -> StorageResult<()> {
        let previous_len: u64 = self
            .conn
            .query_row("SELECT LENGTH(value) FROM kv WHERE key = ?1;", [key], |row| {
                row.get::<_, i64>(0)
            })
            .optional()
            .map_err(backend)?
            .map_or(0, |len| len.max(0) as u64);

        let used = self.used_bytes()?;
        let incoming = (key.len() + value.len()) as u64;
        let freed = previous_len.min(used);
        let projected = used - freed + incoming;
        if projected > self.quota_bytes {
            return Err(StorageError::CapacityExceeded {
                requested: incoming,
                available: self.quota_bytes.saturating_sub(used - freed),
            });
        }

        self.conn
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
                params![key, value],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1;", [key])
            .map_err(backend)?;
        Ok(())
    }

    fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv ORDER BY key ASC;")
            .map_err(backend)?;
        let mut rows = stmt.query([]).map_err(backend)?;
        let mut keys = Vec::new();
        while let Some(row) = rows.next().map_err(backend)? {
            keys.push(row.get(0).map_err(backend)?);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteStorage;
    use crate::storage::StorageProvider;

    #[test]
    fn bootstrap_sets_user_version_and_round_trips() {
        let mut storage = SqliteStorage::open_in_memory(None).unwrap();
        storage.set_item("a", "1").unwrap();
        assert_eq!(storage.get_item("a").unwrap().as_deref(), Some("1"));
        assert_eq!(storage.keys().unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn quota_is_enforced_before_the_write() {
        let mut storage = SqliteStorage::open_in_memory(Some(10)).unwrap();
        storage.set_item("k", "12345").unwrap();
        let err = storage.set_item("k2", "1234567890").unwrap_err();
        assert!(err.is_capacity());
        assert_eq!(storage.get_item("k2").unwrap(), None);
    }

    #[test]
    fn replacing_value_keeps_previous_on_overflow() {
        let mut storage = SqliteStorage::open_in_memory(Some(8)).unwrap();
        storage.set_item("k", "1234").unwrap();
        let err = storage.set_item("k", "123456789012345").unwrap_err();
        assert!(err.is_capacity());
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("1234"));
    }
}
