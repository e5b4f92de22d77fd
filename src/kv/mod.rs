//! Key-value store for account settings and backup bookkeeping
//!
//! Values are JSON text in a single SQLite table, so the store can be
//! snapshotted the same way as the relational store. Typed accessors live
//! in [`values`].

pub mod values;

pub use values::{AccountValues, BackupValues};

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ArchiveError, ArchiveResult};
use crate::storage::{take_snapshot, Snapshot};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS key_value (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);";

/// Persistent string-keyed JSON values
pub struct KeyValueStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl KeyValueStore {
    pub fn open(path: &Path) -> ArchiveResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ArchiveError::Io(format!("Failed to create key-value directory: {}", e))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> ArchiveResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> ArchiveResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            ArchiveError::Storage(format!("Failed to acquire key-value lock: {}", e))
        })
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> ArchiveResult<Option<T>> {
        let conn = self.lock()?;
        read_value(&conn, key)
    }

    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> ArchiveResult<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| ArchiveError::Json(format!("Failed to encode '{}': {}", key, e)))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO key_value (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![key, json],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> ArchiveResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM key_value WHERE key = ?1", [key])?;
        Ok(())
    }

    /// Write several values in one transaction
    pub fn put_all(&self, entries: &[(&str, serde_json::Value)]) -> ArchiveResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO key_value (key, value) VALUES (?1, ?2)
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                params![key, value.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Point-in-time copy of the store under `dir`
    pub fn snapshot(&self, dir: &Path) -> ArchiveResult<Snapshot> {
        let conn = self.lock()?;
        take_snapshot(&conn, dir, "keyvalue")
    }
}

/// Read one value from any connection holding a `key_value` table
pub fn read_value<T: DeserializeOwned>(conn: &Connection, key: &str) -> ArchiveResult<Option<T>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM key_value WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    raw.map(|json| {
        serde_json::from_str(&json)
            .map_err(|e| ArchiveError::Json(format!("Invalid value for '{}': {}", key, e)))
    })
    .transpose()
}
