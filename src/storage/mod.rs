//! Storage layer for chat-archive
//!
//! The local relational store is a single SQLite database behind a mutex.
//! Table access is grouped per domain as free functions over a
//! [`rusqlite::Connection`], so the same code runs against the live store,
//! a snapshot, or the connection an import holds inside its transaction.

pub mod calls;
pub mod chat_folders;
pub mod file_io;
pub mod messages;
pub mod notification_profiles;
pub mod recipients;
pub mod schema;
pub mod snapshot;
pub mod stickers;
pub mod structure;
pub mod threads;

pub use file_io::{read_json, write_json_atomic};
pub use snapshot::{take_snapshot, Snapshot};

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use crate::error::{ArchiveError, ArchiveResult};

/// The main relational store
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (creating if needed) the store at `path`
    pub fn open(path: &Path) -> ArchiveResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ArchiveError::Io(format!("Failed to create database directory: {}", e))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        schema::create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// An in-memory store
    pub fn open_in_memory() -> ArchiveResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Exclusive access to the connection
    pub fn lock(&self) -> ArchiveResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ArchiveError::Storage(format!("Failed to acquire database lock: {}", e)))
    }

    /// Point-in-time copy of the store under `dir`
    pub fn snapshot(&self, dir: &Path) -> ArchiveResult<Snapshot> {
        let conn = self.lock()?;
        take_snapshot(&conn, dir, "main")
    }
}

/// Read a nullable TEXT column holding a UUID
pub(crate) fn uuid_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(index)?;
    raw.map(|s| {
        Uuid::parse_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
        })
    })
    .transpose()
}

/// Bind an optional UUID as TEXT
pub(crate) fn uuid_param(value: Option<Uuid>) -> Option<String> {
    value.map(|u| u.to_string())
}
