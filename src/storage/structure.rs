//! Schema introspection through `sqlite_master`
//!
//! Import records index, trigger and table definitions before dropping them
//! and replays the recorded SQL afterwards, so whatever schema the store
//! carries is restored exactly.

use rusqlite::Connection;

use crate::error::ArchiveResult;

/// A named schema object and the SQL that created it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject {
    pub name: String,
    pub sql: String,
}

/// One row of `PRAGMA foreign_key_check`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyViolation {
    pub table: String,
    pub rowid: Option<i64>,
    pub parent: String,
    pub fk_index: i64,
}

fn objects_of_type(conn: &Connection, object_type: &str) -> ArchiveResult<Vec<SchemaObject>> {
    // Auto-indexes backing UNIQUE constraints have no SQL and come back with
    // their table.
    let mut stmt = conn.prepare(
        "SELECT name, sql FROM sqlite_master
         WHERE type = ?1 AND sql IS NOT NULL AND name NOT LIKE 'sqlite_%'
         ORDER BY rowid",
    )?;
    let rows = stmt.query_map([object_type], |row| {
        Ok(SchemaObject {
            name: row.get(0)?,
            sql: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn list_tables(conn: &Connection) -> ArchiveResult<Vec<SchemaObject>> {
    objects_of_type(conn, "table")
}

pub fn list_indexes(conn: &Connection) -> ArchiveResult<Vec<SchemaObject>> {
    objects_of_type(conn, "index")
}

pub fn list_triggers(conn: &Connection) -> ArchiveResult<Vec<SchemaObject>> {
    objects_of_type(conn, "trigger")
}

/// Turn foreign key enforcement on or off
///
/// Has no effect inside an open transaction, so callers toggle it before
/// `BEGIN` and after `COMMIT`/`ROLLBACK`.
pub fn set_foreign_keys(conn: &Connection, enabled: bool) -> ArchiveResult<()> {
    let value = if enabled { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {};", value))?;
    Ok(())
}

pub fn foreign_keys_enabled(conn: &Connection) -> ArchiveResult<bool> {
    let enabled: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    Ok(enabled == 1)
}

/// Every foreign key violation in the store; empty when consistent
pub fn foreign_key_violations(conn: &Connection) -> ArchiveResult<Vec<ForeignKeyViolation>> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let rows = stmt.query_map([], |row| {
        Ok(ForeignKeyViolation {
            table: row.get(0)?,
            rowid: row.get(1)?,
            parent: row.get(2)?,
            fk_index: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn row_count(conn: &Connection, table: &str) -> ArchiveResult<i64> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}
