//! Destructive structural rewrite of the main store
//!
//! Import replaces the whole relational store except the device key
//! material. The rewrite runs in one transaction with foreign keys off;
//! [`BulkRewrite`] rolls back unless committed and turns foreign keys back
//! on whichever way it is dropped.

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::ArchiveResult;
use crate::storage::schema::KEY_MATERIAL_TABLES;
use crate::storage::structure::{self, SchemaObject};

pub struct BulkRewrite<'c> {
    conn: &'c Connection,
    indexes: Vec<SchemaObject>,
    triggers: Vec<SchemaObject>,
    committed: bool,
}

impl<'c> BulkRewrite<'c> {
    /// Disable foreign keys, open the transaction and empty every table
    ///
    /// Indexes and triggers are dropped and remembered so bulk inserts do
    /// not maintain them row by row.
    pub fn begin(conn: &'c Connection) -> ArchiveResult<Self> {
        structure::set_foreign_keys(conn, false)?;
        if let Err(e) = conn.execute_batch("BEGIN IMMEDIATE") {
            if let Err(fk_error) = structure::set_foreign_keys(conn, true) {
                warn!(error = %fk_error, "Failed to re-enable foreign keys");
            }
            return Err(e.into());
        }

        let mut rewrite = Self {
            conn,
            indexes: Vec::new(),
            triggers: Vec::new(),
            committed: false,
        };
        rewrite.indexes = structure::list_indexes(conn)?;
        rewrite.triggers = structure::list_triggers(conn)?;

        for object in rewrite.triggers.iter() {
            conn.execute_batch(&format!("DROP TRIGGER IF EXISTS \"{}\"", object.name))?;
        }
        for object in rewrite.indexes.iter() {
            conn.execute_batch(&format!("DROP INDEX IF EXISTS \"{}\"", object.name))?;
        }

        let tables: Vec<_> = structure::list_tables(conn)?
            .into_iter()
            .filter(|t| !KEY_MATERIAL_TABLES.contains(&t.name.as_str()))
            .collect();
        for table in &tables {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"", table.name))?;
        }
        for table in &tables {
            conn.execute_batch(&table.sql)?;
        }

        debug!(
            tables = tables.len(),
            indexes = rewrite.indexes.len(),
            triggers = rewrite.triggers.len(),
            "Emptied store for import"
        );
        Ok(rewrite)
    }

    pub fn conn(&self) -> &'c Connection {
        self.conn
    }

    pub fn recreate_indexes(&self) -> ArchiveResult<()> {
        for object in &self.indexes {
            self.conn.execute_batch(&object.sql)?;
        }
        Ok(())
    }

    pub fn recreate_triggers(&self) -> ArchiveResult<()> {
        for object in &self.triggers {
            self.conn.execute_batch(&object.sql)?;
        }
        Ok(())
    }

    pub fn commit(mut self) -> ArchiveResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for BulkRewrite<'_> {
    fn drop(&mut self) {
        if !self.committed {
            match self.conn.execute_batch("ROLLBACK") {
                Ok(()) => debug!("Rolled back import"),
                Err(e) => warn!(error = %e, "Failed to roll back import"),
            }
        }
        if let Err(e) = structure::set_foreign_keys(self.conn, true) {
            warn!(error = %e, "Failed to re-enable foreign keys");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::structure::{foreign_keys_enabled, row_count};
    use crate::storage::Database;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        {
            let conn = db.lock().unwrap();
            conn.execute("INSERT INTO recipient (type) VALUES (0)", []).unwrap();
            conn.execute(
                "INSERT INTO signed_prekey (key_id, public_key, private_key, timestamp)
                 VALUES (1, x'01', x'02', 3)",
                [],
            )
            .unwrap();
        }
        db
    }

    #[test]
    fn test_dropped_guard_rolls_back() {
        let db = seeded();
        let conn = db.lock().unwrap();
        {
            let rewrite = BulkRewrite::begin(&conn).unwrap();
            assert_eq!(row_count(rewrite.conn(), "recipient").unwrap(), 0);
            assert!(!foreign_keys_enabled(&conn).unwrap());
        }
        assert_eq!(row_count(&conn, "recipient").unwrap(), 1);
        assert!(foreign_keys_enabled(&conn).unwrap());
        assert!(!structure::list_indexes(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_commit_keeps_key_material_and_schema() {
        let db = seeded();
        let conn = db.lock().unwrap();
        let indexes_before = structure::list_indexes(&conn).unwrap();
        let triggers_before = structure::list_triggers(&conn).unwrap();

        let rewrite = BulkRewrite::begin(&conn).unwrap();
        assert!(structure::list_indexes(&conn).unwrap().is_empty());
        rewrite.recreate_indexes().unwrap();
        rewrite.recreate_triggers().unwrap();
        rewrite.commit().unwrap();

        assert_eq!(row_count(&conn, "recipient").unwrap(), 0);
        assert_eq!(row_count(&conn, "signed_prekey").unwrap(), 1);
        assert_eq!(structure::list_indexes(&conn).unwrap(), indexes_before);
        assert_eq!(structure::list_triggers(&conn).unwrap(), triggers_before);
        assert!(foreign_keys_enabled(&conn).unwrap());
    }
}
