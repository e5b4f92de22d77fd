//! Point-in-time copies of a live SQLite store
//!
//! A snapshot is taken with the online backup API in a single step, after a
//! WAL checkpoint. One step holds one shared lock on the source for the whole
//! copy, so no committed write can land halfway through it. The copy lives in a temporary file that is deleted when the
//! [`Snapshot`] is dropped, whether or not the export using it succeeded.

use std::path::{Path, PathBuf};

use rusqlite::backup::{Backup, StepResult};
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ArchiveError, ArchiveResult};

/// Deletes a database file and its sidecars on drop
struct SnapshotFile {
    path: PathBuf,
}

impl Drop for SnapshotFile {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut name = self.path.clone().into_os_string();
            name.push(suffix);
            let path = PathBuf::from(name);
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove snapshot file");
                }
            }
        }
    }
}

/// A read-only copy of a store
///
/// Field order matters: the connection closes before the file is removed.
pub struct Snapshot {
    conn: Connection,
    _file: SnapshotFile,
}

impl Snapshot {
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        &self._file.path
    }
}

/// Copy `source` into a fresh file under `dir`
///
/// `label` only names the file. Pending WAL frames are checkpointed first so
/// the copy reflects every committed write.
pub fn take_snapshot(source: &Connection, dir: &Path, label: &str) -> ArchiveResult<Snapshot> {
    std::fs::create_dir_all(dir)
        .map_err(|e| ArchiveError::Io(format!("Failed to create snapshot directory: {}", e)))?;

    let path = dir.join(format!("{}-{}.db", label, Uuid::new_v4()));
    let file = SnapshotFile { path: path.clone() };

    // A checkpoint cannot run inside a transaction
    if !source.is_autocommit() {
        return Err(ArchiveError::Storage(
            "Cannot snapshot a store with an open transaction".into(),
        ));
    }
    source.execute_batch("PRAGMA wal_checkpoint(FULL);")?;

    let mut dest = Connection::open(&path)?;
    {
        let backup = Backup::new(source, &mut dest)?;
        match backup.step(-1)? {
            StepResult::Done => {}
            other => {
                return Err(ArchiveError::Storage(format!(
                    "Snapshot copy did not complete: {:?}",
                    other
                )))
            }
        }
    }
    drop(dest);

    let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    debug!(label, path = %path.display(), "Snapshot taken");

    Ok(Snapshot { conn, _file: file })
}
