//! Local archive rotation
//!
//! Archives are encrypted under the account's backup key and named after
//! the time they were taken, so listing needs no index file.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::config::paths::ArchivePaths;
use crate::config::settings::BackupRetention;
use crate::error::{ArchiveError, ArchiveResult};
use crate::export::{ExportPipeline, ExportSummary, NoProgress};
use crate::import::{ImportPipeline, ImportResult};
use crate::models::SelfIdentity;
use crate::storage::file_io::remove_file_if_exists;

const PREFIX: &str = "backup-";
const EXTENSION: &str = "bin";

/// A local archive file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalBackupInfo {
    pub filename: String,
    pub path: PathBuf,
    /// Parsed from the filename
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// A finished local backup
#[derive(Debug, Clone)]
pub struct CreatedBackup {
    pub info: LocalBackupInfo,
    pub summary: ExportSummary,
}

pub struct LocalBackupManager {
    backup_dir: PathBuf,
    export: Arc<ExportPipeline>,
    import: Arc<ImportPipeline>,
    retention: BackupRetention,
}

impl LocalBackupManager {
    pub fn new(
        paths: &ArchivePaths,
        export: Arc<ExportPipeline>,
        import: Arc<ImportPipeline>,
        retention: BackupRetention,
    ) -> Self {
        Self {
            backup_dir: paths.backups_dir(),
            export,
            import,
            retention,
        }
    }

    /// Write a new archive of the current state
    ///
    /// Returns `None` when canceled; no file is left behind in that case.
    pub fn create_backup(&self, cancel: &CancellationToken) -> ArchiveResult<Option<CreatedBackup>> {
        fs::create_dir_all(&self.backup_dir)
            .map_err(|e| ArchiveError::Io(format!("Failed to create backup directory: {}", e)))?;

        let now = Utc::now();
        let filename = format!(
            "{}{}-{:03}.{}",
            PREFIX,
            now.format("%Y%m%d-%H%M%S"),
            now.timestamp_subsec_millis(),
            EXTENSION
        );
        let backup_path = self.backup_dir.join(&filename);
        let partial_path = self.backup_dir.join(format!("{}.partial", filename));

        let file = File::create(&partial_path)
            .map_err(|e| ArchiveError::Io(format!("Failed to create backup file: {}", e)))?;
        let summary = match self.export.export_for_local_backup(
            now.timestamp_millis(),
            file,
            &NoProgress,
            cancel,
        ) {
            Ok(summary) => summary,
            Err(e) => {
                remove_file_if_exists(&partial_path)?;
                return Err(e);
            }
        };
        if summary.canceled {
            remove_file_if_exists(&partial_path)?;
            info!("Local backup canceled");
            return Ok(None);
        }

        fs::rename(&partial_path, &backup_path)
            .map_err(|e| ArchiveError::Io(format!("Failed to finish backup file: {}", e)))?;
        let info = parse_backup_info(&backup_path)
            .ok_or_else(|| ArchiveError::backup_not_found(filename.clone()))?;
        info!(filename = %info.filename, frames = summary.total_frames(), "Created local backup");
        Ok(Some(CreatedBackup { info, summary }))
    }

    /// All archives, newest first
    pub fn list_backups(&self) -> ArchiveResult<Vec<LocalBackupInfo>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)
            .map_err(|e| ArchiveError::Io(format!("Failed to read backup directory: {}", e)))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                if let Some(info) = parse_backup_info(&path) {
                    backups.push(info);
                }
            }
        }

        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    /// Delete all but the newest `keep_count` archives
    pub fn enforce_retention(&self) -> ArchiveResult<Vec<PathBuf>> {
        let mut deleted = Vec::new();
        for backup in self
            .list_backups()?
            .into_iter()
            .skip(self.retention.keep_count as usize)
        {
            fs::remove_file(&backup.path)
                .map_err(|e| ArchiveError::Io(format!("Failed to delete old backup: {}", e)))?;
            debug!(filename = %backup.filename, "Deleted old backup");
            deleted.push(backup.path);
        }
        Ok(deleted)
    }

    pub fn create_backup_with_retention(
        &self,
        cancel: &CancellationToken,
    ) -> ArchiveResult<(Option<CreatedBackup>, Vec<PathBuf>)> {
        let created = self.create_backup(cancel)?;
        let deleted = self.enforce_retention()?;
        Ok((created, deleted))
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn get_backup(&self, filename: &str) -> ArchiveResult<Option<LocalBackupInfo>> {
        let path = self.backup_dir.join(filename);
        if path.exists() {
            Ok(parse_backup_info(&path))
        } else {
            Ok(None)
        }
    }

    pub fn get_latest_backup(&self) -> ArchiveResult<Option<LocalBackupInfo>> {
        Ok(self.list_backups()?.into_iter().next())
    }

    /// Replace the local state with the contents of `path`
    pub fn restore_backup(
        &self,
        path: &Path,
        identity: &SelfIdentity,
        cancel: &CancellationToken,
    ) -> ArchiveResult<ImportResult> {
        let length = fs::metadata(path)
            .map_err(|_| ArchiveError::backup_not_found(path.display().to_string()))?
            .len();
        info!(path = %path.display(), length, "Restoring local backup");
        let result = self
            .import
            .import_local(length, || File::open(path), identity, cancel)?;
        if result == ImportResult::Failure {
            warn!(path = %path.display(), "Local backup was not restored");
        }
        Ok(result)
    }
}

fn parse_backup_info(path: &Path) -> Option<LocalBackupInfo> {
    let filename = path.file_name()?.to_string_lossy().to_string();
    let stamp = filename
        .strip_prefix(PREFIX)?
        .strip_suffix(EXTENSION)?
        .strip_suffix('.')?;
    let created_at = parse_backup_timestamp(stamp)?;
    let size_bytes = fs::metadata(path).ok()?.len();

    Some(LocalBackupInfo {
        filename,
        path: path.to_path_buf(),
        created_at,
        size_bytes,
    })
}

/// Parse `YYYYMMDD-HHMMSS-mmm`
fn parse_backup_timestamp(stamp: &str) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = stamp.split('-').collect();
    let [date_part, time_part, millis] = parts.as_slice() else {
        return None;
    };
    if date_part.len() != 8 || time_part.len() != 6 || millis.len() != 3 {
        return None;
    }

    let year: i32 = date_part[0..4].parse().ok()?;
    let month: u32 = date_part[4..6].parse().ok()?;
    let day: u32 = date_part[6..8].parse().ok()?;
    let hour: u32 = time_part[0..2].parse().ok()?;
    let minute: u32 = time_part[2..4].parse().ok()?;
    let second: u32 = time_part[4..6].parse().ok()?;
    let millis: u32 = millis.parse().ok()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = chrono::NaiveTime::from_hms_milli_opt(hour, minute, second, millis)?;
    Some(DateTime::from_naive_utc_and_offset(
        chrono::NaiveDateTime::new(date, time),
        Utc,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::PipelineSettings;
    use crate::jobs::InMemoryJobQueue;
    use crate::kv::KeyValueStore;
    use crate::storage::{structure, Database};
    use crate::test_support::{seed_account, seed_store, SeededAccount};
    use chrono::Datelike;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        db: Arc<Database>,
        account: SeededAccount,
        manager: LocalBackupManager,
    }

    fn create_test_manager(keep_count: u32) -> Fixture {
        let temp = TempDir::new().unwrap();
        let paths = ArchivePaths::with_base_dir(temp.path().to_path_buf());
        paths.ensure_directories().unwrap();

        let db = Arc::new(Database::open(&paths.main_db()).unwrap());
        let kv = Arc::new(KeyValueStore::open(&paths.key_value_db()).unwrap());
        let account = seed_account(&kv);
        seed_store(&db.lock().unwrap(), &account.identity);

        let export = Arc::new(ExportPipeline::new(
            db.clone(),
            kv.clone(),
            paths.snapshot_dir(),
            PipelineSettings::default(),
        ));
        let import = Arc::new(ImportPipeline::new(
            db.clone(),
            kv,
            Arc::new(InMemoryJobQueue::new()),
            PipelineSettings::default(),
        ));
        let manager = LocalBackupManager::new(&paths, export, import, BackupRetention { keep_count });
        Fixture {
            _temp: temp,
            db,
            account,
            manager,
        }
    }

    fn create(f: &Fixture) -> CreatedBackup {
        let created = f
            .manager
            .create_backup(&CancellationToken::new())
            .unwrap()
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        created
    }

    #[test]
    fn test_create_backup() {
        let f = create_test_manager(3);

        let created = create(&f);
        assert!(created.info.path.exists());
        assert!(created.info.filename.starts_with("backup-"));
        assert!(created.info.filename.ends_with(".bin"));
        assert!(created.info.size_bytes > 0);
        assert_eq!(created.summary.chat_items, 3);
    }

    #[test]
    fn test_canceled_backup_leaves_nothing() {
        let f = create_test_manager(3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(f.manager.create_backup(&cancel).unwrap().is_none());
        assert_eq!(fs::read_dir(f.manager.backup_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_list_backups_newest_first() {
        let f = create_test_manager(3);
        create(&f);
        create(&f);

        let backups = f.manager.list_backups().unwrap();
        assert_eq!(backups.len(), 2);
        assert!(backups[0].created_at > backups[1].created_at);
    }

    #[test]
    fn test_retention_policy() {
        let f = create_test_manager(2);
        for _ in 0..4 {
            create(&f);
        }

        let deleted = f.manager.enforce_retention().unwrap();
        assert_eq!(deleted.len(), 2);
        assert_eq!(f.manager.list_backups().unwrap().len(), 2);
    }

    #[test]
    fn test_get_latest_backup() {
        let f = create_test_manager(3);
        assert!(f.manager.get_latest_backup().unwrap().is_none());

        create(&f);
        let newest = create(&f);
        let latest = f.manager.get_latest_backup().unwrap().unwrap();
        assert_eq!(latest.path, newest.info.path);
        assert!(f
            .manager
            .get_backup(&newest.info.filename)
            .unwrap()
            .is_some());
        assert!(f.manager.get_backup("backup-missing.bin").unwrap().is_none());
    }

    #[test]
    fn test_restore_backup_replaces_state() {
        let f = create_test_manager(3);
        let created = create(&f);
        f.db.lock()
            .unwrap()
            .execute("DELETE FROM message", [])
            .unwrap();

        let result = f
            .manager
            .restore_backup(
                &created.info.path,
                &f.account.identity,
                &CancellationToken::new(),
            )
            .unwrap();

        assert!(matches!(result, ImportResult::Success { .. }));
        assert_eq!(
            structure::row_count(&f.db.lock().unwrap(), "message").unwrap(),
            3
        );
    }

    #[test]
    fn test_parse_backup_timestamp() {
        let timestamp = parse_backup_timestamp("20251127-143022-456").unwrap();
        assert_eq!(timestamp.year(), 2025);
        assert_eq!(timestamp.month(), 11);
        assert_eq!(timestamp.day(), 27);
        assert_eq!(timestamp.timestamp_subsec_millis(), 456);

        assert!(parse_backup_timestamp("20251127-143022").is_none());
        assert!(parse_backup_timestamp("2025-11-27").is_none());
    }
}
