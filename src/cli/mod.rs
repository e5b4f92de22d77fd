//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the export/import pipelines.

pub mod account;
pub mod archive;
pub mod backup;

pub use account::{handle_init_command, handle_status_command, InitArgs};
pub use archive::{
    handle_export_command, handle_import_command, handle_validate_command, ExportArgs, ImportArgs,
    ValidateArgs,
};
pub use backup::{handle_backup_command, BackupCommands};

use std::sync::Arc;

use crate::config::paths::ArchivePaths;
use crate::config::settings::Settings;
use crate::error::{ArchiveError, ArchiveResult};
use crate::export::ExportPipeline;
use crate::import::ImportPipeline;
use crate::jobs::{InMemoryJobQueue, JobScheduler};
use crate::kv::{AccountValues, KeyValueStore};
use crate::models::SelfIdentity;
use crate::storage::Database;

/// Open stores for one command invocation
pub struct Session {
    pub paths: ArchivePaths,
    pub settings: Settings,
    pub db: Arc<Database>,
    pub kv: Arc<KeyValueStore>,
    pub jobs: Arc<InMemoryJobQueue>,
}

impl Session {
    /// Open the stores under `paths`, creating them if missing
    pub fn open(paths: ArchivePaths, settings: Settings) -> ArchiveResult<Self> {
        paths.ensure_directories()?;
        let db = Arc::new(Database::open(&paths.main_db())?);
        let kv = Arc::new(KeyValueStore::open(&paths.key_value_db())?);
        Ok(Self {
            paths,
            settings,
            db,
            kv,
            jobs: Arc::new(InMemoryJobQueue::new()),
        })
    }

    /// Open existing stores; fails if `init` was never run
    pub fn open_initialized(paths: ArchivePaths, settings: Settings) -> ArchiveResult<Self> {
        if !paths.is_initialized() {
            return Err(ArchiveError::Config(format!(
                "No data at {}. Run 'chat-archive init' first.",
                paths.base_dir().display()
            )));
        }
        Self::open(paths, settings)
    }

    pub fn account(&self) -> AccountValues {
        AccountValues::new(self.kv.clone())
    }

    pub fn identity(&self) -> ArchiveResult<SelfIdentity> {
        self.account()
            .self_identity()?
            .ok_or_else(|| ArchiveError::NotFound {
                entity_type: "Account identity",
                identifier: "self".into(),
            })
    }

    pub fn export_pipeline(&self) -> ExportPipeline {
        ExportPipeline::new(
            self.db.clone(),
            self.kv.clone(),
            self.paths.snapshot_dir(),
            self.settings.pipeline.clone(),
        )
    }

    pub fn import_pipeline(&self) -> ImportPipeline {
        let jobs: Arc<dyn JobScheduler> = self.jobs.clone();
        ImportPipeline::new(
            self.db.clone(),
            self.kv.clone(),
            jobs,
            self.settings.pipeline.clone(),
        )
    }

    /// Print and clear the follow-up jobs queued by an import
    pub fn report_jobs(&self) {
        let jobs = self.jobs.drain();
        if jobs.is_empty() {
            return;
        }
        println!("Queued {} follow-up job(s):", jobs.len());
        for job in jobs {
            println!("  - {:?}", job);
        }
    }
}

/// Format a file size in human-readable form
pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
