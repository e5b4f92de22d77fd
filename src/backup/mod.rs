//! Local backup rotation for chat-archive
//!
//! `LocalBackupManager` writes encrypted archives of the current state into
//! the backups directory as `backup-YYYYMMDD-HHMMSS-mmm.bin`, lists them
//! newest first, keeps the newest `keep_count` and restores one through the
//! import pipeline.
//!
//! # Example
//!
//! ```rust,ignore
//! use chat_archive::backup::LocalBackupManager;
//! use chat_archive::cancel::CancellationToken;
//!
//! let manager = LocalBackupManager::new(&paths, export, import, settings.backup_retention);
//! let (created, deleted) = manager.create_backup_with_retention(&CancellationToken::new())?;
//! ```

mod manager;

pub use manager::{CreatedBackup, LocalBackupInfo, LocalBackupManager};
