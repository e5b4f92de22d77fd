//! Backup CLI commands
//!
//! Implements CLI commands for local archive rotation.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;

use super::archive::print_export_summary;
use super::{format_size, Session};
use crate::archive::validate;
use crate::backup::LocalBackupManager;
use crate::cancel::CancellationToken;
use crate::error::{ArchiveError, ArchiveResult};
use crate::import::ImportResult;

/// Backup subcommands
#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Create a new local backup
    Create,

    /// List all available backups
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Restore from a backup
    Restore {
        /// Backup filename or path (use 'latest' for most recent)
        backup: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Delete old backups according to retention policy
    Prune {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// Handle a backup command
pub fn handle_backup_command(session: &Session, cmd: BackupCommands) -> ArchiveResult<()> {
    let manager = LocalBackupManager::new(
        &session.paths,
        Arc::new(session.export_pipeline()),
        Arc::new(session.import_pipeline()),
        session.settings.backup_retention.clone(),
    );
    let cancel = CancellationToken::new();

    match cmd {
        BackupCommands::Create => {
            println!("Creating backup...");
            let (created, deleted) = manager.create_backup_with_retention(&cancel)?;
            match created {
                Some(created) => {
                    println!("Backup created: {}", created.info.filename);
                    println!("Location: {}", created.info.path.display());
                    println!("Size: {}", format_size(created.info.size_bytes));
                    print_export_summary(&created.summary);
                }
                None => println!("Backup canceled."),
            }
            if !deleted.is_empty() {
                println!("Removed {} old backup(s).", deleted.len());
            }
        }

        BackupCommands::List { verbose } => {
            let backups = manager.list_backups()?;

            if backups.is_empty() {
                println!("No backups found.");
                println!("Create one with: chat-archive backup create");
                return Ok(());
            }

            println!("Available Backups");
            println!("=================");
            println!();

            for (i, backup) in backups.iter().enumerate() {
                let age = chrono::Utc::now().signed_duration_since(backup.created_at);
                if verbose {
                    println!(
                        "{}. {}\n   Created: {}\n   Size: {}\n   Age: {}\n",
                        i + 1,
                        backup.filename,
                        backup.created_at.format("%Y-%m-%d %H:%M:%S%.3f UTC"),
                        format_size(backup.size_bytes),
                        format_duration(age),
                    );
                } else {
                    println!(
                        "  {}. {} ({} ago, {})",
                        i + 1,
                        backup.filename,
                        format_duration(age),
                        format_size(backup.size_bytes),
                    );
                }
            }

            println!();
            println!("Total: {} backup(s)", backups.len());
        }

        BackupCommands::Restore { backup, force } => {
            let backup_path = resolve_backup_path(&manager, &backup)?;

            let summary = {
                let mut reader = super::archive::open_archive(session, &backup_path, false)?;
                validate(reader.as_mut())?
            };
            println!("Backup Information");
            println!("==================");
            println!("File: {}", backup_path.display());
            println!("Contents: {}", summary.summary());
            println!();

            if !force {
                println!("WARNING: This will replace ALL current messages, chats and contacts!");
                println!("To proceed, run again with --force flag:");
                println!("  chat-archive backup restore {} --force", backup);
                return Ok(());
            }

            println!("Creating backup of current data before restore...");
            if let Some(pre_restore) = manager.create_backup(&cancel)? {
                println!("Pre-restore backup saved: {}", pre_restore.info.filename);
            }
            println!();

            println!("Restoring from backup...");
            let identity = session.identity()?;
            match manager.restore_backup(&backup_path, &identity, &cancel)? {
                ImportResult::Success { .. } => {
                    println!("Restore complete.");
                    session.report_jobs();
                }
                ImportResult::Failure => {
                    return Err(ArchiveError::Validation(format!(
                        "{} was not restored",
                        backup_path.display()
                    )))
                }
            }
        }

        BackupCommands::Prune { force } => {
            let backups = manager.list_backups()?;
            let keep = session.settings.backup_retention.keep_count as usize;
            let excess = backups.len().saturating_sub(keep);

            if excess == 0 {
                println!("Nothing to prune ({} backup(s), keeping {}).", backups.len(), keep);
                return Ok(());
            }

            if !force {
                println!("Would delete {} backup(s):", excess);
                for backup in backups.iter().skip(keep) {
                    println!("  - {}", backup.filename);
                }
                println!("To proceed, run again with --force flag.");
                return Ok(());
            }

            let deleted = manager.enforce_retention()?;
            println!("Deleted {} backup(s).", deleted.len());
        }
    }

    Ok(())
}

/// Resolve a backup argument to a path
fn resolve_backup_path(manager: &LocalBackupManager, backup: &str) -> ArchiveResult<PathBuf> {
    if backup == "latest" {
        return manager
            .get_latest_backup()?
            .map(|info| info.path)
            .ok_or_else(|| ArchiveError::backup_not_found("latest"));
    }

    let as_path = PathBuf::from(backup);
    if as_path.exists() {
        return Ok(as_path);
    }

    if let Some(info) = manager.get_backup(backup)? {
        return Ok(info.path);
    }
    if let Some(info) = manager.get_backup(&format!("{}.bin", backup))? {
        return Ok(info.path);
    }

    Err(ArchiveError::backup_not_found(backup))
}

/// Format a duration in human-readable form
fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds();

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}
