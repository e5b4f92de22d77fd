//! Path management for chat-archive
//!
//! ## Path Resolution Order
//!
//! 1. `CHAT_ARCHIVE_DATA_DIR` environment variable (if set)
//! 2. The platform data directory reported by `directories`
//!    (`~/.local/share/chat-archive` on Linux)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::ArchiveError;

/// Environment variable that overrides the data directory
pub const DATA_DIR_ENV: &str = "CHAT_ARCHIVE_DATA_DIR";

/// Manages all paths used by chat-archive
#[derive(Debug, Clone)]
pub struct ArchivePaths {
    /// Base directory for all chat-archive data
    base_dir: PathBuf,
}

impl ArchivePaths {
    /// Create a new ArchivePaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no platform data directory can be determined.
    pub fn new() -> Result<Self, ArchiveError> {
        let base_dir = if let Ok(custom) = std::env::var(DATA_DIR_ENV) {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create ArchivePaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Directory holding the live stores
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// The main relational store
    pub fn main_db(&self) -> PathBuf {
        self.data_dir().join("main.db")
    }

    /// The key-value store
    pub fn key_value_db(&self) -> PathBuf {
        self.data_dir().join("keyvalue.db")
    }

    /// Scratch directory for export snapshots
    pub fn snapshot_dir(&self) -> PathBuf {
        self.base_dir.join("snapshots")
    }

    /// Directory for local archive files
    pub fn backups_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Scratch directory for downloaded archives
    pub fn download_dir(&self) -> PathBuf {
        self.base_dir.join("downloads")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), ArchiveError> {
        for dir in [
            self.base_dir.clone(),
            self.data_dir(),
            self.snapshot_dir(),
            self.backups_dir(),
            self.download_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                ArchiveError::Io(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        Ok(())
    }

    /// Check if the data directory has been initialized (main store exists)
    pub fn is_initialized(&self) -> bool {
        self.main_db().exists()
    }
}

fn resolve_default_path() -> Result<PathBuf, ArchiveError> {
    ProjectDirs::from("", "", "chat-archive")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| ArchiveError::Config("Could not determine a data directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = ArchivePaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.main_db(), temp_dir.path().join("data").join("main.db"));
        assert_eq!(paths.backups_dir(), temp_dir.path().join("backups"));
    }

    #[test]
    fn test_env_var_override() {
        let temp_dir = TempDir::new().unwrap();
        let custom_path = temp_dir.path().to_str().unwrap();

        std::env::set_var(DATA_DIR_ENV, custom_path);
        let paths = ArchivePaths::new().unwrap();
        assert_eq!(paths.base_dir(), temp_dir.path());
        std::env::remove_var(DATA_DIR_ENV);
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = ArchivePaths::with_base_dir(temp_dir.path().join("nested"));

        paths.ensure_directories().unwrap();

        assert!(paths.data_dir().exists());
        assert!(paths.snapshot_dir().exists());
        assert!(paths.download_dir().exists());
        assert!(!paths.is_initialized());
    }
}
