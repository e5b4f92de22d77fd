//! User settings for chat-archive
//!
//! Tuning knobs for export/import, local backup retention and recovery-key
//! stretching. Runtime bookkeeping (restore state, credentials, tier) is kept
//! in the key-value store instead, see [`crate::kv`].

use serde::{Deserialize, Serialize};

use super::paths::ArchivePaths;
use crate::crypto::key_derivation::KeyDerivationParams;
use crate::error::ArchiveError;
use crate::storage::file_io::{read_json, write_json_atomic};

/// Local backup retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRetention {
    /// Number of local archives to keep
    #[serde(default = "default_keep_count")]
    pub keep_count: u32,
}

impl Default for BackupRetention {
    fn default() -> Self {
        Self {
            keep_count: default_keep_count(),
        }
    }
}

/// Throughput settings for the export and import pipelines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Chat item frames between progress callbacks and cancellation checks
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,

    /// Chat items buffered before the inserter flushes
    #[serde(default = "default_chat_item_batch_size")]
    pub chat_item_batch_size: usize,

    /// Recently active contacts scheduled for a profile refresh after import
    #[serde(default = "default_recent_recipient_limit")]
    pub recent_recipient_refresh_limit: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            progress_interval: default_progress_interval(),
            chat_item_batch_size: default_chat_item_batch_size(),
            recent_recipient_refresh_limit: default_recent_recipient_limit(),
        }
    }
}

/// User settings for chat-archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Local backup retention policy
    #[serde(default)]
    pub backup_retention: BackupRetention,

    /// Export/import tuning
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Argon2id parameters used to stretch a recovery phrase into a backup key
    #[serde(default)]
    pub recovery_key_params: KeyDerivationParams,

    /// Default log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_schema_version() -> u32 {
    1
}

fn default_keep_count() -> u32 {
    5
}

fn default_progress_interval() -> u64 {
    1000
}

fn default_chat_item_batch_size() -> usize {
    500
}

fn default_recent_recipient_limit() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            backup_retention: BackupRetention::default(),
            pipeline: PipelineSettings::default(),
            recovery_key_params: KeyDerivationParams::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or return defaults if the file doesn't exist
    pub fn load_or_create(paths: &ArchivePaths) -> Result<Self, ArchiveError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            read_json(&settings_path).map_err(|e| {
                ArchiveError::Config(format!("Failed to parse settings file: {}", e))
            })
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &ArchivePaths) -> Result<(), ArchiveError> {
        paths.ensure_directories()?;
        write_json_atomic(paths.settings_file(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.backup_retention.keep_count, 5);
        assert_eq!(settings.pipeline.progress_interval, 1000);
        assert_eq!(settings.pipeline.recent_recipient_refresh_limit, 50);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = ArchivePaths::with_base_dir(temp_dir.path().to_path_buf());

        let mut settings = Settings::default();
        settings.backup_retention.keep_count = 2;
        settings.pipeline.chat_item_batch_size = 64;
        settings.save(&paths).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.backup_retention.keep_count, 2);
        assert_eq!(loaded.pipeline.chat_item_batch_size, 64);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"log_level":"debug"}"#).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.pipeline.progress_interval, 1000);
        assert_eq!(settings.recovery_key_params.memory_cost, 65536);
    }
}
