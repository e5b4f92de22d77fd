//! Backup bookkeeping types persisted in the key-value store

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted phase of a restore; survives process restarts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RestoreState {
    #[default]
    None,
    Pending,
    CalculatingMedia,
    RestoringDb,
    RestoringMedia,
    CancelingMedia,
}

impl RestoreState {
    /// True while attachments are being downloaded or the download is winding down
    pub fn is_media_restore_operation(self) -> bool {
        matches!(
            self,
            Self::CalculatingMedia | Self::RestoringMedia | Self::CancelingMedia
        )
    }

    /// True for every state except `None`
    pub fn in_progress(self) -> bool {
        self != Self::None
    }
}

/// Entitlement level; only `Paid` backs up media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupTier {
    Free,
    Paid,
}

/// Which credential family an archive service call needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialType {
    /// Required for any backup
    Message,
    /// Required for media uploads and downloads (paid tier)
    Media,
}

/// The account owner as the import pipeline needs it
#[derive(Debug, Clone, PartialEq)]
pub struct SelfIdentity {
    pub aci: Uuid,
    pub e164: Option<String>,
    pub profile_key: [u8; 32],
}
