//! Typed views over the key-value store
//!
//! Missing keys read as their defaults; absent optional values are `None`
//! rather than errors.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use uuid::Uuid;

use super::KeyValueStore;
use crate::archive::frame::AccountSettings;
use crate::credentials::CredentialCache;
use crate::crypto::{BackupKey, MediaRootKey};
use crate::error::{ArchiveError, ArchiveResult};
use crate::models::{BackupTier, CredentialType, RestoreState, SelfIdentity};

/// Key names, shared with exporters that read a snapshot directly
pub mod keys {
    pub const RESTORE_STATE: &str = "backup.restore_state";
    pub const TOTAL_RESTORING_SIZE: &str = "backup.total_restoring_attachment_size";
    pub const RESTORE_WITH_CELLULAR: &str = "backup.restore_with_cellular";
    pub const BACKUP_TIER: &str = "backup.tier";
    pub const BACKUPS_INITIALIZED: &str = "backup.initialized";
    pub const MESSAGE_CREDENTIALS: &str = "backup.credentials.message";
    pub const MEDIA_CREDENTIALS: &str = "backup.credentials.media";
    pub const MEDIA_ROOT_KEY: &str = "backup.media_root_key";
    pub const FIRST_APP_VERSION: &str = "backup.first_app_version";
    pub const INVALID_BACKUP_VERSION: &str = "backup.invalid_backup_version";
    pub const LAST_BACKUP_TIME: &str = "backup.last_backup_time";
    pub const EXPIRED_AND_DOWNGRADED: &str = "backup.expired_and_downgraded";
    pub const NEXT_BACKUP_SECRET_DATA: &str = "backup.next_backup_secret_data";

    pub const ACI: &str = "account.aci";
    pub const E164: &str = "account.e164";
    pub const PROFILE_KEY: &str = "account.profile_key";
    pub const GIVEN_NAME: &str = "account.given_name";
    pub const FAMILY_NAME: &str = "account.family_name";
    pub const USERNAME: &str = "account.username";
    pub const AVATAR_URL_PATH: &str = "account.avatar_url_path";
    pub const SETTINGS: &str = "account.settings";
    pub const BACKUP_KEY: &str = "account.backup_key";
}

pub(crate) fn decode_base64(value: &str, what: &str) -> ArchiveResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| ArchiveError::Storage(format!("Invalid stored {}: {}", what, e)))
}

/// Backup bookkeeping
#[derive(Clone)]
pub struct BackupValues {
    store: Arc<KeyValueStore>,
}

impl BackupValues {
    pub fn new(store: Arc<KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn restore_state(&self) -> ArchiveResult<RestoreState> {
        Ok(self.store.get(keys::RESTORE_STATE)?.unwrap_or_default())
    }

    pub fn set_restore_state(&self, state: RestoreState) -> ArchiveResult<()> {
        self.store.put(keys::RESTORE_STATE, &state)
    }

    /// Bytes of media the current restore started with
    pub fn total_restoring_attachment_size(&self) -> ArchiveResult<u64> {
        Ok(self.store.get(keys::TOTAL_RESTORING_SIZE)?.unwrap_or(0))
    }

    pub fn set_total_restoring_attachment_size(&self, bytes: u64) -> ArchiveResult<()> {
        self.store.put(keys::TOTAL_RESTORING_SIZE, &bytes)
    }

    pub fn restore_with_cellular(&self) -> ArchiveResult<bool> {
        Ok(self.store.get(keys::RESTORE_WITH_CELLULAR)?.unwrap_or(false))
    }

    pub fn set_restore_with_cellular(&self, allowed: bool) -> ArchiveResult<()> {
        self.store.put(keys::RESTORE_WITH_CELLULAR, &allowed)
    }

    /// Tier this device believes it has; `None` before backups are enabled
    pub fn backup_tier(&self) -> ArchiveResult<Option<BackupTier>> {
        self.store.get(keys::BACKUP_TIER)
    }

    pub fn set_backup_tier(&self, tier: Option<BackupTier>) -> ArchiveResult<()> {
        match tier {
            Some(tier) => self.store.put(keys::BACKUP_TIER, &tier),
            None => self.store.remove(keys::BACKUP_TIER),
        }
    }

    /// Whether the backup id is reserved and public keys are registered
    pub fn backups_initialized(&self) -> ArchiveResult<bool> {
        Ok(self.store.get(keys::BACKUPS_INITIALIZED)?.unwrap_or(false))
    }

    pub fn set_backups_initialized(&self, initialized: bool) -> ArchiveResult<()> {
        self.store.put(keys::BACKUPS_INITIALIZED, &initialized)
    }

    fn credentials_key(credential_type: CredentialType) -> &'static str {
        match credential_type {
            CredentialType::Message => keys::MESSAGE_CREDENTIALS,
            CredentialType::Media => keys::MEDIA_CREDENTIALS,
        }
    }

    pub fn credentials(&self, credential_type: CredentialType) -> ArchiveResult<CredentialCache> {
        Ok(self
            .store
            .get(Self::credentials_key(credential_type))?
            .unwrap_or_default())
    }

    pub fn set_credentials(
        &self,
        credential_type: CredentialType,
        cache: &CredentialCache,
    ) -> ArchiveResult<()> {
        self.store.put(Self::credentials_key(credential_type), cache)
    }

    pub fn clear_all_credentials(&self) -> ArchiveResult<()> {
        self.store.remove(keys::MESSAGE_CREDENTIALS)?;
        self.store.remove(keys::MEDIA_CREDENTIALS)
    }

    pub fn media_root_key(&self) -> ArchiveResult<Option<MediaRootKey>> {
        let encoded: Option<String> = self.store.get(keys::MEDIA_ROOT_KEY)?;
        encoded
            .map(|value| MediaRootKey::from_slice(&decode_base64(&value, "media root key")?))
            .transpose()
    }

    pub fn set_media_root_key(&self, key: &MediaRootKey) -> ArchiveResult<()> {
        self.store
            .put(keys::MEDIA_ROOT_KEY, &STANDARD.encode(key.as_bytes()))
    }

    /// Recovery-service chain state for the next remote backup
    pub fn next_backup_secret_data(&self) -> ArchiveResult<Option<Vec<u8>>> {
        let encoded: Option<String> = self.store.get(keys::NEXT_BACKUP_SECRET_DATA)?;
        encoded
            .map(|value| decode_base64(&value, "backup secret data"))
            .transpose()
    }

    pub fn set_next_backup_secret_data(&self, data: Option<&[u8]>) -> ArchiveResult<()> {
        match data {
            Some(data) => self
                .store
                .put(keys::NEXT_BACKUP_SECRET_DATA, &STANDARD.encode(data)),
            None => self.store.remove(keys::NEXT_BACKUP_SECRET_DATA),
        }
    }

    /// The stored media root key, generating and storing one if absent
    pub fn media_root_key_or_generate(&self) -> ArchiveResult<MediaRootKey> {
        if let Some(key) = self.media_root_key()? {
            return Ok(key);
        }
        let key = MediaRootKey::generate();
        self.set_media_root_key(&key)?;
        Ok(key)
    }

    pub fn first_app_version(&self) -> ArchiveResult<Option<String>> {
        self.store.get(keys::FIRST_APP_VERSION)
    }

    pub fn set_first_app_version(&self, version: &str) -> ArchiveResult<()> {
        self.store.put(keys::FIRST_APP_VERSION, version)
    }

    /// Set when an import refused an archive from a newer version
    pub fn has_invalid_backup_version(&self) -> ArchiveResult<bool> {
        Ok(self.store.get(keys::INVALID_BACKUP_VERSION)?.unwrap_or(false))
    }

    pub fn set_has_invalid_backup_version(&self, invalid: bool) -> ArchiveResult<()> {
        self.store.put(keys::INVALID_BACKUP_VERSION, &invalid)
    }

    pub fn last_backup_time(&self) -> ArchiveResult<Option<i64>> {
        self.store.get(keys::LAST_BACKUP_TIME)
    }

    pub fn set_last_backup_time(&self, time_ms: i64) -> ArchiveResult<()> {
        self.store.put(keys::LAST_BACKUP_TIME, &time_ms)
    }

    /// Set when a paid subscription lapsed and the tier fell back to free
    pub fn backup_expired_and_downgraded(&self) -> ArchiveResult<bool> {
        Ok(self.store.get(keys::EXPIRED_AND_DOWNGRADED)?.unwrap_or(false))
    }

    pub fn set_backup_expired_and_downgraded(&self, value: bool) -> ArchiveResult<()> {
        self.store.put(keys::EXPIRED_AND_DOWNGRADED, &value)
    }
}

/// Account owner's identity, profile and settings
#[derive(Clone)]
pub struct AccountValues {
    store: Arc<KeyValueStore>,
}

impl AccountValues {
    pub fn new(store: Arc<KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn aci(&self) -> ArchiveResult<Option<Uuid>> {
        self.store.get(keys::ACI)
    }

    pub fn set_aci(&self, aci: &Uuid) -> ArchiveResult<()> {
        self.store.put(keys::ACI, aci)
    }

    pub fn e164(&self) -> ArchiveResult<Option<String>> {
        self.store.get(keys::E164)
    }

    pub fn set_e164(&self, e164: &str) -> ArchiveResult<()> {
        self.store.put(keys::E164, e164)
    }

    pub fn profile_key(&self) -> ArchiveResult<Option<[u8; 32]>> {
        let encoded: Option<String> = self.store.get(keys::PROFILE_KEY)?;
        encoded
            .map(|value| {
                let bytes = decode_base64(&value, "profile key")?;
                <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
                    ArchiveError::Storage(format!("Stored profile key has {} bytes", bytes.len()))
                })
            })
            .transpose()
    }

    pub fn set_profile_key(&self, key: &[u8]) -> ArchiveResult<()> {
        self.store.put(keys::PROFILE_KEY, &STANDARD.encode(key))
    }

    /// Given and family name; empty when unset
    pub fn profile_name(&self) -> ArchiveResult<(String, String)> {
        Ok((
            self.store.get(keys::GIVEN_NAME)?.unwrap_or_default(),
            self.store.get(keys::FAMILY_NAME)?.unwrap_or_default(),
        ))
    }

    pub fn set_profile_name(&self, given_name: &str, family_name: &str) -> ArchiveResult<()> {
        self.store.put_all(&[
            (keys::GIVEN_NAME, serde_json::json!(given_name)),
            (keys::FAMILY_NAME, serde_json::json!(family_name)),
        ])
    }

    pub fn username(&self) -> ArchiveResult<Option<String>> {
        self.store.get(keys::USERNAME)
    }

    pub fn set_username(&self, username: Option<&str>) -> ArchiveResult<()> {
        match username {
            Some(name) => self.store.put(keys::USERNAME, name),
            None => self.store.remove(keys::USERNAME),
        }
    }

    pub fn avatar_url_path(&self) -> ArchiveResult<String> {
        Ok(self.store.get(keys::AVATAR_URL_PATH)?.unwrap_or_default())
    }

    pub fn set_avatar_url_path(&self, path: &str) -> ArchiveResult<()> {
        self.store.put(keys::AVATAR_URL_PATH, path)
    }

    pub fn settings(&self) -> ArchiveResult<AccountSettings> {
        Ok(self.store.get(keys::SETTINGS)?.unwrap_or_default())
    }

    pub fn set_settings(&self, settings: &AccountSettings) -> ArchiveResult<()> {
        self.store.put(keys::SETTINGS, settings)
    }

    pub fn backup_key(&self) -> ArchiveResult<Option<BackupKey>> {
        let encoded: Option<String> = self.store.get(keys::BACKUP_KEY)?;
        encoded.map(|value| BackupKey::from_base64(&value)).transpose()
    }

    pub fn set_backup_key(&self, key: &BackupKey) -> ArchiveResult<()> {
        self.store.put(keys::BACKUP_KEY, &key.to_base64())
    }

    /// The backup key, failing when the account has none
    pub fn require_backup_key(&self) -> ArchiveResult<BackupKey> {
        self.backup_key()?.ok_or_else(|| ArchiveError::NotFound {
            entity_type: "Backup key",
            identifier: "account".into(),
        })
    }

    /// Identity used to re-create the self recipient on import
    pub fn self_identity(&self) -> ArchiveResult<Option<SelfIdentity>> {
        let (aci, profile_key) = match (self.aci()?, self.profile_key()?) {
            (Some(aci), Some(profile_key)) => (aci, profile_key),
            _ => return Ok(None),
        };
        Ok(Some(SelfIdentity {
            aci,
            e164: self.e164()?,
            profile_key,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<KeyValueStore> {
        Arc::new(KeyValueStore::open_in_memory().unwrap())
    }

    #[test]
    fn test_backup_value_defaults() {
        let values = BackupValues::new(store());
        assert_eq!(values.restore_state().unwrap(), RestoreState::None);
        assert_eq!(values.backup_tier().unwrap(), None);
        assert!(!values.backups_initialized().unwrap());
        assert!(values.credentials(CredentialType::Media).unwrap().is_empty());
        assert!(values.media_root_key().unwrap().is_none());
    }

    #[test]
    fn test_tier_can_be_cleared() {
        let values = BackupValues::new(store());
        values.set_backup_tier(Some(BackupTier::Paid)).unwrap();
        assert_eq!(values.backup_tier().unwrap(), Some(BackupTier::Paid));
        values.set_backup_tier(None).unwrap();
        assert_eq!(values.backup_tier().unwrap(), None);
    }

    #[test]
    fn test_media_root_key_generated_once() {
        let values = BackupValues::new(store());
        let first = values.media_root_key_or_generate().unwrap();
        let second = values.media_root_key_or_generate().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_self_identity_requires_aci_and_profile_key() {
        let account = AccountValues::new(store());
        assert!(account.self_identity().unwrap().is_none());

        let aci = Uuid::new_v4();
        account.set_aci(&aci).unwrap();
        account.set_profile_key(&[3u8; 32]).unwrap();
        account.set_e164("+15550001111").unwrap();

        let identity = account.self_identity().unwrap().unwrap();
        assert_eq!(identity.aci, aci);
        assert_eq!(identity.profile_key, [3u8; 32]);
        assert_eq!(identity.e164.as_deref(), Some("+15550001111"));
    }

    #[test]
    fn test_backup_key_round_trip() {
        let account = AccountValues::new(store());
        assert!(account.require_backup_key().unwrap_err().is_not_found());
        let key = BackupKey::generate();
        account.set_backup_key(&key).unwrap();
        assert!(account.backup_key().unwrap() == Some(key));
    }
}
