//! Archive service credentials, backup id reservation and key rotation
//!
//! Every authenticated archive call goes through
//! [`ArchiveCredentialManager::call_with_access`], which owns the recovery
//! policy for authorization failures:
//!
//! - **401**: the service no longer recognizes this backup id. The
//!   initialized flag and both credential caches are cleared and the call is
//!   retried once from full initialization (reservation, then public key
//!   registration). A second 401 is returned to the caller.
//! - **403 on a media call**: not entitled to the paid tier. A locally
//!   remembered `Paid` tier is downgraded to `Free`; credentials are kept.
//! - **Verification failure**: the credentials no longer match the key; both
//!   caches are cleared.
//!
//! Local storage failures are `Err`; remote outcomes are the inner
//! [`NetworkResult`].

pub mod cache;

pub use cache::{day_start_secs, CredentialCache};

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crypto::{BackupId, BackupKey, MediaRootKey};
use crate::environment::Clock;
use crate::error::{ArchiveError, ArchiveResult};
use crate::jobs::{Job, JobControl, JobScheduler};
use crate::kv::{AccountValues, BackupValues};
use crate::models::{BackupTier, CredentialType};
use crate::network::{
    ApplicationFailure, ArchiveApi, ArchiveServiceCredential, BackupInfo, CdnLocation,
    ForwardSecrecyAuth, NetworkResult,
};

/// A credential together with the key it authorizes requests for
#[derive(Debug, Clone)]
pub struct ArchiveServiceAccess {
    pub credential_type: CredentialType,
    pub credential: ArchiveServiceCredential,
    pub backup_key: BackupKey,
    pub aci: Uuid,
}

impl ArchiveServiceAccess {
    pub fn backup_id(&self) -> ArchiveResult<BackupId> {
        self.backup_key.derive_backup_id(&self.aci)
    }
}

/// Key used to sign media-tier requests
fn media_backup_key(media_root_key: &MediaRootKey) -> BackupKey {
    BackupKey::from_bytes(*media_root_key.as_bytes())
}

pub struct ArchiveCredentialManager {
    api: Arc<dyn ArchiveApi>,
    backup: BackupValues,
    account: AccountValues,
    jobs: Arc<dyn JobScheduler>,
    job_control: Arc<dyn JobControl>,
    clock: Arc<dyn Clock>,
}

impl ArchiveCredentialManager {
    pub fn new(
        api: Arc<dyn ArchiveApi>,
        backup: BackupValues,
        account: AccountValues,
        jobs: Arc<dyn JobScheduler>,
        job_control: Arc<dyn JobControl>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            backup,
            account,
            jobs,
            job_control,
            clock,
        }
    }

    fn aci(&self) -> ArchiveResult<Uuid> {
        self.account.aci()?.ok_or_else(|| ArchiveError::NotFound {
            entity_type: "Account identifier",
            identifier: "self".into(),
        })
    }

    /// Stored key for `credential_type`; never creates key material
    fn key_for(&self, credential_type: CredentialType) -> ArchiveResult<BackupKey> {
        match credential_type {
            CredentialType::Message => self.account.require_backup_key(),
            CredentialType::Media => self
                .backup
                .media_root_key()?
                .map(|key| media_backup_key(&key))
                .ok_or_else(|| ArchiveError::NotFound {
                    entity_type: "Media root key",
                    identifier: "self".into(),
                }),
        }
    }

    /// Tier this device believes it has
    pub fn get_tier(&self) -> ArchiveResult<Option<BackupTier>> {
        self.backup.backup_tier()
    }

    /// Record a purchased subscription
    pub fn enable_paid_tier(&self) -> ArchiveResult<()> {
        info!("Enabling paid backup tier");
        self.backup.set_backup_tier(Some(BackupTier::Paid))?;
        self.backup.set_backup_expired_and_downgraded(false)
    }

    /// Reserve the message and media backup ids for the current keys
    pub fn reserve_backup_id(&self) -> ArchiveResult<NetworkResult<()>> {
        let aci = self.aci()?;
        let message_key = self.key_for(CredentialType::Message)?;
        self.reserve_backup_id_for(&message_key, &aci)
    }

    /// Reserve backup ids derived from `message_key` for `aci`
    ///
    /// A media root key is generated and stored here if none exists yet.
    pub fn reserve_backup_id_for(
        &self,
        message_key: &BackupKey,
        aci: &Uuid,
    ) -> ArchiveResult<NetworkResult<()>> {
        let message_id = message_key.derive_backup_id(aci)?;
        let media_root_key = self.backup.media_root_key_or_generate()?;
        let media_id = media_backup_key(&media_root_key).derive_backup_id(aci)?;
        debug!(?message_id, "Reserving backup id");
        Ok(self.api.reserve_backup_ids(&message_id, &media_id))
    }

    fn cached_access(
        &self,
        credential_type: CredentialType,
        key: BackupKey,
        aci: Uuid,
    ) -> ArchiveResult<Option<ArchiveServiceAccess>> {
        let cache = self.backup.credentials(credential_type)?;
        Ok(cache
            .for_day(self.clock.now_ms())
            .cloned()
            .map(|credential| ArchiveServiceAccess {
                credential_type,
                credential,
                backup_key: key,
                aci,
            }))
    }

    /// Fetch credentials for both tiers and merge them into the caches
    fn fetch_credentials(&self) -> ArchiveResult<NetworkResult<()>> {
        let now_ms = self.clock.now_ms();
        let batch = match self
            .api
            .fetch_service_credentials(now_ms / 1000)
            .into_success()
        {
            Ok(batch) => batch,
            Err(failure) => {
                warn!(?failure, "Failed to fetch archive credentials");
                return Ok(failure);
            }
        };

        for (credential_type, issued) in [
            (CredentialType::Message, batch.message),
            (CredentialType::Media, batch.media),
        ] {
            let mut cache = self.backup.credentials(credential_type)?;
            let added = issued.len();
            cache.add(issued);
            let pruned = cache.prune(now_ms);
            debug!(?credential_type, added, pruned, "Updated credential cache");
            self.backup.set_credentials(credential_type, &cache)?;
        }
        Ok(NetworkResult::Success(()))
    }

    fn access_for_key(
        &self,
        credential_type: CredentialType,
        key: BackupKey,
        aci: Uuid,
    ) -> ArchiveResult<NetworkResult<ArchiveServiceAccess>> {
        if let Some(access) = self.cached_access(credential_type, key.clone(), aci)? {
            return Ok(NetworkResult::Success(access));
        }
        if let Err(failure) = self.fetch_credentials()?.into_success::<ArchiveServiceAccess>() {
            return Ok(failure);
        }
        match self.cached_access(credential_type, key, aci)? {
            Some(access) => Ok(NetworkResult::Success(access)),
            None => Ok(NetworkResult::ApplicationError(ApplicationFailure::Other(
                format!("No {:?} credential issued for today", credential_type),
            ))),
        }
    }

    /// Reserve the backup id and register public keys, once per identity
    pub fn init_backup_and_fetch_auth(&self) -> ArchiveResult<NetworkResult<()>> {
        if self.backup.backups_initialized()? {
            return Ok(NetworkResult::Success(()));
        }

        info!("Initializing archive backup id");
        if let Err(failure) = self.reserve_backup_id()?.into_success() {
            warn!(?failure, "Backup id reservation failed");
            return Ok(failure);
        }

        self.backup.clear_all_credentials()?;
        if let Err(failure) = self.fetch_credentials()?.into_success() {
            return Ok(failure);
        }

        let aci = self.aci()?;
        for credential_type in [CredentialType::Message, CredentialType::Media] {
            let key = self.key_for(credential_type)?;
            let access = match self.cached_access(credential_type, key, aci)? {
                Some(access) => access,
                None => {
                    return Ok(NetworkResult::ApplicationError(ApplicationFailure::Other(
                        format!("No {:?} credential issued for today", credential_type),
                    )))
                }
            };
            if let Err(failure) = self.api.set_public_key(&access).into_success() {
                warn!(?credential_type, ?failure, "Public key registration failed");
                return Ok(failure);
            }
        }

        self.backup.set_backups_initialized(true)?;
        info!("Archive backup initialized");
        Ok(NetworkResult::Success(()))
    }

    /// Access for `credential_type`, initializing the backup first if needed
    pub fn get_access(
        &self,
        credential_type: CredentialType,
    ) -> ArchiveResult<NetworkResult<ArchiveServiceAccess>> {
        if let Err(failure) = self.init_backup_and_fetch_auth()?.into_success() {
            return Ok(failure);
        }
        let key = self.key_for(credential_type)?;
        self.access_for_key(credential_type, key, self.aci()?)
    }

    /// Message-tier access signed with an arbitrary key, without initializing
    pub fn access_with_key(
        &self,
        key: &BackupKey,
        aci: &Uuid,
    ) -> ArchiveResult<NetworkResult<ArchiveServiceAccess>> {
        self.access_for_key(CredentialType::Message, key.clone(), *aci)
    }

    /// Forget the backup identity: next access re-reserves and re-registers
    fn reset_initialization(&self) -> ArchiveResult<()> {
        self.backup.set_backups_initialized(false)?;
        self.backup.clear_all_credentials()
    }

    fn downgrade_if_paid(&self) -> ArchiveResult<()> {
        if self.backup.backup_tier()? == Some(BackupTier::Paid) {
            warn!("Paid tier no longer entitled, downgrading to free");
            self.backup.set_backup_tier(Some(BackupTier::Free))?;
            self.backup.set_backup_expired_and_downgraded(true)?;
        }
        Ok(())
    }

    /// Run `call` with access for `credential_type`, applying the
    /// authorization failure policy
    pub fn call_with_access<T, F>(
        &self,
        credential_type: CredentialType,
        call: F,
    ) -> ArchiveResult<NetworkResult<T>>
    where
        F: Fn(&ArchiveServiceAccess) -> NetworkResult<T>,
    {
        let mut retried = false;
        loop {
            let access = match self.get_access(credential_type)?.into_success() {
                Ok(access) => access,
                Err(failure) => return Ok(failure),
            };

            let result = call(&access);
            match &result {
                NetworkResult::StatusCodeError { code: 401, .. } => {
                    warn!(?credential_type, retried, "Archive call unauthorized, resetting backup id");
                    self.reset_initialization()?;
                    if !retried {
                        retried = true;
                        continue;
                    }
                }
                NetworkResult::StatusCodeError { code: 403, .. }
                    if credential_type == CredentialType::Media =>
                {
                    self.downgrade_if_paid()?;
                }
                NetworkResult::ApplicationError(ApplicationFailure::VerificationFailed) => {
                    warn!("Archive credential verification failed, clearing credentials");
                    self.backup.clear_all_credentials()?;
                }
                _ => {}
            }
            return Ok(result);
        }
    }

    /// Replace the backup key and media root key
    ///
    /// In-flight uploads and exports are halted and credentials cleared
    /// before the new keys are stored.
    pub fn rotate_keys(
        &self,
        new_backup_key: &BackupKey,
        new_media_root_key: &MediaRootKey,
    ) -> ArchiveResult<()> {
        let halted = self.job_control.halt_upload_and_export_jobs();
        info!(halted, "Rotating backup keys");

        self.reset_initialization()?;
        self.account.set_backup_key(new_backup_key)?;
        self.backup.set_media_root_key(new_media_root_key)?;

        self.jobs.enqueue(Job::BackupMessages);
        Ok(())
    }

    /// Refresh the tier from the service
    ///
    /// A service answer of `Free` while the device believed `Paid` is a lapsed
    /// subscription and sets the downgraded flag.
    pub fn get_tier_from_service(&self) -> ArchiveResult<NetworkResult<BackupTier>> {
        let result = self.call_with_access(CredentialType::Message, |access| {
            self.api.backup_tier(access)
        })?;
        if let NetworkResult::Success(remote) = &result {
            match (self.backup.backup_tier()?, remote) {
                (Some(BackupTier::Paid), BackupTier::Free) => self.downgrade_if_paid()?,
                _ => self.backup.set_backup_tier(Some(*remote))?,
            }
        }
        Ok(result)
    }

    /// Credentials for the forward-secrecy recovery service
    pub fn forward_secrecy_auth(&self) -> ArchiveResult<NetworkResult<ForwardSecrecyAuth>> {
        self.call_with_access(CredentialType::Message, |access| {
            self.api.forward_secrecy_auth(access)
        })
    }

    pub fn backup_info(&self) -> ArchiveResult<NetworkResult<BackupInfo>> {
        self.call_with_access(CredentialType::Message, |access| self.api.backup_info(access))
    }

    /// Where the message backup object can be downloaded from
    pub fn backup_cdn_location(&self) -> ArchiveResult<NetworkResult<CdnLocation>> {
        Ok(self.backup_info()?.map(|info| info.message_backup_location()))
    }

    pub fn backup_file_last_modified(&self) -> ArchiveResult<NetworkResult<i64>> {
        self.call_with_access(CredentialType::Message, |access| {
            self.api.backup_file_last_modified(access)
        })
    }
}
