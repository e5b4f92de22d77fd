//! End-to-end restore from the archive service or a linked device
//!
//! Both flows download the archive to a temporary file, import it, and hand
//! media off to a [`Job::RestoreMedia`] job. Any outcome other than
//! [`RemoteRestoreResult::Success`] returns the progress machine to `None`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::progress::ArchiveRestoreProgress;
use crate::archive::{read_forward_secrecy_metadata, FORWARD_SECRECY_METADATA_UPPER_BOUND};
use crate::cancel::CancellationToken;
use crate::credentials::ArchiveCredentialManager;
use crate::crypto::{BackupKey, ForwardSecrecyToken};
use crate::error::{ArchiveError, ArchiveResult};
use crate::import::{ImportPipeline, ImportResult};
use crate::jobs::{Job, JobScheduler};
use crate::kv::{AccountValues, BackupValues};
use crate::models::SelfIdentity;
use crate::network::{
    ApplicationFailure, ArchiveApi, ArchiveTransport, CdnLocation, ForwardSecrecyService,
    NetworkResult, TokenRestoreOutcome, TransferProgressListener,
};
use crate::storage::file_io::remove_file_if_exists;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRestoreResult {
    Success,
    NetworkError,
    Canceled,
    Failure,
    /// The recovery service can never produce the token for this archive
    PermanentForwardSecrecyFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreTimestampResult {
    /// Last-modified time of the backup file (ms)
    Success(i64),
    NotFound,
    BackupsNotEnabled,
    VerificationFailure,
    /// Seconds to wait, when the service said
    RateLimited(Option<u64>),
    Failure,
}

/// Services a restore talks to
pub struct RestoreCollaborators {
    pub credentials: Arc<ArchiveCredentialManager>,
    pub api: Arc<dyn ArchiveApi>,
    pub transport: Arc<dyn ArchiveTransport>,
    pub forward_secrecy: Arc<dyn ForwardSecrecyService>,
    pub jobs: Arc<dyn JobScheduler>,
}

/// A downloaded archive, deleted when dropped
struct TempDownload {
    path: PathBuf,
}

impl TempDownload {
    fn new(dir: &Path) -> ArchiveResult<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| ArchiveError::Io(format!("Failed to create download directory: {}", e)))?;
        Ok(Self {
            path: dir.join(format!("restore-{}.tmp", Uuid::new_v4())),
        })
    }

    fn len(&self) -> ArchiveResult<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }
}

impl Drop for TempDownload {
    fn drop(&mut self) {
        if let Err(e) = remove_file_if_exists(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove downloaded archive");
        }
    }
}

struct DownloadListener<'a> {
    cancel: &'a CancellationToken,
}

impl TransferProgressListener for DownloadListener<'_> {
    fn on_progress(&self, transferred: u64, total: u64) {
        debug!(transferred, total, "Downloading archive");
    }

    fn should_cancel(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

enum Download {
    Complete(TempDownload),
    Stopped(RemoteRestoreResult),
}

pub struct RemoteRestoreOrchestrator {
    services: RestoreCollaborators,
    import: Arc<ImportPipeline>,
    progress: Arc<ArchiveRestoreProgress>,
    backup: BackupValues,
    account: AccountValues,
    download_dir: PathBuf,
}

impl RemoteRestoreOrchestrator {
    pub fn new(
        services: RestoreCollaborators,
        import: Arc<ImportPipeline>,
        progress: Arc<ArchiveRestoreProgress>,
        backup: BackupValues,
        account: AccountValues,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            services,
            import,
            progress,
            backup,
            account,
            download_dir,
        }
    }

    /// Download, decrypt and import this account's remote backup
    pub fn restore_remote_backup(
        &self,
        cancel: &CancellationToken,
    ) -> ArchiveResult<RemoteRestoreResult> {
        self.progress.on_restore_pending()?;
        let result = self.run_remote_restore(cancel);
        self.finish(result)
    }

    /// Download and import an archive a linked primary device uploaded
    pub fn restore_link_and_sync_backup(
        &self,
        cdn: u32,
        key: &str,
        ephemeral_backup_key: &BackupKey,
        cancel: &CancellationToken,
    ) -> ArchiveResult<RemoteRestoreResult> {
        self.progress.on_restore_pending()?;
        let location = CdnLocation {
            cdn,
            key: key.to_string(),
        };
        let result = self.run_link_and_sync_restore(&location, ephemeral_backup_key, cancel);
        self.finish(result)
    }

    fn finish(
        &self,
        result: ArchiveResult<RemoteRestoreResult>,
    ) -> ArchiveResult<RemoteRestoreResult> {
        match &result {
            Ok(RemoteRestoreResult::Success) => info!("Restore successful"),
            Ok(outcome) => {
                warn!(?outcome, "Restore did not complete");
                self.progress.on_restore_failed()?;
            }
            Err(e) => {
                warn!(error = %e, "Restore failed");
                if let Err(progress_error) = self.progress.on_restore_failed() {
                    warn!(error = %progress_error, "Failed to reset restore progress");
                }
            }
        }
        result
    }

    fn self_identity(&self) -> ArchiveResult<SelfIdentity> {
        self.account
            .self_identity()?
            .ok_or_else(|| ArchiveError::NotFound {
                entity_type: "Account identity",
                identifier: "self".into(),
            })
    }

    fn download(
        &self,
        location: &CdnLocation,
        cancel: &CancellationToken,
    ) -> ArchiveResult<Download> {
        let temp = TempDownload::new(&self.download_dir)?;
        let listener = DownloadListener { cancel };

        info!(cdn = location.cdn, "Downloading archive");
        let outcome = self
            .services
            .transport
            .download(location, &temp.path, &listener);
        if cancel.is_cancelled() {
            return Ok(Download::Stopped(RemoteRestoreResult::Canceled));
        }
        if let Err(failure) = outcome.into_success::<()>() {
            warn!(?failure, "Failed to download archive");
            return Ok(Download::Stopped(RemoteRestoreResult::NetworkError));
        }
        Ok(Download::Complete(temp))
    }

    fn run_remote_restore(&self, cancel: &CancellationToken) -> ArchiveResult<RemoteRestoreResult> {
        self.progress.on_restoring_db()?;

        let location = match self.services.credentials.backup_cdn_location()?.into_success::<()>() {
            Ok(location) => location,
            Err(failure) => {
                warn!(?failure, "Failed to locate remote backup");
                return Ok(RemoteRestoreResult::NetworkError);
            }
        };
        let temp = match self.download(&location, cancel)? {
            Download::Complete(temp) => temp,
            Download::Stopped(result) => return Ok(result),
        };

        let Some(metadata) = read_forward_secrecy_metadata(File::open(&temp.path)?)? else {
            warn!("Downloaded archive has no forward secrecy metadata");
            return Ok(RemoteRestoreResult::Failure);
        };

        let auth = match self.services.credentials.forward_secrecy_auth()? {
            NetworkResult::Success(auth) => auth,
            NetworkResult::NetworkError(e) => {
                warn!(error = %e, "Network error fetching recovery service auth");
                return Ok(RemoteRestoreResult::NetworkError);
            }
            NetworkResult::StatusCodeError { code, .. } => {
                warn!(code, "Status error fetching recovery service auth");
                return Ok(RemoteRestoreResult::NetworkError);
            }
            NetworkResult::ApplicationError(e) => {
                warn!(error = %e, "Recovery service auth rejected");
                return Ok(RemoteRestoreResult::Failure);
            }
        };

        let token = match self.services.forward_secrecy.restore_token(&auth, &metadata) {
            TokenRestoreOutcome::Restored(restored) => {
                self.backup
                    .set_next_backup_secret_data(Some(&restored.next_backup_secret_data))?;
                restored.token
            }
            TokenRestoreOutcome::NetworkError(e) => {
                warn!(error = %e, "Network error restoring forward secrecy token");
                return Ok(RemoteRestoreResult::NetworkError);
            }
            outcome @ (TokenRestoreOutcome::RestoreFailed | TokenRestoreOutcome::InvalidData) => {
                warn!(?outcome, "Forward secrecy token can not be restored");
                return Ok(RemoteRestoreResult::PermanentForwardSecrecyFailure);
            }
            outcome @ (TokenRestoreOutcome::DataMissing | TokenRestoreOutcome::ServiceError(_)) => {
                warn!(?outcome, "Failed to restore forward secrecy token");
                return Ok(RemoteRestoreResult::Failure);
            }
        };

        self.import_downloaded(&temp, cancel, |length, identity| {
            let path = temp.path.clone();
            self.import.import_remote_backup(
                length,
                move || File::open(&path),
                identity,
                &token,
                cancel,
            )
        })
    }

    fn run_link_and_sync_restore(
        &self,
        location: &CdnLocation,
        ephemeral_backup_key: &BackupKey,
        cancel: &CancellationToken,
    ) -> ArchiveResult<RemoteRestoreResult> {
        self.progress.on_restoring_db()?;

        let temp = match self.download(location, cancel)? {
            Download::Complete(temp) => temp,
            Download::Stopped(result) => return Ok(result),
        };

        self.import_downloaded(&temp, cancel, |length, identity| {
            let path = temp.path.clone();
            self.import.import_link_and_sync(
                length,
                move || File::open(&path),
                identity,
                ephemeral_backup_key,
                cancel,
            )
        })
    }

    fn import_downloaded<F>(
        &self,
        temp: &TempDownload,
        cancel: &CancellationToken,
        import: F,
    ) -> ArchiveResult<RemoteRestoreResult>
    where
        F: FnOnce(u64, &SelfIdentity) -> ArchiveResult<ImportResult>,
    {
        if cancel.is_cancelled() {
            return Ok(RemoteRestoreResult::Canceled);
        }
        let identity = self.self_identity()?;
        info!("Importing downloaded archive");
        match import(temp.len()?, &identity)? {
            ImportResult::Success { .. } => {}
            ImportResult::Failure if cancel.is_cancelled() => return Ok(RemoteRestoreResult::Canceled),
            ImportResult::Failure => return Ok(RemoteRestoreResult::Failure),
        }

        self.services.jobs.enqueue(Job::RestoreMedia);
        Ok(RemoteRestoreResult::Success)
    }

    /// Look up when the remote backup was last written and remember it
    pub fn restore_backup_file_timestamp(&self) -> ArchiveResult<RestoreTimestampResult> {
        let result = self.services.credentials.backup_file_last_modified()?;
        let outcome = timestamp_outcome(&result);
        match outcome {
            RestoreTimestampResult::Success(time_ms) => self.backup.set_last_backup_time(time_ms)?,
            RestoreTimestampResult::NotFound | RestoreTimestampResult::BackupsNotEnabled => {
                self.backup.set_last_backup_time(0)?
            }
            _ => {}
        }
        Ok(outcome)
    }

    /// Check that `key` opens a backup belonging to `aci`
    ///
    /// On a verification failure the backup id is reserved again for `key`
    /// and the check retried once.
    pub fn verify_backup_key_associated_with_account(
        &self,
        aci: &Uuid,
        key: &BackupKey,
    ) -> ArchiveResult<RestoreTimestampResult> {
        let result = self.timestamp_with_key(aci, key)?;
        if result != RestoreTimestampResult::VerificationFailure {
            return Ok(result);
        }

        warn!("Backup key failed verification, reserving backup id again");
        match self.services.credentials.reserve_backup_id_for(key, aci)? {
            NetworkResult::Success(()) => {
                self.backup.clear_all_credentials()?;
                self.timestamp_with_key(aci, key)
            }
            NetworkResult::StatusCodeError {
                code: 429,
                retry_after,
            } => {
                warn!(?retry_after, "Rate limited reserving backup id");
                Ok(RestoreTimestampResult::RateLimited(retry_after))
            }
            failure => {
                warn!(?failure, "Failed to reserve backup id");
                Ok(result)
            }
        }
    }

    fn timestamp_with_key(&self, aci: &Uuid, key: &BackupKey) -> ArchiveResult<RestoreTimestampResult> {
        let result = self
            .services
            .credentials
            .access_with_key(key, aci)?
            .and_then(|access| self.services.api.backup_file_last_modified(&access));
        Ok(timestamp_outcome(&result))
    }

    /// The forward-secrecy block of the remote backup, read without
    /// downloading the whole object
    pub fn fetch_remote_forward_secrecy_metadata(
        &self,
    ) -> ArchiveResult<NetworkResult<Option<Vec<u8>>>> {
        let location = match self.services.credentials.backup_cdn_location()?.into_success() {
            Ok(location) => location,
            Err(failure) => return Ok(failure),
        };
        match self
            .services
            .transport
            .read_range(&location, FORWARD_SECRECY_METADATA_UPPER_BOUND)
            .into_success()
        {
            Ok(bytes) => Ok(NetworkResult::Success(read_forward_secrecy_metadata(
                bytes.as_slice(),
            )?)),
            Err(failure) => Ok(failure),
        }
    }
}

fn timestamp_outcome(result: &NetworkResult<i64>) -> RestoreTimestampResult {
    match result {
        NetworkResult::Success(time_ms) => RestoreTimestampResult::Success(*time_ms),
        NetworkResult::StatusCodeError { code: 404, .. } => {
            info!("No backup file exists");
            RestoreTimestampResult::NotFound
        }
        NetworkResult::StatusCodeError { code: 401, .. } => {
            info!("Backups not enabled");
            RestoreTimestampResult::BackupsNotEnabled
        }
        NetworkResult::ApplicationError(ApplicationFailure::VerificationFailed) => {
            warn!("Backup key failed verification");
            RestoreTimestampResult::VerificationFailure
        }
        failure => {
            warn!(?failure, "Could not check for backup file");
            RestoreTimestampResult::Failure
        }
    }
}
