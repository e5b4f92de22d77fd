//! Interfaces to the archive service, the CDN and the recovery service
//!
//! Transport, request signing and wire formats belong to the embedding
//! application. Outcomes are values, not errors: callers branch on
//! [`NetworkResult`] to decide between retrying, invalidating credentials
//! and giving up.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::ArchiveServiceAccess;
use crate::crypto::{BackupId, ForwardSecrecyToken};
use crate::models::BackupTier;

/// Failure reported by the service or the client library after a request
/// reached it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplicationFailure {
    /// The server's public key for this backup id does not match the key used
    #[error("backup key verification failed")]
    VerificationFailed,
    #[error("{0}")]
    Other(String),
}

/// Outcome of a call against a remote service
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkResult<T> {
    Success(T),
    /// The request never got a response (connection, timeout)
    NetworkError(String),
    /// The service answered with a non-success status
    StatusCodeError {
        code: u16,
        /// Seconds, when the service sent `Retry-After`
        retry_after: Option<u64>,
    },
    ApplicationError(ApplicationFailure),
}

impl<T> NetworkResult<T> {
    pub fn status(code: u16) -> Self {
        Self::StatusCodeError {
            code,
            retry_after: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::StatusCodeError { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    /// The success value, or the failure re-typed so it can be returned as is
    pub fn into_success<U>(self) -> Result<T, NetworkResult<U>> {
        match self {
            Self::Success(value) => Ok(value),
            Self::NetworkError(e) => Err(NetworkResult::NetworkError(e)),
            Self::StatusCodeError { code, retry_after } => {
                Err(NetworkResult::StatusCodeError { code, retry_after })
            }
            Self::ApplicationError(e) => Err(NetworkResult::ApplicationError(e)),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> NetworkResult<U> {
        match self.into_success() {
            Ok(value) => NetworkResult::Success(f(value)),
            Err(failure) => failure,
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> NetworkResult<U>) -> NetworkResult<U> {
        match self.into_success() {
            Ok(value) => f(value),
            Err(failure) => failure,
        }
    }
}

/// A day-scoped credential issued by the archive service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveServiceCredential {
    /// Start of the day the credential is valid for (seconds since epoch)
    pub redemption_time_secs: i64,
    /// Opaque presentation, base64
    pub credential: String,
}

/// Credentials for both tiers, as returned by one fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveCredentialBatch {
    pub message: Vec<ArchiveServiceCredential>,
    pub media: Vec<ArchiveServiceCredential>,
}

/// Where the service keeps this account's backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub cdn: u32,
    pub backup_dir: String,
    pub media_dir: String,
    pub backup_name: String,
    pub used_space: Option<u64>,
}

/// An object on a CDN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnLocation {
    pub cdn: u32,
    pub key: String,
}

impl BackupInfo {
    /// Location of the message backup object
    pub fn message_backup_location(&self) -> CdnLocation {
        CdnLocation {
            cdn: self.cdn,
            key: format!("{}/{}", self.backup_dir, self.backup_name),
        }
    }
}

/// Credentials for the recovery service
#[derive(Clone, PartialEq, Eq)]
pub struct ForwardSecrecyAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ForwardSecrecyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardSecrecyAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// What the recovery service hands back for an archive's metadata
#[derive(Clone)]
pub struct RestoredSecrecy {
    pub token: ForwardSecrecyToken,
    /// Opaque state the next remote backup continues its chain from
    pub next_backup_secret_data: Vec<u8>,
}

impl fmt::Debug for RestoredSecrecy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoredSecrecy")
            .field("token", &self.token)
            .field("next_backup_secret_data", &"[REDACTED]")
            .finish()
    }
}

/// Outcome of asking the recovery service for a forward-secrecy token
#[derive(Debug, Clone)]
pub enum TokenRestoreOutcome {
    Restored(RestoredSecrecy),
    NetworkError(String),
    /// The service refused; retrying with the same material cannot succeed
    RestoreFailed,
    /// The metadata was not understood by the service
    InvalidData,
    /// The service holds no token for this metadata
    DataMissing,
    ServiceError(String),
}

/// Authenticated calls to the archive service
pub trait ArchiveApi: Send + Sync {
    /// Credentials for today and the following days, both tiers at once
    fn fetch_service_credentials(&self, now_secs: i64) -> NetworkResult<ArchiveCredentialBatch>;

    fn reserve_backup_ids(
        &self,
        message_backup_id: &BackupId,
        media_backup_id: &BackupId,
    ) -> NetworkResult<()>;

    /// Register the public key derived from the access pair's backup key
    fn set_public_key(&self, access: &ArchiveServiceAccess) -> NetworkResult<()>;

    fn backup_info(&self, access: &ArchiveServiceAccess) -> NetworkResult<BackupInfo>;

    fn backup_tier(&self, access: &ArchiveServiceAccess) -> NetworkResult<BackupTier>;

    fn forward_secrecy_auth(&self, access: &ArchiveServiceAccess)
        -> NetworkResult<ForwardSecrecyAuth>;

    /// Last-modified time (ms) of the message backup object
    fn backup_file_last_modified(&self, access: &ArchiveServiceAccess) -> NetworkResult<i64>;
}

/// Progress and cooperative cancellation for a transfer
pub trait TransferProgressListener {
    fn on_progress(&self, transferred: u64, total: u64);

    /// Polled by the transport on every progress tick
    fn should_cancel(&self) -> bool {
        false
    }
}

/// Reads from the CDN
pub trait ArchiveTransport: Send + Sync {
    /// Stream an object to `destination`, reporting progress
    fn download(
        &self,
        location: &CdnLocation,
        destination: &Path,
        listener: &dyn TransferProgressListener,
    ) -> NetworkResult<()>;

    /// The first `length` bytes of an object
    fn read_range(&self, location: &CdnLocation, length: u64) -> NetworkResult<Vec<u8>>;
}

/// The service that holds forward-secrecy tokens
pub trait ForwardSecrecyService: Send + Sync {
    fn restore_token(&self, auth: &ForwardSecrecyAuth, metadata: &[u8]) -> TokenRestoreOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_preserves_failures() {
        let ok: NetworkResult<u32> = NetworkResult::Success(2);
        assert_eq!(ok.map(|v| v * 2), NetworkResult::Success(4));

        let failed: NetworkResult<u32> = NetworkResult::StatusCodeError {
            code: 429,
            retry_after: Some(30),
        };
        let mapped = failed.map(|v| v.to_string());
        assert_eq!(mapped.status_code(), Some(429));
        assert!(!mapped.is_success());
    }

    #[test]
    fn test_message_backup_location() {
        let info = BackupInfo {
            cdn: 3,
            backup_dir: "abc".into(),
            media_dir: "media".into(),
            backup_name: "backup".into(),
            used_space: None,
        };
        assert_eq!(
            info.message_backup_location(),
            CdnLocation {
                cdn: 3,
                key: "abc/backup".into()
            }
        );
    }

    #[test]
    fn test_auth_debug_redacts_password() {
        let auth = ForwardSecrecyAuth {
            username: "user".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", auth).contains("hunter2"));
    }
}
