//! Error types for chat-archive
//!
//! A single error enum covers the codec, the pipelines and the persistence
//! layer. Network outcomes are not errors; they are modelled by
//! [`crate::network::NetworkResult`] so callers can branch on status codes.

use thiserror::Error;

/// The main error type for chat-archive operations
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// SQLite errors from the relational or key-value store
    #[error("Database error: {0}")]
    Database(String),

    /// Validation errors for caller-supplied values
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// The archive stream is structurally corrupt
    #[error("Format error: {0}")]
    Format(String),

    /// MAC or AEAD verification failed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The archive header carries a version newer than this reader understands
    #[error("Unsupported backup version {found} (max supported: {max})")]
    UnsupportedVersion { found: u64, max: u64 },

    /// A frame referenced an id whose defining frame has not been imported
    #[error("No local {entity} for remote id {remote_id}")]
    UnknownRemoteId { entity: &'static str, remote_id: u64 },

    /// The store failed integrity checks after a destructive rewrite
    #[error("Corrupt import: {0}")]
    CorruptImport(String),

    /// Key handling errors
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Transport-level failure surfaced as an error
    #[error("Network error: {0}")]
    Network(String),

    /// Storage errors (locks, files)
    #[error("Storage error: {0}")]
    Storage(String),
}

/// How a failure should be treated by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Corrupt or unsupported stream; needs user action such as re-export
    Format,
    /// MAC or token mismatch; never retried with the same material
    Authentication,
    /// Connection or timeout; retry the whole operation with backoff
    TransientNetwork,
    /// Integrity violation after a destructive rewrite
    Corruption,
    /// Everything else: local I/O, programming errors
    Internal,
}

impl ArchiveError {
    /// Create a "not found" error for recipients
    pub fn recipient_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Recipient",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for backup files
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Classify the error for retry and presentation decisions
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Format(_) | Self::UnsupportedVersion { .. } => FailureKind::Format,
            Self::Authentication(_) => FailureKind::Authentication,
            Self::Network(_) => FailureKind::TransientNetwork,
            Self::CorruptImport(_) => FailureKind::Corruption,
            _ => FailureKind::Internal,
        }
    }

    /// Only transient network failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::TransientNetwork
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ArchiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<rusqlite::Error> for ArchiveError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bincode::Error> for ArchiveError {
    fn from(err: bincode::Error) -> Self {
        Self::Format(err.to_string())
    }
}

/// Result type alias for chat-archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ArchiveError::Config("test error".into());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_not_found_error() {
        let err = ArchiveError::recipient_not_found("42");
        assert_eq!(err.to_string(), "Recipient not found: 42");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unsupported_version_display() {
        let err = ArchiveError::UnsupportedVersion { found: 7, max: 1 };
        assert_eq!(
            err.to_string(),
            "Unsupported backup version 7 (max supported: 1)"
        );
        assert_eq!(err.kind(), FailureKind::Format);
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(
            ArchiveError::Authentication("bad mac".into()).kind(),
            FailureKind::Authentication
        );
        assert_eq!(
            ArchiveError::CorruptImport("fk".into()).kind(),
            FailureKind::Corruption
        );
        assert!(ArchiveError::Network("timeout".into()).is_retryable());
        assert!(!ArchiveError::Format("eof".into()).is_retryable());
        assert!(!ArchiveError::UnknownRemoteId {
            entity: "recipient",
            remote_id: 3
        }
        .is_retryable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let archive_err: ArchiveError = io_err.into();
        assert!(matches!(archive_err, ArchiveError::Io(_)));
    }
}
