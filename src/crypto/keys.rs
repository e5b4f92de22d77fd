//! Backup key hierarchy
//!
//! ```text
//! BackupKey ──HKDF(aci)──────────────────────────► BackupId
//!     │
//!     └──HKDF(BackupId [, ForwardSecrecyToken])──► MessageBackupKey { hmac, aes }
//!
//! MediaRootKey (random, carried in the archive header)
//! ```
//!
//! Every secret type zeroes itself on drop and redacts itself in `Debug`.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ArchiveError, ArchiveResult};

const BACKUP_ID_INFO: &[u8] = b"chat-archive:backup-id:v1";
const MESSAGE_KEY_INFO: &[u8] = b"chat-archive:message-backup-key:v1";

fn fixed_from_slice<const N: usize>(bytes: &[u8], what: &str) -> ArchiveResult<[u8; N]> {
    bytes.try_into().map_err(|_| {
        ArchiveError::Encryption(format!(
            "{} must be {} bytes, got {}",
            what,
            N,
            bytes.len()
        ))
    })
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

fn hkdf_expand<const N: usize>(ikm: &[u8], salt: Option<&[u8]>, info: &[&[u8]]) -> ArchiveResult<[u8; N]> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = [0u8; N];
    hk.expand_multi_info(info, &mut okm)
        .map_err(|e| ArchiveError::Encryption(format!("HKDF expand failed: {}", e)))?;
    Ok(okm)
}

/// Root secret for message backups
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct BackupKey([u8; 32]);

impl BackupKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        Self(random_bytes())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> ArchiveResult<Self> {
        Ok(Self(fixed_from_slice(bytes, "Backup key")?))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(encoded: &str) -> ArchiveResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ArchiveError::Encryption(format!("Invalid backup key encoding: {}", e)))?;
        Self::from_slice(&bytes)
    }

    /// The server-visible identifier of this account's backup
    pub fn derive_backup_id(&self, aci: &Uuid) -> ArchiveResult<BackupId> {
        hkdf_expand(&self.0, None, &[BACKUP_ID_INFO, aci.as_bytes()]).map(BackupId)
    }

    /// Derive the stream keys, optionally bound to a forward-secrecy token
    pub fn derive_message_backup_key(
        &self,
        aci: &Uuid,
        token: Option<&ForwardSecrecyToken>,
    ) -> ArchiveResult<MessageBackupKey> {
        let backup_id = self.derive_backup_id(aci)?;
        let mut ikm = Vec::with_capacity(64);
        ikm.extend_from_slice(&self.0);
        if let Some(token) = token {
            ikm.extend_from_slice(token.as_bytes());
        }

        let okm = hkdf_expand::<64>(&ikm, Some(backup_id.as_bytes()), &[MESSAGE_KEY_INFO]);
        ikm.zeroize();
        let mut okm = okm?;

        let mut key = MessageBackupKey {
            hmac_key: [0u8; 32],
            aes_key: [0u8; 32],
        };
        key.hmac_key.copy_from_slice(&okm[..32]);
        key.aes_key.copy_from_slice(&okm[32..]);
        okm.zeroize();
        Ok(key)
    }
}

impl fmt::Debug for BackupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BackupKey([REDACTED])")
    }
}

/// Identifier of an account's backup on the archive service
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BackupId([u8; 16]);

impl BackupId {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BackupId({})", hex::encode(self.0))
    }
}

/// Keys used to encrypt and authenticate one archive stream
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MessageBackupKey {
    hmac_key: [u8; 32],
    aes_key: [u8; 32],
}

impl MessageBackupKey {
    pub fn hmac_key(&self) -> &[u8; 32] {
        &self.hmac_key
    }

    pub fn aes_key(&self) -> &[u8; 32] {
        &self.aes_key
    }
}

impl fmt::Debug for MessageBackupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageBackupKey([REDACTED])")
    }
}

/// Root of the media encryption hierarchy
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MediaRootKey([u8; 32]);

impl MediaRootKey {
    pub fn generate() -> Self {
        Self(random_bytes())
    }

    pub fn from_slice(bytes: &[u8]) -> ArchiveResult<Self> {
        Ok(Self(fixed_from_slice(bytes, "Media root key")?))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for MediaRootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MediaRootKey([REDACTED])")
    }
}

/// Short-lived secret held by the recovery service
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ForwardSecrecyToken([u8; 32]);

impl ForwardSecrecyToken {
    pub fn generate() -> Self {
        Self(random_bytes())
    }

    pub fn from_slice(bytes: &[u8]) -> ArchiveResult<Self> {
        Ok(Self(fixed_from_slice(bytes, "Forward secrecy token")?))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ForwardSecrecyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ForwardSecrecyToken([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aci() -> Uuid {
        Uuid::parse_str("6d3a1c52-0b9f-4a4e-8f1e-2f6d1e0b7a11").unwrap()
    }

    #[test]
    fn test_backup_id_is_deterministic_per_account() {
        let key = BackupKey::from_bytes([9u8; 32]);
        let a = key.derive_backup_id(&aci()).unwrap();
        let b = key.derive_backup_id(&aci()).unwrap();
        let other = key.derive_backup_id(&Uuid::new_v4()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, other);
    }

    #[test]
    fn test_forward_secrecy_token_changes_keys() {
        let key = BackupKey::from_bytes([9u8; 32]);
        let plain = key.derive_message_backup_key(&aci(), None).unwrap();
        let token = ForwardSecrecyToken::from_slice(&[3u8; 32]).unwrap();
        let bound = key.derive_message_backup_key(&aci(), Some(&token)).unwrap();
        assert_ne!(plain.aes_key(), bound.aes_key());
        assert_ne!(plain.hmac_key(), plain.aes_key());
    }

    #[test]
    fn test_base64_round_trip_and_bad_length() {
        let key = BackupKey::generate();
        let decoded = BackupKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key.as_bytes(), decoded.as_bytes());
        assert!(BackupKey::from_slice(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = BackupKey::from_bytes([0xAA; 32]);
        assert_eq!(format!("{:?}", key), "BackupKey([REDACTED])");
        assert!(format!("{:?}", MediaRootKey::generate()).contains("REDACTED"));
    }
}
