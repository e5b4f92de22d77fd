//! Recovery-phrase stretching using Argon2id
//!
//! A user who restores onto a fresh install types the recovery phrase shown
//! when backups were enabled. The phrase is stretched with Argon2id, salted
//! with the account identifier, into the [`BackupKey`] that roots the key
//! hierarchy, so the same phrase always yields the same key for an account.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroize;

use super::keys::BackupKey;
use crate::error::{ArchiveError, ArchiveResult};

const SALT_PREFIX: &[u8] = b"chat-archive-recovery";

/// Parameters for key derivation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyDerivationParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism degree (default: 4)
    pub parallelism: u32,
}

impl Default for KeyDerivationParams {
    fn default() -> Self {
        Self {
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KeyDerivationParams {
    /// Create params with specific values
    pub fn with_values(memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            memory_cost,
            time_cost,
            parallelism,
        }
    }
}

/// Derive the backup key for `aci` from a recovery phrase
///
/// Whitespace around and inside the phrase is normalized so that a phrase
/// copied with different line breaks still produces the same key.
pub fn derive_backup_key(
    phrase: &str,
    aci: &Uuid,
    params: &KeyDerivationParams,
) -> ArchiveResult<BackupKey> {
    let mut normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Err(ArchiveError::Validation("Recovery phrase is empty".into()));
    }

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| ArchiveError::Encryption(format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut salt = Vec::with_capacity(SALT_PREFIX.len() + 16);
    salt.extend_from_slice(SALT_PREFIX);
    salt.extend_from_slice(aci.as_bytes());

    let mut key = [0u8; 32];
    let result = argon2.hash_password_into(normalized.as_bytes(), &salt, &mut key);
    normalized.zeroize();
    result.map_err(|e| ArchiveError::Encryption(format!("Key derivation failed: {}", e)))?;

    let backup_key = BackupKey::from_bytes(key);
    key.zeroize();
    Ok(backup_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KeyDerivationParams {
        KeyDerivationParams::with_values(1024, 1, 1)
    }

    #[test]
    fn test_same_phrase_same_key() {
        let aci = Uuid::new_v4();
        let key1 = derive_backup_key("correct horse battery", &aci, &fast_params()).unwrap();
        let key2 = derive_backup_key("  correct\nhorse  battery ", &aci, &fast_params()).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_phrase_different_key() {
        let aci = Uuid::new_v4();
        let key1 = derive_backup_key("phrase one", &aci, &fast_params()).unwrap();
        let key2 = derive_backup_key("phrase two", &aci, &fast_params()).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_account_salts_the_key() {
        let key1 = derive_backup_key("same phrase", &Uuid::new_v4(), &fast_params()).unwrap();
        let key2 = derive_backup_key("same phrase", &Uuid::new_v4(), &fast_params()).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_empty_phrase_rejected() {
        let result = derive_backup_key("   ", &Uuid::new_v4(), &fast_params());
        assert!(matches!(result, Err(ArchiveError::Validation(_))));
    }
}
