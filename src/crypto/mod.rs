//! Cryptographic building blocks for archives
//!
//! Provides the backup key hierarchy (HKDF-SHA256), recovery-phrase
//! stretching (Argon2id) and the chunked AES-256-GCM cipher used by the
//! encrypted archive envelope.

pub mod encryption;
pub mod key_derivation;
pub mod keys;
pub mod secure_memory;

pub use encryption::{ChunkCipher, CHUNK_SIZE};
pub use key_derivation::{derive_backup_key, KeyDerivationParams};
pub use keys::{BackupId, BackupKey, ForwardSecrecyToken, MediaRootKey, MessageBackupKey};
pub use secure_memory::SecureString;
