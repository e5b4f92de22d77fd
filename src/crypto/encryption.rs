//! Chunked AES-256-GCM used by the encrypted archive envelope
//!
//! The archive plaintext is split into chunks of at most [`CHUNK_SIZE`]
//! bytes. Every chunk is sealed with the same key and a per-chunk nonce
//! (`base_nonce XOR chunk_index`); the associated data binds the stream
//! magic, the chunk index and whether the chunk is the last one, so chunks
//! cannot be reordered, dropped or truncated without detection.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Key, Nonce,
};
use aes_gcm::aead::rand_core::RngCore;

use crate::error::{ArchiveError, ArchiveResult};

/// Maximum plaintext bytes per chunk (64 KiB)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_LEN: usize = 12;

/// Size of the AES-GCM authentication tag
pub const TAG_LEN: usize = 16;

/// Generate a random base nonce for a new stream
pub fn generate_base_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Seals and opens the chunks of one archive stream
pub struct ChunkCipher {
    cipher: Aes256Gcm,
    base_nonce: [u8; NONCE_LEN],
    domain: [u8; 4],
}

impl ChunkCipher {
    /// Create a cipher for a stream identified by its 4-byte magic
    pub fn new(key: &[u8; 32], base_nonce: [u8; NONCE_LEN], domain: [u8; 4]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
            base_nonce,
            domain,
        }
    }

    pub fn base_nonce(&self) -> &[u8; NONCE_LEN] {
        &self.base_nonce
    }

    fn chunk_nonce(&self, index: u64) -> [u8; NONCE_LEN] {
        let mut nonce = self.base_nonce;
        for (slot, byte) in nonce.iter_mut().zip(index.to_le_bytes()) {
            *slot ^= byte;
        }
        nonce
    }

    // domain | chunk_index(8 LE) | is_final(1)
    fn chunk_aad(&self, index: u64, is_final: bool) -> [u8; 13] {
        let mut aad = [0u8; 13];
        aad[..4].copy_from_slice(&self.domain);
        aad[4..12].copy_from_slice(&index.to_le_bytes());
        aad[12] = u8::from(is_final);
        aad
    }

    /// Encrypt one chunk
    pub fn seal(&self, index: u64, is_final: bool, plaintext: &[u8]) -> ArchiveResult<Vec<u8>> {
        let nonce = self.chunk_nonce(index);
        let aad = self.chunk_aad(index, is_final);
        self.cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|e| ArchiveError::Encryption(format!("Chunk encryption failed: {}", e)))
    }

    /// Decrypt one chunk; any tampering surfaces as an authentication error
    pub fn open(&self, index: u64, is_final: bool, ciphertext: &[u8]) -> ArchiveResult<Vec<u8>> {
        let nonce = self.chunk_nonce(index);
        let aad = self.chunk_aad(index, is_final);
        self.cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                ArchiveError::Authentication(format!("Chunk {} failed verification", index))
            })
    }
}
