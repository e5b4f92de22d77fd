//! chat-archive - Encrypted backup export, import and restore
//!
//! This library serializes a messaging client's local state (a relational
//! store of recipients, chats, calls, sticker packs, notification profiles,
//! chat folders and messages, plus a key-value store of account settings)
//! into a versioned, encrypted, streamable archive, and rebuilds that state
//! from an archive read from disk, downloaded from the archive service or
//! sent by a linked device.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `archive`: Frame codec and the encrypted archive envelope
//! - `export` / `import`: The pipelines between the stores and an archive
//! - `restore`: Restore progress tracking and remote restore orchestration
//! - `credentials`: Archive service credentials and key rotation
//! - `backup`: Local archive rotation
//! - `storage` / `kv`: The relational and key-value stores
//! - `network`, `jobs`, `environment`: Interfaces to the embedding client
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//!
//! # Example
//!
//! ```rust,ignore
//! use chat_archive::config::{paths::ArchivePaths, settings::Settings};
//!
//! let paths = ArchivePaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! ```

pub mod archive;
pub mod backup;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod environment;
pub mod error;
pub mod export;
pub mod import;
pub mod jobs;
pub mod kv;
pub mod models;
pub mod network;
pub mod restore;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{ArchiveError, ArchiveResult};
