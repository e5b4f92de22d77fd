//! Configuration module for chat-archive
//!
//! This module provides configuration management including:
//! - Data directory resolution
//! - Operator settings persistence

pub mod paths;
pub mod settings;

pub use paths::ArchivePaths;
pub use settings::Settings;
