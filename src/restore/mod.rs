//! Restoring an account from an archive
//!
//! [`progress`] tracks where a restore is and whether media downloads can
//! run; [`remote`] drives downloads from the archive service and linked
//! devices through the import pipeline.

pub mod progress;
pub mod remote;

pub use progress::{ArchiveRestoreProgress, ArchiveRestoreProgressState};
pub use remote::{
    RemoteRestoreOrchestrator, RemoteRestoreResult, RestoreCollaborators, RestoreTimestampResult,
};
