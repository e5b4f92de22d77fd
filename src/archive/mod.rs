//! Archive frame codec
//!
//! An archive is a header followed by frames:
//!
//! ```text
//! [BackupHeader][Frame]*
//! ```
//!
//! carried either in an authenticated-encryption envelope
//! ([`envelope`]) or, for diagnostics only, as plaintext ([`stream`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use chat_archive::archive::{open_writer, open_reader, ArchiveWriter, ArchiveReader, BackupMode};
//!
//! let mut writer = open_writer(&backup_key, &aci, BackupMode::Local, None, file)?;
//! writer.write_header(&header)?;
//! writer.write_frame(&frame)?;
//! writer.close()?;
//!
//! let mut reader = open_reader(&backup_key, &aci, BackupMode::Local, None, len, || File::open(&path))?;
//! let header = reader.header()?;
//! while let Some(frame) = reader.next_frame()? { /* ... */ }
//! ```

pub mod envelope;
pub mod frame;
pub mod stream;
pub mod validate;

use serde::{Deserialize, Serialize};

use crate::error::ArchiveResult;

pub use envelope::{
    open_reader, open_writer, read_forward_secrecy_metadata, EncryptedArchiveReader,
    EncryptedArchiveWriter, ForwardSecrecy, FORWARD_SECRECY_METADATA_UPPER_BOUND,
};
pub use frame::{decode, encode, BackupHeader, Frame, MAX_SUPPORTED_VERSION};
pub use stream::{
    open_plaintext_reader, open_plaintext_writer, PlaintextArchiveReader, PlaintextArchiveWriter,
};
pub use validate::{validate, ValidationSummary};

/// What an archive is for; selects the envelope and key binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupMode {
    /// A file kept on this device
    Local,
    /// Handed to a newly linked device through a transit CDN
    LinkAndSync,
    /// Uploaded to the archive service; bound to a forward-secrecy token
    RemoteBackup,
}

/// Sink for an archive being written
pub trait ArchiveWriter {
    fn write_header(&mut self, header: &BackupHeader) -> ArchiveResult<()>;

    fn write_frame(&mut self, frame: &Frame) -> ArchiveResult<()>;

    /// Flush and finalize the stream; safe to call more than once
    fn close(&mut self) -> ArchiveResult<()>;
}

/// Source of an archive being read
pub trait ArchiveReader {
    /// Read (once) and return the header, refusing unsupported versions
    fn header(&mut self) -> ArchiveResult<BackupHeader>;

    /// Next frame, or `None` at a clean end of stream
    fn next_frame(&mut self) -> ArchiveResult<Option<Frame>>;

    /// Bytes consumed from the underlying source
    fn bytes_read(&self) -> u64;

    /// Total length of the underlying source
    fn stream_length(&self) -> u64;
}
