//! Record framing shared by the plaintext and encrypted streams
//!
//! Each record is `[u32 LE length][payload]`. The first record is the
//! [`BackupHeader`]; every following record is a [`Frame`]. A clean end of
//! input at a record boundary ends the stream, anything else is a format
//! error.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::frame::{self, BackupHeader, Frame};
use super::{ArchiveReader, ArchiveWriter, BackupMode};
use crate::error::{ArchiveError, ArchiveResult};

/// Largest record a reader will accept
pub const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

/// Magic for diagnostic plaintext streams
pub const PLAINTEXT_MAGIC: [u8; 4] = *b"CAP1";

/// Recover an [`ArchiveError`] that travelled through an `io::Error`
pub(crate) fn from_io(err: io::Error) -> ArchiveError {
    let text = err.to_string();
    match err.into_inner() {
        Some(inner) => match inner.downcast::<ArchiveError>() {
            Ok(archive) => *archive,
            Err(other) => ArchiveError::Io(other.to_string()),
        },
        None => ArchiveError::Io(text),
    }
}

pub(crate) fn to_io(err: ArchiveError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Fill `buf` completely, or return how many bytes were available before EOF
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn write_record<W: Write>(out: &mut W, payload: &[u8]) -> ArchiveResult<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| (*len as usize) <= MAX_RECORD_LEN)
        .ok_or_else(|| ArchiveError::Format(format!("Record too large: {} bytes", payload.len())))?;
    out.write_all(&len.to_le_bytes()).map_err(from_io)?;
    out.write_all(payload).map_err(from_io)
}

fn read_record<R: Read>(input: &mut R) -> ArchiveResult<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    match read_full(input, &mut len_bytes).map_err(from_io)? {
        0 => return Ok(None),
        4 => {}
        n => {
            return Err(ArchiveError::Format(format!(
                "Truncated record length ({} of 4 bytes)",
                n
            )))
        }
    }

    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_RECORD_LEN {
        return Err(ArchiveError::Format(format!("Record too large: {} bytes", len)));
    }

    let mut payload = vec![0u8; len];
    let read = read_full(input, &mut payload).map_err(from_io)?;
    if read != len {
        return Err(ArchiveError::Format(format!(
            "Truncated record ({} of {} bytes)",
            read, len
        )));
    }
    Ok(Some(payload))
}

/// Byte sink underneath a [`FrameWriter`]
pub trait FrameSink: Write {
    type Inner;

    /// Flush buffered data and write any trailing authentication data
    fn finish(&mut self) -> ArchiveResult<()>;

    fn into_inner(self) -> Self::Inner;
}

/// Writes header and frames as records into a [`FrameSink`]
pub struct FrameWriter<S: FrameSink> {
    sink: S,
    header_written: bool,
    closed: bool,
    frames_written: u64,
}

impl<S: FrameSink> FrameWriter<S> {
    pub(crate) fn new(sink: S) -> Self {
        Self {
            sink,
            header_written: false,
            closed: false,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Give back the underlying sink's destination (call after `close`)
    pub fn into_inner(self) -> S::Inner {
        self.sink.into_inner()
    }

    fn ensure_open(&self) -> ArchiveResult<()> {
        if self.closed {
            return Err(ArchiveError::Validation("Archive writer is closed".into()));
        }
        Ok(())
    }
}

impl<S: FrameSink> ArchiveWriter for FrameWriter<S> {
    fn write_header(&mut self, header: &BackupHeader) -> ArchiveResult<()> {
        self.ensure_open()?;
        if self.header_written {
            return Err(ArchiveError::Validation("Header already written".into()));
        }
        write_record(&mut self.sink, &frame::encode_header(header)?)?;
        self.header_written = true;
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame) -> ArchiveResult<()> {
        self.ensure_open()?;
        if !self.header_written {
            return Err(ArchiveError::Validation(
                "Header must be written before frames".into(),
            ));
        }
        write_record(&mut self.sink, &frame::encode(frame)?)?;
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> ArchiveResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.sink.finish()
    }
}

/// Unencrypted sink for diagnostic streams
pub struct PlaintextSink<W: Write> {
    out: W,
}

impl<W: Write> Write for PlaintextSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl<W: Write> FrameSink for PlaintextSink<W> {
    type Inner = W;

    fn finish(&mut self) -> ArchiveResult<()> {
        self.out.flush().map_err(from_io)
    }

    fn into_inner(self) -> W {
        self.out
    }
}

pub type PlaintextArchiveWriter<W> = FrameWriter<PlaintextSink<W>>;

/// Counts bytes pulled from the raw source for progress reporting
pub struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.count)
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Reads the header and frames back out of a plaintext record stream
pub struct FrameReader<R: Read> {
    input: R,
    header: Option<BackupHeader>,
    finished: bool,
    source_bytes: Arc<AtomicU64>,
    stream_length: u64,
}

impl<R: Read> FrameReader<R> {
    pub(crate) fn new(input: R, source_bytes: Arc<AtomicU64>, stream_length: u64) -> Self {
        Self {
            input,
            header: None,
            finished: false,
            source_bytes,
            stream_length,
        }
    }
}

impl<R: Read> ArchiveReader for FrameReader<R> {
    fn header(&mut self) -> ArchiveResult<BackupHeader> {
        if let Some(header) = &self.header {
            return Ok(header.clone());
        }
        let bytes = read_record(&mut self.input)?
            .ok_or_else(|| ArchiveError::Format("Stream has no header".into()))?;
        let header = frame::decode_header(&bytes)?;
        header.check_version()?;
        self.header = Some(header.clone());
        Ok(header)
    }

    fn next_frame(&mut self) -> ArchiveResult<Option<Frame>> {
        if self.header.is_none() {
            self.header()?;
        }
        if self.finished {
            return Ok(None);
        }
        match read_record(&mut self.input)? {
            Some(bytes) => frame::decode(&bytes).map(Some),
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    fn bytes_read(&self) -> u64 {
        self.source_bytes.load(Ordering::Relaxed)
    }

    fn stream_length(&self) -> u64 {
        self.stream_length
    }
}

pub type PlaintextArchiveReader<R> = FrameReader<CountingReader<R>>;

/// Open a diagnostic plaintext writer; refused for remote backups
pub fn open_plaintext_writer<W: Write>(
    mode: BackupMode,
    mut sink: W,
) -> ArchiveResult<PlaintextArchiveWriter<W>> {
    if mode == BackupMode::RemoteBackup {
        return Err(ArchiveError::Config(
            "Plaintext archives cannot be used for remote backups".into(),
        ));
    }
    sink.write_all(&PLAINTEXT_MAGIC).map_err(from_io)?;
    Ok(FrameWriter::new(PlaintextSink { out: sink }))
}

/// Open a diagnostic plaintext reader; refused for remote backups
pub fn open_plaintext_reader<R: Read>(
    mode: BackupMode,
    length: u64,
    source: R,
) -> ArchiveResult<PlaintextArchiveReader<R>> {
    if mode == BackupMode::RemoteBackup {
        return Err(ArchiveError::Config(
            "Plaintext archives cannot be used for remote backups".into(),
        ));
    }
    let mut input = CountingReader::new(source);
    let mut magic = [0u8; 4];
    let read = read_full(&mut input, &mut magic).map_err(from_io)?;
    if read != magic.len() || magic != PLAINTEXT_MAGIC {
        return Err(ArchiveError::Format("Not a plaintext archive".into()));
    }
    let counter = input.counter();
    Ok(FrameReader::new(input, counter, length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::frame::{StickerPack, MAX_SUPPORTED_VERSION};

    fn header(version: u64) -> BackupHeader {
        BackupHeader {
            version,
            backup_time_ms: 42,
            media_root_key: vec![0; 32],
            first_app_version: String::new(),
            debug_info: Vec::new(),
        }
    }

    fn sticker(n: u8) -> Frame {
        Frame::StickerPack(StickerPack {
            pack_id: vec![n; 16],
            pack_key: vec![n; 32],
        })
    }

    fn write_stream(version: u64, frames: &[Frame]) -> Vec<u8> {
        let mut writer = open_plaintext_writer(BackupMode::Local, Vec::new()).unwrap();
        writer.write_header(&header(version)).unwrap();
        for frame in frames {
            writer.write_frame(frame).unwrap();
        }
        writer.close().unwrap();
        writer.into_inner()
    }

    #[test]
    fn test_plaintext_stream_reads_back() {
        let bytes = write_stream(1, &[sticker(1), sticker(2)]);
        let len = bytes.len() as u64;
        let mut reader = open_plaintext_reader(BackupMode::Local, len, bytes.as_slice()).unwrap();

        assert_eq!(reader.header().unwrap().backup_time_ms, 42);
        assert_eq!(reader.next_frame().unwrap(), Some(sticker(1)));
        assert_eq!(reader.next_frame().unwrap(), Some(sticker(2)));
        assert_eq!(reader.next_frame().unwrap(), None);
        assert_eq!(reader.bytes_read(), len);
    }

    #[test]
    fn test_plaintext_refused_for_remote_backup() {
        assert!(matches!(
            open_plaintext_writer(BackupMode::RemoteBackup, Vec::new()),
            Err(ArchiveError::Config(_))
        ));
        assert!(open_plaintext_reader(BackupMode::RemoteBackup, 0, &b""[..]).is_err());
    }

    #[test]
    fn test_newer_version_rejected() {
        let bytes = write_stream(MAX_SUPPORTED_VERSION + 1, &[sticker(1)]);
        let mut reader =
            open_plaintext_reader(BackupMode::Local, bytes.len() as u64, bytes.as_slice()).unwrap();
        assert!(matches!(
            reader.header(),
            Err(ArchiveError::UnsupportedVersion { .. })
        ));
        assert!(reader.next_frame().is_err());
    }

    #[test]
    fn test_truncated_record_is_format_error() {
        let mut bytes = write_stream(1, &[sticker(1)]);
        bytes.truncate(bytes.len() - 3);
        let mut reader =
            open_plaintext_reader(BackupMode::Local, bytes.len() as u64, bytes.as_slice()).unwrap();
        reader.header().unwrap();
        assert!(matches!(reader.next_frame(), Err(ArchiveError::Format(_))));
    }

    #[test]
    fn test_frame_before_header_rejected() {
        let mut writer = open_plaintext_writer(BackupMode::Local, Vec::new()).unwrap();
        assert!(writer.write_frame(&sticker(1)).is_err());
        writer.close().unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_empty_stream_has_no_header() {
        let bytes = PLAINTEXT_MAGIC.to_vec();
        let mut reader = open_plaintext_reader(BackupMode::Local, 4, bytes.as_slice()).unwrap();
        assert!(matches!(reader.header(), Err(ArchiveError::Format(_))));
    }
}
