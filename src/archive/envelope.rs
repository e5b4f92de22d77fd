//! Encrypted archive envelope
//!
//! ```text
//! Local:         [CAL1][nonce:12][chunk]*[mac:32]
//! LinkAndSync:   [CAS1][nonce:12][chunk]*[mac:32]
//! RemoteBackup:  [CAR1][len:u16 BE][metadata][nonce:12][chunk]*[mac:32]
//! chunk:         [len:u32 LE][AES-256-GCM ciphertext + tag]
//! ```
//!
//! The magic is covered by the MAC and is the AEAD associated data, so an
//! archive only opens in the mode it was written for. The trailing HMAC-SHA256 covers every byte before it. Readers verify it
//! over the whole stream before decrypting anything, which is why they take
//! a source factory: the stream is read once to authenticate and once to
//! decrypt.

use std::io::{self, Read, Write};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use super::stream::{from_io, read_full, to_io, CountingReader, FrameReader, FrameSink, FrameWriter};
use super::BackupMode;
use crate::crypto::encryption::{generate_base_nonce, ChunkCipher, CHUNK_SIZE, NONCE_LEN, TAG_LEN};
use crate::crypto::keys::{BackupKey, ForwardSecrecyToken};
use crate::error::{ArchiveError, ArchiveResult};

type HmacSha256 = Hmac<Sha256>;

/// Magic for Local streams
pub const LOCAL_MAGIC: [u8; 4] = *b"CAL1";

/// Magic for LinkAndSync streams
pub const LINK_AND_SYNC_MAGIC: [u8; 4] = *b"CAS1";

/// Magic for RemoteBackup streams
pub const REMOTE_MAGIC: [u8; 4] = *b"CAR1";

/// Largest forward-secrecy metadata block a writer will accept
pub const MAX_FORWARD_SECRECY_METADATA_LEN: usize = 512;

/// Bytes a caller must fetch to read the forward-secrecy metadata
pub const FORWARD_SECRECY_METADATA_UPPER_BOUND: u64 =
    (REMOTE_MAGIC.len() + 2 + MAX_FORWARD_SECRECY_METADATA_LEN) as u64;

const MAC_LEN: usize = 32;

/// Forward-secrecy material bound into a remote backup
#[derive(Debug, Clone)]
pub struct ForwardSecrecy {
    pub token: ForwardSecrecyToken,
    /// Opaque blob the recovery service needs to hand the token back
    pub metadata: Vec<u8>,
}

fn magic_for(mode: BackupMode) -> [u8; 4] {
    match mode {
        BackupMode::RemoteBackup => REMOTE_MAGIC,
        BackupMode::Local => LOCAL_MAGIC,
        BackupMode::LinkAndSync => LINK_AND_SYNC_MAGIC,
    }
}

/// Encrypts plaintext records into chunks and MACs the output
pub struct EncryptingSink<W: Write> {
    out: W,
    mac: HmacSha256,
    cipher: ChunkCipher,
    buffer: Vec<u8>,
    chunk_index: u64,
}

impl<W: Write> EncryptingSink<W> {
    fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.mac.update(bytes);
        self.out.write_all(bytes)
    }

    fn seal_chunk(&mut self, len: usize, is_final: bool) -> io::Result<()> {
        let chunk: Vec<u8> = self.buffer.drain(..len).collect();
        let sealed = self
            .cipher
            .seal(self.chunk_index, is_final, &chunk)
            .map_err(to_io)?;
        self.chunk_index += 1;
        self.emit(&(sealed.len() as u32).to_le_bytes())?;
        self.emit(&sealed)
    }
}

impl<W: Write> Write for EncryptingSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        // Keep the last full chunk buffered: only close() knows it is final.
        while self.buffer.len() > CHUNK_SIZE {
            self.seal_chunk(CHUNK_SIZE, false)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl<W: Write> FrameSink for EncryptingSink<W> {
    type Inner = W;

    fn finish(&mut self) -> ArchiveResult<()> {
        let remaining = self.buffer.len();
        self.seal_chunk(remaining, true).map_err(from_io)?;
        let tag = self.mac.clone().finalize().into_bytes();
        self.out.write_all(&tag).map_err(from_io)?;
        self.out.flush().map_err(from_io)
    }

    fn into_inner(self) -> W {
        self.out
    }
}

pub type EncryptedArchiveWriter<W> = FrameWriter<EncryptingSink<W>>;

/// Open an encrypted writer over `sink`
///
/// `forward_secrecy` must be present for [`BackupMode::RemoteBackup`] and
/// absent otherwise.
pub fn open_writer<W: Write>(
    key: &BackupKey,
    self_aci: &Uuid,
    mode: BackupMode,
    forward_secrecy: Option<&ForwardSecrecy>,
    sink: W,
) -> ArchiveResult<EncryptedArchiveWriter<W>> {
    let token = match (mode, forward_secrecy) {
        (BackupMode::RemoteBackup, Some(fs)) => {
            if fs.metadata.len() > MAX_FORWARD_SECRECY_METADATA_LEN {
                return Err(ArchiveError::Validation(format!(
                    "Forward secrecy metadata too large: {} bytes",
                    fs.metadata.len()
                )));
            }
            Some(&fs.token)
        }
        (BackupMode::RemoteBackup, None) => {
            return Err(ArchiveError::Config(
                "Remote backups require a forward secrecy token".into(),
            ))
        }
        (_, Some(_)) => {
            return Err(ArchiveError::Config(format!(
                "{:?} backups do not use forward secrecy",
                mode
            )))
        }
        (_, None) => None,
    };

    let keys = key.derive_message_backup_key(self_aci, token)?;
    let magic = magic_for(mode);
    let base_nonce = generate_base_nonce();
    let mac = <HmacSha256 as Mac>::new_from_slice(keys.hmac_key())
        .map_err(|e| ArchiveError::Encryption(format!("Invalid MAC key: {}", e)))?;

    let mut sink = EncryptingSink {
        out: sink,
        mac,
        cipher: ChunkCipher::new(keys.aes_key(), base_nonce, magic),
        buffer: Vec::with_capacity(CHUNK_SIZE),
        chunk_index: 0,
    };

    sink.emit(&magic).map_err(from_io)?;
    if let Some(fs) = forward_secrecy {
        sink.emit(&(fs.metadata.len() as u16).to_be_bytes())
            .map_err(from_io)?;
        sink.emit(&fs.metadata).map_err(from_io)?;
    }
    sink.emit(&base_nonce).map_err(from_io)?;

    Ok(FrameWriter::new(sink))
}

/// Decrypts chunks lazily after the stream MAC has been verified
pub struct DecryptingReader<R: Read> {
    source: R,
    cipher: ChunkCipher,
    chunk_index: u64,
    remaining: u64,
    plaintext: Vec<u8>,
    position: usize,
    finished: bool,
}

impl<R: Read> DecryptingReader<R> {
    fn next_chunk(&mut self) -> ArchiveResult<()> {
        if self.remaining < 4 {
            return Err(ArchiveError::Authentication(
                "Stream ended before the final chunk".into(),
            ));
        }
        let mut len_bytes = [0u8; 4];
        if read_full(&mut self.source, &mut len_bytes).map_err(from_io)? != 4 {
            return Err(ArchiveError::Format("Truncated chunk header".into()));
        }
        let len = u32::from_le_bytes(len_bytes) as u64;
        if len < TAG_LEN as u64 || len > (CHUNK_SIZE + TAG_LEN) as u64 || len > self.remaining - 4 {
            return Err(ArchiveError::Format(format!("Invalid chunk length {}", len)));
        }

        let mut ciphertext = vec![0u8; len as usize];
        if read_full(&mut self.source, &mut ciphertext).map_err(from_io)? != ciphertext.len() {
            return Err(ArchiveError::Format("Truncated chunk".into()));
        }
        self.remaining -= 4 + len;

        let is_final = self.remaining == 0;
        self.plaintext = self.cipher.open(self.chunk_index, is_final, &ciphertext)?;
        self.position = 0;
        self.chunk_index += 1;
        self.finished = is_final;
        Ok(())
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.position == self.plaintext.len() {
            if self.finished {
                return Ok(0);
            }
            self.next_chunk().map_err(to_io)?;
        }
        let n = buf.len().min(self.plaintext.len() - self.position);
        buf[..n].copy_from_slice(&self.plaintext[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

pub type EncryptedArchiveReader<R> = FrameReader<DecryptingReader<CountingReader<R>>>;

fn check_magic(found: &[u8; 4], mode: BackupMode) -> ArchiveResult<()> {
    if *found == magic_for(mode) {
        return Ok(());
    }
    if [LOCAL_MAGIC, LINK_AND_SYNC_MAGIC, REMOTE_MAGIC].contains(found) {
        return Err(ArchiveError::Format(format!(
            "Archive was not written for {:?} mode",
            mode
        )));
    }
    Err(ArchiveError::Format("Not an encrypted archive".into()))
}

/// Read the forward-secrecy prefix; `None` when there isn't one
fn read_metadata_block<R: Read>(input: &mut R) -> ArchiveResult<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 2];
    if read_full(input, &mut len_bytes).map_err(from_io)? != 2 {
        return Ok(None);
    }
    let len = u16::from_be_bytes(len_bytes) as usize;
    if len > MAX_FORWARD_SECRECY_METADATA_LEN {
        return Ok(None);
    }
    let mut metadata = vec![0u8; len];
    if read_full(input, &mut metadata).map_err(from_io)? != len {
        return Ok(None);
    }
    Ok(Some(metadata))
}

/// Extract forward-secrecy metadata from the first bytes of a stream
///
/// Only [`FORWARD_SECRECY_METADATA_UPPER_BOUND`] bytes are consumed, so
/// `source` may be the result of a short range read. Returns `None` for
/// streams that carry no metadata.
pub fn read_forward_secrecy_metadata<R: Read>(source: R) -> ArchiveResult<Option<Vec<u8>>> {
    let mut input = source.take(FORWARD_SECRECY_METADATA_UPPER_BOUND);
    let mut magic = [0u8; 4];
    if read_full(&mut input, &mut magic).map_err(from_io)? != 4 || magic != REMOTE_MAGIC {
        return Ok(None);
    }
    read_metadata_block(&mut input)
}

/// Authenticate the whole stream without releasing plaintext
fn verify_stream_mac<R: Read>(mac_key: &[u8; 32], mode: BackupMode, length: u64, mut input: R) -> ArchiveResult<()> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| ArchiveError::Encryption(format!("Invalid MAC key: {}", e)))?;

    let mut magic = [0u8; 4];
    if read_full(&mut input, &mut magic).map_err(from_io)? != 4 {
        return Err(ArchiveError::Format("Archive too short".into()));
    }
    check_magic(&magic, mode)?;
    mac.update(&magic);

    let mut remaining = length - MAC_LEN as u64 - magic.len() as u64;
    let mut buf = vec![0u8; CHUNK_SIZE];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let read = read_full(&mut input, &mut buf[..want]).map_err(from_io)?;
        if read == 0 {
            return Err(ArchiveError::Format("Archive shorter than declared length".into()));
        }
        mac.update(&buf[..read]);
        remaining -= read as u64;
    }

    let mut tag = [0u8; MAC_LEN];
    if read_full(&mut input, &mut tag).map_err(from_io)? != MAC_LEN {
        return Err(ArchiveError::Format("Missing trailing MAC".into()));
    }
    mac.verify_slice(&tag)
        .map_err(|_| ArchiveError::Authentication("Archive MAC mismatch".into()))
}

/// Open an encrypted reader
///
/// `source` is called twice: once to verify the trailing MAC over
/// `length` bytes and once to decrypt.
pub fn open_reader<F, R>(
    key: &BackupKey,
    self_aci: &Uuid,
    mode: BackupMode,
    token: Option<&ForwardSecrecyToken>,
    length: u64,
    source: F,
) -> ArchiveResult<EncryptedArchiveReader<R>>
where
    F: Fn() -> io::Result<R>,
    R: Read,
{
    if mode == BackupMode::RemoteBackup && token.is_none() {
        return Err(ArchiveError::Config(
            "Remote backups require a forward secrecy token".into(),
        ));
    }
    let token = if mode == BackupMode::RemoteBackup { token } else { None };

    let min_len = (LOCAL_MAGIC.len() + NONCE_LEN + 4 + TAG_LEN + MAC_LEN) as u64;
    if length < min_len {
        return Err(ArchiveError::Format(format!("Archive too short: {} bytes", length)));
    }

    let keys = key.derive_message_backup_key(self_aci, token)?;
    verify_stream_mac(keys.hmac_key(), mode, length, source().map_err(from_io)?)?;

    let mut input = CountingReader::new(source().map_err(from_io)?);
    let mut magic = [0u8; 4];
    read_full(&mut input, &mut magic).map_err(from_io)?;
    check_magic(&magic, mode)?;

    let mut consumed = magic.len() as u64;
    if mode == BackupMode::RemoteBackup {
        let metadata = read_metadata_block(&mut input)?
            .ok_or_else(|| ArchiveError::Format("Missing forward secrecy metadata".into()))?;
        consumed += 2 + metadata.len() as u64;
    }

    let mut base_nonce = [0u8; NONCE_LEN];
    if read_full(&mut input, &mut base_nonce).map_err(from_io)? != NONCE_LEN {
        return Err(ArchiveError::Format("Truncated nonce".into()));
    }
    consumed += NONCE_LEN as u64;

    let remaining = length
        .checked_sub(consumed + MAC_LEN as u64)
        .ok_or_else(|| ArchiveError::Format("Archive too short".into()))?;

    let counter = input.counter();
    let decrypting = DecryptingReader {
        source: input,
        cipher: ChunkCipher::new(keys.aes_key(), base_nonce, magic),
        chunk_index: 0,
        remaining,
        plaintext: Vec::new(),
        position: 0,
        finished: false,
    };
    Ok(FrameReader::new(decrypting, counter, length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::frame::{BackupHeader, ChatItem, Direction, Frame};
    use crate::archive::{ArchiveReader, ArchiveWriter};

    fn aci() -> Uuid {
        Uuid::parse_str("0b7e3f3e-6f56-4b52-a0d4-9f0a2b5c1d33").unwrap()
    }

    fn header() -> BackupHeader {
        BackupHeader {
            version: 1,
            backup_time_ms: 99,
            media_root_key: vec![5; 32],
            first_app_version: "2.0".into(),
            debug_info: Vec::new(),
        }
    }

    fn item(n: i64, body_len: usize) -> Frame {
        Frame::ChatItem(ChatItem {
            chat_id: 1,
            author_id: 1,
            date_sent: n,
            expires_in_ms: 0,
            direction: Direction::Outgoing {
                delivered: true,
                read: true,
            },
            body: Some("x".repeat(body_len)),
            attachments: Vec::new(),
        })
    }

    fn write(key: &BackupKey, mode: BackupMode, fs: Option<&ForwardSecrecy>, frames: &[Frame]) -> Vec<u8> {
        let mut writer = open_writer(key, &aci(), mode, fs, Vec::new()).unwrap();
        writer.write_header(&header()).unwrap();
        for frame in frames {
            writer.write_frame(frame).unwrap();
        }
        writer.close().unwrap();
        writer.into_inner()
    }

    fn read_all(reader: &mut dyn ArchiveReader) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = reader.next_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_local_stream_spanning_several_chunks() {
        let key = BackupKey::generate();
        let frames: Vec<Frame> = (0..5).map(|n| item(n, 40_000)).collect();
        let bytes = write(&key, BackupMode::Local, None, &frames);

        let mut reader = open_reader(&key, &aci(), BackupMode::Local, None, bytes.len() as u64, || {
            Ok(bytes.as_slice())
        })
        .unwrap();

        assert_eq!(reader.header().unwrap(), header());
        assert_eq!(read_all(&mut reader), frames);
        assert_eq!(reader.bytes_read(), bytes.len() as u64 - MAC_LEN as u64);
    }

    #[test]
    fn test_remote_stream_with_forward_secrecy() {
        let key = BackupKey::generate();
        let fs = ForwardSecrecy {
            token: ForwardSecrecyToken::generate(),
            metadata: vec![0xAB; 48],
        };
        let bytes = write(&key, BackupMode::RemoteBackup, Some(&fs), &[item(1, 10)]);

        assert_eq!(
            read_forward_secrecy_metadata(&bytes[..]).unwrap(),
            Some(vec![0xAB; 48])
        );

        let mut reader = open_reader(
            &key,
            &aci(),
            BackupMode::RemoteBackup,
            Some(&fs.token),
            bytes.len() as u64,
            || Ok(bytes.as_slice()),
        )
        .unwrap();
        assert_eq!(read_all(&mut reader), vec![item(1, 10)]);

        let wrong = ForwardSecrecyToken::generate();
        let result = open_reader(
            &key,
            &aci(),
            BackupMode::RemoteBackup,
            Some(&wrong),
            bytes.len() as u64,
            || Ok(bytes.as_slice()),
        );
        assert!(matches!(result, Err(ArchiveError::Authentication(_))));
    }

    #[test]
    fn test_local_stream_has_no_metadata() {
        let key = BackupKey::generate();
        let bytes = write(&key, BackupMode::Local, None, &[]);
        assert_eq!(read_forward_secrecy_metadata(&bytes[..]).unwrap(), None);
    }

    #[test]
    fn test_tampered_byte_fails_before_any_plaintext() {
        let key = BackupKey::generate();
        let mut bytes = write(&key, BackupMode::Local, None, &[item(1, 100)]);
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x01;

        let result = open_reader(&key, &aci(), BackupMode::Local, None, bytes.len() as u64, || {
            Ok(bytes.as_slice())
        });
        assert!(matches!(result, Err(ArchiveError::Authentication(_))));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let bytes = write(&BackupKey::generate(), BackupMode::LinkAndSync, None, &[item(1, 5)]);
        let result = open_reader(
            &BackupKey::generate(),
            &aci(),
            BackupMode::LinkAndSync,
            None,
            bytes.len() as u64,
            || Ok(bytes.as_slice()),
        );
        assert!(matches!(result, Err(ArchiveError::Authentication(_))));
    }

    #[test]
    fn test_mode_mismatch_is_format_error() {
        let key = BackupKey::generate();
        let bytes = write(&key, BackupMode::Local, None, &[]);
        let token = ForwardSecrecyToken::generate();
        let result = open_reader(
            &key,
            &aci(),
            BackupMode::RemoteBackup,
            Some(&token),
            bytes.len() as u64,
            || Ok(bytes.as_slice()),
        );
        assert!(matches!(result, Err(ArchiveError::Format(_))));
    }

    #[test]
    fn test_local_archive_does_not_open_as_link_and_sync() {
        let key = BackupKey::generate();
        let local = write(&key, BackupMode::Local, None, &[item(1, 5)]);
        let result = open_reader(
            &key,
            &aci(),
            BackupMode::LinkAndSync,
            None,
            local.len() as u64,
            || Ok(local.as_slice()),
        );
        assert!(matches!(result, Err(ArchiveError::Format(_))));

        let linked = write(&key, BackupMode::LinkAndSync, None, &[item(1, 5)]);
        assert_eq!(&linked[..4], &LINK_AND_SYNC_MAGIC);
        let mut reader = open_reader(
            &key,
            &aci(),
            BackupMode::LinkAndSync,
            None,
            linked.len() as u64,
            || Ok(linked.as_slice()),
        )
        .unwrap();
        assert_eq!(read_all(&mut reader), vec![item(1, 5)]);

        let mut relabeled = local.clone();
        relabeled[..4].copy_from_slice(&LINK_AND_SYNC_MAGIC);
        let result = open_reader(
            &key,
            &aci(),
            BackupMode::LinkAndSync,
            None,
            relabeled.len() as u64,
            || Ok(relabeled.as_slice()),
        );
        assert!(matches!(result, Err(ArchiveError::Authentication(_))));
    }

    #[test]
    fn test_remote_writer_requires_token() {
        let key = BackupKey::generate();
        assert!(open_writer(&key, &aci(), BackupMode::RemoteBackup, None, Vec::new()).is_err());
        let fs = ForwardSecrecy {
            token: ForwardSecrecyToken::generate(),
            metadata: Vec::new(),
        };
        assert!(open_writer(&key, &aci(), BackupMode::Local, Some(&fs), Vec::new()).is_err());
    }
}
