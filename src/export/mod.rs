//! Export pipeline
//!
//! Turns a point-in-time snapshot of the local stores into an archive:
//!
//! 1. Snapshot the main store and the key-value store (temporary files,
//!    removed on every path)
//! 2. Resolve the self recipient from the snapshot
//! 3. Write the [`BackupHeader`]
//! 4. Run the domain processors in frame order, checking for cancellation
//!    after each domain
//! 5. Close the writer
//!
//! A canceled export is not an error: it returns a summary with
//! `canceled = true` and a closed, truncated stream the caller discards.

pub mod account;
pub mod calls;
pub mod chat_folders;
pub mod chat_items;
pub mod chats;
pub mod notification_profiles;
pub mod recipients;
pub mod state;
pub mod stickers;

pub use state::ExportState;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::archive::{
    open_plaintext_writer, open_writer, ArchiveWriter, BackupHeader, BackupMode, ForwardSecrecy,
    Frame, MAX_SUPPORTED_VERSION,
};
use crate::cancel::CancellationToken;
use crate::config::settings::PipelineSettings;
use crate::crypto::BackupKey;
use crate::error::{ArchiveError, ArchiveResult};
use crate::kv::values::{decode_base64, keys};
use crate::kv::{read_value, AccountValues, BackupValues, KeyValueStore};
use crate::storage::{self, Database};

/// Callbacks fired as each domain is exported
///
/// Domain callbacks fire once when the domain starts. All methods default to
/// doing nothing.
pub trait ExportProgressListener {
    fn on_account(&self) {}
    fn on_recipient(&self) {}
    fn on_thread(&self) {}
    fn on_call(&self) {}
    fn on_sticker(&self) {}
    fn on_notification_profile(&self) {}
    fn on_chat_folder(&self) {}
    /// Every `progress_interval` chat items
    fn on_message(&self, _current: u64, _approx_total: u64) {}
    /// Cumulative size of attachments referenced so far
    fn on_attachment(&self, _current_bytes: u64, _total_bytes: u64) {}
}

/// Listener that ignores every callback
pub struct NoProgress;

impl ExportProgressListener for NoProgress {}

/// Frames written per domain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub backup_time_ms: i64,
    pub account: bool,
    pub recipients: u64,
    pub chats: u64,
    pub calls: u64,
    pub sticker_packs: u64,
    pub notification_profiles: u64,
    pub chat_folders: u64,
    pub chat_items: u64,
    pub canceled: bool,
}

impl ExportSummary {
    pub fn total_frames(&self) -> u64 {
        u64::from(self.account)
            + self.recipients
            + self.chats
            + self.calls
            + self.sticker_packs
            + self.notification_profiles
            + self.chat_folders
            + self.chat_items
    }
}

pub struct ExportPipeline {
    db: Arc<Database>,
    kv: Arc<KeyValueStore>,
    snapshot_dir: PathBuf,
    settings: PipelineSettings,
}

impl ExportPipeline {
    pub fn new(
        db: Arc<Database>,
        kv: Arc<KeyValueStore>,
        snapshot_dir: PathBuf,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            db,
            kv,
            snapshot_dir,
            settings,
        }
    }

    /// Write an archive of the current state into `writer`
    ///
    /// Only chat items sent at or after `cutoff_time_ms` are included. The
    /// writer is closed on every path.
    pub fn export(
        &self,
        current_time_ms: i64,
        mode: BackupMode,
        writer: &mut dyn ArchiveWriter,
        cutoff_time_ms: i64,
        progress: &dyn ExportProgressListener,
        cancel: &CancellationToken,
    ) -> ArchiveResult<ExportSummary> {
        let result =
            self.export_frames(current_time_ms, mode, writer, cutoff_time_ms, progress, cancel);
        match result {
            Ok(summary) => {
                writer.close()?;
                info!(
                    ?mode,
                    frames = summary.total_frames(),
                    canceled = summary.canceled,
                    "Export finished"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(close_error) = writer.close() {
                    warn!(error = %close_error, "Failed to close writer after export error");
                }
                Err(e)
            }
        }
    }

    fn export_frames(
        &self,
        current_time_ms: i64,
        mode: BackupMode,
        writer: &mut dyn ArchiveWriter,
        cutoff_time_ms: i64,
        progress: &dyn ExportProgressListener,
        cancel: &CancellationToken,
    ) -> ArchiveResult<ExportSummary> {
        let main = self.db.snapshot(&self.snapshot_dir)?;
        let kv = self.kv.snapshot(&self.snapshot_dir)?;
        let conn = main.conn();

        let self_recipient = storage::recipients::find_self(conn)?
            .ok_or_else(|| ArchiveError::recipient_not_found("self"))?;
        debug!(self_recipient = %self_recipient.id, "Resolved self recipient");

        writer.write_header(&header(kv.conn(), current_time_ms)?)?;

        let mut state = ExportState::new(current_time_ms, mode, self_recipient.id);
        let mut summary = ExportSummary {
            backup_time_ms: current_time_ms,
            ..Default::default()
        };
        let mut emit = |frame: Frame| writer.write_frame(&frame);

        macro_rules! checkpoint {
            ($domain:literal) => {
                if cancel.is_cancelled() {
                    info!(after = $domain, "Export canceled");
                    summary.canceled = true;
                    return Ok(summary);
                }
            };
        }

        progress.on_account();
        emit(account::export(kv.conn())?)?;
        summary.account = true;
        checkpoint!("account");

        progress.on_recipient();
        summary.recipients = recipients::export(conn, &mut state, &mut emit)?;
        checkpoint!("recipients");

        progress.on_thread();
        summary.chats = chats::export(conn, &mut state, &mut emit)?;
        checkpoint!("chats");

        progress.on_call();
        summary.calls = calls::export(conn, &state, &mut emit)?;
        checkpoint!("calls");

        progress.on_sticker();
        summary.sticker_packs = stickers::export(conn, &mut emit)?;
        checkpoint!("sticker packs");

        progress.on_notification_profile();
        summary.notification_profiles = notification_profiles::export(conn, &state, &mut emit)?;
        checkpoint!("notification profiles");

        progress.on_chat_folder();
        summary.chat_folders = chat_folders::export(conn, &state, &mut emit)?;
        checkpoint!("chat folders");

        let items = chat_items::export(
            conn,
            &state,
            cutoff_time_ms,
            self.settings.progress_interval,
            progress,
            cancel,
            &mut emit,
        )?;
        summary.chat_items = items.emitted;
        summary.canceled = items.canceled;
        checkpoint!("chat items");

        Ok(summary)
    }

    fn ensure_media_root_key(&self) -> ArchiveResult<()> {
        BackupValues::new(self.kv.clone()).media_root_key_or_generate()?;
        Ok(())
    }

    fn account_key(&self) -> ArchiveResult<(BackupKey, uuid::Uuid)> {
        let account = AccountValues::new(self.kv.clone());
        let aci = account.aci()?.ok_or_else(|| ArchiveError::NotFound {
            entity_type: "Account identifier",
            identifier: "self".into(),
        })?;
        Ok((account.require_backup_key()?, aci))
    }

    /// Encrypted archive for a file kept on this device
    pub fn export_for_local_backup<W: Write>(
        &self,
        current_time_ms: i64,
        sink: W,
        progress: &dyn ExportProgressListener,
        cancel: &CancellationToken,
    ) -> ArchiveResult<ExportSummary> {
        self.ensure_media_root_key()?;
        let (key, aci) = self.account_key()?;
        let mut writer = open_writer(&key, &aci, BackupMode::Local, None, sink)?;
        self.export(current_time_ms, BackupMode::Local, &mut writer, 0, progress, cancel)
    }

    /// Encrypted archive for upload, bound to a forward-secrecy token
    pub fn export_for_remote_backup<W: Write>(
        &self,
        current_time_ms: i64,
        forward_secrecy: &ForwardSecrecy,
        sink: W,
        progress: &dyn ExportProgressListener,
        cancel: &CancellationToken,
    ) -> ArchiveResult<ExportSummary> {
        self.ensure_media_root_key()?;
        let (key, aci) = self.account_key()?;
        let mut writer = open_writer(
            &key,
            &aci,
            BackupMode::RemoteBackup,
            Some(forward_secrecy),
            sink,
        )?;
        self.export(
            current_time_ms,
            BackupMode::RemoteBackup,
            &mut writer,
            0,
            progress,
            cancel,
        )
    }

    /// Encrypted archive for a newly linked device, under an ephemeral key
    pub fn export_for_link_and_sync<W: Write>(
        &self,
        current_time_ms: i64,
        ephemeral_key: &BackupKey,
        sink: W,
        progress: &dyn ExportProgressListener,
        cancel: &CancellationToken,
    ) -> ArchiveResult<ExportSummary> {
        self.ensure_media_root_key()?;
        let (_, aci) = self.account_key()?;
        let mut writer = open_writer(ephemeral_key, &aci, BackupMode::LinkAndSync, None, sink)?;
        self.export(
            current_time_ms,
            BackupMode::LinkAndSync,
            &mut writer,
            0,
            progress,
            cancel,
        )
    }

    /// Diagnostic archive; `plaintext` skips encryption entirely
    pub fn export_for_debugging<W: Write>(
        &self,
        current_time_ms: i64,
        plaintext: bool,
        cutoff_time_ms: i64,
        sink: W,
        progress: &dyn ExportProgressListener,
        cancel: &CancellationToken,
    ) -> ArchiveResult<ExportSummary> {
        self.ensure_media_root_key()?;
        if plaintext {
            let mut writer = open_plaintext_writer(BackupMode::Local, sink)?;
            return self.export(
                current_time_ms,
                BackupMode::Local,
                &mut writer,
                cutoff_time_ms,
                progress,
                cancel,
            );
        }
        let (key, aci) = self.account_key()?;
        let mut writer = open_writer(&key, &aci, BackupMode::Local, None, sink)?;
        self.export(
            current_time_ms,
            BackupMode::Local,
            &mut writer,
            cutoff_time_ms,
            progress,
            cancel,
        )
    }
}

fn header(kv: &Connection, backup_time_ms: i64) -> ArchiveResult<BackupHeader> {
    let media_root_key = read_value::<String>(kv, keys::MEDIA_ROOT_KEY)?
        .ok_or_else(|| ArchiveError::Validation("Media root key has not been generated".into()))?;
    Ok(BackupHeader {
        version: MAX_SUPPORTED_VERSION,
        backup_time_ms,
        media_root_key: decode_base64(&media_root_key, "media root key")?,
        first_app_version: read_value(kv, keys::FIRST_APP_VERSION)?.unwrap_or_default(),
        debug_info: Vec::new(),
    })
}
