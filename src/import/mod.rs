//! Import pipeline
//!
//! Replaces the local relational store with the contents of an archive:
//!
//! 1. Read the header; an unsupported version fails without touching the
//!    store and flags the key-value store
//! 2. Open a [`BulkRewrite`]: foreign keys off, one transaction, every table
//!    except device key material dropped and recreated empty
//! 3. Insert the self recipient from the caller's identity
//! 4. Dispatch frames to the domain importers; chat items are batched
//! 5. Add the default chat folder if the archive had none
//! 6. Reconcile (see [`reconcile`]) and commit
//! 7. Write account and header values into the key-value store and enqueue
//!    follow-up jobs
//!
//! Cancellation is polled before every frame and between reconciliation
//! steps. A canceled import rolls back and reports [`ImportResult::Failure`].

pub mod account;
pub mod calls;
pub mod chat_folders;
pub mod chat_items;
pub mod chats;
pub mod followup;
pub mod notification_profiles;
pub mod reconcile;
pub mod recipients;
pub mod rewrite;
pub mod state;
pub mod stickers;

pub use chat_items::ChatItemInserter;
pub use rewrite::BulkRewrite;
pub use state::{ImportSkips, ImportState};

use std::io::{self, Read};
use std::sync::Arc;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::archive::{
    open_plaintext_reader, open_reader, ArchiveReader, BackupHeader, BackupMode, Frame,
};
use crate::cancel::CancellationToken;
use crate::config::settings::PipelineSettings;
use crate::crypto::{BackupKey, ForwardSecrecyToken, MediaRootKey};
use crate::error::{ArchiveError, ArchiveResult};
use crate::jobs::JobScheduler;
use crate::kv::{AccountValues, BackupValues, KeyValueStore};
use crate::models::{RecipientRecord, RecipientType, SelfIdentity};
use crate::storage::{self, Database};

/// Outcome of an import that did not hit a programming or storage error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportResult {
    Success { backup_time_ms: i64 },
    /// Unsupported version or canceled; the store is unchanged
    Failure,
}

pub struct ImportPipeline {
    db: Arc<Database>,
    kv: Arc<KeyValueStore>,
    jobs: Arc<dyn JobScheduler>,
    settings: PipelineSettings,
}

impl ImportPipeline {
    pub fn new(
        db: Arc<Database>,
        kv: Arc<KeyValueStore>,
        jobs: Arc<dyn JobScheduler>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            db,
            kv,
            jobs,
            settings,
        }
    }

    /// Replace local state with the archive behind `reader`
    pub fn import(
        &self,
        reader: &mut dyn ArchiveReader,
        identity: &SelfIdentity,
        cancel: &CancellationToken,
    ) -> ArchiveResult<ImportResult> {
        let backup = BackupValues::new(self.kv.clone());
        let header = match reader.header() {
            Ok(header) => header,
            Err(ArchiveError::UnsupportedVersion { found, max }) => {
                warn!(found, max, "Refusing archive with unsupported version");
                backup.set_has_invalid_backup_version(true)?;
                return Ok(ImportResult::Failure);
            }
            Err(e) => return Err(e),
        };

        let conn = self.db.lock()?;
        let Some(state) = self.rewrite(&conn, reader, identity, &header, cancel)? else {
            info!("Import canceled, store rolled back");
            return Ok(ImportResult::Failure);
        };

        if let Some(account_data) = &state.account {
            account::apply(&self.kv, account_data)?;
        }
        self.record_header(&backup, &header)?;

        followup::enqueue(
            &conn,
            self.jobs.as_ref(),
            self.settings.recent_recipient_refresh_limit,
        )?;

        if state.skips.total() > 0 {
            info!(skips = ?state.skips, "Skipped frames during import");
        }
        info!(backup_time_ms = header.backup_time_ms, "Import finished");
        Ok(ImportResult::Success {
            backup_time_ms: header.backup_time_ms,
        })
    }

    /// Run the rewrite; `None` means canceled and rolled back
    fn rewrite(
        &self,
        conn: &Connection,
        reader: &mut dyn ArchiveReader,
        identity: &SelfIdentity,
        header: &BackupHeader,
        cancel: &CancellationToken,
    ) -> ArchiveResult<Option<ImportState>> {
        let rewrite = BulkRewrite::begin(conn)?;

        let self_recipient_id = storage::recipients::insert(
            conn,
            &RecipientRecord {
                aci: Some(identity.aci),
                e164: identity.e164.clone(),
                profile_key: Some(identity.profile_key.to_vec()),
                ..RecipientRecord::new(RecipientType::SelfRecipient)
            },
        )?;
        let mut state = ImportState::new(self_recipient_id, header.backup_time_ms);
        let mut chat_items = ChatItemInserter::new(self.settings.chat_item_batch_size);
        let mut frames = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let Some(frame) = reader.next_frame()? else {
                break;
            };
            match frame {
                Frame::Account(data) => account::import(conn, &mut state, data)?,
                Frame::Recipient(recipient) => recipients::import(conn, &mut state, recipient)?,
                Frame::Chat(chat) => chats::import(conn, &mut state, chat)?,
                Frame::AdHocCall(call) => calls::import(conn, &mut state, call)?,
                Frame::StickerPack(pack) => stickers::import(conn, &mut state, pack)?,
                Frame::NotificationProfile(profile) => {
                    notification_profiles::import(conn, &mut state, profile)?
                }
                Frame::ChatFolder(folder) => chat_folders::import(conn, &mut state, folder)?,
                Frame::ChatItem(item) => chat_items.add(conn, &state, item)?,
            }
            frames += 1;
        }
        chat_items.flush(conn)?;
        debug!(frames, chat_items = chat_items.inserted(), "Read every frame");

        if chat_folders::insert_default_if_missing(conn, &mut state)? {
            debug!("Added default chat folder");
        }

        for step in reconcile::STEPS {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            reconcile::run(&rewrite, step)?;
        }

        rewrite.commit()?;
        Ok(Some(state))
    }

    fn record_header(&self, backup: &BackupValues, header: &BackupHeader) -> ArchiveResult<()> {
        match MediaRootKey::from_slice(&header.media_root_key) {
            Ok(key) => backup.set_media_root_key(&key)?,
            Err(e) => warn!(error = %e, "Archive carries no usable media root key"),
        }
        backup.set_last_backup_time(header.backup_time_ms)?;
        if !header.first_app_version.is_empty() {
            backup.set_first_app_version(&header.first_app_version)?;
        }
        backup.set_has_invalid_backup_version(false)?;
        Ok(())
    }

    fn local_key(&self) -> ArchiveResult<BackupKey> {
        AccountValues::new(self.kv.clone()).require_backup_key()
    }

    /// Import a file kept on this device, encrypted under the account's key
    pub fn import_local<F, R>(
        &self,
        length: u64,
        source: F,
        identity: &SelfIdentity,
        cancel: &CancellationToken,
    ) -> ArchiveResult<ImportResult>
    where
        F: Fn() -> io::Result<R>,
        R: Read,
    {
        let key = self.local_key()?;
        let mut reader = open_reader(&key, &identity.aci, BackupMode::Local, None, length, source)?;
        self.import(&mut reader, identity, cancel)
    }

    /// Import a downloaded remote backup bound to `token`
    pub fn import_remote_backup<F, R>(
        &self,
        length: u64,
        source: F,
        identity: &SelfIdentity,
        token: &ForwardSecrecyToken,
        cancel: &CancellationToken,
    ) -> ArchiveResult<ImportResult>
    where
        F: Fn() -> io::Result<R>,
        R: Read,
    {
        let key = self.local_key()?;
        let mut reader = open_reader(
            &key,
            &identity.aci,
            BackupMode::RemoteBackup,
            Some(token),
            length,
            source,
        )?;
        self.import(&mut reader, identity, cancel)
    }

    /// Import an archive sent by the primary device under an ephemeral key
    pub fn import_link_and_sync<F, R>(
        &self,
        length: u64,
        source: F,
        identity: &SelfIdentity,
        ephemeral_key: &BackupKey,
        cancel: &CancellationToken,
    ) -> ArchiveResult<ImportResult>
    where
        F: Fn() -> io::Result<R>,
        R: Read,
    {
        let mut reader = open_reader(
            ephemeral_key,
            &identity.aci,
            BackupMode::LinkAndSync,
            None,
            length,
            source,
        )?;
        self.import(&mut reader, identity, cancel)
    }

    /// Import a plaintext diagnostic archive
    pub fn import_for_debugging<R: Read>(
        &self,
        length: u64,
        source: R,
        identity: &SelfIdentity,
        cancel: &CancellationToken,
    ) -> ArchiveResult<ImportResult> {
        let mut reader = open_plaintext_reader(BackupMode::Local, length, source)?;
        self.import(&mut reader, identity, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::frame::{Chat, ChatItem, Destination, Direction, Recipient};
    use crate::archive::{open_plaintext_writer, ArchiveWriter, MAX_SUPPORTED_VERSION};
    use crate::export::{ExportPipeline, NoProgress};
    use crate::jobs::{InMemoryJobQueue, Job};
    use crate::models::{MessageRecord, MessageId};
    use crate::storage::{chat_folders, messages, notification_profiles, structure, threads};
    use crate::test_support::{seed_account, seed_store, SeededAccount, SeededStore};
    use std::io::Cursor;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        db: Arc<Database>,
        kv: Arc<KeyValueStore>,
        jobs: Arc<InMemoryJobQueue>,
        account: SeededAccount,
        store: SeededStore,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let db = Arc::new(Database::open(&temp.path().join("main.db")).unwrap());
            let kv = Arc::new(KeyValueStore::open(&temp.path().join("kv.db")).unwrap());
            let account = seed_account(&kv);
            let store = seed_store(&db.lock().unwrap(), &account.identity);
            Self {
                temp,
                db,
                kv,
                jobs: Arc::new(InMemoryJobQueue::new()),
                account,
                store,
            }
        }

        fn snapshot_dir(&self) -> PathBuf {
            self.temp.path().join("snapshots")
        }

        fn exporter(&self) -> ExportPipeline {
            ExportPipeline::new(
                self.db.clone(),
                self.kv.clone(),
                self.snapshot_dir(),
                PipelineSettings::default(),
            )
        }

        fn importer(&self) -> ImportPipeline {
            ImportPipeline::new(
                self.db.clone(),
                self.kv.clone(),
                self.jobs.clone(),
                PipelineSettings::default(),
            )
        }

        fn count(&self, table: &str) -> i64 {
            structure::row_count(&self.db.lock().unwrap(), table).unwrap()
        }

        fn add_message(&self, date_sent: i64) {
            let conn = self.db.lock().unwrap();
            messages::insert(
                &conn,
                &MessageRecord {
                    id: MessageId::from_raw(0),
                    thread_id: self.store.thread,
                    from_recipient_id: self.store.alice,
                    date_sent,
                    date_received: date_sent,
                    outgoing: false,
                    read: false,
                    delivered: false,
                    expires_in_ms: 0,
                    body: Some("written after the backup".into()),
                },
            )
            .unwrap();
        }
    }

    type MessageFields = (i64, bool, i64, bool, bool, i64, Option<String>);

    fn message_fields(conn: &Connection) -> Vec<MessageFields> {
        let thread = &threads::list(conn).unwrap()[0];
        messages::list_for_thread(conn, thread.id)
            .unwrap()
            .into_iter()
            .map(|m| {
                (
                    m.date_sent,
                    m.outgoing,
                    m.date_received,
                    m.read,
                    m.delivered,
                    m.expires_in_ms,
                    m.body,
                )
            })
            .collect()
    }

    fn plaintext(header_version: u64, frames: Vec<Frame>) -> Vec<u8> {
        let mut out = Vec::new();
        let mut writer = open_plaintext_writer(BackupMode::Local, &mut out).unwrap();
        writer
            .write_header(&BackupHeader {
                version: header_version,
                backup_time_ms: 9_000,
                media_root_key: vec![5; 32],
                first_app_version: "2.0.0".into(),
                debug_info: Vec::new(),
            })
            .unwrap();
        for frame in &frames {
            writer.write_frame(frame).unwrap();
        }
        writer.close().unwrap();
        drop(writer);
        out
    }

    #[test]
    fn test_local_round_trip_replaces_store() {
        let f = Fixture::new();
        let before = {
            let conn = f.db.lock().unwrap();
            conn.execute(
                "UPDATE message SET read = 0, delivered = 1, expires_in = 60000 WHERE date_sent = 3000",
                [],
            )
            .unwrap();
            message_fields(&conn)
        };
        let mut archive = Vec::new();
        f.exporter()
            .export_for_local_backup(5_000, &mut archive, &NoProgress, &CancellationToken::new())
            .unwrap();

        f.add_message(4_000);
        assert_eq!(f.count("message"), 4);

        let length = archive.len() as u64;
        let result = f
            .importer()
            .import_local(
                length,
                move || Ok(Cursor::new(archive.clone())),
                &f.account.identity,
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(result, ImportResult::Success { backup_time_ms: 5_000 });

        assert_eq!(f.count("recipient"), 3);
        assert_eq!(f.count("thread"), 1);
        assert_eq!(f.count("message"), 3);
        assert_eq!(f.count("call"), 1);
        assert_eq!(f.count("sticker_pack"), 1);

        let conn = f.db.lock().unwrap();
        assert!(structure::foreign_keys_enabled(&conn).unwrap());
        assert_eq!(messages::pending_restore_bytes(&conn).unwrap(), 2_048);
        assert_eq!(messages::search(&conn, "hello alice").unwrap().len(), 1);

        assert_eq!(message_fields(&conn), before);

        let thread = &threads::list(&conn).unwrap()[0];
        assert_eq!(thread.message_count, 3);
        assert_eq!(thread.snippet.as_deref(), Some("Photo"));
        assert_eq!(thread.pinned_order, Some(1));

        let profiles = notification_profiles::list(&conn).unwrap();
        assert_eq!(profiles[0].name, "Work");
        assert_eq!(profiles[0].allowed_members.len(), 1);

        let folders = chat_folders::list(&conn).unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, "Friends");
        assert_eq!(folders[0].included_threads, vec![thread.id]);

        let me = storage::recipients::find_self(&conn).unwrap().unwrap();
        assert_eq!(me.aci, Some(f.account.aci));
        assert_eq!(me.profile_given_name.as_deref(), Some("Sam"));
        drop(conn);

        let backup = BackupValues::new(f.kv.clone());
        assert_eq!(backup.last_backup_time().unwrap(), Some(5_000));
        assert!(!backup.has_invalid_backup_version().unwrap());

        let jobs = f.jobs.jobs();
        assert!(jobs.contains(&Job::StickerPackDownload {
            pack_id: "0a0b".into(),
            pack_key: "0c0d".into(),
        }));
        assert!(jobs.iter().any(|job| matches!(job, Job::RetrieveProfile { .. })));
    }

    #[test]
    fn test_unsupported_version_fails_without_mutation() {
        let f = Fixture::new();
        let bytes = plaintext(MAX_SUPPORTED_VERSION + 1, Vec::new());

        let result = f
            .importer()
            .import_for_debugging(
                bytes.len() as u64,
                bytes.as_slice(),
                &f.account.identity,
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(result, ImportResult::Failure);
        assert_eq!(f.count("message"), 3);
        assert!(BackupValues::new(f.kv.clone())
            .has_invalid_backup_version()
            .unwrap());
        assert!(f.jobs.jobs().is_empty());
    }

    #[test]
    fn test_unknown_remote_id_rolls_back() {
        let f = Fixture::new();
        let bytes = plaintext(
            MAX_SUPPORTED_VERSION,
            vec![Frame::Chat(Chat {
                id: 1,
                recipient_id: 42,
                ..Default::default()
            })],
        );

        let result = f.importer().import_for_debugging(
            bytes.len() as u64,
            bytes.as_slice(),
            &f.account.identity,
            &CancellationToken::new(),
        );

        assert!(matches!(
            result,
            Err(ArchiveError::UnknownRemoteId { entity: "recipient", remote_id: 42 })
        ));
        assert_eq!(f.count("message"), 3);
        assert_eq!(f.count("recipient"), 3);
        assert!(structure::foreign_keys_enabled(&f.db.lock().unwrap()).unwrap());
    }

    #[test]
    fn test_chat_item_with_unknown_author_rolls_back() {
        let f = Fixture::new();
        let bytes = plaintext(
            MAX_SUPPORTED_VERSION,
            vec![
                Frame::Recipient(Recipient {
                    id: 1,
                    destination: Destination::SelfRecipient,
                }),
                Frame::Chat(Chat {
                    id: 1,
                    recipient_id: 1,
                    ..Default::default()
                }),
                Frame::ChatItem(ChatItem {
                    chat_id: 1,
                    author_id: 8,
                    date_sent: 100,
                    expires_in_ms: 0,
                    direction: Direction::Incoming {
                        date_received: 110,
                        read: false,
                        delivered: false,
                    },
                    body: Some("from nowhere".into()),
                    attachments: Vec::new(),
                }),
            ],
        );

        let result = f.importer().import_for_debugging(
            bytes.len() as u64,
            bytes.as_slice(),
            &f.account.identity,
            &CancellationToken::new(),
        );

        assert!(matches!(
            result,
            Err(ArchiveError::UnknownRemoteId { entity: "recipient", remote_id: 8 })
        ));
        assert_eq!(f.count("recipient"), 3);
        assert_eq!(f.count("thread"), 1);
        assert_eq!(f.count("message"), 3);
        assert!(structure::foreign_keys_enabled(&f.db.lock().unwrap()).unwrap());
    }

    #[test]
    fn test_cancellation_rolls_back() {
        let f = Fixture::new();
        let bytes = plaintext(
            MAX_SUPPORTED_VERSION,
            vec![Frame::Recipient(Recipient {
                id: 1,
                destination: Destination::SelfRecipient,
            })],
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = f
            .importer()
            .import_for_debugging(bytes.len() as u64, bytes.as_slice(), &f.account.identity, &cancel)
            .unwrap();

        assert_eq!(result, ImportResult::Failure);
        assert_eq!(f.count("message"), 3);
        assert_eq!(f.count("chat_folder"), 1);
        assert!(structure::foreign_keys_enabled(&f.db.lock().unwrap()).unwrap());
    }

    #[test]
    fn test_default_folder_and_header_values() {
        let f = Fixture::new();
        let bytes = plaintext(
            MAX_SUPPORTED_VERSION,
            vec![Frame::Recipient(Recipient {
                id: 1,
                destination: Destination::SelfRecipient,
            })],
        );

        let result = f
            .importer()
            .import_for_debugging(
                bytes.len() as u64,
                bytes.as_slice(),
                &f.account.identity,
                &CancellationToken::new(),
            )
            .unwrap();

        assert_eq!(result, ImportResult::Success { backup_time_ms: 9_000 });
        assert_eq!(f.count("recipient"), 1);
        assert_eq!(f.count("message"), 0);

        let folders = chat_folders::list(&f.db.lock().unwrap()).unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].folder_type, crate::models::ChatFolderType::All);

        let backup = BackupValues::new(f.kv.clone());
        assert_eq!(backup.first_app_version().unwrap().as_deref(), Some("2.0.0"));
        assert_eq!(
            backup.media_root_key().unwrap().unwrap().as_bytes(),
            &[5u8; 32]
        );
    }
}
