//! In-memory collaborators shared by unit tests

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use uuid::Uuid;

use crate::archive::frame::AccountSettings;
use crate::credentials::{day_start_secs, ArchiveServiceAccess};
use crate::crypto::{BackupId, BackupKey, ForwardSecrecyToken};
use crate::kv::{AccountValues, KeyValueStore};
use crate::models::{
    AttachmentRecord, BackupTier, CallEvent, CallRecord, ChatFolderId, ChatFolderRecord,
    ChatFolderType, MessageId, MessageRecord, NotificationProfileId, NotificationProfileRecord,
    RecipientId, RecipientRecord, RecipientType, SelfIdentity, StickerPackRecord, ThreadId,
    ThreadRecord, TransferState,
};
use crate::storage::{calls, chat_folders, messages, notification_profiles, recipients, stickers, threads};
use crate::network::{
    ArchiveApi, ArchiveCredentialBatch, ArchiveServiceCredential, ArchiveTransport, BackupInfo,
    CdnLocation, ForwardSecrecyAuth, ForwardSecrecyService, NetworkResult, RestoredSecrecy,
    TokenRestoreOutcome, TransferProgressListener,
};

const CREDENTIAL_DAYS: i64 = 7;

/// Archive service that issues a week of credentials and records every call
pub struct FakeArchiveApi {
    calls: Mutex<Vec<&'static str>>,
    tier: Mutex<BackupTier>,
    backup_info: Mutex<VecDeque<NetworkResult<BackupInfo>>>,
    reservations: Mutex<VecDeque<NetworkResult<()>>>,
    last_modified: Mutex<NetworkResult<i64>>,
    fetch_limit: Mutex<Option<usize>>,
}

impl FakeArchiveApi {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            tier: Mutex::new(BackupTier::Free),
            backup_info: Mutex::new(VecDeque::new()),
            reservations: Mutex::new(VecDeque::new()),
            last_modified: Mutex::new(NetworkResult::Success(1_700_000_000_000)),
            fetch_limit: Mutex::new(None),
        }
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    /// Results for the next `backup_info` calls; afterwards calls succeed
    pub fn script_backup_info(&self, results: Vec<NetworkResult<BackupInfo>>) {
        self.backup_info.lock().unwrap().extend(results);
    }

    /// Results for the next `reserve_backup_ids` calls; afterwards calls succeed
    pub fn script_reservations(&self, results: Vec<NetworkResult<()>>) {
        self.reservations.lock().unwrap().extend(results);
    }

    pub fn set_last_modified(&self, result: NetworkResult<i64>) {
        *self.last_modified.lock().unwrap() = result;
    }

    /// Credential fetches after the first `n` fail with a network error
    pub fn fail_credential_fetches_after(&self, n: usize) {
        *self.fetch_limit.lock().unwrap() = Some(n);
    }

    pub fn set_tier(&self, tier: BackupTier) {
        *self.tier.lock().unwrap() = tier;
    }

    pub fn default_backup_info() -> BackupInfo {
        BackupInfo {
            cdn: 3,
            backup_dir: "backups".into(),
            media_dir: "media".into(),
            backup_name: "message-backup".into(),
            used_space: Some(4096),
        }
    }
}

impl ArchiveApi for FakeArchiveApi {
    fn fetch_service_credentials(&self, now_secs: i64) -> NetworkResult<ArchiveCredentialBatch> {
        self.record("fetch_service_credentials");
        if let Some(limit) = *self.fetch_limit.lock().unwrap() {
            if self.count("fetch_service_credentials") > limit {
                return NetworkResult::NetworkError("offline".into());
            }
        }
        let today = day_start_secs(now_secs * 1000);
        let issue = |tag: &str| {
            (0..CREDENTIAL_DAYS)
                .map(|day| ArchiveServiceCredential {
                    redemption_time_secs: today + day * 86_400,
                    credential: format!("{}-{}", tag, day),
                })
                .collect()
        };
        NetworkResult::Success(ArchiveCredentialBatch {
            message: issue("message"),
            media: issue("media"),
        })
    }

    fn reserve_backup_ids(&self, _message: &BackupId, _media: &BackupId) -> NetworkResult<()> {
        self.record("reserve_backup_ids");
        self.reservations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(NetworkResult::Success(()))
    }

    fn set_public_key(&self, _access: &ArchiveServiceAccess) -> NetworkResult<()> {
        self.record("set_public_key");
        NetworkResult::Success(())
    }

    fn backup_info(&self, _access: &ArchiveServiceAccess) -> NetworkResult<BackupInfo> {
        self.record("backup_info");
        self.backup_info
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| NetworkResult::Success(Self::default_backup_info()))
    }

    fn backup_tier(&self, _access: &ArchiveServiceAccess) -> NetworkResult<BackupTier> {
        self.record("backup_tier");
        NetworkResult::Success(*self.tier.lock().unwrap())
    }

    fn forward_secrecy_auth(
        &self,
        _access: &ArchiveServiceAccess,
    ) -> NetworkResult<ForwardSecrecyAuth> {
        self.record("forward_secrecy_auth");
        NetworkResult::Success(ForwardSecrecyAuth {
            username: "svr".into(),
            password: "secret".into(),
        })
    }

    fn backup_file_last_modified(&self, _access: &ArchiveServiceAccess) -> NetworkResult<i64> {
        self.record("backup_file_last_modified");
        self.last_modified.lock().unwrap().clone()
    }
}

/// CDN holding objects in memory
#[derive(Default)]
pub struct FakeTransport {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    offline: AtomicBool,
    pub downloads: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl ArchiveTransport for FakeTransport {
    fn download(
        &self,
        location: &CdnLocation,
        destination: &Path,
        listener: &dyn TransferProgressListener,
    ) -> NetworkResult<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return NetworkResult::NetworkError("offline".into());
        }
        let bytes = match self.objects.lock().unwrap().get(&location.key) {
            Some(bytes) => bytes.clone(),
            None => return NetworkResult::status(404),
        };
        let total = bytes.len() as u64;
        listener.on_progress(0, total);
        if listener.should_cancel() {
            return NetworkResult::NetworkError("canceled".into());
        }
        if let Err(e) = std::fs::write(destination, &bytes) {
            return NetworkResult::NetworkError(e.to_string());
        }
        listener.on_progress(total, total);
        NetworkResult::Success(())
    }

    fn read_range(&self, location: &CdnLocation, length: u64) -> NetworkResult<Vec<u8>> {
        if self.offline.load(Ordering::SeqCst) {
            return NetworkResult::NetworkError("offline".into());
        }
        match self.objects.lock().unwrap().get(&location.key) {
            Some(bytes) => {
                let end = bytes.len().min(length as usize);
                NetworkResult::Success(bytes[..end].to_vec())
            }
            None => NetworkResult::status(404),
        }
    }
}

/// Chain state the fake recovery service returns with every token
pub const NEXT_BACKUP_SECRET_DATA: &[u8] = b"next-backup-secret";

/// Recovery service that hands back a fixed token unless told otherwise
pub struct FakeForwardSecrecyService {
    token: ForwardSecrecyToken,
    outcome: Mutex<Option<TokenRestoreOutcome>>,
}

impl FakeForwardSecrecyService {
    pub fn new(token: ForwardSecrecyToken) -> Self {
        Self {
            token,
            outcome: Mutex::new(None),
        }
    }

    pub fn fail_with(&self, outcome: TokenRestoreOutcome) {
        *self.outcome.lock().unwrap() = Some(outcome);
    }
}

impl ForwardSecrecyService for FakeForwardSecrecyService {
    fn restore_token(&self, _auth: &ForwardSecrecyAuth, _metadata: &[u8]) -> TokenRestoreOutcome {
        self.outcome
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| {
                TokenRestoreOutcome::Restored(RestoredSecrecy {
                    token: self.token.clone(),
                    next_backup_secret_data: NEXT_BACKUP_SECRET_DATA.to_vec(),
                })
            })
    }
}

/// An account with keys and a profile in the key-value store
pub struct SeededAccount {
    pub aci: Uuid,
    pub backup_key: BackupKey,
    pub identity: SelfIdentity,
}

pub fn seed_account(kv: &Arc<KeyValueStore>) -> SeededAccount {
    let account = AccountValues::new(kv.clone());
    let aci = Uuid::new_v4();
    let backup_key = BackupKey::generate();
    let profile_key = [7u8; 32];

    account.set_aci(&aci).unwrap();
    account.set_e164("+15550000").unwrap();
    account.set_profile_key(&profile_key).unwrap();
    account.set_profile_name("Sam", "Owner").unwrap();
    account.set_username(Some("sam.01")).unwrap();
    account
        .set_settings(&AccountSettings {
            read_receipts: true,
            typing_indicators: true,
            link_previews: false,
            universal_expire_timer_secs: 3600,
            display_badges_on_profile: true,
        })
        .unwrap();
    account.set_backup_key(&backup_key).unwrap();

    SeededAccount {
        aci,
        backup_key,
        identity: SelfIdentity {
            aci,
            e164: Some("+15550000".into()),
            profile_key,
        },
    }
}

/// Row ids of a seeded store
pub struct SeededStore {
    pub self_id: RecipientId,
    pub alice: RecipientId,
    pub bob: RecipientId,
    pub thread: ThreadId,
    pub messages: Vec<MessageId>,
}

fn contact(aci: Uuid, e164: &str, given: &str) -> RecipientRecord {
    RecipientRecord {
        aci: Some(aci),
        e164: Some(e164.into()),
        profile_key: Some(vec![3; 32]),
        profile_given_name: Some(given.into()),
        profile_sharing: true,
        ..RecipientRecord::new(RecipientType::Individual)
    }
}

fn text_message(
    thread_id: ThreadId,
    from: RecipientId,
    date_sent: i64,
    outgoing: bool,
    body: &str,
) -> MessageRecord {
    MessageRecord {
        id: MessageId::from_raw(0),
        thread_id,
        from_recipient_id: from,
        date_sent,
        date_received: if outgoing { 0 } else { date_sent + 5 },
        outgoing,
        read: !outgoing,
        delivered: outgoing,
        expires_in_ms: 0,
        body: Some(body.into()),
    }
}

/// Self, two contacts, one thread with three messages and one of each
/// other domain
pub fn seed_store(conn: &Connection, identity: &SelfIdentity) -> SeededStore {
    let self_id = recipients::insert(
        conn,
        &RecipientRecord {
            aci: Some(identity.aci),
            e164: identity.e164.clone(),
            profile_key: Some(identity.profile_key.to_vec()),
            ..RecipientRecord::new(RecipientType::SelfRecipient)
        },
    )
    .unwrap();
    let alice = recipients::insert(conn, &contact(Uuid::new_v4(), "+15550001", "Alice")).unwrap();
    let bob = recipients::insert(conn, &contact(Uuid::new_v4(), "+15550002", "Bob")).unwrap();

    let thread = threads::insert(
        conn,
        &ThreadRecord {
            pinned_order: Some(1),
            muted_until_ms: 99,
            ..ThreadRecord::new(alice)
        },
    )
    .unwrap();

    let first = messages::insert(conn, &text_message(thread, alice, 1_000, false, "Hi")).unwrap();
    let second =
        messages::insert(conn, &text_message(thread, self_id, 2_000, true, "Hello Alice")).unwrap();
    let third = messages::insert(conn, &text_message(thread, alice, 3_000, false, "Photo")).unwrap();
    messages::insert_attachment(
        conn,
        &AttachmentRecord {
            message_id: third,
            content_type: Some("image/jpeg".into()),
            file_name: Some("beach.jpg".into()),
            size: 2_048,
            plaintext_hash: Some(vec![9; 32]),
            remote_key: Some(vec![4; 64]),
            transfer_state: TransferState::Done,
        },
    )
    .unwrap();

    calls::insert(
        conn,
        &CallRecord {
            call_id: 77,
            peer: bob,
            event: CallEvent::Joined,
            timestamp: 1_500,
        },
    )
    .unwrap();
    stickers::insert(
        conn,
        &StickerPackRecord {
            pack_id: "0a0b".into(),
            pack_key: "0c0d".into(),
            title: Some("Cats".into()),
            author: None,
            installed: true,
        },
    )
    .unwrap();
    notification_profiles::insert(
        conn,
        &NotificationProfileRecord {
            id: NotificationProfileId::from_raw(0),
            profile_uuid: Uuid::new_v4(),
            name: "Work".into(),
            emoji: Some("💼".into()),
            color: 0xff00ff,
            created_at_ms: 500,
            allow_all_calls: true,
            allow_all_mentions: false,
            schedule_enabled: true,
            schedule_start: 540,
            schedule_end: 1_020,
            allowed_members: vec![alice],
        },
    )
    .unwrap();
    chat_folders::insert(
        conn,
        &ChatFolderRecord {
            id: ChatFolderId::from_raw(0),
            folder_uuid: Uuid::new_v4(),
            name: "Friends".into(),
            position: 0,
            folder_type: ChatFolderType::Custom,
            show_unread: false,
            show_muted: true,
            show_individual: false,
            show_groups: false,
            included_threads: vec![thread],
            excluded_threads: Vec::new(),
        },
    )
    .unwrap();

    SeededStore {
        self_id,
        alice,
        bob,
        thread,
        messages: vec![first, second, third],
    }
}
