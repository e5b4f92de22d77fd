//! Archive header and frame definitions
//!
//! Frames reference each other through in-stream numeric ids assigned by the
//! exporter: a `Chat` names its recipient by `Recipient::id`, a `ChatItem`
//! names its chat by `Chat::id` and its author by `Recipient::id`. These ids
//! are meaningless outside a single stream.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ArchiveError, ArchiveResult};

/// Highest header version this build can read
pub const MAX_SUPPORTED_VERSION: u64 = 1;

/// First record of every archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupHeader {
    /// Format version; readers refuse anything above [`MAX_SUPPORTED_VERSION`]
    pub version: u64,
    /// When the export started (ms since epoch)
    pub backup_time_ms: i64,
    /// Root of the media key hierarchy at export time
    pub media_root_key: Vec<u8>,
    /// Version string of the application that first created the account
    pub first_app_version: String,
    /// Free-form diagnostic bytes
    pub debug_info: Vec<u8>,
}

impl BackupHeader {
    /// Fail with `UnsupportedVersion` when the header is newer than this reader
    pub fn check_version(&self) -> ArchiveResult<()> {
        if self.version > MAX_SUPPORTED_VERSION {
            return Err(ArchiveError::UnsupportedVersion {
                found: self.version,
                max: MAX_SUPPORTED_VERSION,
            });
        }
        Ok(())
    }
}

/// One typed record of the archive
///
/// Exporters write variants in declaration order; chat items come last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    Account(AccountData),
    Recipient(Recipient),
    Chat(Chat),
    AdHocCall(AdHocCall),
    StickerPack(StickerPack),
    NotificationProfile(NotificationProfile),
    ChatFolder(ChatFolder),
    ChatItem(ChatItem),
}

impl Frame {
    /// Short name for logs and validation messages
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Account(_) => "account",
            Frame::Recipient(_) => "recipient",
            Frame::Chat(_) => "chat",
            Frame::AdHocCall(_) => "ad hoc call",
            Frame::StickerPack(_) => "sticker pack",
            Frame::NotificationProfile(_) => "notification profile",
            Frame::ChatFolder(_) => "chat folder",
            Frame::ChatItem(_) => "chat item",
        }
    }
}

/// Profile and settings of the account owner
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountData {
    pub profile_key: Vec<u8>,
    pub username: Option<String>,
    pub given_name: String,
    pub family_name: String,
    pub avatar_url_path: String,
    pub settings: AccountSettings,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountSettings {
    pub read_receipts: bool,
    pub typing_indicators: bool,
    pub link_previews: bool,
    pub universal_expire_timer_secs: u32,
    pub display_badges_on_profile: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: u64,
    pub destination: Destination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Destination {
    /// The account owner
    SelfRecipient,
    Contact(Contact),
    Group(Group),
    ReleaseNotes,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Contact {
    pub aci: Option<Uuid>,
    pub pni: Option<Uuid>,
    pub e164: Option<String>,
    pub profile_key: Option<Vec<u8>>,
    pub profile_given_name: Option<String>,
    pub profile_family_name: Option<String>,
    pub blocked: bool,
    pub profile_sharing: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Group {
    pub master_key: Vec<u8>,
    pub title: String,
    pub avatar_url_path: Option<String>,
    pub whitelisted: bool,
    pub blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Chat {
    pub id: u64,
    pub recipient_id: u64,
    pub archived: bool,
    pub pinned_order: Option<u32>,
    pub expiration_timer_ms: u64,
    pub mute_until_ms: i64,
    pub marked_unread: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdHocCallState {
    Generic,
    Joined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdHocCall {
    pub call_id: u64,
    pub recipient_id: u64,
    pub state: AdHocCallState,
    pub call_timestamp: i64,
}

/// An installed sticker pack; contents are downloaded again after restore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickerPack {
    pub pack_id: Vec<u8>,
    pub pack_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationProfile {
    pub id: Vec<u8>,
    pub name: String,
    pub emoji: Option<String>,
    pub color: u32,
    pub created_at_ms: i64,
    pub allow_all_calls: bool,
    pub allow_all_mentions: bool,
    /// Recipient ids allowed to notify while the profile is active
    pub allowed_members: Vec<u64>,
    pub schedule_enabled: bool,
    pub schedule_start_time: u32,
    pub schedule_end_time: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FolderType {
    All,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatFolder {
    pub id: Vec<u8>,
    pub name: String,
    pub folder_type: FolderType,
    pub show_only_unread: bool,
    pub show_muted_chats: bool,
    pub include_all_individual_chats: bool,
    pub include_all_group_chats: bool,
    /// Chat ids
    pub included_chat_ids: Vec<u64>,
    /// Chat ids
    pub excluded_chat_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Direction {
    Incoming {
        date_received: i64,
        read: bool,
        delivered: bool,
    },
    Outgoing {
        delivered: bool,
        read: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageAttachment {
    pub content_type: Option<String>,
    pub file_name: Option<String>,
    pub size: u64,
    pub plaintext_hash: Option<Vec<u8>>,
    pub remote_key: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatItem {
    pub chat_id: u64,
    pub author_id: u64,
    pub date_sent: i64,
    pub expires_in_ms: u64,
    pub direction: Direction,
    pub body: Option<String>,
    pub attachments: Vec<MessageAttachment>,
}

/// Serialize a frame payload
pub fn encode(frame: &Frame) -> ArchiveResult<Vec<u8>> {
    bincode::serialize(frame)
        .map_err(|e| ArchiveError::Format(format!("Failed to encode {}: {}", frame.kind(), e)))
}

/// Deserialize a frame payload
pub fn decode(bytes: &[u8]) -> ArchiveResult<Frame> {
    bincode::deserialize(bytes).map_err(|e| ArchiveError::Format(format!("Invalid frame: {}", e)))
}

pub(crate) fn encode_header(header: &BackupHeader) -> ArchiveResult<Vec<u8>> {
    bincode::serialize(header)
        .map_err(|e| ArchiveError::Format(format!("Failed to encode header: {}", e)))
}

pub(crate) fn decode_header(bytes: &[u8]) -> ArchiveResult<BackupHeader> {
    bincode::deserialize(bytes).map_err(|e| ArchiveError::Format(format!("Invalid header: {}", e)))
}
