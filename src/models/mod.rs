//! Core data models for chat-archive
//!
//! Rows of the local relational store, and the backup bookkeeping types
//! kept in the key-value store.

pub mod backup;
pub mod call;
pub mod chat_folder;
pub mod ids;
pub mod message;
pub mod notification_profile;
pub mod recipient;
pub mod sticker;
pub mod thread;

pub use backup::{BackupTier, CredentialType, RestoreState, SelfIdentity};
pub use call::{CallEvent, CallRecord};
pub use chat_folder::{ChatFolderRecord, ChatFolderType};
pub use ids::{ChatFolderId, MessageId, NotificationProfileId, RecipientId, ThreadId};
pub use message::{AttachmentRecord, MessageRecord, TransferState};
pub use notification_profile::NotificationProfileRecord;
pub use recipient::{RecipientRecord, RecipientType};
pub use sticker::StickerPackRecord;
pub use thread::ThreadRecord;
