//! Bookkeeping shared by the import processors

use std::collections::HashMap;

use crate::archive::frame::AccountData;
use crate::error::{ArchiveError, ArchiveResult};
use crate::models::{RecipientId, ThreadId};

/// Frames dropped for recoverable reasons
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSkips {
    /// Contacts with no identifier, or whose account id was already imported
    pub recipients: u64,
    /// Chats pointing at a recipient that already has a chat
    pub chats: u64,
    /// Calls with a call id that was already imported
    pub calls: u64,
    /// Sticker packs that appeared twice
    pub sticker_packs: u64,
    /// Profiles whose name was already taken
    pub notification_profiles: u64,
    /// Folder members naming a chat that was never imported
    pub chat_folder_members: u64,
}

impl ImportSkips {
    pub fn total(&self) -> u64 {
        self.recipients
            + self.chats
            + self.calls
            + self.sticker_packs
            + self.notification_profiles
            + self.chat_folder_members
    }
}

/// Maps from in-stream ids to the rows created for them
///
/// Frames arrive in domain order, so a reference to an id that has no
/// mapping yet is an ordering violation in the archive, reported as
/// [`ArchiveError::UnknownRemoteId`].
#[derive(Debug)]
pub struct ImportState {
    pub self_recipient_id: RecipientId,
    pub backup_time_ms: i64,
    pub skips: ImportSkips,
    /// Applied to the key-value store once the rewrite commits
    pub account: Option<AccountData>,
    remote_to_recipient: HashMap<u64, RecipientId>,
    remote_to_thread: HashMap<u64, ThreadId>,
    chat_folder_position: i64,
}

impl ImportState {
    pub fn new(self_recipient_id: RecipientId, backup_time_ms: i64) -> Self {
        Self {
            self_recipient_id,
            backup_time_ms,
            skips: ImportSkips::default(),
            account: None,
            remote_to_recipient: HashMap::new(),
            remote_to_thread: HashMap::new(),
            chat_folder_position: 0,
        }
    }

    pub fn map_recipient(&mut self, remote_id: u64, local: RecipientId) {
        self.remote_to_recipient.insert(remote_id, local);
    }

    pub fn local_recipient_id(&self, remote_id: u64) -> Option<RecipientId> {
        self.remote_to_recipient.get(&remote_id).copied()
    }

    pub fn require_local_recipient_id(&self, remote_id: u64) -> ArchiveResult<RecipientId> {
        self.local_recipient_id(remote_id)
            .ok_or(ArchiveError::UnknownRemoteId {
                entity: "recipient",
                remote_id,
            })
    }

    pub fn map_thread(&mut self, remote_id: u64, local: ThreadId) {
        self.remote_to_thread.insert(remote_id, local);
    }

    pub fn local_thread_id(&self, remote_id: u64) -> Option<ThreadId> {
        self.remote_to_thread.get(&remote_id).copied()
    }

    pub fn require_local_thread_id(&self, remote_id: u64) -> ArchiveResult<ThreadId> {
        self.local_thread_id(remote_id).ok_or(ArchiveError::UnknownRemoteId {
            entity: "chat",
            remote_id,
        })
    }

    /// Position for the next chat folder, counting up from zero
    pub fn next_chat_folder_position(&mut self) -> i64 {
        let position = self.chat_folder_position;
        self.chat_folder_position += 1;
        position
    }

    pub fn imported_chat_folder(&self) -> bool {
        self.chat_folder_position > 0
    }
}
