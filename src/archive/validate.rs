//! Decode a whole archive without importing it
//!
//! Used before a destructive restore and by the `validate` command: every
//! frame is decoded and every in-stream reference is checked against the
//! frames seen so far, so an archive that would trip the importer's
//! ordering checks is rejected up front.

use std::collections::HashSet;

use super::frame::{BackupHeader, Destination, Frame};
use super::ArchiveReader;
use crate::error::{ArchiveError, ArchiveResult};

/// Per-domain frame counts of a decoded archive
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationSummary {
    pub header: BackupHeader,
    pub has_account: bool,
    pub recipients: u64,
    pub chats: u64,
    pub calls: u64,
    pub sticker_packs: u64,
    pub notification_profiles: u64,
    pub chat_folders: u64,
    pub chat_items: u64,
}

impl ValidationSummary {
    pub fn total_frames(&self) -> u64 {
        u64::from(self.has_account)
            + self.recipients
            + self.chats
            + self.calls
            + self.sticker_packs
            + self.notification_profiles
            + self.chat_folders
            + self.chat_items
    }

    /// One-line description
    pub fn summary(&self) -> String {
        format!(
            "v{}: {} recipients, {} chats, {} messages, {} calls, {} sticker packs, {} profiles, {} folders",
            self.header.version,
            self.recipients,
            self.chats,
            self.chat_items,
            self.calls,
            self.sticker_packs,
            self.notification_profiles,
            self.chat_folders
        )
    }
}

fn invalid(message: String) -> ArchiveError {
    ArchiveError::Validation(message)
}

/// Decode every frame of `reader` and check cross-frame references
pub fn validate(reader: &mut dyn ArchiveReader) -> ArchiveResult<ValidationSummary> {
    let header = reader.header()?;
    let mut summary = ValidationSummary {
        header,
        has_account: false,
        recipients: 0,
        chats: 0,
        calls: 0,
        sticker_packs: 0,
        notification_profiles: 0,
        chat_folders: 0,
        chat_items: 0,
    };

    let mut recipient_ids = HashSet::new();
    let mut chat_ids = HashSet::new();
    let mut self_seen = false;

    while let Some(frame) = reader.next_frame()? {
        match frame {
            Frame::Account(_) => {
                if summary.has_account {
                    return Err(invalid("Archive contains more than one account frame".into()));
                }
                summary.has_account = true;
            }
            Frame::Recipient(recipient) => {
                if !recipient_ids.insert(recipient.id) {
                    return Err(invalid(format!("Duplicate recipient id {}", recipient.id)));
                }
                if recipient.destination == Destination::SelfRecipient {
                    if self_seen {
                        return Err(invalid("More than one self recipient".into()));
                    }
                    self_seen = true;
                }
                summary.recipients += 1;
            }
            Frame::Chat(chat) => {
                if !recipient_ids.contains(&chat.recipient_id) {
                    return Err(invalid(format!(
                        "Chat {} references unknown recipient {}",
                        chat.id, chat.recipient_id
                    )));
                }
                if !chat_ids.insert(chat.id) {
                    return Err(invalid(format!("Duplicate chat id {}", chat.id)));
                }
                summary.chats += 1;
            }
            Frame::AdHocCall(call) => {
                if !recipient_ids.contains(&call.recipient_id) {
                    return Err(invalid(format!(
                        "Call {} references unknown recipient {}",
                        call.call_id, call.recipient_id
                    )));
                }
                summary.calls += 1;
            }
            Frame::StickerPack(_) => summary.sticker_packs += 1,
            Frame::NotificationProfile(profile) => {
                if let Some(missing) = profile
                    .allowed_members
                    .iter()
                    .find(|id| !recipient_ids.contains(id))
                {
                    return Err(invalid(format!(
                        "Notification profile '{}' references unknown recipient {}",
                        profile.name, missing
                    )));
                }
                summary.notification_profiles += 1;
            }
            Frame::ChatFolder(folder) => {
                if let Some(missing) = folder
                    .included_chat_ids
                    .iter()
                    .chain(folder.excluded_chat_ids.iter())
                    .find(|id| !chat_ids.contains(id))
                {
                    return Err(invalid(format!(
                        "Chat folder '{}' references unknown chat {}",
                        folder.name, missing
                    )));
                }
                summary.chat_folders += 1;
            }
            Frame::ChatItem(item) => {
                if !chat_ids.contains(&item.chat_id) {
                    return Err(invalid(format!(
                        "Message sent at {} references unknown chat {}",
                        item.date_sent, item.chat_id
                    )));
                }
                if !recipient_ids.contains(&item.author_id) {
                    return Err(invalid(format!(
                        "Message sent at {} references unknown author {}",
                        item.date_sent, item.author_id
                    )));
                }
                summary.chat_items += 1;
            }
        }
    }

    if !summary.has_account {
        return Err(invalid("Archive has no account frame".into()));
    }
    if !self_seen {
        return Err(invalid("Archive has no self recipient".into()));
    }

    Ok(summary)
}
