//! Thread rows

use super::ids::{RecipientId, ThreadId};

/// A row of the `thread` table
///
/// `date`, `snippet`, `message_count` and `active` are summaries of the
/// thread's messages and are recomputed locally rather than backed up.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadRecord {
    pub id: ThreadId,
    pub recipient_id: RecipientId,
    pub archived: bool,
    pub pinned_order: Option<u32>,
    pub expires_in_ms: i64,
    pub muted_until_ms: i64,
    pub marked_unread: bool,
    pub date: i64,
    pub snippet: Option<String>,
    pub message_count: i64,
    pub active: bool,
}

impl ThreadRecord {
    pub fn new(recipient_id: RecipientId) -> Self {
        Self {
            id: ThreadId::from_raw(0),
            recipient_id,
            archived: false,
            pinned_order: None,
            expires_in_ms: 0,
            muted_until_ms: 0,
            marked_unread: false,
            date: 0,
            snippet: None,
            message_count: 0,
            active: false,
        }
    }
}
