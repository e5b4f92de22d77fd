//! Chat frames

use rusqlite::Connection;
use tracing::debug;

use super::state::ImportState;
use crate::archive::frame::Chat;
use crate::error::ArchiveResult;
use crate::models::ThreadRecord;
use crate::storage::threads;

/// Insert a thread for the chat's recipient
///
/// A recipient has at most one thread; a second chat for the same
/// recipient maps onto the first.
pub fn import(conn: &Connection, state: &mut ImportState, chat: Chat) -> ArchiveResult<()> {
    let recipient_id = state.require_local_recipient_id(chat.recipient_id)?;
    if let Some(existing) = threads::find_by_recipient(conn, recipient_id)? {
        debug!(remote_id = chat.id, "Chat maps onto an existing thread");
        state.map_thread(chat.id, existing);
        state.skips.chats += 1;
        return Ok(());
    }

    let local = threads::insert(
        conn,
        &ThreadRecord {
            archived: chat.archived,
            pinned_order: chat.pinned_order,
            expires_in_ms: i64::try_from(chat.expiration_timer_ms).unwrap_or(i64::MAX),
            muted_until_ms: chat.mute_until_ms,
            marked_unread: chat.marked_unread,
            ..ThreadRecord::new(recipient_id)
        },
    )?;
    state.map_thread(chat.id, local);
    Ok(())
}
