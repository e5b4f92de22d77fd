//! Chat frames

use rusqlite::Connection;

use super::state::ExportState;
use crate::archive::frame::{Chat, Frame};
use crate::error::ArchiveResult;
use crate::storage::threads;

/// Emit a chat for every thread whose recipient was emitted
pub fn export<F>(conn: &Connection, state: &mut ExportState, emit: &mut F) -> ArchiveResult<u64>
where
    F: FnMut(Frame) -> ArchiveResult<()>,
{
    let mut emitted = 0;
    for thread in threads::list(conn)? {
        let Some(recipient_id) = state.backup_recipient_id(thread.recipient_id) else {
            continue;
        };
        let id = state.add_thread(thread.id);
        emit(Frame::Chat(Chat {
            id,
            recipient_id,
            archived: thread.archived,
            pinned_order: thread.pinned_order,
            expiration_timer_ms: thread.expires_in_ms.max(0) as u64,
            mute_until_ms: thread.muted_until_ms,
            marked_unread: thread.marked_unread,
        }))?;
        emitted += 1;
    }
    Ok(emitted)
}
