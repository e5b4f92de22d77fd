//! Chat folder frames

use rusqlite::Connection;

use super::state::ExportState;
use crate::archive::frame::{ChatFolder, FolderType, Frame};
use crate::error::ArchiveResult;
use crate::models::{ChatFolderType, ThreadId};
use crate::storage::chat_folders;

fn backup_ids(state: &ExportState, threads: &[ThreadId]) -> Vec<u64> {
    threads
        .iter()
        .filter_map(|thread| state.backup_thread_id(*thread))
        .collect()
}

/// Emit folders in position order
pub fn export<F>(conn: &Connection, state: &ExportState, emit: &mut F) -> ArchiveResult<u64>
where
    F: FnMut(Frame) -> ArchiveResult<()>,
{
    let mut emitted = 0;
    for folder in chat_folders::list(conn)? {
        emit(Frame::ChatFolder(ChatFolder {
            id: folder.folder_uuid.as_bytes().to_vec(),
            name: folder.name,
            folder_type: match folder.folder_type {
                ChatFolderType::All => FolderType::All,
                ChatFolderType::Custom => FolderType::Custom,
            },
            show_only_unread: folder.show_unread,
            show_muted_chats: folder.show_muted,
            include_all_individual_chats: folder.show_individual,
            include_all_group_chats: folder.show_groups,
            included_chat_ids: backup_ids(state, &folder.included_threads),
            excluded_chat_ids: backup_ids(state, &folder.excluded_threads),
        }))?;
        emitted += 1;
    }
    Ok(emitted)
}
