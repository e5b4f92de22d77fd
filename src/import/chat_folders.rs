//! Chat folder frames

use rusqlite::Connection;
use uuid::Uuid;

use super::state::ImportState;
use crate::archive::frame::{ChatFolder, FolderType};
use crate::error::ArchiveResult;
use crate::models::{ChatFolderId, ChatFolderRecord, ChatFolderType, ThreadId};
use crate::storage::chat_folders;

fn local_threads(state: &mut ImportState, chat_ids: &[u64]) -> Vec<ThreadId> {
    let mut threads = Vec::with_capacity(chat_ids.len());
    for chat_id in chat_ids {
        match state.local_thread_id(*chat_id) {
            Some(thread) => threads.push(thread),
            None => state.skips.chat_folder_members += 1,
        }
    }
    threads
}

/// Insert a folder at the next position
///
/// Members naming a chat that was never imported are dropped rather than
/// failing the import.
pub fn import(conn: &Connection, state: &mut ImportState, folder: ChatFolder) -> ArchiveResult<()> {
    let included_threads = local_threads(state, &folder.included_chat_ids);
    let excluded_threads = local_threads(state, &folder.excluded_chat_ids);
    let position = state.next_chat_folder_position();

    chat_folders::insert(
        conn,
        &ChatFolderRecord {
            id: ChatFolderId::from_raw(0),
            folder_uuid: Uuid::from_slice(&folder.id).unwrap_or_else(|_| Uuid::new_v4()),
            name: folder.name,
            position,
            folder_type: match folder.folder_type {
                FolderType::All => ChatFolderType::All,
                FolderType::Custom => ChatFolderType::Custom,
            },
            show_unread: folder.show_only_unread,
            show_muted: folder.show_muted_chats,
            show_individual: folder.include_all_individual_chats,
            show_groups: folder.include_all_group_chats,
            included_threads,
            excluded_threads,
        },
    )?;
    Ok(())
}

/// Insert the default "All chats" folder when the archive carried none
pub fn insert_default_if_missing(conn: &Connection, state: &mut ImportState) -> ArchiveResult<bool> {
    if state.imported_chat_folder() {
        return Ok(false);
    }
    let position = state.next_chat_folder_position();
    chat_folders::insert(conn, &ChatFolderRecord::all_chats(position))?;
    Ok(true)
}
