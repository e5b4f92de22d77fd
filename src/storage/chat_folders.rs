//! Chat folder access

use rusqlite::{params, Connection};

use super::uuid_column;
use crate::error::ArchiveResult;
use crate::models::{ChatFolderId, ChatFolderRecord, ChatFolderType, ThreadId};

const INCLUDED: i64 = 0;
const EXCLUDED: i64 = 1;

/// Insert a folder and its membership rows
pub fn insert(conn: &Connection, record: &ChatFolderRecord) -> ArchiveResult<ChatFolderId> {
    conn.execute(
        "INSERT INTO chat_folder (folder_uuid, name, position, folder_type, show_unread,
             show_muted, show_individual, show_groups)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.folder_uuid.to_string(),
            record.name,
            record.position,
            record.folder_type.as_i64(),
            record.show_unread,
            record.show_muted,
            record.show_individual,
            record.show_groups,
        ],
    )?;
    let id = ChatFolderId::from_raw(conn.last_insert_rowid());

    let mut stmt = conn.prepare_cached(
        "INSERT INTO chat_folder_membership (chat_folder_id, thread_id, membership_type)
         VALUES (?1, ?2, ?3)",
    )?;
    for thread in &record.included_threads {
        stmt.execute(params![id, thread, INCLUDED])?;
    }
    for thread in &record.excluded_threads {
        stmt.execute(params![id, thread, EXCLUDED])?;
    }
    Ok(id)
}

/// All folders ordered by position
pub fn list(conn: &Connection) -> ArchiveResult<Vec<ChatFolderRecord>> {
    let mut stmt = conn.prepare(
        "SELECT _id, folder_uuid, name, position, folder_type, show_unread, show_muted,
             show_individual, show_groups
         FROM chat_folder ORDER BY position, _id",
    )?;
    let rows = stmt.query_map([], |row| {
        let folder_type: i64 = row.get(4)?;
        Ok(ChatFolderRecord {
            id: row.get(0)?,
            folder_uuid: uuid_column(row, 1)?.unwrap_or_default(),
            name: row.get(2)?,
            position: row.get(3)?,
            folder_type: ChatFolderType::from_i64(folder_type),
            show_unread: row.get(5)?,
            show_muted: row.get(6)?,
            show_individual: row.get(7)?,
            show_groups: row.get(8)?,
            included_threads: Vec::new(),
            excluded_threads: Vec::new(),
        })
    })?;
    let mut folders = rows.collect::<Result<Vec<_>, _>>()?;

    let mut members = conn.prepare(
        "SELECT thread_id, membership_type FROM chat_folder_membership
         WHERE chat_folder_id = ?1 ORDER BY _id",
    )?;
    for folder in &mut folders {
        let rows = members.query_map([folder.id], |row| {
            Ok((row.get::<_, ThreadId>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (thread, membership) = row?;
            if membership == EXCLUDED {
                folder.excluded_threads.push(thread);
            } else {
                folder.included_threads.push(thread);
            }
        }
    }
    Ok(folders)
}
