//! Thread table access

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::ArchiveResult;
use crate::models::{RecipientId, ThreadId, ThreadRecord};

const COLUMNS: &str = "_id, recipient_id, archived, pinned_order, expires_in, muted_until, \
     marked_unread, date, snippet, message_count, active";

fn from_row(row: &Row<'_>) -> rusqlite::Result<ThreadRecord> {
    Ok(ThreadRecord {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        archived: row.get(2)?,
        pinned_order: row.get(3)?,
        expires_in_ms: row.get(4)?,
        muted_until_ms: row.get(5)?,
        marked_unread: row.get(6)?,
        date: row.get(7)?,
        snippet: row.get(8)?,
        message_count: row.get(9)?,
        active: row.get(10)?,
    })
}

/// Insert a thread; summary fields are left for [`refresh_summaries`]
pub fn insert(conn: &Connection, record: &ThreadRecord) -> ArchiveResult<ThreadId> {
    conn.execute(
        "INSERT INTO thread (recipient_id, archived, pinned_order, expires_in, muted_until,
             marked_unread, date, snippet, message_count, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            record.recipient_id,
            record.archived,
            record.pinned_order,
            record.expires_in_ms,
            record.muted_until_ms,
            record.marked_unread,
            record.date,
            record.snippet,
            record.message_count,
            record.active,
        ],
    )?;
    Ok(ThreadId::from_raw(conn.last_insert_rowid()))
}

pub fn get(conn: &Connection, id: ThreadId) -> ArchiveResult<Option<ThreadRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {} FROM thread WHERE _id = ?1", COLUMNS),
            [id],
            from_row,
        )
        .optional()?;
    Ok(record)
}

pub fn find_by_recipient(
    conn: &Connection,
    recipient_id: RecipientId,
) -> ArchiveResult<Option<ThreadId>> {
    let id = conn
        .query_row(
            "SELECT _id FROM thread WHERE recipient_id = ?1",
            [recipient_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// All threads in row order
pub fn list(conn: &Connection) -> ArchiveResult<Vec<ThreadRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM thread ORDER BY _id", COLUMNS))?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Recompute date, snippet, message count and active flag from messages
///
/// Returns the number of threads updated.
pub fn refresh_summaries(conn: &Connection) -> ArchiveResult<usize> {
    let updated = conn.execute(
        "UPDATE thread SET
             message_count = (SELECT COUNT(*) FROM message WHERE message.thread_id = thread._id),
             date = COALESCE(
                 (SELECT MAX(date_sent) FROM message WHERE message.thread_id = thread._id), 0),
             snippet = (SELECT body FROM message WHERE message.thread_id = thread._id
                        ORDER BY date_sent DESC, _id DESC LIMIT 1),
             active = EXISTS (SELECT 1 FROM message WHERE message.thread_id = thread._id)",
        [],
    )?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecipientRecord, RecipientType};
    use crate::storage::{recipients, Database};

    #[test]
    fn test_refresh_summaries() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let recipient = recipients::insert(&conn, &RecipientRecord::new(RecipientType::SelfRecipient))
            .unwrap();
        let thread = insert(&conn, &ThreadRecord::new(recipient)).unwrap();
        conn.execute_batch(&format!(
            "INSERT INTO message (thread_id, from_recipient_id, date_sent, body) VALUES ({t}, {r}, 10, 'first');
             INSERT INTO message (thread_id, from_recipient_id, date_sent, body) VALUES ({t}, {r}, 20, 'second');",
            t = thread.raw(),
            r = recipient.raw()
        ))
        .unwrap();

        assert_eq!(refresh_summaries(&conn).unwrap(), 1);
        let record = get(&conn, thread).unwrap().unwrap();
        assert_eq!(record.message_count, 2);
        assert_eq!(record.date, 20);
        assert_eq!(record.snippet.as_deref(), Some("second"));
        assert!(record.active);
        assert_eq!(find_by_recipient(&conn, recipient).unwrap(), Some(thread));
    }
}
