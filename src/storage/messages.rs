//! Message, attachment and search-index access

use std::ops::ControlFlow;

use rusqlite::{params, Connection, Row};

use crate::error::ArchiveResult;
use crate::models::{AttachmentRecord, MessageId, MessageRecord, TransferState};

const COLUMNS: &str = "_id, thread_id, from_recipient_id, date_sent, date_received, outgoing, \
     read, delivered, expires_in, body";

fn from_row(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        from_recipient_id: row.get(2)?,
        date_sent: row.get(3)?,
        date_received: row.get(4)?,
        outgoing: row.get(5)?,
        read: row.get(6)?,
        delivered: row.get(7)?,
        expires_in_ms: row.get(8)?,
        body: row.get(9)?,
    })
}

fn attachment_from_row(row: &Row<'_>) -> rusqlite::Result<AttachmentRecord> {
    let state: i64 = row.get(6)?;
    Ok(AttachmentRecord {
        message_id: row.get(0)?,
        content_type: row.get(1)?,
        file_name: row.get(2)?,
        size: row.get(3)?,
        plaintext_hash: row.get(4)?,
        remote_key: row.get(5)?,
        transfer_state: TransferState::from_i64(state),
    })
}

pub fn insert(conn: &Connection, record: &MessageRecord) -> ArchiveResult<MessageId> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO message (thread_id, from_recipient_id, date_sent, date_received, outgoing,
             read, delivered, expires_in, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    stmt.execute(params![
        record.thread_id,
        record.from_recipient_id,
        record.date_sent,
        record.date_received,
        record.outgoing,
        record.read,
        record.delivered,
        record.expires_in_ms,
        record.body,
    ])?;
    Ok(MessageId::from_raw(conn.last_insert_rowid()))
}

pub fn insert_attachment(conn: &Connection, record: &AttachmentRecord) -> ArchiveResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO attachment (message_id, content_type, file_name, size, plaintext_hash,
             remote_key, transfer_state)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    stmt.execute(params![
        record.message_id,
        record.content_type,
        record.file_name,
        record.size,
        record.plaintext_hash,
        record.remote_key,
        record.transfer_state.as_i64(),
    ])?;
    Ok(())
}

/// Number of messages sent at or after `cutoff`
pub fn count_since(conn: &Connection, cutoff: i64) -> ArchiveResult<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM message WHERE date_sent >= ?1",
        [cutoff],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Visit messages sent at or after `cutoff` in send order until `visit` breaks
pub fn for_each_since<F>(conn: &Connection, cutoff: i64, mut visit: F) -> ArchiveResult<()>
where
    F: FnMut(MessageRecord) -> ArchiveResult<ControlFlow<()>>,
{
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM message WHERE date_sent >= ?1 ORDER BY date_sent, _id",
        COLUMNS
    ))?;
    let mut rows = stmt.query([cutoff])?;
    while let Some(row) = rows.next()? {
        if visit(from_row(row)?)?.is_break() {
            break;
        }
    }
    Ok(())
}

/// Total attachment size referenced by messages sent at or after `cutoff`
pub fn attachment_bytes_since(conn: &Connection, cutoff: i64) -> ArchiveResult<u64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(attachment.size), 0) FROM attachment
         INNER JOIN message ON message._id = attachment.message_id
         WHERE message.date_sent >= ?1",
        [cutoff],
        |row| row.get(0),
    )?;
    Ok(total.max(0) as u64)
}

pub fn list_for_thread(
    conn: &Connection,
    thread_id: crate::models::ThreadId,
) -> ArchiveResult<Vec<MessageRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM message WHERE thread_id = ?1 ORDER BY date_sent, _id",
        COLUMNS
    ))?;
    let rows = stmt.query_map([thread_id], from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn attachments_for(conn: &Connection, message_id: MessageId) -> ArchiveResult<Vec<AttachmentRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT message_id, content_type, file_name, size, plaintext_hash, remote_key, transfer_state
         FROM attachment WHERE message_id = ?1 ORDER BY _id",
    )?;
    let rows = stmt.query_map([message_id], attachment_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Delete messages that share send time, author and thread, keeping the oldest row
///
/// Attachments of removed messages are deleted explicitly since this runs
/// with foreign keys disabled. Returns the number of messages removed.
pub fn delete_duplicates(conn: &Connection) -> ArchiveResult<usize> {
    const DUPLICATES: &str = "SELECT _id FROM message WHERE _id NOT IN (
             SELECT MIN(_id) FROM message GROUP BY date_sent, from_recipient_id, thread_id)";

    conn.execute(
        &format!("DELETE FROM attachment WHERE message_id IN ({})", DUPLICATES),
        [],
    )?;
    let removed = conn.execute(&format!("DELETE FROM message WHERE _id IN ({})", DUPLICATES), [])?;
    Ok(removed)
}

/// Repopulate the search table from message bodies
pub fn rebuild_search_index(conn: &Connection) -> ArchiveResult<usize> {
    conn.execute("DELETE FROM message_search", [])?;
    let inserted = conn.execute(
        "INSERT INTO message_search (message_id, thread_id, body)
         SELECT _id, thread_id, lower(body) FROM message WHERE body IS NOT NULL",
        [],
    )?;
    Ok(inserted)
}

/// Messages whose body contains `query`, case-insensitively
pub fn search(conn: &Connection, query: &str) -> ArchiveResult<Vec<MessageId>> {
    let pattern = format!("%{}%", query.to_lowercase());
    let mut stmt = conn.prepare(
        "SELECT message_id FROM message_search WHERE body LIKE ?1 ORDER BY message_id",
    )?;
    let rows = stmt.query_map([pattern], |row| row.get(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Total size of attachments waiting to be restored
pub fn pending_restore_bytes(conn: &Connection) -> ArchiveResult<u64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(size), 0) FROM attachment WHERE transfer_state = ?1",
        [TransferState::RestorePending.as_i64()],
        |row| row.get(0),
    )?;
    Ok(total.max(0) as u64)
}

/// Mark the pending attachments of one message as downloaded
pub fn mark_restored(conn: &Connection, message_id: MessageId) -> ArchiveResult<usize> {
    let updated = conn.execute(
        "UPDATE attachment SET transfer_state = ?1 WHERE message_id = ?2 AND transfer_state = ?3",
        params![
            TransferState::Done.as_i64(),
            message_id,
            TransferState::RestorePending.as_i64()
        ],
    )?;
    Ok(updated)
}

/// Mark every pending attachment as offloaded; used when media restore is canceled
pub fn offload_pending_restores(conn: &Connection) -> ArchiveResult<usize> {
    let updated = conn.execute(
        "UPDATE attachment SET transfer_state = ?1 WHERE transfer_state = ?2",
        params![
            TransferState::Offloaded.as_i64(),
            TransferState::RestorePending.as_i64()
        ],
    )?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecipientRecord, RecipientType, ThreadId, ThreadRecord};
    use crate::storage::{recipients, structure, threads, Database};

    fn message(thread_id: ThreadId, author: crate::models::RecipientId, sent: i64, body: &str) -> MessageRecord {
        MessageRecord {
            id: MessageId::from_raw(0),
            thread_id,
            from_recipient_id: author,
            date_sent: sent,
            date_received: sent + 1,
            outgoing: false,
            read: true,
            delivered: false,
            expires_in_ms: 0,
            body: Some(body.to_string()),
        }
    }

    fn attachment(message_id: MessageId, size: i64, state: TransferState) -> AttachmentRecord {
        AttachmentRecord {
            message_id,
            content_type: Some("image/jpeg".into()),
            file_name: None,
            size,
            plaintext_hash: None,
            remote_key: None,
            transfer_state: state,
        }
    }

    #[test]
    fn test_delete_duplicates_keeps_first_and_drops_attachments() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let author = recipients::insert(&conn, &RecipientRecord::new(RecipientType::SelfRecipient)).unwrap();
        let thread = threads::insert(&conn, &ThreadRecord::new(author)).unwrap();

        let first = insert(&conn, &message(thread, author, 100, "one")).unwrap();
        let copy = insert(&conn, &message(thread, author, 100, "one again")).unwrap();
        insert(&conn, &message(thread, author, 200, "two")).unwrap();
        insert_attachment(&conn, &attachment(copy, 10, TransferState::Done)).unwrap();

        structure::set_foreign_keys(&conn, false).unwrap();
        assert_eq!(delete_duplicates(&conn).unwrap(), 1);

        let remaining = list_for_thread(&conn, thread).unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].id, first);
        assert!(attachments_for(&conn, copy).unwrap().is_empty());
        assert!(structure::foreign_key_violations(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_search_after_rebuild() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let author = recipients::insert(&conn, &RecipientRecord::new(RecipientType::SelfRecipient)).unwrap();
        let thread = threads::insert(&conn, &ThreadRecord::new(author)).unwrap();
        let id = insert(&conn, &message(thread, author, 1, "Lunch Tomorrow?")).unwrap();

        conn.execute("DELETE FROM message_search", []).unwrap();
        assert!(search(&conn, "lunch").unwrap().is_empty());

        assert_eq!(rebuild_search_index(&conn).unwrap(), 1);
        assert_eq!(search(&conn, "LUNCH").unwrap(), vec![id]);
    }

    #[test]
    fn test_pending_restore_bytes() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let author = recipients::insert(&conn, &RecipientRecord::new(RecipientType::SelfRecipient)).unwrap();
        let thread = threads::insert(&conn, &ThreadRecord::new(author)).unwrap();
        let id = insert(&conn, &message(thread, author, 1, "pic")).unwrap();
        insert_attachment(&conn, &attachment(id, 300, TransferState::RestorePending)).unwrap();
        insert_attachment(&conn, &attachment(id, 50, TransferState::Done)).unwrap();

        assert_eq!(pending_restore_bytes(&conn).unwrap(), 300);
        assert_eq!(offload_pending_restores(&conn).unwrap(), 1);
        assert_eq!(pending_restore_bytes(&conn).unwrap(), 0);
    }
}
