//! Chat item frames

use rusqlite::Connection;
use tracing::debug;

use super::state::ImportState;
use crate::archive::frame::{ChatItem, Direction, MessageAttachment};
use crate::error::ArchiveResult;
use crate::models::{AttachmentRecord, MessageId, MessageRecord, RecipientId, ThreadId, TransferState};
use crate::storage::messages;

struct PendingItem {
    thread_id: ThreadId,
    author_id: RecipientId,
    item: ChatItem,
}

/// Buffers chat items and writes them in batches
///
/// References are resolved when an item is added, so an unknown chat or
/// author fails on the frame that carries it. Call [`flush`](Self::flush)
/// at end of stream.
pub struct ChatItemInserter {
    batch_size: usize,
    pending: Vec<PendingItem>,
    inserted: u64,
}

impl ChatItemInserter {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            pending: Vec::with_capacity(batch_size),
            inserted: 0,
        }
    }

    pub fn add(&mut self, conn: &Connection, state: &ImportState, item: ChatItem) -> ArchiveResult<()> {
        let thread_id = state.require_local_thread_id(item.chat_id)?;
        let author_id = state.require_local_recipient_id(item.author_id)?;
        self.pending.push(PendingItem {
            thread_id,
            author_id,
            item,
        });
        if self.pending.len() >= self.batch_size {
            self.flush(conn)?;
        }
        Ok(())
    }

    /// Write every buffered item
    pub fn flush(&mut self, conn: &Connection) -> ArchiveResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();
        for pending in batch {
            let PendingItem {
                thread_id,
                author_id,
                item,
            } = pending;
            let attachments = item.attachments.clone();
            let message_id = messages::insert(conn, &message_record(thread_id, author_id, item))?;
            for attachment in attachments {
                messages::insert_attachment(conn, &attachment_record(message_id, attachment))?;
            }
        }
        self.inserted += count as u64;
        debug!(count, total = self.inserted, "Flushed chat items");
        Ok(())
    }

    pub fn inserted(&self) -> u64 {
        self.inserted
    }
}

fn message_record(thread_id: ThreadId, author_id: RecipientId, item: ChatItem) -> MessageRecord {
    let (outgoing, date_received, read, delivered) = match item.direction {
        Direction::Incoming {
            date_received,
            read,
            delivered,
        } => (false, date_received, read, delivered),
        Direction::Outgoing { delivered, read } => (true, 0, read, delivered),
    };
    MessageRecord {
        id: MessageId::from_raw(0),
        thread_id,
        from_recipient_id: author_id,
        date_sent: item.date_sent,
        date_received,
        outgoing,
        read,
        delivered,
        expires_in_ms: i64::try_from(item.expires_in_ms).unwrap_or(i64::MAX),
        body: item.body,
    }
}

/// Attachments with a remote key wait for the media restore; the rest
/// cannot be fetched and are marked offloaded
fn attachment_record(message_id: MessageId, attachment: MessageAttachment) -> AttachmentRecord {
    let transfer_state = if attachment.remote_key.is_some() {
        TransferState::RestorePending
    } else {
        TransferState::Offloaded
    };
    AttachmentRecord {
        message_id,
        content_type: attachment.content_type,
        file_name: attachment.file_name,
        size: i64::try_from(attachment.size).unwrap_or(i64::MAX),
        plaintext_hash: attachment.plaintext_hash,
        remote_key: attachment.remote_key,
        transfer_state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArchiveError;
    use crate::models::{RecipientRecord, RecipientType, ThreadRecord};
    use crate::storage::{recipients, structure, threads, Database};

    fn item(chat_id: u64, date_sent: i64, remote_key: Option<Vec<u8>>) -> ChatItem {
        ChatItem {
            chat_id,
            author_id: 1,
            date_sent,
            expires_in_ms: 0,
            direction: Direction::Incoming {
                date_received: date_sent + 1,
                read: false,
                delivered: false,
            },
            body: Some("hello".into()),
            attachments: vec![MessageAttachment {
                size: 10,
                remote_key,
                ..Default::default()
            }],
        }
    }

    #[test]
    fn test_batches_flush_at_size_and_on_demand() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let me = recipients::insert(&conn, &RecipientRecord::new(RecipientType::SelfRecipient)).unwrap();
        let thread = threads::insert(&conn, &ThreadRecord::new(me)).unwrap();
        let mut state = ImportState::new(me, 0);
        state.map_recipient(1, me);
        state.map_thread(1, thread);

        let mut inserter = ChatItemInserter::new(2);
        inserter.add(&conn, &state, item(1, 10, Some(vec![1]))).unwrap();
        assert_eq!(structure::row_count(&conn, "message").unwrap(), 0);
        inserter.add(&conn, &state, item(1, 20, None)).unwrap();
        assert_eq!(structure::row_count(&conn, "message").unwrap(), 2);
        inserter.add(&conn, &state, item(1, 30, None)).unwrap();
        inserter.flush(&conn).unwrap();
        assert_eq!(inserter.inserted(), 3);

        assert_eq!(messages::pending_restore_bytes(&conn).unwrap(), 10);
    }

    #[test]
    fn test_unknown_chat_fails_on_add() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let state = ImportState::new(RecipientId::from_raw(1), 0);

        let mut inserter = ChatItemInserter::new(10);
        let result = inserter.add(&conn, &state, item(9, 10, None));
        assert!(matches!(
            result,
            Err(ArchiveError::UnknownRemoteId { entity: "chat", remote_id: 9 })
        ));
    }

    #[test]
    fn test_unknown_author_fails_on_add() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();
        let me = recipients::insert(&conn, &RecipientRecord::new(RecipientType::SelfRecipient)).unwrap();
        let thread = threads::insert(&conn, &ThreadRecord::new(me)).unwrap();
        let mut state = ImportState::new(me, 0);
        state.map_recipient(1, me);
        state.map_thread(1, thread);

        let mut inserter = ChatItemInserter::new(10);
        let result = inserter.add(
            &conn,
            &state,
            ChatItem {
                author_id: 7,
                ..item(1, 10, None)
            },
        );
        assert!(matches!(
            result,
            Err(ArchiveError::UnknownRemoteId { entity: "recipient", remote_id: 7 })
        ));
        inserter.flush(&conn).unwrap();
        assert_eq!(structure::row_count(&conn, "message").unwrap(), 0);
    }
}
