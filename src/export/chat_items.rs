//! Chat item frames, written last and in bulk

use std::ops::ControlFlow;

use rusqlite::Connection;

use super::state::ExportState;
use super::ExportProgressListener;
use crate::archive::frame::{ChatItem, Direction, Frame, MessageAttachment};
use crate::cancel::CancellationToken;
use crate::error::ArchiveResult;
use crate::models::{AttachmentRecord, MessageRecord};
use crate::storage::messages;

/// Result of the chat item pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChatItemExport {
    pub emitted: u64,
    pub canceled: bool,
}

fn attachment(record: AttachmentRecord) -> MessageAttachment {
    MessageAttachment {
        content_type: record.content_type,
        file_name: record.file_name,
        size: record.size.max(0) as u64,
        plaintext_hash: record.plaintext_hash,
        remote_key: record.remote_key,
    }
}

fn chat_item(
    record: MessageRecord,
    chat_id: u64,
    author_id: u64,
    attachments: Vec<MessageAttachment>,
) -> ChatItem {
    let direction = if record.outgoing {
        Direction::Outgoing {
            delivered: record.delivered,
            read: record.read,
        }
    } else {
        Direction::Incoming {
            date_received: record.date_received,
            read: record.read,
            delivered: record.delivered,
        }
    };
    ChatItem {
        chat_id,
        author_id,
        date_sent: record.date_sent,
        expires_in_ms: record.expires_in_ms.max(0) as u64,
        direction,
        body: record.body,
        attachments,
    }
}

/// Emit messages sent at or after `cutoff_ms` whose chat and author were emitted
///
/// Every `interval` frames the listener hears about progress and the
/// cancellation token is polled.
pub fn export<F>(
    conn: &Connection,
    state: &ExportState,
    cutoff_ms: i64,
    interval: u64,
    progress: &dyn ExportProgressListener,
    cancel: &CancellationToken,
    emit: &mut F,
) -> ArchiveResult<ChatItemExport>
where
    F: FnMut(Frame) -> ArchiveResult<()>,
{
    let approx_total = messages::count_since(conn, cutoff_ms)?;
    let total_attachment_bytes = messages::attachment_bytes_since(conn, cutoff_ms)?;
    let interval = interval.max(1);

    let mut result = ChatItemExport::default();
    let mut attachment_bytes = 0u64;

    messages::for_each_since(conn, cutoff_ms, |record| {
        let (Some(chat_id), Some(author_id)) = (
            state.backup_thread_id(record.thread_id),
            state.backup_recipient_id(record.from_recipient_id),
        ) else {
            return Ok(ControlFlow::Continue(()));
        };

        let attachments: Vec<_> = messages::attachments_for(conn, record.id)?
            .into_iter()
            .map(attachment)
            .collect();
        if !attachments.is_empty() {
            attachment_bytes += attachments.iter().map(|a| a.size).sum::<u64>();
            progress.on_attachment(attachment_bytes, total_attachment_bytes);
        }

        emit(Frame::ChatItem(chat_item(record, chat_id, author_id, attachments)))?;
        result.emitted += 1;

        if result.emitted % interval == 0 {
            progress.on_message(result.emitted, approx_total);
            if cancel.is_cancelled() {
                result.canceled = true;
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    })?;

    Ok(result)
}
