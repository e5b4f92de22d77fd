//! Message and attachment rows

use serde::{Deserialize, Serialize};

use super::ids::{MessageId, RecipientId, ThreadId};

/// A row of the `message` table
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub from_recipient_id: RecipientId,
    pub date_sent: i64,
    /// Zero for outgoing messages
    pub date_received: i64,
    pub outgoing: bool,
    pub read: bool,
    pub delivered: bool,
    pub expires_in_ms: i64,
    pub body: Option<String>,
}

/// Where an attachment's bytes are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    /// On disk
    Done,
    /// Referenced by a restored archive; bytes still to be downloaded
    RestorePending,
    /// Only a remote reference exists and none is being fetched
    Offloaded,
}

impl TransferState {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Done => 0,
            Self::RestorePending => 1,
            Self::Offloaded => 2,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            0 => Self::Done,
            1 => Self::RestorePending,
            _ => Self::Offloaded,
        }
    }
}

/// A row of the `attachment` table
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRecord {
    pub message_id: MessageId,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
    pub size: i64,
    pub plaintext_hash: Option<Vec<u8>>,
    pub remote_key: Option<Vec<u8>>,
    pub transfer_state: TransferState,
}
