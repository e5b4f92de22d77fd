//! Ad hoc call log rows

use super::ids::RecipientId;

/// Outcome recorded for a call link call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    Generic,
    Joined,
}

impl CallEvent {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Generic => 0,
            Self::Joined => 1,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::Joined,
            _ => Self::Generic,
        }
    }
}

/// A row of the `call` table
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub call_id: u64,
    pub peer: RecipientId,
    pub event: CallEvent,
    pub timestamp: i64,
}
