//! Bookkeeping shared by the export processors

use std::collections::HashMap;

use crate::archive::BackupMode;
use crate::models::{RecipientId, ThreadId};

/// Maps between local row ids and the in-stream ids written to frames
///
/// Backup ids are assigned sequentially from 1 in emission order. A
/// recipient or chat that has no backup id was not emitted, and anything
/// referencing it is skipped.
#[derive(Debug)]
pub struct ExportState {
    pub backup_time_ms: i64,
    pub mode: BackupMode,
    pub self_recipient_id: RecipientId,
    recipient_to_backup: HashMap<RecipientId, u64>,
    backup_to_recipient: HashMap<u64, RecipientId>,
    thread_to_backup: HashMap<ThreadId, u64>,
    backup_to_thread: HashMap<u64, ThreadId>,
}

impl ExportState {
    pub fn new(backup_time_ms: i64, mode: BackupMode, self_recipient_id: RecipientId) -> Self {
        Self {
            backup_time_ms,
            mode,
            self_recipient_id,
            recipient_to_backup: HashMap::new(),
            backup_to_recipient: HashMap::new(),
            thread_to_backup: HashMap::new(),
            backup_to_thread: HashMap::new(),
        }
    }

    /// Assign the next backup id to an emitted recipient
    pub fn add_recipient(&mut self, local: RecipientId) -> u64 {
        if let Some(existing) = self.recipient_to_backup.get(&local) {
            return *existing;
        }
        let backup_id = self.recipient_to_backup.len() as u64 + 1;
        self.recipient_to_backup.insert(local, backup_id);
        self.backup_to_recipient.insert(backup_id, local);
        backup_id
    }

    pub fn backup_recipient_id(&self, local: RecipientId) -> Option<u64> {
        self.recipient_to_backup.get(&local).copied()
    }

    pub fn local_recipient_id(&self, backup_id: u64) -> Option<RecipientId> {
        self.backup_to_recipient.get(&backup_id).copied()
    }

    /// Assign the next backup id to an included thread
    pub fn add_thread(&mut self, local: ThreadId) -> u64 {
        if let Some(existing) = self.thread_to_backup.get(&local) {
            return *existing;
        }
        let backup_id = self.thread_to_backup.len() as u64 + 1;
        self.thread_to_backup.insert(local, backup_id);
        self.backup_to_thread.insert(backup_id, local);
        backup_id
    }

    pub fn backup_thread_id(&self, local: ThreadId) -> Option<u64> {
        self.thread_to_backup.get(&local).copied()
    }

    pub fn local_thread_id(&self, backup_id: u64) -> Option<ThreadId> {
        self.backup_to_thread.get(&backup_id).copied()
    }

    pub fn recipient_count(&self) -> usize {
        self.recipient_to_backup.len()
    }

    pub fn thread_count(&self) -> usize {
        self.thread_to_backup.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential_and_stable() {
        let mut state = ExportState::new(0, BackupMode::Local, RecipientId::from_raw(1));
        assert_eq!(state.add_recipient(RecipientId::from_raw(7)), 1);
        assert_eq!(state.add_recipient(RecipientId::from_raw(3)), 2);
        assert_eq!(state.add_recipient(RecipientId::from_raw(7)), 1);
        assert_eq!(state.recipient_count(), 2);
        assert_eq!(state.local_recipient_id(2), Some(RecipientId::from_raw(3)));
        assert_eq!(state.backup_recipient_id(RecipientId::from_raw(9)), None);

        assert_eq!(state.add_thread(ThreadId::from_raw(40)), 1);
        assert_eq!(state.backup_thread_id(ThreadId::from_raw(40)), Some(1));
        assert_eq!(state.local_thread_id(1), Some(ThreadId::from_raw(40)));
    }
}
