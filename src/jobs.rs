//! Background work handed to the embedding application
//!
//! Import and restore finish by enqueuing follow-up jobs; key rotation halts
//! jobs that would otherwise keep using the old key. Running, retrying and
//! persisting jobs is the scheduler's business.

use std::sync::Mutex;

use tracing::debug;

use crate::models::RecipientId;

/// A unit of follow-up work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Fetch a sticker pack's manifest and stickers
    StickerPackDownload { pack_id: String, pack_key: String },
    RetrieveProfile { recipient_id: RecipientId },
    /// Fetch current group state for a V2 group
    RequestGroupV2Info { recipient_id: RecipientId },
    AvatarGroupsV2Download { recipient_id: RecipientId, avatar_url_path: String },
    /// Download attachments referenced by a restored archive
    RestoreMedia,
    /// Export and upload a fresh remote backup
    BackupMessages,
    UploadAttachments,
}

impl Job {
    /// Jobs that read or sign with the backup key
    pub fn uses_backup_key(&self) -> bool {
        matches!(self, Job::BackupMessages | Job::UploadAttachments)
    }
}

pub trait JobScheduler: Send + Sync {
    fn enqueue(&self, job: Job);
}

/// Stops in-flight jobs
pub trait JobControl: Send + Sync {
    /// Cancel queued and running upload and export jobs; returns how many
    fn halt_upload_and_export_jobs(&self) -> usize;
}

/// A queue that only records jobs; the CLI prints it, tests inspect it
#[derive(Debug, Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<Vec<Job>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs enqueued so far, oldest first
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().map(|jobs| jobs.clone()).unwrap_or_default()
    }

    /// Remove and return every queued job
    pub fn drain(&self) -> Vec<Job> {
        self.jobs
            .lock()
            .map(|mut jobs| std::mem::take(&mut *jobs))
            .unwrap_or_default()
    }
}

impl JobScheduler for InMemoryJobQueue {
    fn enqueue(&self, job: Job) {
        debug!(?job, "Enqueued job");
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.push(job);
        }
    }
}

impl JobControl for InMemoryJobQueue {
    fn halt_upload_and_export_jobs(&self) -> usize {
        match self.jobs.lock() {
            Ok(mut jobs) => {
                let before = jobs.len();
                jobs.retain(|job| !job.uses_backup_key());
                before - jobs.len()
            }
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halt_removes_only_backup_jobs() {
        let queue = InMemoryJobQueue::new();
        queue.enqueue(Job::BackupMessages);
        queue.enqueue(Job::RestoreMedia);
        queue.enqueue(Job::UploadAttachments);

        assert_eq!(queue.halt_upload_and_export_jobs(), 2);
        assert_eq!(queue.jobs(), vec![Job::RestoreMedia]);
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.jobs().is_empty());
    }
}
