//! Jobs enqueued after a committed import

use rusqlite::Connection;
use tracing::info;

use crate::error::ArchiveResult;
use crate::jobs::{Job, JobScheduler};
use crate::storage::{recipients, stickers};

/// Sticker downloads, profile refreshes for recently active contacts, and
/// group state plus avatar refreshes; returns how many jobs were enqueued
pub fn enqueue(
    conn: &Connection,
    jobs: &dyn JobScheduler,
    recent_recipient_limit: usize,
) -> ArchiveResult<usize> {
    let mut enqueued = 0;

    for pack in stickers::list_installed(conn)? {
        jobs.enqueue(Job::StickerPackDownload {
            pack_id: pack.pack_id,
            pack_key: pack.pack_key,
        });
        enqueued += 1;
    }

    for recipient_id in recipients::recently_active_individuals(conn, recent_recipient_limit)? {
        jobs.enqueue(Job::RetrieveProfile { recipient_id });
        enqueued += 1;
    }

    for (recipient_id, avatar_url_path) in recipients::groups_with_master_key(conn)? {
        jobs.enqueue(Job::RequestGroupV2Info { recipient_id });
        enqueued += 1;
        if let Some(avatar_url_path) = avatar_url_path.filter(|p| !p.is_empty()) {
            jobs.enqueue(Job::AvatarGroupsV2Download {
                recipient_id,
                avatar_url_path,
            });
            enqueued += 1;
        }
    }

    info!(enqueued, "Enqueued post-import jobs");
    Ok(enqueued)
}
