//! Notification profile frames

use rusqlite::Connection;

use super::state::ExportState;
use crate::archive::frame::{Frame, NotificationProfile};
use crate::error::ArchiveResult;
use crate::storage::notification_profiles;

/// Emit every profile; allowed members that were not emitted are dropped
pub fn export<F>(conn: &Connection, state: &ExportState, emit: &mut F) -> ArchiveResult<u64>
where
    F: FnMut(Frame) -> ArchiveResult<()>,
{
    let mut emitted = 0;
    for profile in notification_profiles::list(conn)? {
        let allowed_members = profile
            .allowed_members
            .iter()
            .filter_map(|member| state.backup_recipient_id(*member))
            .collect();
        emit(Frame::NotificationProfile(NotificationProfile {
            id: profile.profile_uuid.as_bytes().to_vec(),
            name: profile.name,
            emoji: profile.emoji,
            color: profile.color,
            created_at_ms: profile.created_at_ms,
            allow_all_calls: profile.allow_all_calls,
            allow_all_mentions: profile.allow_all_mentions,
            allowed_members,
            schedule_enabled: profile.schedule_enabled,
            schedule_start_time: profile.schedule_start,
            schedule_end_time: profile.schedule_end,
        }))?;
        emitted += 1;
    }
    Ok(emitted)
}
