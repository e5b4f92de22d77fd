//! Notification profile frames

use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use super::state::ImportState;
use crate::archive::frame::NotificationProfile;
use crate::error::ArchiveResult;
use crate::models::{NotificationProfileId, NotificationProfileRecord};
use crate::storage::notification_profiles;

/// Insert a profile; one whose name is taken is skipped
pub fn import(
    conn: &Connection,
    state: &mut ImportState,
    profile: NotificationProfile,
) -> ArchiveResult<()> {
    if notification_profiles::name_exists(conn, &profile.name)? {
        debug!(name = %profile.name, "Skipping notification profile with duplicate name");
        state.skips.notification_profiles += 1;
        return Ok(());
    }

    let allowed_members = profile
        .allowed_members
        .iter()
        .map(|member| state.require_local_recipient_id(*member))
        .collect::<Result<Vec<_>, _>>()?;

    notification_profiles::insert(
        conn,
        &NotificationProfileRecord {
            id: NotificationProfileId::from_raw(0),
            profile_uuid: Uuid::from_slice(&profile.id).unwrap_or_else(|_| Uuid::new_v4()),
            name: profile.name,
            emoji: profile.emoji,
            color: profile.color,
            created_at_ms: profile.created_at_ms,
            allow_all_calls: profile.allow_all_calls,
            allow_all_mentions: profile.allow_all_mentions,
            schedule_enabled: profile.schedule_enabled,
            schedule_start: profile.schedule_start_time,
            schedule_end: profile.schedule_end_time,
            allowed_members,
        },
    )?;
    Ok(())
}
