//! Notification profile access

use rusqlite::{params, Connection, OptionalExtension};

use super::uuid_column;
use crate::error::ArchiveResult;
use crate::models::{NotificationProfileId, NotificationProfileRecord, RecipientId};

/// Whether a profile with this name exists; names are unique
pub fn name_exists(conn: &Connection, name: &str) -> ArchiveResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT _id FROM notification_profile WHERE name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Insert a profile and its allowed members
pub fn insert(
    conn: &Connection,
    record: &NotificationProfileRecord,
) -> ArchiveResult<NotificationProfileId> {
    conn.execute(
        "INSERT INTO notification_profile (profile_uuid, name, emoji, color, created_at,
             allow_all_calls, allow_all_mentions, schedule_enabled, schedule_start, schedule_end)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            record.profile_uuid.to_string(),
            record.name,
            record.emoji,
            record.color,
            record.created_at_ms,
            record.allow_all_calls,
            record.allow_all_mentions,
            record.schedule_enabled,
            record.schedule_start,
            record.schedule_end,
        ],
    )?;
    let id = NotificationProfileId::from_raw(conn.last_insert_rowid());

    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO notification_profile_allowed_member
             (notification_profile_id, recipient_id) VALUES (?1, ?2)",
    )?;
    for member in &record.allowed_members {
        stmt.execute(params![id, member])?;
    }
    Ok(id)
}

pub fn list(conn: &Connection) -> ArchiveResult<Vec<NotificationProfileRecord>> {
    let mut stmt = conn.prepare(
        "SELECT _id, profile_uuid, name, emoji, color, created_at, allow_all_calls,
             allow_all_mentions, schedule_enabled, schedule_start, schedule_end
         FROM notification_profile ORDER BY _id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(NotificationProfileRecord {
            id: row.get(0)?,
            profile_uuid: uuid_column(row, 1)?.unwrap_or_default(),
            name: row.get(2)?,
            emoji: row.get(3)?,
            color: row.get(4)?,
            created_at_ms: row.get(5)?,
            allow_all_calls: row.get(6)?,
            allow_all_mentions: row.get(7)?,
            schedule_enabled: row.get(8)?,
            schedule_start: row.get(9)?,
            schedule_end: row.get(10)?,
            allowed_members: Vec::new(),
        })
    })?;
    let mut profiles = rows.collect::<Result<Vec<_>, _>>()?;

    let mut members = conn.prepare(
        "SELECT recipient_id FROM notification_profile_allowed_member
         WHERE notification_profile_id = ?1 ORDER BY _id",
    )?;
    for profile in &mut profiles {
        let ids = members.query_map([profile.id], |row| row.get::<_, RecipientId>(0))?;
        profile.allowed_members = ids.collect::<Result<Vec<_>, _>>()?;
    }
    Ok(profiles)
}
