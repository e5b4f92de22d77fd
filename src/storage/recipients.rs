//! Recipient table access

use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{uuid_column, uuid_param};
use crate::error::ArchiveResult;
use crate::models::{RecipientId, RecipientRecord, RecipientType};

const COLUMNS: &str = "_id, type, aci, pni, e164, profile_key, profile_given_name, \
     profile_family_name, group_id, group_master_key, group_title, avatar_url_path, \
     blocked, profile_sharing, hidden, last_profile_fetch";

fn from_row(row: &Row<'_>) -> rusqlite::Result<RecipientRecord> {
    let raw_type: i64 = row.get(1)?;
    Ok(RecipientRecord {
        id: row.get(0)?,
        recipient_type: RecipientType::from_i64(raw_type).unwrap_or(RecipientType::Individual),
        aci: uuid_column(row, 2)?,
        pni: uuid_column(row, 3)?,
        e164: row.get(4)?,
        profile_key: row.get(5)?,
        profile_given_name: row.get(6)?,
        profile_family_name: row.get(7)?,
        group_id: row.get(8)?,
        group_master_key: row.get(9)?,
        group_title: row.get(10)?,
        avatar_url_path: row.get(11)?,
        blocked: row.get(12)?,
        profile_sharing: row.get(13)?,
        hidden: row.get(14)?,
        last_profile_fetch: row.get(15)?,
    })
}

/// Group id derived from a group master key
pub fn group_id_for_master_key(master_key: &[u8]) -> Vec<u8> {
    Sha256::digest(master_key).to_vec()
}

/// Insert a recipient and return its new row id; `record.id` is ignored
pub fn insert(conn: &Connection, record: &RecipientRecord) -> ArchiveResult<RecipientId> {
    conn.execute(
        "INSERT INTO recipient (type, aci, pni, e164, profile_key, profile_given_name,
             profile_family_name, group_id, group_master_key, group_title, avatar_url_path,
             blocked, profile_sharing, hidden, last_profile_fetch)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            record.recipient_type.as_i64(),
            uuid_param(record.aci),
            uuid_param(record.pni),
            record.e164,
            record.profile_key,
            record.profile_given_name,
            record.profile_family_name,
            record.group_id,
            record.group_master_key,
            record.group_title,
            record.avatar_url_path,
            record.blocked,
            record.profile_sharing,
            record.hidden,
            record.last_profile_fetch,
        ],
    )?;
    Ok(RecipientId::from_raw(conn.last_insert_rowid()))
}

pub fn get(conn: &Connection, id: RecipientId) -> ArchiveResult<Option<RecipientRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {} FROM recipient WHERE _id = ?1", COLUMNS),
            [id],
            from_row,
        )
        .optional()?;
    Ok(record)
}

/// All recipients in row order
pub fn list(conn: &Connection) -> ArchiveResult<Vec<RecipientRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM recipient ORDER BY _id", COLUMNS))?;
    let rows = stmt.query_map([], from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn find_by_aci(conn: &Connection, aci: &Uuid) -> ArchiveResult<Option<RecipientId>> {
    let id = conn
        .query_row(
            "SELECT _id FROM recipient WHERE aci = ?1",
            [aci.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// The account owner's recipient row, if the store has one
pub fn find_self(conn: &Connection) -> ArchiveResult<Option<RecipientRecord>> {
    let record = conn
        .query_row(
            &format!(
                "SELECT {} FROM recipient WHERE type = ?1 ORDER BY _id LIMIT 1",
                COLUMNS
            ),
            [RecipientType::SelfRecipient.as_i64()],
            from_row,
        )
        .optional()?;
    Ok(record)
}

pub fn set_profile_name(
    conn: &Connection,
    id: RecipientId,
    given_name: &str,
    family_name: &str,
) -> ArchiveResult<()> {
    conn.execute(
        "UPDATE recipient SET profile_given_name = ?1, profile_family_name = ?2 WHERE _id = ?3",
        params![
            Some(given_name).filter(|s| !s.is_empty()),
            Some(family_name).filter(|s| !s.is_empty()),
            id
        ],
    )?;
    Ok(())
}

/// Individual recipients with an active thread, most recent first
pub fn recently_active_individuals(
    conn: &Connection,
    limit: usize,
) -> ArchiveResult<Vec<RecipientId>> {
    let mut stmt = conn.prepare(
        "SELECT recipient._id FROM recipient
         INNER JOIN thread ON thread.recipient_id = recipient._id
         WHERE recipient.type = ?1 AND thread.active = 1
         ORDER BY thread.date DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(
        params![RecipientType::Individual.as_i64(), limit as i64],
        |row| row.get(0),
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Groups that carry a master key, with their avatar paths
pub fn groups_with_master_key(
    conn: &Connection,
) -> ArchiveResult<Vec<(RecipientId, Option<String>)>> {
    let mut stmt = conn.prepare(
        "SELECT _id, avatar_url_path FROM recipient
         WHERE type = ?1 AND group_master_key IS NOT NULL
         ORDER BY _id",
    )?;
    let rows = stmt.query_map([RecipientType::Group.as_i64()], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
