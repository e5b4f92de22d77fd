//! Sticker pack access

use rusqlite::{params, Connection};

use crate::error::ArchiveResult;
use crate::models::StickerPackRecord;

/// Insert a pack, ignoring a pack id that is already present
pub fn insert(conn: &Connection, record: &StickerPackRecord) -> ArchiveResult<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO sticker_pack (pack_id, pack_key, title, author, installed)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.pack_id,
            record.pack_key,
            record.title,
            record.author,
            record.installed
        ],
    )?;
    Ok(inserted > 0)
}

pub fn list_installed(conn: &Connection) -> ArchiveResult<Vec<StickerPackRecord>> {
    let mut stmt = conn.prepare(
        "SELECT pack_id, pack_key, title, author, installed FROM sticker_pack
         WHERE installed = 1 ORDER BY _id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(StickerPackRecord {
            pack_id: row.get(0)?,
            pack_key: row.get(1)?,
            title: row.get(2)?,
            author: row.get(3)?,
            installed: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
