//! Sticker pack frames
//!
//! Only ids and keys travel in the archive. Packs are stored as installed
//! with no title or author; the download jobs enqueued after import fill
//! those in.

use rusqlite::Connection;

use super::state::ImportState;
use crate::archive::frame::StickerPack;
use crate::error::ArchiveResult;
use crate::models::StickerPackRecord;
use crate::storage::stickers;

pub fn import(conn: &Connection, state: &mut ImportState, pack: StickerPack) -> ArchiveResult<()> {
    let inserted = stickers::insert(
        conn,
        &StickerPackRecord {
            pack_id: hex::encode(&pack.pack_id),
            pack_key: hex::encode(&pack.pack_key),
            title: None,
            author: None,
            installed: true,
        },
    )?;
    if !inserted {
        state.skips.sticker_packs += 1;
    }
    Ok(())
}
