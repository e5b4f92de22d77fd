//! Sticker pack frames

use rusqlite::Connection;
use tracing::warn;

use crate::archive::frame::{Frame, StickerPack};
use crate::error::ArchiveResult;
use crate::storage::stickers;

/// Emit installed packs; only ids and keys are carried
pub fn export<F>(conn: &Connection, emit: &mut F) -> ArchiveResult<u64>
where
    F: FnMut(Frame) -> ArchiveResult<()>,
{
    let mut emitted = 0;
    for pack in stickers::list_installed(conn)? {
        let (Ok(pack_id), Ok(pack_key)) = (hex::decode(&pack.pack_id), hex::decode(&pack.pack_key))
        else {
            warn!(pack_id = %pack.pack_id, "Skipping sticker pack with malformed id or key");
            continue;
        };
        emit(Frame::StickerPack(StickerPack { pack_id, pack_key }))?;
        emitted += 1;
    }
    Ok(emitted)
}
