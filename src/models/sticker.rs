//! Sticker pack rows

/// A row of the `sticker_pack` table
#[derive(Debug, Clone, PartialEq)]
pub struct StickerPackRecord {
    /// Hex-encoded pack id
    pub pack_id: String,
    /// Hex-encoded pack key
    pub pack_key: String,
    /// Unknown until the manifest is downloaded
    pub title: Option<String>,
    pub author: Option<String>,
    pub installed: bool,
}
