//! Account frame from the key-value snapshot

use rusqlite::Connection;

use crate::archive::frame::{AccountData, AccountSettings, Frame};
use crate::error::ArchiveResult;
use crate::kv::read_value;
use crate::kv::values::{decode_base64, keys};

/// Build the account frame; absent values export as empty
pub fn export(kv: &Connection) -> ArchiveResult<Frame> {
    let profile_key = match read_value::<String>(kv, keys::PROFILE_KEY)? {
        Some(encoded) => decode_base64(&encoded, "profile key")?,
        None => Vec::new(),
    };

    Ok(Frame::Account(AccountData {
        profile_key,
        username: read_value(kv, keys::USERNAME)?,
        given_name: read_value(kv, keys::GIVEN_NAME)?.unwrap_or_default(),
        family_name: read_value(kv, keys::FAMILY_NAME)?.unwrap_or_default(),
        avatar_url_path: read_value(kv, keys::AVATAR_URL_PATH)?.unwrap_or_default(),
        settings: read_value::<AccountSettings>(kv, keys::SETTINGS)?.unwrap_or_default(),
    }))
}
