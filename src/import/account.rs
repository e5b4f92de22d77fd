//! Account frame
//!
//! The profile name lands on the self recipient inside the rewrite. Account
//! settings live in the key-value store, which the rewrite transaction does
//! not cover, so they are held in [`ImportState`] and written after commit.

use std::sync::Arc;

use rusqlite::Connection;

use super::state::ImportState;
use crate::archive::frame::AccountData;
use crate::error::ArchiveResult;
use crate::kv::{AccountValues, KeyValueStore};
use crate::storage::recipients;

pub fn import(conn: &Connection, state: &mut ImportState, account: AccountData) -> ArchiveResult<()> {
    recipients::set_profile_name(
        conn,
        state.self_recipient_id,
        &account.given_name,
        &account.family_name,
    )?;
    state.account = Some(account);
    Ok(())
}

/// Write an imported account frame into the key-value store
pub fn apply(kv: &Arc<KeyValueStore>, account: &AccountData) -> ArchiveResult<()> {
    let values = AccountValues::new(kv.clone());
    if !account.profile_key.is_empty() {
        values.set_profile_key(&account.profile_key)?;
    }
    values.set_profile_name(&account.given_name, &account.family_name)?;
    values.set_username(account.username.as_deref())?;
    values.set_avatar_url_path(&account.avatar_url_path)?;
    values.set_settings(&account.settings)?;
    Ok(())
}
