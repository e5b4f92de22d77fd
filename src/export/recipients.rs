//! Recipient frames

use rusqlite::Connection;
use tracing::debug;

use super::state::ExportState;
use crate::archive::frame::{Contact, Destination, Frame, Group, Recipient};
use crate::error::ArchiveResult;
use crate::models::{RecipientRecord, RecipientType};
use crate::storage::recipients;

fn destination(record: &RecipientRecord) -> Option<Destination> {
    match record.recipient_type {
        RecipientType::SelfRecipient => Some(Destination::SelfRecipient),
        RecipientType::ReleaseNotes => Some(Destination::ReleaseNotes),
        RecipientType::Individual => {
            if record.aci.is_none() && record.pni.is_none() && record.e164.is_none() {
                return None;
            }
            Some(Destination::Contact(Contact {
                aci: record.aci,
                pni: record.pni,
                e164: record.e164.clone(),
                profile_key: record.profile_key.clone(),
                profile_given_name: record.profile_given_name.clone(),
                profile_family_name: record.profile_family_name.clone(),
                blocked: record.blocked,
                profile_sharing: record.profile_sharing,
                hidden: record.hidden,
            }))
        }
        RecipientType::Group => {
            let master_key = record.group_master_key.clone()?;
            Some(Destination::Group(Group {
                master_key,
                title: record.group_title.clone().unwrap_or_default(),
                avatar_url_path: record.avatar_url_path.clone(),
                whitelisted: record.profile_sharing,
                blocked: record.blocked,
            }))
        }
    }
}

/// Emit every exportable recipient, self first
///
/// Contacts with no identifier and groups without a master key cannot be
/// restored and are left out.
pub fn export<F>(conn: &Connection, state: &mut ExportState, emit: &mut F) -> ArchiveResult<u64>
where
    F: FnMut(Frame) -> ArchiveResult<()>,
{
    let mut records = recipients::list(conn)?;
    records.sort_by_key(|r| (r.id != state.self_recipient_id, r.id));

    let mut emitted = 0;
    for record in records {
        let Some(destination) = destination(&record) else {
            debug!(recipient = %record.id, "Skipping unrestorable recipient");
            continue;
        };
        let id = state.add_recipient(record.id);
        emit(Frame::Recipient(Recipient { id, destination }))?;
        emitted += 1;
    }
    Ok(emitted)
}
