//! Recipient frames

use rusqlite::Connection;
use tracing::debug;

use super::state::ImportState;
use crate::archive::frame::{Contact, Destination, Group, Recipient};
use crate::error::ArchiveResult;
use crate::models::{RecipientRecord, RecipientType};
use crate::storage::recipients;

fn contact_record(contact: Contact) -> RecipientRecord {
    RecipientRecord {
        aci: contact.aci,
        pni: contact.pni,
        e164: contact.e164,
        profile_key: contact.profile_key,
        profile_given_name: contact.profile_given_name,
        profile_family_name: contact.profile_family_name,
        blocked: contact.blocked,
        profile_sharing: contact.profile_sharing,
        hidden: contact.hidden,
        ..RecipientRecord::new(RecipientType::Individual)
    }
}

fn group_record(group: Group) -> RecipientRecord {
    RecipientRecord {
        group_id: Some(recipients::group_id_for_master_key(&group.master_key)),
        group_master_key: Some(group.master_key),
        group_title: Some(group.title).filter(|t| !t.is_empty()),
        avatar_url_path: group.avatar_url_path,
        profile_sharing: group.whitelisted,
        blocked: group.blocked,
        ..RecipientRecord::new(RecipientType::Group)
    }
}

/// Insert a recipient and map its in-stream id
///
/// The self frame maps onto the self row created from the identity. A
/// contact whose account id is already present maps onto that row.
pub fn import(conn: &Connection, state: &mut ImportState, recipient: Recipient) -> ArchiveResult<()> {
    let record = match recipient.destination {
        Destination::SelfRecipient => {
            state.map_recipient(recipient.id, state.self_recipient_id);
            return Ok(());
        }
        Destination::Contact(contact) => {
            if contact.aci.is_none() && contact.pni.is_none() && contact.e164.is_none() {
                debug!(remote_id = recipient.id, "Skipping contact without identifiers");
                state.skips.recipients += 1;
                return Ok(());
            }
            if let Some(aci) = contact.aci {
                if let Some(existing) = recipients::find_by_aci(conn, &aci)? {
                    state.map_recipient(recipient.id, existing);
                    state.skips.recipients += 1;
                    return Ok(());
                }
            }
            contact_record(contact)
        }
        Destination::Group(group) => group_record(group),
        Destination::ReleaseNotes => RecipientRecord::new(RecipientType::ReleaseNotes),
    };

    let local = recipients::insert(conn, &record)?;
    state.map_recipient(recipient.id, local);
    Ok(())
}
