//! Ad hoc call frames

use rusqlite::Connection;

use super::state::ImportState;
use crate::archive::frame::{AdHocCall, AdHocCallState};
use crate::error::{ArchiveError, ArchiveResult};
use crate::models::{CallEvent, CallRecord};
use crate::storage::calls;

pub fn import(conn: &Connection, state: &mut ImportState, call: AdHocCall) -> ArchiveResult<()> {
    let call_id = i64::try_from(call.call_id)
        .map_err(|_| ArchiveError::Format(format!("Call id {} out of range", call.call_id)))?;
    let peer = state.require_local_recipient_id(call.recipient_id)?;
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM call WHERE call_id = ?1)",
        [call_id],
        |row| row.get(0),
    )?;
    if exists {
        state.skips.calls += 1;
        return Ok(());
    }
    calls::insert(
        conn,
        &CallRecord {
            call_id: call.call_id,
            peer,
            event: match call.state {
                AdHocCallState::Generic => CallEvent::Generic,
                AdHocCallState::Joined => CallEvent::Joined,
            },
            timestamp: call.call_timestamp,
        },
    )
}
