//! Ad hoc call frames

use rusqlite::Connection;

use super::state::ExportState;
use crate::archive::frame::{AdHocCall, AdHocCallState, Frame};
use crate::error::ArchiveResult;
use crate::models::CallEvent;
use crate::storage::calls;

pub fn export<F>(conn: &Connection, state: &ExportState, emit: &mut F) -> ArchiveResult<u64>
where
    F: FnMut(Frame) -> ArchiveResult<()>,
{
    let mut emitted = 0;
    for call in calls::list(conn)? {
        let Some(recipient_id) = state.backup_recipient_id(call.peer) else {
            continue;
        };
        emit(Frame::AdHocCall(AdHocCall {
            call_id: call.call_id,
            recipient_id,
            state: match call.event {
                CallEvent::Generic => AdHocCallState::Generic,
                CallEvent::Joined => AdHocCallState::Joined,
            },
            call_timestamp: call.timestamp,
        }))?;
        emitted += 1;
    }
    Ok(emitted)
}
