//! Call log access

use rusqlite::{params, Connection};

use crate::error::{ArchiveError, ArchiveResult};
use crate::models::{CallEvent, CallRecord};

pub fn insert(conn: &Connection, record: &CallRecord) -> ArchiveResult<()> {
    let call_id = i64::try_from(record.call_id)
        .map_err(|_| ArchiveError::Validation(format!("Call id {} out of range", record.call_id)))?;
    conn.execute(
        "INSERT INTO call (call_id, peer, event, timestamp) VALUES (?1, ?2, ?3, ?4)",
        params![
            call_id,
            record.peer,
            record.event.as_i64(),
            record.timestamp
        ],
    )?;
    Ok(())
}

pub fn list(conn: &Connection) -> ArchiveResult<Vec<CallRecord>> {
    let mut stmt =
        conn.prepare("SELECT call_id, peer, event, timestamp FROM call ORDER BY timestamp, _id")?;
    let rows = stmt.query_map([], |row| {
        let call_id: i64 = row.get(0)?;
        let event: i64 = row.get(2)?;
        Ok(CallRecord {
            call_id: call_id.max(0) as u64,
            peer: row.get(1)?,
            event: CallEvent::from_i64(event),
            timestamp: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
