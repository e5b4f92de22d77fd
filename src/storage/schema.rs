//! Relational schema of the local store
//!
//! A single current schema; there is no migration history. Import recreates
//! tables from the definitions recorded in `sqlite_master`, so the DDL here
//! only runs when a store is first created.

use rusqlite::Connection;

use crate::error::ArchiveResult;

/// Tables that hold device key material and survive an import untouched
pub const KEY_MATERIAL_TABLES: &[&str] = &["kyber_prekey", "one_time_prekey", "signed_prekey"];

const TABLES: &str = "
CREATE TABLE IF NOT EXISTS recipient (
    _id INTEGER PRIMARY KEY,
    type INTEGER NOT NULL,
    aci TEXT UNIQUE,
    pni TEXT,
    e164 TEXT,
    profile_key BLOB,
    profile_given_name TEXT,
    profile_family_name TEXT,
    group_id BLOB UNIQUE,
    group_master_key BLOB,
    group_title TEXT,
    avatar_url_path TEXT,
    blocked INTEGER NOT NULL DEFAULT 0,
    profile_sharing INTEGER NOT NULL DEFAULT 0,
    hidden INTEGER NOT NULL DEFAULT 0,
    last_profile_fetch INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS thread (
    _id INTEGER PRIMARY KEY,
    recipient_id INTEGER NOT NULL UNIQUE REFERENCES recipient (_id) ON DELETE CASCADE,
    archived INTEGER NOT NULL DEFAULT 0,
    pinned_order INTEGER,
    expires_in INTEGER NOT NULL DEFAULT 0,
    muted_until INTEGER NOT NULL DEFAULT 0,
    marked_unread INTEGER NOT NULL DEFAULT 0,
    date INTEGER NOT NULL DEFAULT 0,
    snippet TEXT,
    message_count INTEGER NOT NULL DEFAULT 0,
    active INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS message (
    _id INTEGER PRIMARY KEY,
    thread_id INTEGER NOT NULL REFERENCES thread (_id) ON DELETE CASCADE,
    from_recipient_id INTEGER NOT NULL REFERENCES recipient (_id) ON DELETE CASCADE,
    date_sent INTEGER NOT NULL,
    date_received INTEGER NOT NULL DEFAULT 0,
    outgoing INTEGER NOT NULL DEFAULT 0,
    read INTEGER NOT NULL DEFAULT 0,
    delivered INTEGER NOT NULL DEFAULT 0,
    expires_in INTEGER NOT NULL DEFAULT 0,
    body TEXT
);

CREATE TABLE IF NOT EXISTS attachment (
    _id INTEGER PRIMARY KEY,
    message_id INTEGER NOT NULL REFERENCES message (_id) ON DELETE CASCADE,
    content_type TEXT,
    file_name TEXT,
    size INTEGER NOT NULL DEFAULT 0,
    plaintext_hash BLOB,
    remote_key BLOB,
    transfer_state INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS call (
    _id INTEGER PRIMARY KEY,
    call_id INTEGER NOT NULL UNIQUE,
    peer INTEGER NOT NULL REFERENCES recipient (_id) ON DELETE CASCADE,
    event INTEGER NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sticker_pack (
    _id INTEGER PRIMARY KEY,
    pack_id TEXT NOT NULL UNIQUE,
    pack_key TEXT NOT NULL,
    title TEXT,
    author TEXT,
    installed INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS notification_profile (
    _id INTEGER PRIMARY KEY,
    profile_uuid TEXT NOT NULL,
    name TEXT NOT NULL UNIQUE,
    emoji TEXT,
    color INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL DEFAULT 0,
    allow_all_calls INTEGER NOT NULL DEFAULT 0,
    allow_all_mentions INTEGER NOT NULL DEFAULT 0,
    schedule_enabled INTEGER NOT NULL DEFAULT 0,
    schedule_start INTEGER NOT NULL DEFAULT 0,
    schedule_end INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS notification_profile_allowed_member (
    _id INTEGER PRIMARY KEY,
    notification_profile_id INTEGER NOT NULL REFERENCES notification_profile (_id) ON DELETE CASCADE,
    recipient_id INTEGER NOT NULL REFERENCES recipient (_id) ON DELETE CASCADE,
    UNIQUE (notification_profile_id, recipient_id)
);

CREATE TABLE IF NOT EXISTS chat_folder (
    _id INTEGER PRIMARY KEY,
    folder_uuid TEXT NOT NULL,
    name TEXT NOT NULL,
    position INTEGER NOT NULL,
    folder_type INTEGER NOT NULL,
    show_unread INTEGER NOT NULL DEFAULT 0,
    show_muted INTEGER NOT NULL DEFAULT 1,
    show_individual INTEGER NOT NULL DEFAULT 0,
    show_groups INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS chat_folder_membership (
    _id INTEGER PRIMARY KEY,
    chat_folder_id INTEGER NOT NULL REFERENCES chat_folder (_id) ON DELETE CASCADE,
    thread_id INTEGER NOT NULL REFERENCES thread (_id) ON DELETE CASCADE,
    membership_type INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS message_search (
    message_id INTEGER PRIMARY KEY,
    thread_id INTEGER NOT NULL,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS kyber_prekey (
    _id INTEGER PRIMARY KEY,
    key_id INTEGER NOT NULL UNIQUE,
    serialized BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS one_time_prekey (
    _id INTEGER PRIMARY KEY,
    key_id INTEGER NOT NULL UNIQUE,
    public_key BLOB NOT NULL,
    private_key BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS signed_prekey (
    _id INTEGER PRIMARY KEY,
    key_id INTEGER NOT NULL UNIQUE,
    public_key BLOB NOT NULL,
    private_key BLOB NOT NULL,
    timestamp INTEGER NOT NULL
);
";

const INDEXES: &str = "
CREATE INDEX IF NOT EXISTS message_thread_date_index ON message (thread_id, date_received);
CREATE INDEX IF NOT EXISTS message_date_sent_index ON message (date_sent, from_recipient_id, thread_id);
CREATE INDEX IF NOT EXISTS attachment_message_index ON attachment (message_id);
CREATE INDEX IF NOT EXISTS recipient_e164_index ON recipient (e164);
CREATE INDEX IF NOT EXISTS call_peer_index ON call (peer);
CREATE INDEX IF NOT EXISTS chat_folder_membership_thread_index ON chat_folder_membership (thread_id);
";

// The search table is kept in sync by triggers; import drops them and
// rebuilds the table in one statement instead.
const TRIGGERS: &str = "
CREATE TRIGGER IF NOT EXISTS message_search_insert AFTER INSERT ON message
WHEN new.body IS NOT NULL
BEGIN
    INSERT INTO message_search (message_id, thread_id, body) VALUES (new._id, new.thread_id, lower(new.body));
END;

CREATE TRIGGER IF NOT EXISTS message_search_delete AFTER DELETE ON message
BEGIN
    DELETE FROM message_search WHERE message_id = old._id;
END;

CREATE TRIGGER IF NOT EXISTS message_search_update AFTER UPDATE OF body ON message
BEGIN
    DELETE FROM message_search WHERE message_id = old._id;
    INSERT INTO message_search (message_id, thread_id, body)
    SELECT new._id, new.thread_id, lower(new.body) WHERE new.body IS NOT NULL;
END;
";

/// Create every table, index and trigger that does not exist yet
pub fn create_schema(conn: &Connection) -> ArchiveResult<()> {
    conn.execute_batch(TABLES)?;
    conn.execute_batch(INDEXES)?;
    conn.execute_batch(TRIGGERS)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        create_schema(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 14);
    }

    #[test]
    fn test_search_triggers_track_bodies() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO recipient (_id, type) VALUES (1, 0);
             INSERT INTO thread (_id, recipient_id) VALUES (1, 1);
             INSERT INTO message (_id, thread_id, from_recipient_id, date_sent, body) VALUES (1, 1, 1, 10, 'Hello World');
             INSERT INTO message (_id, thread_id, from_recipient_id, date_sent) VALUES (2, 1, 1, 11);",
        )
        .unwrap();

        let body: String = conn
            .query_row("SELECT body FROM message_search WHERE message_id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(body, "hello world");

        conn.execute("DELETE FROM message WHERE _id = 1", []).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM message_search", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
