//! v001 -- Initial schema creation.
//!
//! Creates the four collections: `sessions`, `messages`, `attachments`, and
//! `cache`.  All timestamps are unix milliseconds.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Sessions
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sessions (
    id            TEXT PRIMARY KEY NOT NULL,
    name          TEXT NOT NULL,
    system_prompt TEXT,
    created_at    INTEGER NOT NULL,
    updated_at    INTEGER NOT NULL,
    expires_at    INTEGER NOT NULL,
    last_accessed INTEGER NOT NULL
);

-- ----------------------------------------------------------------
-- Messages (session_id is a back-reference, deletes cascade in code)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id                TEXT PRIMARY KEY NOT NULL,
    session_id        TEXT NOT NULL,
    role              TEXT NOT NULL,              -- user | assistant | system
    content           TEXT NOT NULL,
    status            TEXT NOT NULL,              -- pending | sending | streaming | complete | error
    streaming_content TEXT NOT NULL DEFAULT '',
    token_count       INTEGER,
    created_at        INTEGER NOT NULL,
    expires_at        INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_session_created ON messages(session_id, created_at);

-- ----------------------------------------------------------------
-- Attachments (no TTL)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS attachments (
    id             TEXT PRIMARY KEY NOT NULL,
    message_id     TEXT NOT NULL,
    filename       TEXT NOT NULL,
    file_type      TEXT NOT NULL,
    file_size      INTEGER NOT NULL,
    content_hash   TEXT,
    storage_path   TEXT,
    extracted_text TEXT,
    created_at     INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_attachments_message_id ON attachments(message_id);

-- ----------------------------------------------------------------
-- Cache region (TTL + LRU)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS cache (
    key           TEXT PRIMARY KEY NOT NULL,
    value         TEXT NOT NULL,                  -- JSON
    size_bytes    INTEGER NOT NULL,
    expires_at    INTEGER NOT NULL,
    last_accessed INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_expires_at ON cache(expires_at);
CREATE INDEX IF NOT EXISTS idx_cache_last_accessed ON cache(last_accessed);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
