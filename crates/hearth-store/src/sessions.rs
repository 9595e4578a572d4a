//! CRUD operations for [`Session`] records.

use rusqlite::{params, OptionalExtension};

use crate::clock::{millis_to_datetime, to_millis};
use crate::error::{OpContext, Result};
use crate::models::Session;
use crate::rows;
use crate::store::{expiry_millis, PersistentStore};

const SESSION_COLUMNS: &str =
    "id, name, system_prompt, created_at, updated_at, expires_at, last_accessed";

impl PersistentStore {
    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Insert or replace a session, stamping `expires_at` and `last_accessed`.
    /// Returns the record as stored.
    pub async fn save_session(&self, session: &Session) -> Result<Session> {
        let now = self.now();
        let now_ms = now.timestamp_millis();
        let expires_ms = expiry_millis(now, self.config().session_ttl);

        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO sessions (id, name, system_prompt, created_at, updated_at, expires_at, last_accessed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     system_prompt = excluded.system_prompt,
                     created_at = excluded.created_at,
                     updated_at = excluded.updated_at,
                     expires_at = excluded.expires_at,
                     last_accessed = excluded.last_accessed",
                params![
                    session.id,
                    session.name,
                    session.system_prompt,
                    session.created_at.timestamp_millis(),
                    session.updated_at.timestamp_millis(),
                    expires_ms,
                    now_ms,
                ],
            )?;
            Ok(())
        })
        .await
        .op("save_session", &session.id)?;

        let mut stored = session.clone();
        stored.created_at = to_millis(stored.created_at);
        stored.updated_at = to_millis(stored.updated_at);
        stored.expires_at = millis_to_datetime(expires_ms);
        stored.last_accessed = millis_to_datetime(now_ms);
        Ok(stored)
    }

    /// Bump `updated_at` and renew the TTL of a live session.  Returns `false`
    /// when the session is missing or already expired.
    pub async fn touch_session(&self, id: &str) -> Result<bool> {
        let now = self.now();
        let now_ms = now.timestamp_millis();
        let expires_ms = expiry_millis(now, self.config().session_ttl);

        self.with_tx(|tx| {
            let affected = tx.execute(
                "UPDATE sessions
                 SET updated_at = ?1, last_accessed = ?1, expires_at = ?2
                 WHERE id = ?3 AND expires_at >= ?1",
                params![now_ms, expires_ms, id],
            )?;
            Ok(affected > 0)
        })
        .await
        .op("touch_session", id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a live session and refresh its `last_accessed`.  Expired
    /// sessions read as `None` even while still physically stored.
    pub async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let now = self.now();
        let now_ms = now.timestamp_millis();

        self.with_tx(|tx| {
            let found = tx
                .query_row(
                    &format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1 AND expires_at >= ?2"
                    ),
                    params![id, now_ms],
                    row_to_session,
                )
                .optional()?;

            let Some(mut session) = found else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE sessions SET last_accessed = ?1 WHERE id = ?2",
                params![now_ms, id],
            )?;
            session.last_accessed = millis_to_datetime(now_ms);
            Ok(Some(session))
        })
        .await
        .op("get_session", id)
    }

    /// All live sessions, in no particular order.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let now_ms = self.now().timestamp_millis();

        self.with_tx(|tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE expires_at >= ?1"
            ))?;
            let rows = stmt.query_map(params![now_ms], row_to_session)?;

            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row?);
            }
            Ok(sessions)
        })
        .await
        .op("list_sessions", "*")
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a session and every message that references it, atomically.
    /// Returns `true` if the session row existed.
    pub async fn delete_session(&self, id: &str) -> Result<bool> {
        let deleted = self
            .with_tx(|tx| {
                let messages =
                    tx.execute("DELETE FROM messages WHERE session_id = ?1", params![id])?;
                let sessions = tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
                tracing::debug!(session_id = id, messages, "deleted session");
                Ok(sessions > 0)
            })
            .await
            .op("delete_session", id)?;
        Ok(deleted)
    }

    /// Truncate both the session and message collections.
    pub async fn clear_sessions(&self) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute("DELETE FROM messages", [])?;
            tx.execute("DELETE FROM sessions", [])?;
            Ok(())
        })
        .await
        .op("clear_sessions", "*")
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        name: row.get(1)?,
        system_prompt: row.get(2)?,
        created_at: rows::timestamp(row, 3)?,
        updated_at: rows::timestamp(row, 4)?,
        expires_at: Some(rows::timestamp(row, 5)?),
        last_accessed: Some(rows::timestamp(row, 6)?),
    })
}
