use rusqlite::{params, OptionalExtension};

use crate::clock::{millis_to_datetime, to_millis};
use crate::error::{OpContext, Result};
use crate::models::Message;
use crate::rows;
use crate::store::{expiry_millis, PersistentStore};

const MESSAGE_COLUMNS: &str =
    "id, session_id, role, content, status, streaming_content, token_count, created_at, expires_at";

impl PersistentStore {
    /// Insert or replace a message, stamping `expires_at`.  Returns the record
    /// as stored.
    pub async fn save_message(&self, message: &Message) -> Result<Message> {
        let expires_ms = expiry_millis(self.now(), self.config().message_ttl);

        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO messages (id, session_id, role, content, status, streaming_content, token_count, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                     session_id = excluded.session_id,
                     role = excluded.role,
                     content = excluded.content,
                     status = excluded.status,
                     streaming_content = excluded.streaming_content,
                     token_count = excluded.token_count,
                     created_at = excluded.created_at,
                     expires_at = excluded.expires_at",
                params![
                    message.id,
                    message.session_id,
                    message.role.as_str(),
                    message.content,
                    message.status.as_str(),
                    message.streaming_content,
                    message.token_count.map(|n| n as i64),
                    message.created_at.timestamp_millis(),
                    expires_ms,
                ],
            )?;
            Ok(())
        })
        .await
        .op("save_message", &message.id)?;

        let mut stored = message.clone();
        stored.created_at = to_millis(stored.created_at);
        stored.expires_at = millis_to_datetime(expires_ms);
        Ok(stored)
    }

    pub async fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let now_ms = self.now().timestamp_millis();

        self.with_tx(|tx| {
            let message = tx
                .query_row(
                    &format!(
                        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND expires_at >= ?2"
                    ),
                    params![id, now_ms],
                    row_to_message,
                )
                .optional()?;
            Ok(message)
        })
        .await
        .op("get_message", id)
    }

    /// Live messages of a session, oldest first.
    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let now_ms = self.now().timestamp_millis();

        self.with_tx(|tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages
                 WHERE session_id = ?1 AND expires_at >= ?2
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt.query_map(params![session_id, now_ms], row_to_message)?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .op("list_messages", session_id)
    }

    pub async fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_tx(|tx| {
            let affected = tx.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
            Ok(affected > 0)
        })
        .await
        .op("delete_message", id)
    }

    /// Delete every message of a session.  Returns how many were removed.
    pub async fn delete_messages_by_session(&self, session_id: &str) -> Result<usize> {
        self.with_tx(|tx| {
            Ok(tx.execute(
                "DELETE FROM messages WHERE session_id = ?1",
                params![session_id],
            )?)
        })
        .await
        .op("delete_messages_by_session", session_id)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let token_count: Option<i64> = row.get(6)?;

    Ok(Message {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: rows::parsed(row, 2)?,
        content: row.get(3)?,
        status: rows::parsed(row, 4)?,
        streaming_content: row.get(5)?,
        token_count: token_count.map(|n| n.max(0) as u64),
        created_at: rows::timestamp(row, 7)?,
        expires_at: Some(rows::timestamp(row, 8)?),
    })
}
