//! CRUD operations for [`Attachment`] records.  Attachments have no TTL.

use rusqlite::{params, OptionalExtension};

use crate::clock::to_millis;
use crate::error::{OpContext, Result};
use crate::models::Attachment;
use crate::rows;
use crate::store::PersistentStore;

const ATTACHMENT_COLUMNS: &str = "id, message_id, filename, file_type, file_size, content_hash, storage_path, extracted_text, created_at";

impl PersistentStore {
    /// Insert or replace an attachment record.  Returns the record as stored.
    pub async fn save_attachment(&self, attachment: &Attachment) -> Result<Attachment> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT OR REPLACE INTO attachments (id, message_id, filename, file_type, file_size, content_hash, storage_path, extracted_text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    attachment.id,
                    attachment.message_id,
                    attachment.filename,
                    attachment.file_type,
                    attachment.file_size,
                    attachment.content_hash,
                    attachment.storage_path,
                    attachment.extracted_text,
                    attachment.created_at.timestamp_millis(),
                ],
            )?;
            Ok(())
        })
        .await
        .op("save_attachment", &attachment.id)?;

        let mut stored = attachment.clone();
        stored.created_at = to_millis(stored.created_at);
        Ok(stored)
    }

    pub async fn get_attachment(&self, id: &str) -> Result<Option<Attachment>> {
        self.with_tx(|tx| {
            Ok(tx
                .query_row(
                    &format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = ?1"),
                    params![id],
                    row_to_attachment,
                )
                .optional()?)
        })
        .await
        .op("get_attachment", id)
    }

    /// Attachments of one message, oldest first.
    pub async fn list_attachments_by_message(&self, message_id: &str) -> Result<Vec<Attachment>> {
        self.with_tx(|tx| {
            let mut stmt = tx.prepare(&format!(
                "SELECT {ATTACHMENT_COLUMNS}
                 FROM attachments
                 WHERE message_id = ?1
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map(params![message_id], row_to_attachment)?;

            let mut attachments = Vec::new();
            for row in rows {
                attachments.push(row?);
            }
            Ok(attachments)
        })
        .await
        .op("list_attachments_by_message", message_id)
    }

    // only removes the record, not the file at storage_path
    pub async fn delete_attachment(&self, id: &str) -> Result<bool> {
        self.with_tx(|tx| {
            let affected = tx.execute("DELETE FROM attachments WHERE id = ?1", params![id])?;
            Ok(affected > 0)
        })
        .await
        .op("delete_attachment", id)
    }
}

fn row_to_attachment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get(0)?,
        message_id: row.get(1)?,
        filename: row.get(2)?,
        file_type: row.get(3)?,
        file_size: row.get(4)?,
        content_hash: row.get(5)?,
        storage_path: row.get(6)?,
        extracted_text: row.get(7)?,
        created_at: rows::timestamp(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};

    use crate::clock::Clock;
    use crate::store::test_support::store;

    use super::*;

    fn attachment(id: &str, message_id: &str, created_at: DateTime<Utc>) -> Attachment {
        Attachment {
            id: id.into(),
            message_id: message_id.into(),
            filename: format!("{id}.txt"),
            file_type: "text/plain".into(),
            file_size: 42,
            content_hash: Some("abc123".into()),
            storage_path: None,
            extracted_text: Some("hello".into()),
            created_at,
        }
    }

    #[tokio::test]
    async fn crud() {
        let (store, clock) = store();
        let now = clock.now();
        let a1 = attachment("a1", "m1", now);
        store.save_attachment(&a1).await.unwrap();
        store
            .save_attachment(&attachment("a2", "m1", now + chrono::Duration::seconds(5)))
            .await
            .unwrap();
        store.save_attachment(&attachment("a3", "m2", now)).await.unwrap();

        assert_eq!(store.get_attachment("a1").await.unwrap(), Some(a1));
        let ids: Vec<String> = store
            .list_attachments_by_message("m1")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["a1", "a2"]);

        assert!(store.delete_attachment("a1").await.unwrap());
        assert!(store.get_attachment("a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sub_millisecond_created_at_reads_back_as_stored() {
        let (store, _clock) = store();
        let created = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);

        let stored = store
            .save_attachment(&attachment("a1", "m1", created))
            .await
            .unwrap();
        assert_eq!(stored.created_at.timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(store.get_attachment("a1").await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn attachments_do_not_expire() {
        let (store, clock) = store();
        store
            .save_attachment(&attachment("a1", "m1", clock.now()))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));
        store.purge_expired().await.unwrap();
        assert!(store.get_attachment("a1").await.unwrap().is_some());
    }
}
