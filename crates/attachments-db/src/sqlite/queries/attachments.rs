use chrono::Utc;
use rusqlite::{params, Connection, Row};

use attachments_core::attachment::{Attachment, NewAttachment, UpdateAttachment};
use attachments_core::TargetRef;

use super::super::{SqliteDatabase, SqliteResultExt};
use crate::DbError;

fn row_to_attachment(row: &Row) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get("id")?,
        target: TargetRef {
            kind: row.get("target_type")?,
            id: row.get("target_id")?,
        },
        creator: row.get("creator")?,
        file_key: row.get("file_key")?,
        size_bytes: row.get("size_bytes")?,
        tag: row.get("tag")?,
        created_at: row.get("created_at")?,
        modified_at: row.get("modified_at")?,
    })
}

fn fetch_attachment(conn: &Connection, id: &str) -> Result<Attachment, DbError> {
    conn.query_row(
        "SELECT * FROM attachments WHERE id = ?1",
        params![id],
        row_to_attachment,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("attachment {id}")),
        other => DbError::Internal(other.to_string()),
    })
}

impl SqliteDatabase {
    pub fn create_attachment_sync(&self, input: &NewAttachment) -> Result<Attachment, DbError> {
        self.with_conn(|conn| {
            let id = uuid::Uuid::new_v4().to_string();
            let now = Utc::now();
            conn.execute(
                "INSERT INTO attachments
                     (id, target_type, target_id, creator, file_key, size_bytes, tag,
                      created_at, modified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    id,
                    input.target.kind,
                    input.target.id,
                    input.creator,
                    input.file_key,
                    input.size_bytes,
                    input.tag,
                    now,
                ],
            )
            .to_db()?;
            fetch_attachment(conn, &id)
        })
    }

    pub fn get_attachment_sync(&self, id: &str) -> Result<Attachment, DbError> {
        self.with_conn(|conn| fetch_attachment(conn, id))
    }

    pub fn list_attachments_for_sync(&self, target: &TargetRef) -> Result<Vec<Attachment>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT * FROM attachments
                     WHERE target_type = ?1 AND target_id = ?2
                     ORDER BY created_at DESC, rowid DESC",
                )
                .to_db()?;
            let attachments = stmt
                .query_map(params![target.kind, target.id], row_to_attachment)
                .to_db()?
                .collect::<Result<Vec<_>, _>>()
                .to_db()?;
            Ok(attachments)
        })
    }

    pub fn find_attachments_with_tag_sync(
        &self,
        target: &TargetRef,
        tag: &str,
    ) -> Result<Vec<Attachment>, DbError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT * FROM attachments
                     WHERE target_type = ?1 AND target_id = ?2 AND tag = ?3
                     ORDER BY created_at DESC, rowid DESC",
                )
                .to_db()?;
            let attachments = stmt
                .query_map(params![target.kind, target.id, tag], row_to_attachment)
                .to_db()?
                .collect::<Result<Vec<_>, _>>()
                .to_db()?;
            Ok(attachments)
        })
    }

    pub fn update_attachment_sync(
        &self,
        id: &str,
        update: &UpdateAttachment,
    ) -> Result<Attachment, DbError> {
        self.with_conn(|conn| {
            let existing = fetch_attachment(conn, id)?;
            let file_key = update.file_key.as_ref().unwrap_or(&existing.file_key);
            let size_bytes = update.size_bytes.unwrap_or(existing.size_bytes);
            let tag = match &update.tag {
                Some(tag) => tag.clone(),
                None => existing.tag.clone(),
            };
            // Never let modified_at fall behind created_at, even with clock skew.
            let now = Utc::now().max(existing.created_at);
            conn.execute(
                "UPDATE attachments
                 SET file_key = ?1, size_bytes = ?2, tag = ?3, modified_at = ?4
                 WHERE id = ?5",
                params![file_key, size_bytes, tag, now, id],
            )
            .to_db()?;
            fetch_attachment(conn, id)
        })
    }

    pub fn delete_attachment_sync(&self, id: &str) -> Result<Attachment, DbError> {
        self.with_conn(|conn| {
            let attachment = fetch_attachment(conn, id)?;
            conn.execute("DELETE FROM attachments WHERE id = ?1", params![id])
                .to_db()?;
            Ok(attachment)
        })
    }
}
