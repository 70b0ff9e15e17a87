use rusqlite::Connection;

use super::SqliteResultExt;
use crate::DbError;

pub(crate) const LATEST_VERSION: i64 = 2;

pub fn run(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )
    .to_db()?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        // v1: attachments keyed on (target_type, target_id); tag is nullable
        // and deliberately not unique per target.
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS attachments (
                 id          TEXT PRIMARY KEY,
                 target_type TEXT NOT NULL,
                 target_id   TEXT NOT NULL,
                 creator     TEXT NOT NULL,
                 file_key    TEXT NOT NULL,
                 size_bytes  INTEGER NOT NULL DEFAULT 0,
                 tag         TEXT CHECK(tag IS NULL OR length(tag) <= 30),
                 created_at  TEXT NOT NULL,
                 modified_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_attachments_target
                 ON attachments(target_type, target_id, created_at);
             CREATE INDEX IF NOT EXISTS idx_attachments_tag
                 ON attachments(target_type, target_id, tag);

             INSERT INTO schema_version (version, applied_at) VALUES (1, datetime('now'));",
        )
        .to_db()?;
        tracing::info!("applied schema migration v1 (attachments)");
    }

    if current_version < 2 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS api_keys (
                 id           TEXT PRIMARY KEY,
                 name         TEXT NOT NULL DEFAULT '',
                 key_hash     TEXT NOT NULL UNIQUE,
                 capabilities TEXT NOT NULL DEFAULT '',
                 created_at   TEXT NOT NULL,
                 last_used_at TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_api_keys_hash ON api_keys(key_hash);

             INSERT INTO schema_version (version, applied_at) VALUES (2, datetime('now'));",
        )
        .to_db()?;
        tracing::info!("applied schema migration v2 (api_keys)");
    }

    Ok(())
}
