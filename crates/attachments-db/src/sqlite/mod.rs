pub(crate) mod migrations;
pub mod queries;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

use attachments_core::api_key::ApiKey;
use attachments_core::attachment::{Attachment, NewAttachment, UpdateAttachment};
use attachments_core::{Capability, TargetRef};

use crate::{Database, DbConfig, DbError};

/// Converts `rusqlite::Result<T>` into `Result<T, DbError>` so query code can
/// write `.to_db()?`.
pub(crate) trait SqliteResultExt<T> {
    fn to_db(self) -> Result<T, DbError>;
}

impl<T> SqliteResultExt<T> for rusqlite::Result<T> {
    fn to_db(self) -> Result<T, DbError> {
        self.map_err(map_sqlite_err)
    }
}

#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    pub fn open(config: &DbConfig) -> Result<Self, DbError> {
        let path = config
            .sqlite_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| crate::data_dir().join("attachments.db"));
        std::fs::create_dir_all(path.parent().unwrap_or(Path::new(".")))?;
        Self::open_path(&path)
    }

    pub fn open_path(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path).to_db()?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )
        .to_db()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        tracing::debug!(path = %path.display(), "opened sqlite database");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory().to_db()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;").to_db()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    pub(crate) fn with_conn<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| DbError::Internal("lock poisoned".into()))?;
        f(&conn)
    }

    fn run_migrations(&self) -> Result<(), DbError> {
        self.with_conn(migrations::run)
    }
}

pub(crate) fn map_sqlite_err(e: rusqlite::Error) -> DbError {
    DbError::Internal(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_returns_working_db() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT count(*) FROM sqlite_master WHERE name IN ('attachments', 'api_keys')",
                    [],
                    |row| row.get(0),
                )
                .to_db()?;
            assert_eq!(count, 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn open_path_creates_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("test.db");
        assert!(!db_path.exists());

        let _db = SqliteDatabase::open_path(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn open_with_config_creates_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested/dir/attachments.db");
        let config = DbConfig {
            sqlite_path: Some(db_path.to_string_lossy().to_string()),
        };
        let _db = SqliteDatabase::open(&config).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn reopening_runs_migrations_idempotently() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("again.db");
        drop(SqliteDatabase::open_path(&db_path).unwrap());
        let db = SqliteDatabase::open_path(&db_path).unwrap();
        let version: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
                    .to_db()
            })
            .unwrap();
        assert_eq!(version, migrations::LATEST_VERSION);
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    // -- Attachments --
    async fn create_attachment(&self, input: &NewAttachment) -> Result<Attachment, DbError> {
        let db = self.clone();
        let input = input.clone();
        tokio::task::spawn_blocking(move || db.create_attachment_sync(&input))
            .await
            .map_err(|e| DbError::Internal(e.to_string()))?
    }
    async fn get_attachment(&self, id: &str) -> Result<Attachment, DbError> {
        let db = self.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || db.get_attachment_sync(&id))
            .await
            .map_err(|e| DbError::Internal(e.to_string()))?
    }
    async fn list_attachments_for(&self, target: &TargetRef) -> Result<Vec<Attachment>, DbError> {
        let db = self.clone();
        let target = target.clone();
        tokio::task::spawn_blocking(move || db.list_attachments_for_sync(&target))
            .await
            .map_err(|e| DbError::Internal(e.to_string()))?
    }
    async fn find_attachments_with_tag(
        &self,
        target: &TargetRef,
        tag: &str,
    ) -> Result<Vec<Attachment>, DbError> {
        let db = self.clone();
        let target = target.clone();
        let tag = tag.to_string();
        tokio::task::spawn_blocking(move || db.find_attachments_with_tag_sync(&target, &tag))
            .await
            .map_err(|e| DbError::Internal(e.to_string()))?
    }
    async fn update_attachment(
        &self,
        id: &str,
        update: &UpdateAttachment,
    ) -> Result<Attachment, DbError> {
        let db = self.clone();
        let id = id.to_string();
        let update = update.clone();
        tokio::task::spawn_blocking(move || db.update_attachment_sync(&id, &update))
            .await
            .map_err(|e| DbError::Internal(e.to_string()))?
    }
    async fn delete_attachment(&self, id: &str) -> Result<Attachment, DbError> {
        let db = self.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || db.delete_attachment_sync(&id))
            .await
            .map_err(|e| DbError::Internal(e.to_string()))?
    }

    // -- API Keys --
    async fn insert_api_key(
        &self,
        name: &str,
        key_hash: &str,
        capabilities: &[Capability],
    ) -> Result<ApiKey, DbError> {
        let db = self.clone();
        let name = name.to_string();
        let key_hash = key_hash.to_string();
        let capabilities = capabilities.to_vec();
        tokio::task::spawn_blocking(move || db.insert_api_key_sync(&name, &key_hash, &capabilities))
            .await
            .map_err(|e| DbError::Internal(e.to_string()))?
    }
    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, DbError> {
        let db = self.clone();
        let key_hash = key_hash.to_string();
        tokio::task::spawn_blocking(move || db.find_api_key_by_hash_sync(&key_hash))
            .await
            .map_err(|e| DbError::Internal(e.to_string()))?
    }
    async fn touch_api_key(&self, id: &str) -> Result<(), DbError> {
        let db = self.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || db.touch_api_key_sync(&id))
            .await
            .map_err(|e| DbError::Internal(e.to_string()))?
    }
    async fn has_api_keys(&self) -> Result<bool, DbError> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.has_api_keys_sync())
            .await
            .map_err(|e| DbError::Internal(e.to_string()))?
    }
    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, DbError> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.list_api_keys_sync())
            .await
            .map_err(|e| DbError::Internal(e.to_string()))?
    }
    async fn delete_api_key(&self, id: &str) -> Result<(), DbError> {
        let db = self.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || db.delete_api_key_sync(&id))
            .await
            .map_err(|e| DbError::Internal(e.to_string()))?
    }
}
