#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use attachments_core::api_key::ApiKey;
use attachments_core::attachment::{Attachment, NewAttachment, UpdateAttachment};
use attachments_core::{Capability, TargetRef};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Backend selection and location.
#[derive(Debug, Clone, Default)]
pub struct DbConfig {
    /// Path to the SQLite file. Defaults to `<data_dir>/attachments.db`.
    pub sqlite_path: Option<String>,
}

/// Storage for attachment records and API keys.
///
/// Attachments are keyed polymorphically on `(target_type, target_id)`;
/// nothing here knows what the target entities are.
#[async_trait]
pub trait Database: Send + Sync {
    // -- Attachments --
    async fn create_attachment(&self, input: &NewAttachment) -> Result<Attachment, DbError>;
    async fn get_attachment(&self, id: &str) -> Result<Attachment, DbError>;
    /// All attachments for a target, newest first.
    async fn list_attachments_for(&self, target: &TargetRef) -> Result<Vec<Attachment>, DbError>;
    /// Every attachment on `target` carrying exactly `tag`, newest first.
    /// Tags are not unique, so this may return more than one row.
    async fn find_attachments_with_tag(
        &self,
        target: &TargetRef,
        tag: &str,
    ) -> Result<Vec<Attachment>, DbError>;
    async fn update_attachment(
        &self,
        id: &str,
        update: &UpdateAttachment,
    ) -> Result<Attachment, DbError>;
    /// Delete and return the removed row.
    async fn delete_attachment(&self, id: &str) -> Result<Attachment, DbError>;

    // -- API Keys --
    async fn insert_api_key(
        &self,
        name: &str,
        key_hash: &str,
        capabilities: &[Capability],
    ) -> Result<ApiKey, DbError>;
    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, DbError>;
    async fn touch_api_key(&self, id: &str) -> Result<(), DbError>;
    async fn has_api_keys(&self) -> Result<bool, DbError>;
    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, DbError>;
    async fn delete_api_key(&self, id: &str) -> Result<(), DbError>;
}

/// Default data directory: `$XDG_DATA_HOME/attachments`, falling back to
/// `~/.local/share/attachments`, then `./attachments`.
pub fn data_dir() -> PathBuf {
    let base = if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg)
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".local/share")
    } else {
        PathBuf::from(".")
    };
    base.join("attachments")
}
