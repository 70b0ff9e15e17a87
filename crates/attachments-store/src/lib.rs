mod local;

pub use local::LocalStore;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use attachments_core::TargetRef;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("store error: {0}")]
    Internal(String),
}

/// A store for opaque blobs keyed by string paths.
///
/// Objects are write-once: a key is created with its contents and never
/// overwritten, only deleted.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create a new object. Fails with `StoreError::AlreadyExists` if `key`
    /// is taken, leaving the existing object untouched.
    async fn put_new(&self, key: &str, data: Bytes) -> Result<(), StoreError>;

    /// Read an object. Returns `StoreError::NotFound` if absent.
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Delete an object. No-op if absent.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

// -- Key helpers --

/// Upload path for an attachment: `attachments/<kind>/<target-id>/<filename>`.
///
/// Existing deployments depend on this layout; do not change it.
pub fn attachment_key(target: &TargetRef, filename: &str) -> String {
    format!(
        "attachments/{}/{}/{}",
        target.kind.to_lowercase(),
        target.id,
        filename
    )
}

// -- Configuration --

/// Configuration for the object store backend.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Local filesystem base directory. Defaults to the shared data dir.
    pub local_data_dir: Option<String>,
}

// -- Factory --

/// Create an `ObjectStore` from configuration.
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn ObjectStore>, StoreError> {
    let store = LocalStore::new(config);
    tracing::debug!(base_dir = %store.base_dir().display(), "using local object store");
    Ok(Arc::new(store))
}
