use attachments_core::ValidationErrors;
use attachments_db::DbError;
use attachments_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A lookup that should yield one record matched several.
    #[error("ambiguous: {0}")]
    Ambiguous(String),

    #[error(transparent)]
    Invalid(#[from] ValidationErrors),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DbError> for ServiceError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(msg) => ServiceError::NotFound(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => ServiceError::NotFound(format!("file {key}")),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}
