use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttachmentsError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("unknown capability: {0}")]
    UnknownCapability(String),
}
