use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TargetRef;

/// Maximum length of an attachment tag, in characters.
pub const MAX_TAG_LENGTH: usize = 30;

/// One uploaded file attached to some target entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    #[serde(flatten)]
    pub target: TargetRef,
    /// Username of the uploader. Never changes after insert.
    pub creator: String,
    /// Object store key, `attachments/<kind>/<target-id>/<filename>`.
    pub file_key: String,
    pub size_bytes: i64,
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Attachment {
    /// Last path component of the stored file.
    pub fn filename(&self) -> &str {
        self.file_key
            .rsplit('/')
            .next()
            .unwrap_or(self.file_key.as_str())
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag.as_deref() {
            Some(tag) if !tag.is_empty() => {
                write!(f, "{} attached {} ({})", self.creator, self.file_key, tag)
            }
            _ => write!(f, "{} attached {}", self.creator, self.file_key),
        }
    }
}

/// Insert payload for a new attachment row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttachment {
    #[serde(flatten)]
    pub target: TargetRef,
    pub creator: String,
    pub file_key: String,
    pub size_bytes: i64,
    pub tag: Option<String>,
}

/// Replacement values when an attachment is re-saved through the upload form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAttachment {
    pub file_key: Option<String>,
    pub size_bytes: Option<i64>,
    /// `Some(None)` clears the tag.
    pub tag: Option<Option<String>>,
}
