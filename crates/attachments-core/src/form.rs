use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attachment::MAX_TAG_LENGTH;

pub const FIELD_FILE: &str = "attachment_file";
pub const FIELD_TAG: &str = "tag";

/// Default cap on a single upload: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// A file as received from the client.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Raw form fields as submitted.
#[derive(Debug, Clone, Default)]
pub struct UploadSubmission {
    pub attachment_file: Option<UploadedFile>,
    pub tag: Option<String>,
}

/// Output of a successful validation.
#[derive(Debug, Clone)]
pub struct CleanedUpload {
    /// The uploaded file with its filename reduced to a bare name.
    pub file: UploadedFile,
    pub tag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_upload_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Field name -> error messages for a rejected submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("invalid upload: {}", self.summary())]
pub struct ValidationErrors {
    pub fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    fn summary(&self) -> String {
        self.fields
            .iter()
            .map(|(field, msgs)| format!("{field}: {}", msgs.join(" ")))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// The upload form: a required file plus a required tag of at most
/// [`MAX_TAG_LENGTH`] characters.
///
/// The stored tag column is nullable, but the form still insists on a tag.
/// With `hidden_tag` set the tag is pre-filled and rendered as a hidden input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentForm {
    pub initial_tag: Option<String>,
    pub hidden_tag: bool,
}

impl AttachmentForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(tag: impl Into<String>) -> Self {
        Self {
            initial_tag: Some(tag.into()),
            hidden_tag: true,
        }
    }

    pub fn validate(
        &self,
        submission: UploadSubmission,
        limits: &UploadLimits,
    ) -> Result<CleanedUpload, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let file = match submission.attachment_file {
            None => {
                errors.add(FIELD_FILE, "This field is required.");
                None
            }
            Some(file) => match clean_file(file, limits) {
                Ok(file) => Some(file),
                Err(msg) => {
                    errors.add(FIELD_FILE, msg);
                    None
                }
            },
        };

        let tag = submission
            .tag
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        let tag_len = tag.chars().count();
        if tag.is_empty() {
            errors.add(FIELD_TAG, "This field is required.");
        } else if tag_len > MAX_TAG_LENGTH {
            errors.add(
                FIELD_TAG,
                format!(
                    "Ensure this value has at most {MAX_TAG_LENGTH} characters (it has {tag_len})."
                ),
            );
        }

        match file {
            Some(file) if errors.is_empty() => Ok(CleanedUpload { file, tag }),
            _ => Err(errors),
        }
    }
}

fn clean_file(mut file: UploadedFile, limits: &UploadLimits) -> Result<UploadedFile, String> {
    let name = sanitize_filename(&file.filename)
        .ok_or_else(|| "No file was submitted. Check the encoding type on the form.".to_string())?;
    if file.is_empty() {
        return Err("The submitted file is empty.".into());
    }
    if file.len() > limits.max_upload_bytes {
        return Err(format!(
            "The submitted file is too large ({} bytes, limit {}).",
            file.len(),
            limits.max_upload_bytes
        ));
    }
    file.filename = name;
    Ok(file)
}

/// Strip any client-side directory components from an upload filename.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}
