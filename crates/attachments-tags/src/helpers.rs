//! Per-actor context for the upload form and the delete link.
//!
//! These only decide what a page may offer; the endpoints re-check
//! permissions on submit.

use serde::Serialize;

use attachments_core::urls::{add_url_for, delete_url_for};
use attachments_core::{Actor, Attachable, Attachment, AttachmentForm, Capability};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadFormContext {
    /// `None` when the actor may not upload.
    pub form: Option<AttachmentForm>,
    pub form_url: Option<String>,
    pub next: Option<String>,
}

impl UploadFormContext {
    pub fn is_available(&self) -> bool {
        self.form.is_some()
    }
}

/// Build the upload form context for `target`.
///
/// Actors without `add_attachment` get an empty context. A `tag` pre-fills
/// the form and hides the tag input.
pub fn render_upload_form(
    actor: &Actor,
    target: &dyn Attachable,
    redirect_to: &str,
    tag: Option<&str>,
) -> UploadFormContext {
    if !actor.has_perm(Capability::AddAttachment) {
        return UploadFormContext::default();
    }
    let form = match tag {
        Some(tag) => AttachmentForm::with_tag(tag),
        None => AttachmentForm::new(),
    };
    UploadFormContext {
        form: Some(form),
        form_url: Some(add_url_for(&target.target_ref())),
        next: Some(redirect_to.to_string()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteLinkContext {
    pub delete_url: Option<String>,
    pub next: Option<String>,
}

/// Delete link for `attachment`, present only when `actor` may delete it.
pub fn render_delete_link(actor: &Actor, attachment: &Attachment, redirect_to: &str) -> DeleteLinkContext {
    if !actor.can_delete(attachment) {
        return DeleteLinkContext::default();
    }
    DeleteLinkContext {
        delete_url: Some(delete_url_for(&attachment.id)),
        next: Some(redirect_to.to_string()),
    }
}
