use std::sync::Arc;

use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info, warn};

use attachments_core::attachment::{NewAttachment, UpdateAttachment};
use attachments_core::{
    Actor, Attachable, Attachment, AttachmentForm, Capability, TargetRef, UploadLimits,
    UploadSubmission,
};
use attachments_db::Database;
use attachments_store::{attachment_key, ObjectStore, StoreError};

use crate::ServiceError;

/// How many suffixed names to try before giving up on a free storage key.
const MAX_KEY_ATTEMPTS: usize = 8;

/// Attachment repository plus the upload and delete flows on top of it.
#[derive(Clone)]
pub struct AttachmentService {
    db: Arc<dyn Database>,
    store: Arc<dyn ObjectStore>,
    limits: UploadLimits,
}

impl AttachmentService {
    pub fn new(db: Arc<dyn Database>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            db,
            store,
            limits: UploadLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    // -- Lookups --

    /// Every attachment on `target`, newest first. No match is an empty list.
    pub async fn attachments_for(
        &self,
        target: &dyn Attachable,
    ) -> Result<Vec<Attachment>, ServiceError> {
        let target = target.target_ref();
        Ok(self.db.list_attachments_for(&target).await?)
    }

    /// The single attachment on `target` tagged `tag`.
    ///
    /// Zero matches is `NotFound`; more than one is `Ambiguous`, since tags
    /// are a naming convention and not a unique key.
    pub async fn attachment_for(
        &self,
        target: &dyn Attachable,
        tag: &str,
    ) -> Result<Attachment, ServiceError> {
        let target = target.target_ref();
        let mut matches = self.db.find_attachments_with_tag(&target, tag).await?;
        match matches.len() {
            0 => Err(ServiceError::NotFound(format!(
                "attachment tagged {tag:?} on {target}"
            ))),
            1 => Ok(matches.remove(0)),
            n => Err(ServiceError::Ambiguous(format!(
                "{n} attachments tagged {tag:?} on {target}"
            ))),
        }
    }

    pub async fn get_attachment(&self, id: &str) -> Result<Attachment, ServiceError> {
        Ok(self.db.get_attachment(id).await?)
    }

    /// Fetch an attachment together with its stored bytes.
    pub async fn read_file(&self, id: &str) -> Result<(Attachment, Bytes), ServiceError> {
        let attachment = self.db.get_attachment(id).await?;
        let data = self.store.get(&attachment.file_key).await?;
        Ok((attachment, data))
    }

    // -- Mutations --

    /// Validate an upload and attach it to `target` on behalf of `actor`.
    ///
    /// Every successful call inserts a new row, even for identical content.
    /// Permission checks belong to the caller.
    pub async fn submit(
        &self,
        form: &AttachmentForm,
        submission: UploadSubmission,
        actor: &Actor,
        target: &dyn Attachable,
    ) -> Result<Attachment, ServiceError> {
        let cleaned = form.validate(submission, &self.limits)?;
        let target = target.target_ref();

        let file_key = self.store_file(&target, &cleaned.file.filename, cleaned.file.data.clone()).await?;
        let input = NewAttachment {
            target: target.clone(),
            creator: actor.username.clone(),
            file_key: file_key.clone(),
            size_bytes: cleaned.file.len() as i64,
            tag: Some(cleaned.tag),
        };

        match self.db.create_attachment(&input).await {
            Ok(attachment) => {
                info!(
                    attachment_id = %attachment.id,
                    target = %target,
                    creator = %actor.username,
                    tag = ?attachment.tag,
                    "attachment created"
                );
                Ok(attachment)
            }
            Err(e) => {
                // Do not leave an orphaned file behind a failed insert.
                if let Err(cleanup) = self.store.delete(&file_key).await {
                    warn!(file_key = %file_key, error = %cleanup, "failed to remove orphaned upload");
                }
                Err(e.into())
            }
        }
    }

    /// Replace the file and tag of an existing attachment.
    ///
    /// Allowed for whoever may delete the attachment, as the old file is
    /// discarded. The creator and target never change.
    pub async fn resubmit(
        &self,
        actor: &Actor,
        attachment_id: &str,
        submission: UploadSubmission,
    ) -> Result<Attachment, ServiceError> {
        let existing = self.db.get_attachment(attachment_id).await?;
        if !actor.has_perm(Capability::AddAttachment) || !actor.can_delete(&existing) {
            return Err(ServiceError::Forbidden(format!(
                "{} may not replace attachment {attachment_id}",
                actor.username
            )));
        }

        let cleaned = AttachmentForm::new().validate(submission, &self.limits)?;
        let file_key = self
            .store_file(&existing.target, &cleaned.file.filename, cleaned.file.data.clone())
            .await?;
        let update = UpdateAttachment {
            file_key: Some(file_key.clone()),
            size_bytes: Some(cleaned.file.len() as i64),
            tag: Some(Some(cleaned.tag)),
        };
        let updated = match self.db.update_attachment(attachment_id, &update).await {
            Ok(updated) => updated,
            Err(e) => {
                if let Err(cleanup) = self.store.delete(&file_key).await {
                    warn!(file_key = %file_key, error = %cleanup, "failed to remove orphaned upload");
                }
                return Err(e.into());
            }
        };

        if existing.file_key != updated.file_key {
            if let Err(e) = self.store.delete(&existing.file_key).await {
                warn!(file_key = %existing.file_key, error = %e, "failed to remove replaced file");
            }
        }
        info!(attachment_id = %updated.id, "attachment replaced");
        Ok(updated)
    }

    /// Delete an attachment and its file if `actor` is allowed to.
    ///
    /// The referenced target and creator are untouched.
    pub async fn delete(&self, actor: &Actor, attachment_id: &str) -> Result<Attachment, ServiceError> {
        let attachment = self.db.get_attachment(attachment_id).await?;
        if !actor.can_delete(&attachment) {
            return Err(ServiceError::Forbidden(format!(
                "{} may not delete attachment {attachment_id}",
                actor.username
            )));
        }

        let deleted = self.db.delete_attachment(attachment_id).await?;
        if let Err(e) = self.store.delete(&deleted.file_key).await {
            warn!(file_key = %deleted.file_key, error = %e, "failed to remove deleted attachment's file");
        }
        info!(attachment_id = %deleted.id, actor = %actor.username, "attachment deleted");
        Ok(deleted)
    }

    /// Write `data` under the target's upload path, picking a free key.
    ///
    /// Keys are claimed with an exclusive create, so two uploads with the
    /// same filename never share a file: the loser retries as
    /// `<stem>_<7 random chars><ext>`.
    async fn store_file(
        &self,
        target: &TargetRef,
        filename: &str,
        data: Bytes,
    ) -> Result<String, ServiceError> {
        let mut key = attachment_key(target, filename);
        for _ in 0..=MAX_KEY_ATTEMPTS {
            match self.store.put_new(&key, data.clone()).await {
                Ok(()) => {
                    debug!(file_key = %key, bytes = data.len(), "stored upload");
                    return Ok(key);
                }
                Err(StoreError::AlreadyExists(taken)) => {
                    debug!(file_key = %taken, "storage key taken, retrying with suffix");
                    key = attachment_key(target, &with_random_suffix(filename));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ServiceError::Internal(format!(
            "no free storage key for {filename} on {target}"
        )))
    }
}

fn with_random_suffix(filename: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(char::from)
        .collect();
    match filename.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_{}{}", &filename[..dot], suffix, &filename[dot..]),
        _ => format!("{filename}_{suffix}"),
    }
}
