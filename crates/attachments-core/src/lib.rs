pub mod actor;
pub mod api_key;
pub mod attachment;
pub mod error;
pub mod form;
pub mod target;
pub mod urls;

pub use actor::{Actor, Capability};
pub use attachment::{Attachment, NewAttachment};
pub use error::AttachmentsError;
pub use form::{AttachmentForm, CleanedUpload, UploadLimits, UploadSubmission, UploadedFile, ValidationErrors};
pub use target::{Attachable, TargetRef};
