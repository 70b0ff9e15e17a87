//! Presentation helpers for attachments.
//!
//! Two kinds of helpers live here. The upload-form and delete-link helpers
//! decide, per actor, what a page may offer. The lookup directives
//! (`get_attachments_for`, `get_attachment_with_tag`) bind query results into
//! a [`RenderContext`] so templates can iterate over them.
//!
//! Directives are registered explicitly on a [`DirectiveRegistry`]. A
//! [`TemplateRenderer`] turns each one into a call the template engine makes
//! in place, so directives see loop and `set` variables like any expression.

pub mod context;
pub mod directive;
mod error;
pub mod helpers;
mod inclusion;
pub mod registry;
pub mod render;
pub mod scope;

pub use context::{ContextValue, RenderContext};
pub use error::TagError;
pub use helpers::{render_delete_link, render_upload_form, DeleteLinkContext, UploadFormContext};
pub use registry::DirectiveRegistry;
pub use render::TemplateRenderer;
pub use scope::RenderScope;
