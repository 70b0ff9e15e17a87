//! Directives that render a bundled template fragment in place.
//!
//! ```text
//! attachment_form <target>
//! attachment_form_with_tag <target> <tag>
//! attachment_delete_link <attachment>
//! ```

use minijinja::{Environment, Value};
use serde::Serialize;

use crate::directive::{arg, DirectiveNode, Operand, Token};
use crate::helpers::{render_delete_link, render_upload_form};
use crate::scope::RenderScope;
use crate::TagError;

pub(crate) const ATTACHMENT_FORM: &str = "attachment_form";
pub(crate) const ATTACHMENT_FORM_WITH_TAG: &str = "attachment_form_with_tag";
pub(crate) const ATTACHMENT_DELETE_LINK: &str = "attachment_delete_link";

pub(crate) const ADD_FORM_TEMPLATE: &str = "attachments/add_form.html";
pub(crate) const DELETE_LINK_TEMPLATE: &str = "attachments/delete_link.html";

/// An environment holding only the bundled fragments.
pub(crate) fn fragment_environment() -> Result<Environment<'static>, TagError> {
    let mut env = Environment::new();
    env.add_template(
        ADD_FORM_TEMPLATE,
        include_str!("../templates/attachments/add_form.html"),
    )?;
    env.add_template(
        DELETE_LINK_TEMPLATE,
        include_str!("../templates/attachments/delete_link.html"),
    )?;
    Ok(env)
}

fn fragment<S: Serialize>(scope: &RenderScope, name: &str, ctx: S) -> Result<Value, TagError> {
    Ok(Value::from_safe_string(scope.render_fragment(name, ctx)?))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFormNode {
    pub target: Operand,
    pub tag: Option<Operand>,
}

pub(crate) fn parse_attachment_form(token: &Token) -> Result<Box<dyn DirectiveNode>, TagError> {
    match token.split_contents().as_slice() {
        [_, target] => Ok(Box::new(UploadFormNode {
            target: Operand::parse(target),
            tag: None,
        })),
        _ => Err(TagError::syntax(ATTACHMENT_FORM, "takes exactly one argument: the target")),
    }
}

pub(crate) fn parse_attachment_form_with_tag(
    token: &Token,
) -> Result<Box<dyn DirectiveNode>, TagError> {
    match token.split_contents().as_slice() {
        [_, target, tag] => Ok(Box::new(UploadFormNode {
            target: Operand::parse(target),
            tag: Some(Operand::parse(tag)),
        })),
        _ => Err(TagError::syntax(
            ATTACHMENT_FORM_WITH_TAG,
            "takes exactly two arguments: the target and the tag",
        )),
    }
}

impl DirectiveNode for UploadFormNode {
    fn operands(&self) -> Vec<&Operand> {
        std::iter::once(&self.target).chain(self.tag.as_ref()).collect()
    }

    fn call(&self, args: &[Value], scope: &RenderScope) -> Result<Value, TagError> {
        let target = self.target.resolve_target(&arg(args, 0))?;
        let tag = self
            .tag
            .as_ref()
            .map(|t| t.resolve_str(&arg(args, 1)))
            .transpose()?;
        let form = render_upload_form(&scope.actor(), &target, &scope.redirect_target(), tag.as_deref());
        fragment(scope, ADD_FORM_TEMPLATE, form)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteLinkNode {
    pub attachment: Operand,
}

pub(crate) fn parse_delete_link(token: &Token) -> Result<Box<dyn DirectiveNode>, TagError> {
    match token.split_contents().as_slice() {
        [_, attachment] => Ok(Box::new(DeleteLinkNode {
            attachment: Operand::parse(attachment),
        })),
        _ => Err(TagError::syntax(
            ATTACHMENT_DELETE_LINK,
            "takes exactly one argument: the attachment",
        )),
    }
}

impl DirectiveNode for DeleteLinkNode {
    fn operands(&self) -> Vec<&Operand> {
        vec![&self.attachment]
    }

    fn call(&self, args: &[Value], scope: &RenderScope) -> Result<Value, TagError> {
        // A failed tag lookup binds null; there is nothing to link to.
        let Some(attachment) = self.attachment.resolve_attachment(&arg(args, 0))? else {
            return Ok(Value::from(""));
        };
        let link = render_delete_link(&scope.actor(), &attachment, &scope.redirect_target());
        fragment(scope, DELETE_LINK_TEMPLATE, link)
    }
}
