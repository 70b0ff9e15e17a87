//! The lookup directives and the small pieces they are built from.
//!
//! ```text
//! get_attachments_for <target> [as <name>]
//! get_attachment_with_tag <target> <tag> [as <name>]
//! ```
//!
//! The two grammars are deliberately separate. The list directive looks for
//! the `as` keyword; the tag directive reads fixed positions (slot 4 is the
//! name, slot 3 is not inspected).
//!
//! Operands are evaluated by the template engine where the directive
//! appears, so loop and `set` variables resolve like any other expression.

use std::fmt;

use minijinja::Value;
use serde::Deserialize;
use tracing::{debug, warn};

use attachments_core::{Attachment, TargetRef};
use attachments_service::ServiceError;

use crate::scope::RenderScope;
use crate::TagError;

pub const GET_ATTACHMENTS_FOR: &str = "get_attachments_for";
pub const GET_ATTACHMENT_WITH_TAG: &str = "get_attachment_with_tag";

pub const DEFAULT_LIST_NAME: &str = "attachments";
pub const DEFAULT_SINGLE_NAME: &str = "attachment";

/// The raw contents of one `{% ... %}` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub contents: String,
}

impl Token {
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
        }
    }

    /// Whitespace-separated words; the first one names the directive.
    pub fn split_contents(&self) -> Vec<&str> {
        self.contents.split_whitespace().collect()
    }

    pub fn name(&self) -> Option<&str> {
        self.contents.split_whitespace().next()
    }
}

/// A directive argument: a quoted literal or a context variable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Literal(String),
    Variable(String),
}

impl Operand {
    pub fn parse(bit: &str) -> Self {
        let mut chars = bit.chars();
        match (chars.next(), chars.next_back()) {
            (Some(open @ ('"' | '\'')), Some(close)) if open == close => {
                Operand::Literal(bit[1..bit.len() - 1].to_string())
            }
            _ => Operand::Variable(bit.to_string()),
        }
    }

    pub fn literal(s: impl Into<String>) -> Self {
        Operand::Literal(s.into())
    }

    /// Template expression for this operand, or `None` when a variable is
    /// not a plain or dotted identifier (`project`, `row.project`).
    pub fn to_expression(&self) -> Option<String> {
        match self {
            Operand::Literal(s) => Some(format!(
                "\"{}\"",
                s.replace('\\', "\\\\").replace('"', "\\\"")
            )),
            Operand::Variable(name) => is_variable_path(name).then(|| name.clone()),
        }
    }

    fn defined(&self, value: &Value) -> Result<(), TagError> {
        if value.is_undefined() {
            return Err(TagError::VariableDoesNotExist(self.to_string()));
        }
        Ok(())
    }

    fn wrong_type(&self, expected: &'static str) -> TagError {
        TagError::WrongType {
            name: self.to_string(),
            expected,
        }
    }

    /// `value` must be a string.
    pub fn resolve_str(&self, value: &Value) -> Result<String, TagError> {
        self.defined(value)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.wrong_type("a string"))
    }

    /// A literal is read as `kind:id`; a variable must hold a target.
    pub fn resolve_target(&self, value: &Value) -> Result<TargetRef, TagError> {
        match self {
            Operand::Literal(s) => parse_target_literal(s),
            Operand::Variable(_) => {
                self.defined(value)?;
                if value.as_str().is_some() {
                    return Err(self.wrong_type("an attachable target"));
                }
                let target = TargetRef::deserialize(value.clone())
                    .map_err(|_| self.wrong_type("an attachable target"))?;
                TargetRef::parse(&target.kind, &target.id)
                    .map_err(|_| self.wrong_type("a valid target"))
            }
        }
    }

    /// Attachments only come from variables. A null value, what a failed
    /// tag lookup binds, resolves to `None`.
    pub fn resolve_attachment(&self, value: &Value) -> Result<Option<Attachment>, TagError> {
        match self {
            Operand::Literal(_) => Err(self.wrong_type("an attachment")),
            Operand::Variable(_) => {
                self.defined(value)?;
                if value.is_none() {
                    return Ok(None);
                }
                Attachment::deserialize(value.clone())
                    .map(Some)
                    .map_err(|_| self.wrong_type("an attachment"))
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(s) => write!(f, "\"{s}\""),
            Operand::Variable(name) => f.write_str(name),
        }
    }
}

fn is_variable_path(name: &str) -> bool {
    name.split('.').all(|segment| {
        let mut chars = segment.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

fn parse_target_literal(s: &str) -> Result<TargetRef, TagError> {
    let (kind, id) = s.split_once(':').ok_or_else(|| TagError::WrongType {
        name: format!("\"{s}\""),
        expected: "a target literal of the form kind:id",
    })?;
    TargetRef::parse(kind, id).map_err(|e| TagError::WrongType {
        name: format!("\"{s}\" ({e})"),
        expected: "a valid target",
    })
}

/// Argument `index`, or undefined when the call was short.
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::UNDEFINED)
}

/// A parsed directive.
///
/// The renderer replaces the block with a call whose arguments are the
/// node's [`operands`](Self::operands), evaluated by the template engine in
/// place, and passes the resulting values to [`call`](Self::call) in the
/// same order.
pub trait DirectiveNode: Send + Sync + fmt::Debug {
    fn operands(&self) -> Vec<&Operand>;

    /// Run the directive. The returned value replaces the block in the
    /// output; lookup directives return an empty string.
    fn call(&self, args: &[Value], scope: &RenderScope) -> Result<Value, TagError>;
}

/// Parses a token into a node. Registered by name on a `DirectiveRegistry`.
pub type DirectiveParser = fn(&Token) -> Result<Box<dyn DirectiveNode>, TagError>;

// -- get_attachments_for --

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentsForNode {
    pub target: Operand,
    pub var_name: Operand,
}

/// `get_attachments_for <target> [as <name>]`; the name defaults to
/// `attachments`.
pub fn parse_attachments_for(token: &Token) -> Result<Box<dyn DirectiveNode>, TagError> {
    Ok(Box::new(AttachmentsForNode::parse(token)?))
}

impl AttachmentsForNode {
    pub fn parse(token: &Token) -> Result<Self, TagError> {
        let bits = token.split_contents();
        let target = bits
            .get(1)
            .ok_or_else(|| TagError::syntax(GET_ATTACHMENTS_FOR, "requires a target argument"))?;
        let var_name = match &bits[2..] {
            [] => Operand::literal(DEFAULT_LIST_NAME),
            ["as", name] => Operand::parse(name),
            ["as"] => {
                return Err(TagError::syntax(
                    GET_ATTACHMENTS_FOR,
                    "expects a variable name after 'as'",
                ))
            }
            _ => {
                return Err(TagError::syntax(
                    GET_ATTACHMENTS_FOR,
                    "takes the form: get_attachments_for <target> [as <name>]",
                ))
            }
        };
        Ok(Self {
            target: Operand::parse(target),
            var_name,
        })
    }
}

impl DirectiveNode for AttachmentsForNode {
    fn operands(&self) -> Vec<&Operand> {
        vec![&self.target, &self.var_name]
    }

    fn call(&self, args: &[Value], scope: &RenderScope) -> Result<Value, TagError> {
        let target = self.target.resolve_target(&arg(args, 0))?;
        let var_name = self.var_name.resolve_str(&arg(args, 1))?;
        let attachments = scope.block_on(scope.service().attachments_for(&target))?;
        debug!(target = %target, var = %var_name, count = attachments.len(), "bound attachments");
        scope.bind(var_name, attachments);
        Ok(Value::from(""))
    }
}

// -- get_attachment_with_tag --

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentWithTagNode {
    pub target: Operand,
    pub tag: Operand,
    pub var_name: Operand,
}

/// `get_attachment_with_tag <target> <tag> [as <name>]`, read positionally;
/// the name defaults to `attachment`.
pub fn parse_attachment_with_tag(token: &Token) -> Result<Box<dyn DirectiveNode>, TagError> {
    Ok(Box::new(AttachmentWithTagNode::parse(token)?))
}

impl AttachmentWithTagNode {
    pub fn parse(token: &Token) -> Result<Self, TagError> {
        let bits = token.split_contents();
        match bits.as_slice() {
            [_, target, tag] => Ok(Self {
                target: Operand::parse(target),
                tag: Operand::parse(tag),
                var_name: Operand::literal(DEFAULT_SINGLE_NAME),
            }),
            [_, target, tag, _, name] => Ok(Self {
                target: Operand::parse(target),
                tag: Operand::parse(tag),
                var_name: Operand::parse(name),
            }),
            _ => Err(TagError::syntax(
                GET_ATTACHMENT_WITH_TAG,
                "takes the form: get_attachment_with_tag <target> <tag> [as <name>]",
            )),
        }
    }
}

impl DirectiveNode for AttachmentWithTagNode {
    fn operands(&self) -> Vec<&Operand> {
        vec![&self.target, &self.tag, &self.var_name]
    }

    /// Binds the attachment, or null when the lookup yields anything but a
    /// single match. Lookup faults are logged and bound as null as well.
    fn call(&self, args: &[Value], scope: &RenderScope) -> Result<Value, TagError> {
        let target = self.target.resolve_target(&arg(args, 0))?;
        let tag = self.tag.resolve_str(&arg(args, 1))?;
        let var_name = self.var_name.resolve_str(&arg(args, 2))?;

        let found = match scope.block_on(scope.service().attachment_for(&target, &tag)) {
            Ok(attachment) => Some(attachment),
            Err(ServiceError::NotFound(msg)) | Err(ServiceError::Ambiguous(msg)) => {
                debug!(target = %target, tag = %tag, "{msg}");
                None
            }
            Err(e) => {
                warn!(target = %target, tag = %tag, error = %e, "tag lookup failed, binding null");
                None
            }
        };
        scope.bind(var_name, found);
        Ok(Value::from(""))
    }
}
