use std::collections::BTreeMap;

use serde::Serialize;

use attachments_core::{Actor, Attachment, TargetRef};

/// A value bound in a rendering context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContextValue {
    /// Also what a failed single-attachment lookup binds.
    Null,
    Bool(bool),
    Str(String),
    Target(TargetRef),
    Targets(Vec<TargetRef>),
    Attachment(Box<Attachment>),
    Attachments(Vec<Attachment>),
}

impl ContextValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ContextValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_attachment(&self) -> Option<&Attachment> {
        match self {
            ContextValue::Attachment(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_attachments(&self) -> Option<&[Attachment]> {
        match self {
            ContextValue::Attachments(list) => Some(list),
            _ => None,
        }
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::Str(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::Str(s)
    }
}

impl From<TargetRef> for ContextValue {
    fn from(t: TargetRef) -> Self {
        ContextValue::Target(t)
    }
}

impl From<Vec<TargetRef>> for ContextValue {
    fn from(targets: Vec<TargetRef>) -> Self {
        ContextValue::Targets(targets)
    }
}

impl From<Attachment> for ContextValue {
    fn from(a: Attachment) -> Self {
        ContextValue::Attachment(Box::new(a))
    }
}

impl From<Option<Attachment>> for ContextValue {
    fn from(a: Option<Attachment>) -> Self {
        a.map(ContextValue::from).unwrap_or(ContextValue::Null)
    }
}

impl From<Vec<Attachment>> for ContextValue {
    fn from(list: Vec<Attachment>) -> Self {
        ContextValue::Attachments(list)
    }
}

/// Variables visible to one template render, plus the request it serves.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    vars: BTreeMap<String, ContextValue>,
    actor: Option<Actor>,
    request_uri: String,
}

impl RenderContext {
    pub fn new(actor: Option<Actor>, request_uri: impl Into<String>) -> Self {
        Self {
            vars: BTreeMap::new(),
            actor,
            request_uri: request_uri.into(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ContextValue>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ContextValue> {
        self.vars.get(name)
    }

    /// The requesting actor. Anonymous requests get an actor with no
    /// capabilities.
    pub fn actor(&self) -> Actor {
        self.actor.clone().unwrap_or_else(|| Actor::new(""))
    }

    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    /// Where to send the browser after a form post: the `next` variable when
    /// bound to a string, otherwise the current request URI.
    pub fn redirect_target(&self) -> String {
        self.vars
            .get("next")
            .and_then(ContextValue::as_str)
            .unwrap_or(&self.request_uri)
            .to_string()
    }
}
