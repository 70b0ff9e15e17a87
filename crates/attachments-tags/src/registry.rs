use std::collections::BTreeMap;

use crate::directive::{
    parse_attachment_with_tag, parse_attachments_for, DirectiveNode, DirectiveParser, Token,
    GET_ATTACHMENTS_FOR, GET_ATTACHMENT_WITH_TAG,
};
use crate::inclusion::{
    parse_attachment_form, parse_attachment_form_with_tag, parse_delete_link,
    ATTACHMENT_DELETE_LINK, ATTACHMENT_FORM, ATTACHMENT_FORM_WITH_TAG,
};
use crate::TagError;

/// Named directive parsers, built once at startup and handed to a
/// [`TemplateRenderer`](crate::TemplateRenderer).
#[derive(Debug, Clone, Default)]
pub struct DirectiveRegistry {
    parsers: BTreeMap<String, DirectiveParser>,
}

impl DirectiveRegistry {
    /// An empty registry. Blocks with unregistered names pass through to the
    /// template engine untouched.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every attachment directive registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_attachment_directives();
        registry
    }

    /// Register (or replace) the parser for `name`.
    pub fn register(&mut self, name: impl Into<String>, parser: DirectiveParser) -> &mut Self {
        self.parsers.insert(name.into(), parser);
        self
    }

    pub fn register_attachment_directives(&mut self) -> &mut Self {
        self.register(GET_ATTACHMENTS_FOR, parse_attachments_for)
            .register(GET_ATTACHMENT_WITH_TAG, parse_attachment_with_tag)
            .register(ATTACHMENT_FORM, parse_attachment_form)
            .register(ATTACHMENT_FORM_WITH_TAG, parse_attachment_form_with_tag)
            .register(ATTACHMENT_DELETE_LINK, parse_delete_link)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parsers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parsers.keys().map(String::as_str)
    }

    pub fn parse(&self, token: &Token) -> Result<Box<dyn DirectiveNode>, TagError> {
        let name = token.name().unwrap_or_default();
        let parser = self
            .parsers
            .get(name)
            .ok_or_else(|| TagError::UnknownDirective(name.to_string()))?;
        parser(token)
    }
}
