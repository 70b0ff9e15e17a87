//! State shared by one render: the host context, directive bindings, and the
//! handles directive nodes need while the template engine runs.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use minijinja::value::{Object, Value};
use minijinja::{Environment, ErrorKind};
use serde::Serialize;
use tokio::runtime::Handle;

use attachments_core::Actor;
use attachments_service::AttachmentService;

use crate::context::{ContextValue, RenderContext};
use crate::directive::DirectiveNode;
use crate::TagError;

/// Names every template sees unless the host binds them itself.
pub const USER_VAR: &str = "user";
pub const REQUEST_URI_VAR: &str = "request_uri";

pub struct RenderScope {
    context: RenderContext,
    nodes: Vec<Box<dyn DirectiveNode>>,
    service: AttachmentService,
    fragments: Arc<Environment<'static>>,
    handle: Handle,
    bindings: Mutex<BTreeMap<String, ContextValue>>,
    failure: Mutex<Option<TagError>>,
}

impl fmt::Debug for RenderScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderScope")
            .field("context", &self.context)
            .field("nodes", &self.nodes)
            .finish_non_exhaustive()
    }
}

impl RenderScope {
    pub(crate) fn new(
        context: RenderContext,
        nodes: Vec<Box<dyn DirectiveNode>>,
        service: AttachmentService,
        fragments: Arc<Environment<'static>>,
        handle: Handle,
    ) -> Self {
        Self {
            context,
            nodes,
            service,
            fragments,
            handle,
            bindings: Mutex::new(BTreeMap::new()),
            failure: Mutex::new(None),
        }
    }

    pub fn service(&self) -> &AttachmentService {
        &self.service
    }

    pub fn actor(&self) -> Actor {
        self.context.actor()
    }

    pub fn redirect_target(&self) -> String {
        self.context.redirect_target()
    }

    /// Drive a service call to completion. Only valid off the async
    /// executor, which is where the template engine runs.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    /// Bind `name` for the rest of the render. Bindings shadow host
    /// variables of the same name.
    pub fn bind(&self, name: impl Into<String>, value: impl Into<ContextValue>) {
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    pub fn render_fragment<S: Serialize>(&self, name: &str, ctx: S) -> Result<String, TagError> {
        Ok(self.fragments.get_template(name)?.render(ctx)?)
    }

    /// Root-context lookup: directive bindings, then host variables, then
    /// `user` and `request_uri`.
    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self
            .bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Some(Value::from_serialize(value));
        }
        if let Some(value) = self.context.get(name) {
            return Some(Value::from_serialize(value));
        }
        match name {
            USER_VAR => Some(Value::from_serialize(self.context.actor())),
            REQUEST_URI_VAR => Some(Value::from(self.context.request_uri())),
            _ => None,
        }
    }

    /// Entry point for the directive function: `args[0]` indexes the node,
    /// the rest are its evaluated operands.
    pub(crate) fn dispatch(&self, args: &[Value]) -> Result<Value, minijinja::Error> {
        let (index, operands) = args
            .split_first()
            .ok_or_else(|| minijinja::Error::new(ErrorKind::MissingArgument, "directive index"))?;
        let node = index
            .as_usize()
            .and_then(|i| self.nodes.get(i))
            .ok_or_else(|| minijinja::Error::new(ErrorKind::InvalidOperation, "unknown directive"))?;

        node.call(operands, self).map_err(|e| {
            let err = minijinja::Error::new(ErrorKind::InvalidOperation, e.to_string());
            self.failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_or_insert(e);
            err
        })
    }

    pub(crate) fn take_bindings(&self) -> BTreeMap<String, ContextValue> {
        std::mem::take(&mut *self.bindings.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// The first directive error of the render, if any.
    pub(crate) fn take_failure(&self) -> Option<TagError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// The template's root context, resolved lazily so bindings made by earlier
/// directives are visible to later expressions.
#[derive(Debug)]
pub(crate) struct RootContext(pub(crate) Arc<RenderScope>);

impl Object for RootContext {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        self.0.lookup(key.as_str()?)
    }
}
