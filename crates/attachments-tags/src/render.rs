//! Template rendering with attachment directives.
//!
//! The source is scanned for `{% ... %}` blocks whose first word names a
//! registered directive. Each one is parsed into a node and replaced by a call
//! expression, `{{ __directive(<index>, <operands>...) }}`, so the template
//! engine evaluates the operands where the block stands: inside a `{% for %}`
//! body the directive runs once per iteration and sees the loop variable.
//!
//! Bindings made by a directive are visible to everything rendered after it.
//! Blocks inside `{% raw %}` and `{# ... #}` comments are left alone.

use std::sync::Arc;

use minijinja::value::Rest;
use minijinja::{Environment, Value};
use tokio::runtime::Handle;
use tracing::debug;

use attachments_service::AttachmentService;

use crate::context::RenderContext;
use crate::directive::{DirectiveNode, Token};
use crate::inclusion::fragment_environment;
use crate::registry::DirectiveRegistry;
use crate::scope::{RenderScope, RootContext};
use crate::TagError;

const DIRECTIVE_FUNCTION: &str = "__directive";

const BLOCK_OPEN: &str = "{%";
const BLOCK_CLOSE: &str = "%}";
const COMMENT_OPEN: &str = "{#";
const COMMENT_CLOSE: &str = "#}";

/// Renders templates against an [`AttachmentService`].
pub struct TemplateRenderer {
    env: Environment<'static>,
    fragments: Arc<Environment<'static>>,
    registry: DirectiveRegistry,
    service: AttachmentService,
}

impl TemplateRenderer {
    pub fn new(service: AttachmentService, registry: DirectiveRegistry) -> Result<Self, TagError> {
        Ok(Self {
            env: Environment::new(),
            fragments: Arc::new(fragment_environment()?),
            registry,
            service,
        })
    }

    /// For hosts that want to add their own templates or filters.
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }

    pub fn registry(&self) -> &DirectiveRegistry {
        &self.registry
    }

    /// Render `source` under `name`. The name picks the escaping mode, so
    /// `.html` names are HTML-escaped.
    ///
    /// `user` and `request_uri` are provided unless `ctx` binds those names
    /// itself. Variables bound by directives are copied into `ctx` afterwards;
    /// a directive run more than once leaves its last binding.
    pub async fn render(
        &self,
        name: &str,
        source: &str,
        ctx: &mut RenderContext,
    ) -> Result<String, TagError> {
        let (body, nodes) = self.compile(source)?;
        debug!(template = name, directives = nodes.len(), "rendering template");

        let handle = Handle::try_current().map_err(|e| TagError::Render(e.to_string()))?;
        let scope = Arc::new(RenderScope::new(
            ctx.clone(),
            nodes,
            self.service.clone(),
            self.fragments.clone(),
            handle,
        ));

        let mut env = self.env.clone();
        let directives = scope.clone();
        env.add_function(DIRECTIVE_FUNCTION, move |args: Rest<Value>| {
            directives.dispatch(&args.0)
        });
        let root = Value::from_object(RootContext(scope.clone()));
        let name = name.to_string();

        // Directive lookups block on the service, so the engine runs on the
        // blocking pool.
        let rendered = tokio::task::spawn_blocking(move || env.render_named_str(&name, &body, root))
            .await
            .map_err(|e| TagError::Render(format!("render task failed: {e}")))?;

        for (var, value) in scope.take_bindings() {
            ctx.insert(var, value);
        }
        if let Some(failure) = scope.take_failure() {
            return Err(failure);
        }
        Ok(rendered?)
    }

    /// Replace registered directives with calls to the directive function.
    fn compile(&self, source: &str) -> Result<(String, Vec<Box<dyn DirectiveNode>>), TagError> {
        let mut out = String::with_capacity(source.len());
        let mut nodes: Vec<Box<dyn DirectiveNode>> = Vec::new();
        let mut rest = source;
        let mut consumed = 0;
        let mut in_raw = false;

        while let Some(start) = next_tag(rest, in_raw) {
            if rest[start..].starts_with(COMMENT_OPEN) {
                // An unclosed comment is left for the engine to report.
                let end = rest[start + 2..]
                    .find(COMMENT_CLOSE)
                    .map_or(rest.len(), |i| start + 2 + i + COMMENT_CLOSE.len());
                out.push_str(&rest[..end]);
                consumed += end;
                rest = &rest[end..];
                continue;
            }

            let inner_start = start + BLOCK_OPEN.len();
            let inner_len = rest[inner_start..]
                .find(BLOCK_CLOSE)
                .ok_or(TagError::Unterminated(consumed + start))?;
            let block_end = inner_start + inner_len + BLOCK_CLOSE.len();
            let block = &rest[start..block_end];
            let inner = &rest[inner_start..inner_start + inner_len];

            let trim_left = inner.starts_with('-');
            let trim_right = inner.ends_with('-') && inner.len() > 1;
            let body = inner.trim_start_matches(['-', '+']).trim_end_matches(['-', '+']);
            let token = Token::new(body.trim());
            let name = token.name().unwrap_or_default();

            out.push_str(&rest[..start]);
            if in_raw {
                in_raw = name != "endraw";
                out.push_str(block);
            } else if name == "raw" {
                in_raw = true;
                out.push_str(block);
            } else if self.registry.contains(name) {
                let node = self.registry.parse(&token)?;
                let mut call = vec![nodes.len().to_string()];
                for operand in node.operands() {
                    let expr = operand.to_expression().ok_or_else(|| {
                        TagError::syntax(name, format!("cannot use {operand} as an argument"))
                    })?;
                    call.push(expr);
                }
                out.push_str(&format!(
                    "{{{{{} {DIRECTIVE_FUNCTION}({}) {}}}}}",
                    if trim_left { "-" } else { "" },
                    call.join(", "),
                    if trim_right { "-" } else { "" },
                ));
                nodes.push(node);
            } else {
                out.push_str(block);
            }

            consumed += block_end;
            rest = &rest[block_end..];
        }
        out.push_str(rest);
        Ok((out, nodes))
    }
}

/// Offset of the next block or comment opener. Inside `{% raw %}` only
/// blocks matter, since the closing `endraw` is one.
fn next_tag(rest: &str, in_raw: bool) -> Option<usize> {
    let block = rest.find(BLOCK_OPEN);
    if in_raw {
        return block;
    }
    match (block, rest.find(COMMENT_OPEN)) {
        (Some(b), Some(c)) => Some(b.min(c)),
        (b, c) => b.or(c),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use attachments_db::SqliteDatabase;
    use attachments_store::{create_store, StoreConfig};

    use super::*;

    fn renderer(dir: &std::path::Path, registry: DirectiveRegistry) -> TemplateRenderer {
        let db = Arc::new(SqliteDatabase::open_in_memory().unwrap());
        let store = create_store(&StoreConfig {
            local_data_dir: Some(dir.to_string_lossy().to_string()),
        })
        .unwrap();
        TemplateRenderer::new(AttachmentService::new(db, store), registry).unwrap()
    }

    #[test]
    fn compile_replaces_only_registered_blocks() {
        let tmp = tempfile::tempdir().unwrap();
        let r = renderer(tmp.path(), DirectiveRegistry::with_defaults());
        let (body, nodes) = r
            .compile("{% if x %}a{% endif %}{% get_attachments_for obj %}b")
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(
            body,
            "{% if x %}a{% endif %}{{ __directive(0, obj, \"attachments\") }}b"
        );
    }

    #[test]
    fn compile_numbers_directives_in_source_order() {
        let tmp = tempfile::tempdir().unwrap();
        let r = renderer(tmp.path(), DirectiveRegistry::with_defaults());
        let (body, nodes) = r
            .compile("{% for a in list %}{% attachment_delete_link a %}{% endfor %}{% attachment_form_with_tag row.project 'logo' %}")
            .unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(
            body,
            "{% for a in list %}{{ __directive(0, a) }}{% endfor %}{{ __directive(1, row.project, \"logo\") }}"
        );
    }

    #[test]
    fn compile_keeps_whitespace_control() {
        let tmp = tempfile::tempdir().unwrap();
        let r = renderer(tmp.path(), DirectiveRegistry::with_defaults());
        let (body, _) = r.compile("a {%- get_attachments_for obj -%} b").unwrap();
        assert_eq!(body, "a {{- __directive(0, obj, \"attachments\") -}} b");
    }

    #[test]
    fn compile_skips_raw_blocks() {
        let tmp = tempfile::tempdir().unwrap();
        let r = renderer(tmp.path(), DirectiveRegistry::with_defaults());
        let src = "{% raw %}{# {% get_attachments_for obj %}{% endraw %}";
        let (body, nodes) = r.compile(src).unwrap();
        assert!(nodes.is_empty());
        assert_eq!(body, src);
    }

    #[test]
    fn compile_skips_comments() {
        let tmp = tempfile::tempdir().unwrap();
        let r = renderer(tmp.path(), DirectiveRegistry::with_defaults());
        let src = "{# {% get_attachments_for obj %} #}{% get_attachments_for other %}";
        let (body, nodes) = r.compile(src).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(
            body,
            "{# {% get_attachments_for obj %} #}{{ __directive(0, other, \"attachments\") }}"
        );

        let (body, nodes) = r.compile("a {# {% get_attachments_for obj %}").unwrap();
        assert!(nodes.is_empty());
        assert_eq!(body, "a {# {% get_attachments_for obj %}");
    }

    #[test]
    fn compile_rejects_operands_that_are_not_names() {
        let tmp = tempfile::tempdir().unwrap();
        let r = renderer(tmp.path(), DirectiveRegistry::with_defaults());
        assert!(matches!(
            r.compile("{% get_attachments_for obj|first %}"),
            Err(TagError::Syntax { directive, .. }) if directive == "get_attachments_for"
        ));
    }

    #[test]
    fn compile_reports_unterminated_block() {
        let tmp = tempfile::tempdir().unwrap();
        let r = renderer(tmp.path(), DirectiveRegistry::with_defaults());
        assert!(matches!(r.compile("ok {% get_attachments_for"), Err(TagError::Unterminated(3))));
    }

    #[test]
    fn unregistered_directives_pass_through() {
        let tmp = tempfile::tempdir().unwrap();
        let r = renderer(tmp.path(), DirectiveRegistry::new());
        let (body, nodes) = r.compile("{% get_attachments_for obj %}").unwrap();
        assert!(nodes.is_empty());
        assert_eq!(body, "{% get_attachments_for obj %}");
    }
}
