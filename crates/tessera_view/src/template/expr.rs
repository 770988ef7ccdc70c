//! # Expression Templates
//!
//! The built-in `.erb` compiler. Only output tags are understood:
//!
//! ```text
//! Hi <%= room.name %>             path, rendered as an escaped leaf
//! <%= @User.count %>              tracked query, rendered as a leaf
//! <%= render room.members %>      object or collection render
//! <%= render @User.all %>         render of a query result
//! <%= render 'header' %>          partial by name
//! <%# comment %>                  dropped
//! ```
//!
//! Literal text compiles to shared const nodes. Every tag compiles to its
//! own template run as a child fragment, so a stale tag re-executes alone.

use super::{CompiledTemplate, TemplateCompiler, TemplateRef};
use crate::error::{ViewError, ViewResult};
use crate::renderer::RenderPass;
use crate::request::RenderRequest;
use crate::tree::{ConstNode, NodeKind};
use std::sync::Arc;
use tessera_core::{IdAllocator, QueryTarget, Value};

const OPEN: &str = "<%";
const CLOSE: &str = "%>";

/// Where a tag's value comes from.
#[derive(Clone, Debug, PartialEq)]
enum Source {
    /// `local.field.field`
    Path(Vec<String>),
    /// `@Type.op(args)`
    Query {
        type_name: String,
        op: String,
        args: Vec<Value>,
    },
}

impl Source {
    fn eval(&self, pass: &mut RenderPass<'_>) -> ViewResult<Value> {
        match self {
            Self::Path(parts) => eval_path(pass, parts),
            Self::Query { type_name, op, args } => {
                pass.query(QueryTarget::Type(Arc::from(type_name.as_str())), op, args.clone())
            }
        }
    }
}

fn eval_path(pass: &mut RenderPass<'_>, parts: &[String]) -> ViewResult<Value> {
    let Some((head, fields)) = parts.split_first() else {
        return Ok(Value::Null);
    };
    let mut value = pass.local(head)?;
    let mut walked = head.clone();
    for field in fields {
        let Value::Record(record) = &value else {
            return Err(ViewError::NotARecord { path: walked });
        };
        let record = Arc::clone(record);
        value = pass.read_field(&record, field)?;
        walked.push('.');
        walked.push_str(field);
    }
    Ok(value)
}

/// What a tag does with its source.
#[derive(Clone, Debug, PartialEq)]
enum Action {
    Output(Source),
    Render(Source),
    RenderNamed(String),
}

/// One `<%= ... %>` tag, run as its own fragment.
#[derive(Debug)]
struct Tag {
    text: String,
    action: Action,
}

impl CompiledTemplate for Tag {
    fn name(&self) -> &str {
        &self.text
    }

    fn execute(&self, pass: &mut RenderPass<'_>) -> ViewResult<()> {
        match &self.action {
            Action::Output(source) => {
                let value = source.eval(pass)?;
                let text = pass.escape(&value.to_string());
                pass.set_output(text)
            }
            Action::Render(source) => {
                let value = source.eval(pass)?;
                pass.render(RenderRequest::value(value))
            }
            Action::RenderNamed(name) => pass.render(RenderRequest::partial(name.as_str())),
        }
    }

    fn node_kind(&self) -> NodeKind {
        match self.action {
            Action::Output(_) => NodeKind::Leaf,
            Action::Render(_) | Action::RenderNamed(_) => NodeKind::Composite,
        }
    }
}

#[derive(Debug)]
enum Segment {
    Const(Arc<ConstNode>),
    Tag(TemplateRef),
}

/// A compiled `.erb` template.
#[derive(Debug)]
pub struct ExprTemplate {
    name: String,
    segments: Vec<Segment>,
}

impl ExprTemplate {
    /// Number of tags.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.segments.iter().filter(|s| matches!(s, Segment::Tag(_))).count()
    }
}

impl CompiledTemplate for ExprTemplate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, pass: &mut RenderPass<'_>) -> ViewResult<()> {
        for segment in &self.segments {
            match segment {
                Segment::Const(node) => pass.emit_const(Arc::clone(node))?,
                Segment::Tag(tag) => pass.fragment(tag)?,
            }
        }
        Ok(())
    }

    fn needs_binding_context(&self) -> bool {
        self.tag_count() > 0
    }
}

/// Compiler of the `.erb` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprCompiler;

impl TemplateCompiler for ExprCompiler {
    fn compile(&self, name: &str, source: &str, ids: &IdAllocator) -> ViewResult<TemplateRef> {
        let syntax = |reason: String| ViewError::TemplateSyntax {
            template: name.to_owned(),
            reason,
        };
        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Const(Arc::new(ConstNode::new(ids.next_node(), &rest[..start]))));
            }
            let body_start = start + OPEN.len();
            let Some(len) = rest[body_start..].find(CLOSE) else {
                return Err(syntax(format!("unterminated tag at byte {}", source.len() - rest.len() + start)));
            };
            let body = &rest[body_start..body_start + len];
            rest = &rest[body_start + len + CLOSE.len()..];

            if body.starts_with('#') {
                continue;
            }
            let Some(expr) = body.strip_prefix('=') else {
                return Err(syntax(format!("only output tags are supported: `<%{body}%>`")));
            };
            let expr = expr.trim();
            let action = parse_action(expr).map_err(syntax)?;
            segments.push(Segment::Tag(Arc::new(Tag {
                text: expr.to_owned(),
                action,
            })));
        }
        if !rest.is_empty() {
            segments.push(Segment::Const(Arc::new(ConstNode::new(ids.next_node(), rest))));
        }
        Ok(Arc::new(ExprTemplate {
            name: name.to_owned(),
            segments,
        }))
    }
}

fn parse_action(expr: &str) -> Result<Action, String> {
    let Some(target) = expr.strip_prefix("render ") else {
        return parse_source(expr).map(Action::Output);
    };
    let target = target.trim();
    if let Some(name) = quoted(target) {
        return Ok(Action::RenderNamed(name.to_owned()));
    }
    parse_source(target).map(Action::Render)
}

fn parse_source(expr: &str) -> Result<Source, String> {
    if let Some(query) = expr.strip_prefix('@') {
        return parse_query(query);
    }
    let parts: Vec<String> = expr.split('.').map(str::to_owned).collect();
    if let Some(bad) = parts.iter().find(|p| !is_ident(p)) {
        return Err(format!("invalid path segment `{bad}` in `{expr}`"));
    }
    Ok(Source::Path(parts))
}

fn parse_query(query: &str) -> Result<Source, String> {
    let (call, args) = match query.split_once('(') {
        Some((call, tail)) => {
            let inner = tail
                .strip_suffix(')')
                .ok_or_else(|| format!("missing `)` in `@{query}`"))?;
            (call, parse_args(inner)?)
        }
        None => (query, Vec::new()),
    };
    let Some((type_name, op)) = call.split_once('.') else {
        return Err(format!("expected `@Type.op` in `@{query}`"));
    };
    if !is_ident(type_name) || !is_ident(op) {
        return Err(format!("invalid query `@{query}`"));
    }
    Ok(Source::Query {
        type_name: type_name.to_owned(),
        op: op.to_owned(),
        args,
    })
}

fn parse_args(inner: &str) -> Result<Vec<Value>, String> {
    let mut args = Vec::new();
    let mut rest = inner.trim();
    while !rest.is_empty() {
        let (value, tail) = if let Some(q) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') {
            let body = &rest[1..];
            let end = body.find(q).ok_or_else(|| format!("unterminated string in `{inner}`"))?;
            (Value::from(&body[..end]), &body[end + 1..])
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            (literal(rest[..end].trim())?, &rest[end..])
        };
        args.push(value);
        rest = tail.trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after.trim_start();
        } else if !rest.is_empty() {
            return Err(format!("expected `,` in `{inner}`"));
        }
    }
    Ok(args)
}

fn literal(token: &str) -> Result<Value, String> {
    match token {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        "nil" | "null" => Ok(Value::Null),
        t => t
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("unsupported literal `{t}`")),
    }
}

fn quoted(s: &str) -> Option<&str> {
    let s = s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')).or_else(|| {
        s.strip_prefix('"').and_then(|s| s.strip_suffix('"'))
    })?;
    Some(s)
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '?')
}
