//! # Render Requests
//!
//! What to render, in any of the accepted forms, and its canonical form.
//!
//! | form           | resolves to                                         |
//! |----------------|-----------------------------------------------------|
//! | nothing        | empty output                                        |
//! | text           | constant text (`.txt` unless formats say otherwise) |
//! | inline         | template source (`.erb` unless formats say so)      |
//! | compiled       | a compiled template, used as-is                     |
//! | file           | a template file, formats from its extensions        |
//! | template       | a named template, searched in the view hierarchy    |
//! | object         | a partial named after the record's type hierarchy   |
//! | collection     | one object render per element                       |

use crate::template::TemplateRef;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tessera_core::{Schema, Value};

/// Local variables visible to a template.
pub type Bindings = BTreeMap<String, Value>;

/// The thing to render.
#[derive(Clone)]
pub enum RenderTarget {
    /// Empty output.
    Nothing,
    /// Literal text.
    Text(String),
    /// Inline template source.
    Inline(String),
    /// Precompiled template.
    Compiled(TemplateRef),
    /// Template file path.
    File(String),
    /// Template searched by name.
    Template(String),
    /// Record (or primitive) rendered through a partial.
    Object(Value),
    /// Elements rendered one by one.
    Collection(Vec<Value>),
}

impl fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => f.write_str("Nothing"),
            Self::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Self::Inline(s) => f.debug_tuple("Inline").field(s).finish(),
            Self::Compiled(t) => f.debug_tuple("Compiled").field(&t.name()).finish(),
            Self::File(p) => f.debug_tuple("File").field(p).finish(),
            Self::Template(n) => f.debug_tuple("Template").field(n).finish(),
            Self::Object(v) => f.debug_tuple("Object").field(v).finish(),
            Self::Collection(items) => f.debug_tuple("Collection").field(&items.len()).finish(),
        }
    }
}

/// A render request as issued by callers and templates.
#[derive(Clone, Debug)]
pub struct RenderRequest {
    target: RenderTarget,
    view: Option<String>,
    template: Option<String>,
    partial: bool,
    as_name: Option<String>,
    locals: Bindings,
    formats: Option<Vec<String>>,
}

impl RenderRequest {
    fn of(target: RenderTarget) -> Self {
        Self {
            target,
            view: None,
            template: None,
            partial: false,
            as_name: None,
            locals: Bindings::new(),
            formats: None,
        }
    }

    /// Renders nothing.
    #[must_use]
    pub fn nothing() -> Self {
        Self::of(RenderTarget::Nothing)
    }

    /// Renders literal text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::of(RenderTarget::Text(text.into()))
    }

    /// Renders inline template source.
    #[must_use]
    pub fn inline(source: impl Into<String>) -> Self {
        Self::of(RenderTarget::Inline(source.into()))
    }

    /// Renders a compiled template.
    #[must_use]
    pub fn compiled(template: TemplateRef) -> Self {
        Self::of(RenderTarget::Compiled(template))
    }

    /// Renders a template file.
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self::of(RenderTarget::File(path.into()))
    }

    /// Renders a template found by name.
    #[must_use]
    pub fn template(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            template: Some(name.clone()),
            ..Self::of(RenderTarget::Template(name))
        }
    }

    /// Renders a partial found by name.
    #[must_use]
    pub fn partial(name: impl Into<String>) -> Self {
        Self {
            partial: true,
            ..Self::template(name)
        }
    }

    /// Renders a record through the partial of its type hierarchy.
    #[must_use]
    pub fn object(value: Value) -> Self {
        Self {
            partial: true,
            ..Self::of(RenderTarget::Object(value))
        }
    }

    /// Renders every element.
    #[must_use]
    pub fn collection(items: Vec<Value>) -> Self {
        Self {
            partial: true,
            ..Self::of(RenderTarget::Collection(items))
        }
    }

    /// Renders an arbitrary value: a record through its partial, a list
    /// element-wise (a one-element list as its element), anything else
    /// through the `primitive` partial.
    #[must_use]
    pub fn value(value: Value) -> Self {
        match value {
            Value::Record(_) => Self::object(value),
            Value::List(mut items) if items.len() == 1 => Self::value(items.remove(0)),
            Value::List(items) => Self::collection(items),
            other => Self {
                template: Some("primitive".to_owned()),
                ..Self::object(other)
            },
        }
    }

    /// Sets the view.
    #[must_use]
    pub fn in_view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    /// Names the partial used for an object.
    #[must_use]
    pub fn with_template(mut self, name: impl Into<String>) -> Self {
        self.template = Some(name.into());
        self
    }

    /// Binds the object under `name`.
    #[must_use]
    pub fn as_name(mut self, name: impl Into<String>) -> Self {
        self.as_name = Some(name.into());
        self
    }

    /// Adds a local variable.
    #[must_use]
    pub fn with_local(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.locals.insert(name.into(), value.into());
        self
    }

    /// Overrides the format chain.
    #[must_use]
    pub fn with_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.formats = Some(formats.into_iter().map(Into::into).collect());
        self
    }

    /// The target.
    #[must_use]
    pub const fn target(&self) -> &RenderTarget {
        &self.target
    }

    /// Canonical form of this request.
    ///
    /// `inherited` are the locals of the enclosing template; the request's
    /// own locals and the object bindings shadow them.
    #[must_use]
    pub fn normalize(
        self,
        current_view: Option<&str>,
        default_view: &str,
        schema: &Schema,
        inherited: &Bindings,
    ) -> NormalizedRequest {
        let view = self
            .view
            .or_else(|| current_view.map(str::to_owned))
            .unwrap_or_else(|| default_view.to_owned());

        let object = match &self.target {
            RenderTarget::Object(v) => Some(v.clone()),
            _ => None,
        };

        let hierarchy: Vec<String> = if let Some(t) = &self.template {
            vec![t.clone()]
        } else if let Some(Value::Record(r)) = &object {
            schema
                .hierarchy(r.key().type_name())
                .iter()
                .map(|t| underscore(t))
                .collect()
        } else {
            vec!["index".to_owned(), "main".to_owned()]
        };

        let mut locals = inherited.clone();
        locals.extend(self.locals);
        if let Some(obj) = &object {
            let var = self
                .as_name
                .clone()
                .or_else(|| self.template.clone().filter(|t| is_identifier(t)))
                .unwrap_or_else(|| "it".to_owned());
            for name in std::iter::once(&var).chain(hierarchy.iter()) {
                locals.insert(name.clone(), obj.clone());
            }
        }

        NormalizedRequest {
            target: self.target,
            view,
            template: self.template,
            partial: self.partial,
            hierarchy,
            locals: Arc::new(locals),
            formats: self.formats,
            as_name: self.as_name,
        }
    }
}

/// A request in canonical form.
#[derive(Clone, Debug)]
pub struct NormalizedRequest {
    /// The target.
    pub target: RenderTarget,
    /// View to search.
    pub view: String,
    /// Explicit template name.
    pub template: Option<String>,
    /// Partial lookup (`_name` first).
    pub partial: bool,
    /// Template names to try, most specific first.
    pub hierarchy: Vec<String>,
    /// Locals bound for the template.
    pub locals: Arc<Bindings>,
    /// Format chain override.
    pub formats: Option<Vec<String>>,
    /// Object variable name, kept for element-wise collection renders.
    pub as_name: Option<String>,
}

impl NormalizedRequest {
    /// The request rendering one element of a collection with the same
    /// options.
    #[must_use]
    pub fn element(&self, item: Value) -> RenderRequest {
        RenderRequest {
            target: RenderTarget::Object(item),
            view: Some(self.view.clone()),
            template: self.template.clone(),
            partial: true,
            as_name: self.as_name.clone(),
            locals: Bindings::new(),
            formats: self.formats.clone(),
        }
    }

    /// Name shown in errors and logs.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.template.clone().unwrap_or_else(|| self.hierarchy.join(";"))
    }
}

/// `ChatRoom` → `chat_room`.
#[must_use]
pub fn underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c == ':' {
            out.push('/');
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out.replace("//", "/")
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
