//! # Templates
//!
//! A compiled template is opaque to the renderer: it executes against a
//! [`RenderPass`], which is its binding context, and contributes content
//! to the node the pass has open.
//!
//! Compilers are registered per format. A chain of formats compiles to a
//! [`CompositeTemplate`]: the first stage runs, its text is compiled with
//! the remaining formats, and so on.
//!
//! ```text
//! "room.html.erb"  →  formats [".erb", ".html"]
//!
//! .erb stage ──text──▶ stage boundary (collapse) ──▶ .html stage
//! ```

mod composite;
mod expr;
mod text;

pub use composite::CompositeTemplate;
pub use expr::{ExprCompiler, ExprTemplate};
pub use text::{TextCompiler, TextTemplate};

use crate::error::{ViewError, ViewResult};
use crate::renderer::RenderPass;
use crate::tree::NodeKind;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tessera_core::IdAllocator;
use tessera_shared::CONST_NODE_FORMATS;

/// An executable template.
pub trait CompiledTemplate: Send + Sync + fmt::Debug {
    /// Name used in logs and node sources.
    fn name(&self) -> &str;

    /// Executes against `pass`, contributing to its open node. The text the
    /// template produces is the result of that node.
    ///
    /// # Errors
    ///
    /// Propagates access, resolution and protocol failures.
    fn execute(&self, pass: &mut RenderPass<'_>) -> ViewResult<()>;

    /// False for templates whose output never depends on bindings; their
    /// nodes are never re-executed.
    fn needs_binding_context(&self) -> bool {
        true
    }

    /// Kind of node this template renders into when run as a fragment.
    fn node_kind(&self) -> NodeKind {
        NodeKind::Composite
    }
}

/// Shared handle to a compiled template.
pub type TemplateRef = Arc<dyn CompiledTemplate>;

/// Compiles template source of one format.
pub trait TemplateCompiler: Send + Sync {
    /// Compiles `source`; `ids` supplies ids for const fragments.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::TemplateSyntax`] for malformed source.
    fn compile(&self, name: &str, source: &str, ids: &IdAllocator) -> ViewResult<TemplateRef>;
}

/// Format registry.
pub struct TemplateEngine {
    compilers: HashMap<String, Arc<dyn TemplateCompiler>>,
}

impl TemplateEngine {
    /// Creates an engine with the built-in formats: const text formats and
    /// `.erb` expression templates.
    #[must_use]
    pub fn new() -> Self {
        let mut engine = Self {
            compilers: HashMap::new(),
        };
        for format in CONST_NODE_FORMATS {
            engine.register(format, Arc::new(TextCompiler));
        }
        engine.register(".erb", Arc::new(ExprCompiler));
        engine
    }

    /// Registers (or replaces) the compiler of `format`.
    pub fn register(&mut self, format: &str, compiler: Arc<dyn TemplateCompiler>) {
        self.compilers.insert(format.to_owned(), compiler);
    }

    /// True if `format` has a compiler.
    #[must_use]
    pub fn supports(&self, format: &str) -> bool {
        self.compilers.contains_key(format)
    }

    /// Compiles `source` through the format chain `formats`, first stage
    /// first. An empty chain compiles as constant text.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::UnknownFormat`] if the first stage has no
    /// compiler, or the compiler's own error. Later stages are compiled
    /// when the chain runs.
    pub fn compile(&self, name: &str, source: &str, formats: &[String], ids: &IdAllocator) -> ViewResult<TemplateRef> {
        let Some((first, rest)) = formats.split_first() else {
            return TextCompiler.compile(name, source, ids);
        };
        let compiler = self
            .compilers
            .get(first)
            .ok_or_else(|| ViewError::UnknownFormat(first.clone()))?;
        let stage = compiler.compile(name, source, ids)?;
        if rest.is_empty() {
            return Ok(stage);
        }
        Ok(Arc::new(CompositeTemplate::new(name, stage, rest.to_vec())))
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut formats: Vec<&String> = self.compilers.keys().collect();
        formats.sort();
        f.debug_struct("TemplateEngine").field("formats", &formats).finish()
    }
}
