//! Constant text templates.

use super::{CompiledTemplate, TemplateCompiler, TemplateRef};
use crate::error::ViewResult;
use crate::renderer::RenderPass;
use crate::tree::ConstNode;
use std::sync::Arc;
use tessera_core::IdAllocator;

/// Emits one shared const node.
#[derive(Debug)]
pub struct TextTemplate {
    name: String,
    node: Arc<ConstNode>,
}

impl TextTemplate {
    /// Wraps `text` in a fresh const node.
    #[must_use]
    pub fn new(name: &str, text: &str, ids: &IdAllocator) -> Self {
        Self {
            name: name.to_owned(),
            node: Arc::new(ConstNode::new(ids.next_node(), text)),
        }
    }

    /// The const node emitted on every execution.
    #[must_use]
    pub const fn node(&self) -> &Arc<ConstNode> {
        &self.node
    }
}

impl CompiledTemplate for TextTemplate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, pass: &mut RenderPass<'_>) -> ViewResult<()> {
        if self.node.text().is_empty() {
            return Ok(());
        }
        pass.emit_const(Arc::clone(&self.node))
    }

    fn needs_binding_context(&self) -> bool {
        false
    }
}

/// Compiler of the const text formats.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCompiler;

impl TemplateCompiler for TextCompiler {
    fn compile(&self, name: &str, source: &str, ids: &IdAllocator) -> ViewResult<TemplateRef> {
        Ok(Arc::new(TextTemplate::new(name, source, ids)))
    }
}
