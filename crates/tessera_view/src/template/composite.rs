//! Multi-stage template chains.

use super::{CompiledTemplate, TemplateRef};
use crate::error::ViewResult;
use crate::renderer::RenderPass;

/// Runs `first`, then compiles its text with `rest` and runs that.
///
/// At the boundary the open node is collapsed: whatever the first stage
/// observed stays as the node's dependencies, its children and output are
/// dropped, and the next stage renders afresh into the same node.
#[derive(Debug)]
pub struct CompositeTemplate {
    name: String,
    first: TemplateRef,
    rest: Vec<String>,
}

impl CompositeTemplate {
    /// Creates a chain.
    #[must_use]
    pub fn new(name: &str, first: TemplateRef, rest: Vec<String>) -> Self {
        Self {
            name: name.to_owned(),
            first,
            rest,
        }
    }

    /// Formats applied after the first stage.
    #[must_use]
    pub fn remaining_formats(&self) -> &[String] {
        &self.rest
    }
}

impl CompiledTemplate for CompositeTemplate {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, pass: &mut RenderPass<'_>) -> ViewResult<()> {
        self.first.execute(pass)?;
        let text = pass.current_text()?;
        pass.stage_boundary()?;
        let next = pass.compile_content(&self.name, &text, &self.rest)?;
        tracing::trace!(template = %self.name, formats = ?self.rest, "template stage boundary");
        next.execute(pass)
    }

    fn needs_binding_context(&self) -> bool {
        self.first.needs_binding_context()
    }
}
