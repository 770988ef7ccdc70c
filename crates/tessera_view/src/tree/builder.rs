//! Open/close stack mirroring template nesting.

use super::{Child, ConstNode, RenderNode, RenderTree};
use crate::error::{ProtocolError, ProtocolResult};
use std::sync::Arc;
use tessera_core::NodeId;

/// Builds a [`RenderTree`] through strictly nested open/close calls.
///
/// The first node opened becomes the root; every later node becomes a
/// child of the node on top of the stack.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    tree: RenderTree,
    stack: Vec<NodeId>,
}

impl TreeBuilder {
    /// Creates a builder for an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `node` as the new current node.
    ///
    /// # Errors
    ///
    /// Fails if the current node cannot take children, or if a second root
    /// is opened.
    pub fn open(&mut self, node: RenderNode) -> ProtocolResult<NodeId> {
        let id = node.id();
        match self.stack.last() {
            Some(&parent) => self.tree.insert_child(parent, node)?,
            None => self.tree.insert_root(node)?,
        }
        self.stack.push(id);
        Ok(id)
    }

    /// Closes the current node, which must be `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::StackCorrupted`] if another node is on top;
    /// the stack is left untouched.
    pub fn close(&mut self, expected: NodeId) -> ProtocolResult<()> {
        match self.stack.last() {
            Some(&top) if top == expected => {
                self.stack.pop();
                Ok(())
            }
            found => Err(ProtocolError::StackCorrupted {
                expected,
                found: found.copied(),
            }),
        }
    }

    /// The current node.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NoOpenNode`] outside any node.
    pub fn current(&self) -> ProtocolResult<NodeId> {
        self.stack.last().copied().ok_or(ProtocolError::NoOpenNode)
    }

    /// The current node, mutably.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NoOpenNode`] outside any node.
    pub fn current_mut(&mut self) -> ProtocolResult<&mut RenderNode> {
        let id = self.current()?;
        self.tree.node_mut(id)
    }

    /// Appends a shared const node to the current node.
    ///
    /// # Errors
    ///
    /// Fails if no node is open or the current node cannot take children.
    pub fn emit_const(&mut self, node: Arc<ConstNode>) -> ProtocolResult<()> {
        let id = self.current()?;
        self.tree.append_child(id, Child::Const(node))
    }

    /// Sets the output of the current node.
    ///
    /// # Errors
    ///
    /// See [`RenderTree::set_output`].
    pub fn set_output(&mut self, text: String) -> ProtocolResult<()> {
        let id = self.current()?;
        self.tree.set_output(id, text)
    }

    /// Number of open nodes.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Tree built so far.
    #[must_use]
    pub const fn tree(&self) -> &RenderTree {
        &self.tree
    }

    /// Tree built so far, mutably.
    pub fn tree_mut(&mut self) -> &mut RenderTree {
        &mut self.tree
    }

    /// Finishes the pass.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Unbalanced`] if nodes are still open.
    pub fn finish(self) -> ProtocolResult<RenderTree> {
        if self.stack.is_empty() {
            Ok(self.tree)
        } else {
            Err(ProtocolError::Unbalanced { open: self.stack.len() })
        }
    }
}
