//! # Render Tree
//!
//! The rendered output of one pass, kept as a tree of fragments:
//!
//! ```text
//! Composite #1  (template: "Hi <%= room.name %>", bindings: {room: Room#1})
//! ├── Const #2  "Hi "                       shared, never re-executed
//! └── Leaf  #3  "g708"                      deps: {Room#1: [(name, "g708")]}
//! ```
//!
//! Dynamic nodes live in an arena keyed by [`NodeId`]. Const nodes are
//! shared between trees (and between positions of one tree), so they are
//! held by reference and carry no parent.
//!
//! ## Invariants
//!
//! - A node carries literal output only while it has no children
//! - `result(composite)` is always the concatenation of its children
//! - A re-rendered fragment replaces the old one through [`RenderTree::swap`],
//!   which transfers the old id so client-side references stay valid

mod builder;
mod printer;

pub use builder::TreeBuilder;
pub use printer::DelimitedPrinter;

use crate::error::{ProtocolError, ProtocolResult};
use crate::request::Bindings;
use crate::template::TemplateRef;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tessera_core::{DependencySet, NodeId};

/// Kind of a dynamic render node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Directly computed text.
    Leaf,
    /// Concatenation of ordered children.
    Composite,
}

/// A fully static fragment, immutable once built.
#[derive(Debug, PartialEq, Eq)]
pub struct ConstNode {
    id: NodeId,
    text: Arc<str>,
}

impl ConstNode {
    /// Creates a const node.
    #[must_use]
    pub fn new(id: NodeId, text: impl Into<Arc<str>>) -> Self {
        Self { id, text: text.into() }
    }

    /// Node id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Fixed content.
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A child slot of a composite node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Child {
    /// Shared static fragment.
    Const(Arc<ConstNode>),
    /// Dynamic node owned by the tree.
    Node(NodeId),
}

impl Child {
    /// Id of the referenced node.
    #[must_use]
    pub fn id(&self) -> NodeId {
        match self {
            Self::Const(c) => c.id(),
            Self::Node(id) => *id,
        }
    }
}

/// One dynamic fragment of rendered output.
pub struct RenderNode {
    id: NodeId,
    kind: NodeKind,
    source: Arc<str>,
    view: Arc<str>,
    children: Vec<Child>,
    output: Option<String>,
    deps: DependencySet,
    template: Option<TemplateRef>,
    bindings: Arc<Bindings>,
    parent: Option<NodeId>,
}

impl RenderNode {
    /// Creates an open node with no content.
    #[must_use]
    pub fn new(id: NodeId, kind: NodeKind, source: impl Into<Arc<str>>, view: Arc<str>) -> Self {
        Self {
            id,
            kind,
            source: source.into(),
            view,
            children: Vec::new(),
            output: None,
            deps: DependencySet::new(),
            template: None,
            bindings: Arc::new(Bindings::new()),
            parent: None,
        }
    }

    /// Attaches the template and bindings that re-execute this node.
    #[must_use]
    pub fn with_template(mut self, template: Option<TemplateRef>, bindings: Arc<Bindings>) -> Self {
        self.template = template;
        self.bindings = bindings;
        self
    }

    /// Node id, stable across re-renders of the same position.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Node kind.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    /// What produced this node (expression or template name).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// View in effect when the node was rendered.
    #[must_use]
    pub fn view(&self) -> &Arc<str> {
        &self.view
    }

    /// Ordered children.
    #[must_use]
    pub fn children(&self) -> &[Child] {
        &self.children
    }

    /// Literal output, if set.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    /// What this node observed while being computed.
    #[must_use]
    pub const fn deps(&self) -> &DependencySet {
        &self.deps
    }

    /// Mutable dependencies; only the open node of a render pass uses this.
    pub(crate) fn deps_mut(&mut self) -> &mut DependencySet {
        &mut self.deps
    }

    /// Template that re-executes this node.
    #[must_use]
    pub const fn template(&self) -> Option<&TemplateRef> {
        self.template.as_ref()
    }

    /// Locals the template ran with.
    #[must_use]
    pub const fn bindings(&self) -> &Arc<Bindings> {
        &self.bindings
    }

    /// Parent node, `None` for the root.
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// First template run into this node owns it; later ones are nested.
    pub(crate) fn adopt_template(&mut self, template: &TemplateRef, bindings: &Arc<Bindings>, view: &Arc<str>) {
        if self.template.is_none() {
            self.template = Some(Arc::clone(template));
            self.bindings = Arc::clone(bindings);
            self.view = Arc::clone(view);
        }
    }
}

impl fmt::Debug for RenderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("children", &self.children)
            .field("output", &self.output)
            .field("deps", &self.deps)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

/// Arena of dynamic nodes plus the root id.
#[derive(Debug, Default)]
pub struct RenderTree {
    nodes: HashMap<NodeId, RenderNode>,
    root: Option<NodeId>,
}

impl RenderTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Root node id.
    #[must_use]
    pub const fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Looks a node up.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&RenderNode> {
        self.nodes.get(&id)
    }

    /// Looks a node up, failing on unknown ids.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownNode`].
    pub fn node(&self, id: NodeId) -> ProtocolResult<&RenderNode> {
        self.nodes.get(&id).ok_or(ProtocolError::UnknownNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> ProtocolResult<&mut RenderNode> {
        self.nodes.get_mut(&id).ok_or(ProtocolError::UnknownNode(id))
    }

    /// True if `id` is a dynamic node of this tree.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of dynamic nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All dynamic nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &RenderNode> {
        self.nodes.values()
    }

    pub(crate) fn insert_root(&mut self, mut node: RenderNode) -> ProtocolResult<()> {
        if let Some(existing) = self.root {
            return Err(ProtocolError::DuplicateRoot(existing));
        }
        node.parent = None;
        self.root = Some(node.id);
        self.nodes.insert(node.id, node);
        Ok(())
    }

    pub(crate) fn insert_child(&mut self, parent: NodeId, mut node: RenderNode) -> ProtocolResult<()> {
        self.append_child(parent, Child::Node(node.id))?;
        node.parent = Some(parent);
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Appends `child` to `parent`.
    ///
    /// # Errors
    ///
    /// Fails if `parent` is unknown, is a leaf, or already carries output.
    pub fn append_child(&mut self, parent: NodeId, child: Child) -> ProtocolResult<()> {
        let node = self.node_mut(parent)?;
        if node.kind != NodeKind::Composite {
            return Err(ProtocolError::NotComposite(parent));
        }
        if node.output.as_deref().is_some_and(|o| !o.is_empty()) {
            return Err(ProtocolError::OutputAlreadySet(parent));
        }
        node.output = None;
        node.children.push(child);
        Ok(())
    }

    /// Sets the literal output of `id`.
    ///
    /// # Errors
    ///
    /// Fails if the node has children or already carries different,
    /// non-empty output.
    pub fn set_output(&mut self, id: NodeId, text: String) -> ProtocolResult<()> {
        let node = self.node_mut(id)?;
        if !node.children.is_empty() {
            return Err(ProtocolError::HasChildren(id));
        }
        if let Some(existing) = &node.output {
            if !existing.is_empty() && *existing != text {
                return Err(ProtocolError::ConflictingOutput(id));
            }
        }
        node.output = Some(text);
        Ok(())
    }

    /// Rendered text of `id`: literal output for childless nodes, else the
    /// concatenation of the children's results. Unknown ids yield "".
    #[must_use]
    pub fn result(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_result(id, &mut out);
        out
    }

    fn write_result(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if node.children.is_empty() {
            out.push_str(node.output.as_deref().unwrap_or_default());
            return;
        }
        for child in &node.children {
            match child {
                Child::Const(c) => out.push_str(c.text()),
                Child::Node(cid) => self.write_result(*cid, out),
            }
        }
    }

    /// Rendered text of the whole tree.
    #[must_use]
    pub fn text(&self) -> String {
        self.root.map(|r| self.result(r)).unwrap_or_default()
    }

    /// Dynamic node ids in depth-first pre-order.
    #[must_use]
    pub fn preorder(&self) -> Vec<NodeId> {
        self.root.map(|r| self.subtree(r)).unwrap_or_default()
    }

    /// `id` followed by every dynamic descendant, pre-order.
    #[must_use]
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.nodes.get(&next) else {
                continue;
            };
            out.push(next);
            for child in node.children.iter().rev() {
                if let Child::Node(cid) = child {
                    stack.push(*cid);
                }
            }
        }
        out
    }

    /// Replaces the subtree at `old` with `fragment`, in place.
    ///
    /// The fragment root takes over `old`'s id and position; its own
    /// descendants keep their fresh ids. Returns the removed nodes so their
    /// dependency registrations can be torn down.
    ///
    /// # Errors
    ///
    /// Fails if `old` is unknown or `fragment` is empty.
    pub fn swap(&mut self, old: NodeId, mut fragment: Self) -> ProtocolResult<Vec<RenderNode>> {
        let new_root = fragment.root.ok_or(ProtocolError::EmptyFragment(old))?;
        let parent = self.node(old)?.parent;
        let mut root_node = fragment
            .nodes
            .remove(&new_root)
            .ok_or(ProtocolError::UnknownNode(new_root))?;

        let removed: Vec<RenderNode> = self
            .subtree(old)
            .into_iter()
            .filter_map(|id| self.nodes.remove(&id))
            .collect();

        root_node.id = old;
        root_node.parent = parent;
        for child in &root_node.children {
            if let Child::Node(cid) = child {
                if let Some(n) = fragment.nodes.get_mut(cid) {
                    n.parent = Some(old);
                }
            }
        }
        self.nodes.insert(old, root_node);
        self.nodes.extend(fragment.nodes);

        tracing::trace!(node = %old, removed = removed.len(), "swapped render fragment");
        Ok(removed)
    }

    /// Folds every descendant of `id` into it: their dependencies are merged
    /// into `id`, then children and output are reset.
    ///
    /// # Errors
    ///
    /// Fails if `id` is unknown.
    pub fn collapse(&mut self, id: NodeId) -> ProtocolResult<()> {
        let descendants: Vec<NodeId> = self.subtree(id).into_iter().skip(1).collect();
        let mut merged = DependencySet::new();
        for d in descendants {
            if let Some(node) = self.nodes.remove(&d) {
                merged.merge(&node.deps);
            }
        }
        let node = self.node_mut(id)?;
        node.deps.merge(&merged);
        node.children.clear();
        node.output = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{RecordKey, Value};

    fn view() -> Arc<str> {
        Arc::from("application")
    }

    fn sample() -> RenderTree {
        // #1 [ "Hi " (#2), #3 "g708" ]
        let mut tree = RenderTree::new();
        tree.insert_root(RenderNode::new(NodeId::new(1), NodeKind::Composite, "root", view()))
            .unwrap();
        tree.append_child(NodeId::new(1), Child::Const(Arc::new(ConstNode::new(NodeId::new(2), "Hi "))))
            .unwrap();
        let mut leaf = RenderNode::new(NodeId::new(3), NodeKind::Leaf, "room.name", view());
        leaf.deps_mut()
            .record_field_access(&RecordKey::new("Room", 1), "name", Value::from("g708"));
        tree.insert_child(NodeId::new(1), leaf).unwrap();
        tree.set_output(NodeId::new(3), "g708".into()).unwrap();
        tree
    }

    #[test]
    fn test_result_concatenates_children() {
        let tree = sample();
        assert_eq!(tree.text(), "Hi g708");
        assert_eq!(tree.result(NodeId::new(3)), "g708");
        assert_eq!(tree.preorder(), vec![NodeId::new(1), NodeId::new(3)]);
    }

    #[test]
    fn test_protocol_violations() {
        let mut tree = sample();
        assert_eq!(
            tree.append_child(NodeId::new(3), Child::Node(NodeId::new(9))),
            Err(ProtocolError::NotComposite(NodeId::new(3)))
        );
        assert_eq!(
            tree.set_output(NodeId::new(1), "x".into()),
            Err(ProtocolError::HasChildren(NodeId::new(1)))
        );
        assert_eq!(
            tree.set_output(NodeId::new(3), "other".into()),
            Err(ProtocolError::ConflictingOutput(NodeId::new(3)))
        );
        assert!(tree.set_output(NodeId::new(3), "g708".into()).is_ok());
    }

    #[test]
    fn test_swap_preserves_identity_and_position() {
        let mut tree = sample();
        let mut fragment = RenderTree::new();
        fragment
            .insert_root(RenderNode::new(NodeId::new(10), NodeKind::Leaf, "room.name", view()))
            .unwrap();
        fragment.set_output(NodeId::new(10), "xxx".into()).unwrap();

        let removed = tree.swap(NodeId::new(3), fragment).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].output(), Some("g708"));
        assert_eq!(tree.text(), "Hi xxx");
        assert!(!tree.contains(NodeId::new(10)));
        let swapped = tree.node(NodeId::new(3)).unwrap();
        assert_eq!(swapped.parent(), Some(NodeId::new(1)));
        assert_eq!(swapped.output(), Some("xxx"));
    }

    #[test]
    fn test_collapse_merges_descendant_deps() {
        let mut tree = sample();
        tree.collapse(NodeId::new(1)).unwrap();
        let root = tree.node(NodeId::new(1)).unwrap();
        assert!(root.children().is_empty());
        assert!(root.deps().depends_on(&RecordKey::new("Room", 1)));
        assert_eq!(tree.len(), 1);
    }
}
