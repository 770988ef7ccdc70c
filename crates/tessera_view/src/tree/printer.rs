//! Delimited printing.
//!
//! Nodes that depend on data are wrapped in empty marker elements so the
//! client can find the range a later `node_update` replaces:
//!
//! ```text
//!  <reds_7></reds_7> g708 <rede_7></rede_7> 
//! ```

use super::{Child, RenderTree};
use tessera_core::NodeId;
use tessera_shared::constants::{NODE_END_TAG, NODE_START_TAG};

/// Prints render trees with node delimiters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedPrinter;

impl DelimitedPrinter {
    /// `id` and its descendants, `id` itself wrapped if it has dependencies.
    #[must_use]
    pub fn outer(tree: &RenderTree, id: NodeId) -> String {
        let mut out = String::new();
        Self::write(tree, id, true, &mut out);
        out
    }

    /// Content of `id` with its descendants delimited; `id` itself is not
    /// wrapped, since the client already holds its markers.
    #[must_use]
    pub fn inner(tree: &RenderTree, id: NodeId) -> String {
        let mut out = String::new();
        Self::write(tree, id, false, &mut out);
        out
    }

    fn write(tree: &RenderTree, id: NodeId, wrap: bool, out: &mut String) {
        let Some(node) = tree.get(id) else {
            return;
        };
        let wrap = wrap && !node.deps().is_empty();
        if wrap {
            out.push_str(&format!(" <{NODE_START_TAG}{id}></{NODE_START_TAG}{id}> "));
        }
        if node.children().is_empty() {
            out.push_str(node.output().unwrap_or_default());
        } else {
            for child in node.children() {
                match child {
                    Child::Const(c) => out.push_str(c.text()),
                    Child::Node(cid) => Self::write(tree, *cid, true, out),
                }
            }
        }
        if wrap {
            out.push_str(&format!(" <{NODE_END_TAG}{id}></{NODE_END_TAG}{id}> "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ConstNode, NodeKind, RenderNode, TreeBuilder};
    use std::sync::Arc;
    use tessera_core::{RecordKey, Value};

    #[test]
    fn test_only_tracked_nodes_are_delimited() {
        let mut b = TreeBuilder::new();
        let view: Arc<str> = Arc::from("application");
        let root = b
            .open(RenderNode::new(NodeId::new(1), NodeKind::Composite, "root", Arc::clone(&view)))
            .unwrap();
        b.emit_const(Arc::new(ConstNode::new(NodeId::new(2), "Hi"))).unwrap();
        let leaf = b
            .open(RenderNode::new(NodeId::new(3), NodeKind::Leaf, "room.name", view))
            .unwrap();
        b.current_mut()
            .unwrap()
            .deps_mut()
            .record_field_access(&RecordKey::new("Room", 1), "name", Value::from("g708"));
        b.set_output("g708".into()).unwrap();
        b.close(leaf).unwrap();
        b.close(root).unwrap();
        let tree = b.finish().unwrap();

        assert_eq!(
            DelimitedPrinter::outer(&tree, root),
            "Hi <reds_3></reds_3> g708 <rede_3></rede_3> "
        );
        assert_eq!(DelimitedPrinter::inner(&tree, leaf), "g708");
    }
}
