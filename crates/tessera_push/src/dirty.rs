//! # Dirty-Node Discovery
//!
//! Matches a snapshot of record changes against the dependency sets of a
//! render tree.
//!
//! ```text
//! Saved(r)     → dirty iff a recorded (r, field, value) now reads differently
//! Destroyed(r) → dirty iff any field of r was observed
//! any change   → dirty iff a query on the changed type now returns something else
//! ```
//!
//! Once a re-renderable node is dirty its descendants are not visited: the
//! parent's re-render replaces them anyway. If that re-render fails, the
//! caller resumes the scan below the node with [`find_dirty_below`].

use tessera_core::{ChangeKind, DependencySet, NodeId, QueryExecutor, RecordChange};
use tessera_view::RenderTree;

/// Dirty nodes of `tree`, pre-order, outermost first.
///
/// Query dependencies are only re-executed when `executor` is given.
#[must_use]
pub fn find_dirty(tree: &RenderTree, changes: &[RecordChange], executor: Option<&dyn QueryExecutor>) -> Vec<NodeId> {
    let mut dirty = Vec::new();
    if changes.is_empty() {
        return dirty;
    }
    let Some(root) = tree.root() else {
        return dirty;
    };
    scan(tree, vec![root], changes, executor, &mut dirty);
    tracing::trace!(nodes = tree.len(), changes = changes.len(), dirty = dirty.len(), "dirty scan");
    dirty
}

/// Dirty nodes strictly below `id` that [`find_dirty`] skipped because `id`
/// itself was dirty and re-renderable.
///
/// Empty if `id` is unknown or not re-renderable, since the full scan
/// already descended into its children.
#[must_use]
pub fn find_dirty_below(
    tree: &RenderTree,
    id: NodeId,
    changes: &[RecordChange],
    executor: Option<&dyn QueryExecutor>,
) -> Vec<NodeId> {
    let mut dirty = Vec::new();
    let Some(node) = tree.get(id) else {
        return dirty;
    };
    if changes.is_empty() || !node.template().is_some_and(|t| t.needs_binding_context()) {
        return dirty;
    }
    scan(tree, child_nodes(node).rev().collect(), changes, executor, &mut dirty);
    tracing::trace!(node = %id, dirty = dirty.len(), "dirty scan below failed node");
    dirty
}

fn child_nodes(node: &tessera_view::RenderNode) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
    node.children().iter().filter_map(|child| match child {
        tessera_view::Child::Node(cid) => Some(*cid),
        tessera_view::Child::Const(_) => None,
    })
}

fn scan(
    tree: &RenderTree,
    mut stack: Vec<NodeId>,
    changes: &[RecordChange],
    executor: Option<&dyn QueryExecutor>,
    dirty: &mut Vec<NodeId>,
) {
    while let Some(id) = stack.pop() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        if is_dirty(node.deps(), changes, executor) {
            dirty.push(id);
            let rerenderable = node.template().is_some_and(|t| t.needs_binding_context());
            if rerenderable {
                continue;
            }
        }
        stack.extend(child_nodes(node).rev());
    }
}

/// True if any change in `changes` invalidates `deps`.
#[must_use]
pub fn is_dirty(deps: &DependencySet, changes: &[RecordChange], executor: Option<&dyn QueryExecutor>) -> bool {
    if deps.is_empty() {
        return false;
    }
    let by_record = changes.iter().any(|change| match change.kind() {
        ChangeKind::Saved => deps.affected_by_field_change(&**change.record()),
        ChangeKind::Destroyed => deps.depends_on(&change.key()),
    });
    if by_record {
        return true;
    }

    let Some(executor) = executor else {
        return false;
    };
    let touches_query = deps.queries().iter().any(|q| {
        changes
            .iter()
            .any(|c| c.key().type_name() == q.target.type_name())
    });
    touches_query && !deps.affected_by_query_change(executor).is_empty()
}
