//! # Pusher
//!
//! One update cycle for one client:
//!
//! ```text
//! ┌─────────────┐  drain   ┌────────────┐  rerender  ┌────────────────┐
//! │ChangeBuffer │ ───────▶ │ find_dirty │ ─────────▶ │ (old, fresh)   │
//! └─────────────┘          └────────────┘  in scope  │ text differs?  │
//!                                                    └───────┬────────┘
//!                 unsubscribe old ◀── swap ◀─────────────────┘
//!                 subscribe fresh ──▶ publish node_update
//! ```
//!
//! ## Rules
//!
//! 1. A node whose re-render fails is logged and skipped; dirty nodes below
//!    it are then re-rendered on their own
//! 2. A fresh render with the same text is discarded
//! 3. Publishing is fire-and-forget; a failed publish keeps the swap
//!
//! Render passes subscribe nodes as they first read data, so a change saved
//! while the pass runs lands in the client's buffer for the next cycle.
//! Subscriptions of nodes that never reach the live tree are released.

use crate::dirty::{find_dirty, find_dirty_below};
use crate::error::{PublishResult, PushResult};
use crate::publisher::Publisher;
use crate::session::{subscribe_subtree, ClientSession};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_core::{ChangeHub, FieldInterceptor, LiveSubscriptions, NodeId, RecordRef, Subscriber};
use tessera_security::{AccessScope, PolicyContext};
use tessera_shared::PushMessage;
use tessera_view::{DelimitedPrinter, RenderRequest, RenderTree, Rerendered, ViewRenderer, ViewResult};

/// Outcome counters of one push cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PushStats {
    /// Changes drained from the client's buffer.
    pub changes: usize,
    /// Dirty nodes found.
    pub dirty: usize,
    /// Re-renders that failed.
    pub failures: usize,
    /// Re-renders whose text matched the previous result.
    pub unchanged: usize,
    /// Node updates published.
    pub published: usize,
    /// Node updates swapped in but not delivered.
    pub publish_failures: usize,
}

impl PushStats {
    /// True if nothing was sent.
    #[must_use]
    pub const fn is_quiet(&self) -> bool {
        self.published == 0 && self.publish_failures == 0
    }
}

impl std::ops::AddAssign for PushStats {
    fn add_assign(&mut self, other: Self) {
        self.changes += other.changes;
        self.dirty += other.dirty;
        self.failures += other.failures;
        self.unchanged += other.unchanged;
        self.published += other.published;
        self.publish_failures += other.publish_failures;
    }
}

/// A tree rendered for and attached to a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachedView {
    /// Handle of the tree within the session.
    pub handle: u64,
    /// Page content sent to the client.
    pub html: String,
}

/// Runs render and update cycles for client sessions.
pub struct Pusher {
    renderer: ViewRenderer,
    hub: Arc<ChangeHub>,
    publisher: Arc<dyn Publisher>,
    policy: Option<Arc<PolicyContext>>,
    empty_on_read_violation: bool,
    delimit_nodes: bool,
    cycles: AtomicU64,
    published: AtomicU64,
}

impl Pusher {
    /// Creates a pusher without policy enforcement.
    #[must_use]
    pub fn new(renderer: ViewRenderer, hub: Arc<ChangeHub>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            renderer,
            hub,
            publisher,
            policy: None,
            empty_on_read_violation: false,
            delimit_nodes: true,
            cycles: AtomicU64::new(0),
            published: AtomicU64::new(0),
        }
    }

    /// Enforces policies of `context` for each session's principal.
    #[must_use]
    pub fn with_policy(mut self, context: Arc<PolicyContext>) -> Self {
        self.policy = Some(context);
        self
    }

    /// Denied reads yield empty values instead of failing the node.
    #[must_use]
    pub const fn empty_on_read_violation(mut self, enabled: bool) -> Self {
        self.empty_on_read_violation = enabled;
        self
    }

    /// Wrap tracked nodes in delimiter tags in page content and updates.
    #[must_use]
    pub const fn delimit_nodes(mut self, enabled: bool) -> Self {
        self.delimit_nodes = enabled;
        self
    }

    /// The renderer.
    #[must_use]
    pub const fn renderer(&self) -> &ViewRenderer {
        &self.renderer
    }

    /// The change hub.
    #[must_use]
    pub const fn hub(&self) -> &Arc<ChangeHub> {
        &self.hub
    }

    /// The policy context, if policies are enforced.
    #[must_use]
    pub const fn policy(&self) -> Option<&Arc<PolicyContext>> {
        self.policy.as_ref()
    }

    /// Push cycles run so far.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Node updates published so far.
    #[must_use]
    pub fn total_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    // =========================================================================
    // RENDER
    // =========================================================================

    /// Renders `request` for the session's principal and attaches the
    /// tree to the session.
    ///
    /// # Errors
    ///
    /// Any render failure, including policy denials.
    pub fn render(&self, session: &mut ClientSession, request: RenderRequest) -> PushResult<AttachedView> {
        if let Some(policy) = &self.policy {
            policy.begin_request();
        }
        let principal = Arc::clone(session.principal());
        let live = LiveSubscriptions::new(Arc::clone(&self.hub), session.id());
        let rendered = self.in_scope(&principal, |policy| {
            self.renderer.render_with(request, policy, Some(&live))
        });
        let tree = match rendered {
            Ok(tree) => tree,
            Err(e) => {
                live.release();
                return Err(e.into());
            }
        };
        let html = match tree.root() {
            Some(root) if self.delimit_nodes => DelimitedPrinter::outer(&tree, root),
            _ => tree.text(),
        };
        let handle = session.attach(&self.hub, tree);
        match session.tree(handle) {
            Some(tree) => live.release_unless(|id| tree.contains(id)),
            None => live.release(),
        };
        Ok(AttachedView { handle, html })
    }

    // =========================================================================
    // PUSH
    // =========================================================================

    /// Runs one update cycle for `session`.
    ///
    /// # Errors
    ///
    /// Only tree surgery failures, which indicate a bug; per-node failures
    /// are counted in the returned statistics.
    pub fn push(&self, session: &mut ClientSession) -> PushResult<PushStats> {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        let changes = session.buffer().drain();
        let mut stats = PushStats {
            changes: changes.len(),
            ..PushStats::default()
        };
        if changes.is_empty() {
            return Ok(stats);
        }
        if let Some(policy) = &self.policy {
            policy.begin_request();
        }

        let client = session.id();
        let principal = Arc::clone(session.principal());
        let channel = session.channel().to_owned();
        let executor = self.renderer.context().executor().cloned();

        for (handle, tree) in session.trees_mut() {
            let mut pending = find_dirty(tree, &changes, executor.as_deref());
            pending.reverse();

            let mut updates: Vec<(NodeId, RenderTree, LiveSubscriptions)> = Vec::new();
            while let Some(id) = pending.pop() {
                stats.dirty += 1;
                let live = LiveSubscriptions::new(Arc::clone(&self.hub), client);
                match self.rerender(tree, id, &principal, &live) {
                    Ok(Rerendered::Fragment(fresh)) if fresh.text() != tree.result(id) => {
                        updates.push((id, fresh, live));
                    }
                    Ok(_) => {
                        live.release();
                        stats.unchanged += 1;
                    }
                    Err(e) => {
                        live.release();
                        tracing::warn!(client = %client, tree = *handle, node = %id, "re-render failed: {}", e);
                        stats.failures += 1;
                        pending.extend(find_dirty_below(tree, id, &changes, executor.as_deref()).into_iter().rev());
                    }
                }
            }

            for (id, fresh, live) in updates {
                if !tree.contains(id) {
                    live.release();
                    continue;
                }
                let removed = match tree.swap(id, fresh) {
                    Ok(removed) => removed,
                    Err(e) => {
                        live.release();
                        return Err(e.into());
                    }
                };
                self.hub
                    .unsubscribe_all(removed.iter().map(|n| Subscriber::new(client, n.id())));
                subscribe_subtree(&self.hub, client, tree, id);
                live.release_unless(|n| tree.contains(n));

                let inner = if self.delimit_nodes {
                    DelimitedPrinter::inner(tree, id)
                } else {
                    tree.result(id)
                };
                match self.publisher.publish(&channel, &PushMessage::node_update(id.raw(), inner)) {
                    Ok(()) => stats.published += 1,
                    Err(e) => {
                        tracing::warn!(client = %client, node = %id, "publish failed: {}", e);
                        stats.publish_failures += 1;
                    }
                }
            }
        }

        self.published.fetch_add(stats.published as u64, Ordering::Relaxed);
        tracing::debug!(
            client = %client,
            changes = stats.changes,
            dirty = stats.dirty,
            published = stats.published,
            failures = stats.failures,
            "push cycle complete"
        );
        Ok(stats)
    }

    /// Publishes an arbitrary message on the session's channel.
    ///
    /// # Errors
    ///
    /// Delivery failures.
    pub fn publish(&self, session: &ClientSession, message: &PushMessage) -> PublishResult<()> {
        self.publisher.publish(session.channel(), message)
    }

    fn rerender(
        &self,
        tree: &RenderTree,
        id: NodeId,
        principal: &RecordRef,
        live: &LiveSubscriptions,
    ) -> ViewResult<Rerendered> {
        self.in_scope(principal, |policy| {
            self.renderer.rerender_node_with(tree, id, policy, Some(live))
        })
    }

    fn in_scope<R>(&self, principal: &RecordRef, f: impl FnOnce(Option<&mut dyn FieldInterceptor>) -> R) -> R {
        let Some(context) = &self.policy else {
            return f(None);
        };
        let mut scope = AccessScope::new(Arc::clone(context)).empty_on_read_violation(self.empty_on_read_violation);
        scope.with_policy_scope(principal, |s| {
            let mut guard = s.guard();
            f(guard.as_mut().map(|g| g as &mut dyn FieldInterceptor))
        })
    }
}

impl std::fmt::Debug for Pusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pusher")
            .field("policy", &self.policy.is_some())
            .field("empty_on_read_violation", &self.empty_on_read_violation)
            .field("delimit_nodes", &self.delimit_nodes)
            .field("cycles", &self.cycles())
            .finish_non_exhaustive()
    }
}
