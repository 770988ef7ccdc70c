//! # Client Sessions
//!
//! Everything the server keeps for one connected client: who it is, where
//! its updates go, the trees it is looking at and the changes reported
//! since its last push.
//!
//! Every node of an attached tree that observed data is subscribed on the
//! change hub under `(client, node)`. Detaching or disconnecting removes
//! all of those registrations.

use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{ChangeBuffer, ChangeHub, ClientId, RecordRef, Subscriber};
use tessera_shared::constants::push_channel;
use tessera_view::RenderTree;

/// Per-client state.
#[derive(Debug)]
pub struct ClientSession {
    id: ClientId,
    principal: RecordRef,
    auth_token: String,
    channel: String,
    buffer: Arc<ChangeBuffer>,
    trees: BTreeMap<u64, RenderTree>,
    next_tree: u64,
}

impl ClientSession {
    /// Registers `id` on `hub` and creates its session.
    #[must_use]
    pub fn connect(
        hub: &ChangeHub,
        id: ClientId,
        principal: RecordRef,
        auth_token: impl Into<String>,
        channel_prefix: &str,
    ) -> Self {
        let auth_token = auth_token.into();
        let channel = push_channel(channel_prefix, &auth_token);
        let buffer = hub.register_client(id);
        tracing::info!(client = %id, %channel, "client connected");
        Self {
            id,
            principal,
            auth_token,
            channel,
            buffer,
            trees: BTreeMap::new(),
            next_tree: 0,
        }
    }

    /// Client id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    /// Principal policies are evaluated against.
    #[must_use]
    pub const fn principal(&self) -> &RecordRef {
        &self.principal
    }

    /// Token identifying the client's push channel.
    #[must_use]
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    /// Push channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Changes reported since the last push.
    #[must_use]
    pub const fn buffer(&self) -> &Arc<ChangeBuffer> {
        &self.buffer
    }

    /// Takes ownership of `tree` and subscribes its nodes. Returns the
    /// handle of the tree within this session.
    pub fn attach(&mut self, hub: &ChangeHub, tree: RenderTree) -> u64 {
        let handle = self.next_tree;
        self.next_tree += 1;
        let root = tree.root();
        let subscribed = root.map_or(0, |r| subscribe_subtree(hub, self.id, &tree, r));
        tracing::debug!(client = %self.id, tree = handle, nodes = tree.len(), subscribed, "tree attached");
        self.trees.insert(handle, tree);
        handle
    }

    /// Releases a tree and its registrations.
    pub fn detach(&mut self, hub: &ChangeHub, handle: u64) -> Option<RenderTree> {
        let tree = self.trees.remove(&handle)?;
        let subs: Vec<Subscriber> = tree.nodes().map(|n| Subscriber::new(self.id, n.id())).collect();
        hub.unsubscribe_all(subs);
        Some(tree)
    }

    /// Looks an attached tree up.
    #[must_use]
    pub fn tree(&self, handle: u64) -> Option<&RenderTree> {
        self.trees.get(&handle)
    }

    /// Handles of the attached trees.
    #[must_use]
    pub fn tree_handles(&self) -> Vec<u64> {
        self.trees.keys().copied().collect()
    }

    /// Number of attached trees.
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub(crate) fn trees_mut(&mut self) -> impl Iterator<Item = (&u64, &mut RenderTree)> {
        self.trees.iter_mut()
    }

    /// Drops every tree and unregisters the client from `hub`. The buffer
    /// stops receiving changes.
    pub fn disconnect(&mut self, hub: &ChangeHub) {
        self.trees.clear();
        self.buffer.drain();
        hub.unregister_client(self.id);
        tracing::info!(client = %self.id, "client disconnected");
    }
}

/// Subscribes every node of the subtree at `root` that observed data.
/// Returns the number of nodes subscribed.
pub(crate) fn subscribe_subtree(hub: &ChangeHub, client: ClientId, tree: &RenderTree, root: tessera_core::NodeId) -> usize {
    let mut count = 0;
    for id in tree.subtree(root) {
        let Some(node) = tree.get(id) else { continue };
        if node.deps().is_empty() {
            continue;
        }
        hub.subscribe(Subscriber::new(client, id), node.deps().topics());
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::record::memory::MemRecord;
    use tessera_core::{RecordChange, Schema};
    use tessera_view::{MemorySource, RenderRequest, RendererConfig, ViewContext, ViewRenderer};

    fn rendered(room: &RecordRef) -> RenderTree {
        let ctx = ViewContext::new(RendererConfig::default(), Arc::new(Schema::new()), Box::new(MemorySource::new()));
        ViewRenderer::new(Arc::new(ctx))
            .render(RenderRequest::inline("Hi <%= room.name %>").with_local("room", Arc::clone(room)), None)
            .unwrap()
    }

    #[test]
    fn test_attach_subscribes_tracked_nodes() {
        let hub = ChangeHub::new();
        let room = MemRecord::new("Room", 1).with("name", "g708").shared();
        let mut session =
            ClientSession::connect(&hub, ClientId::new(1), MemRecord::new("Client", 1).shared(), "tok", "/data/update/");
        assert_eq!(session.channel(), "/data/update/tok");

        session.attach(&hub, rendered(&room));
        assert_eq!(hub.subscription_count(), 1);
        assert_eq!(hub.notify(&RecordChange::saved(Arc::clone(&room))), 1);
        assert_eq!(session.buffer().len(), 1);
    }

    #[test]
    fn test_detach_and_disconnect_release_registrations() {
        let hub = ChangeHub::new();
        let room = MemRecord::new("Room", 1).with("name", "g708").shared();
        let mut session =
            ClientSession::connect(&hub, ClientId::new(1), MemRecord::new("Client", 1).shared(), "tok", "/data/update/");
        let a = session.attach(&hub, rendered(&room));
        session.attach(&hub, rendered(&room));
        assert_eq!(hub.subscription_count(), 2);

        assert!(session.detach(&hub, a).is_some());
        assert_eq!(hub.subscription_count(), 1);

        session.disconnect(&hub);
        assert_eq!(hub.subscription_count(), 0);
        assert_eq!(hub.notify(&RecordChange::saved(room)), 0);
    }
}
