//! # Change Hub
//!
//! Listener registration table plus per-client change buffers.
//!
//! ```text
//!  persistence layer            ChangeHub                         client sessions
//! ┌───────────────┐   notify  ┌──────────────────────────┐  push  ┌──────────────┐
//! │ save/destroy  │ ────────▶ │ Topic → {(client, node)} │ ─────▶ │ ChangeBuffer │
//! └───────────────┘           └──────────────────────────┘        └──────────────┘
//! ```
//!
//! A subscription is owned by one render node of one client. Nodes leaving
//! a live tree (swap or disposal) must unsubscribe; the hub never holds a
//! reference to the nodes themselves, only their ids.
//!
//! Both tables are behind `RwLock`s: render passes for different clients run
//! on different threads and register concurrently with notifications.

use crate::ids::{ClientId, NodeId};
use crate::record::{RecordKey, RecordRef};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lifecycle event kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Record persisted with (possibly) new field values.
    Saved,
    /// Record removed.
    Destroyed,
}

/// A lifecycle notification.
#[derive(Clone, Debug)]
pub struct RecordChange {
    record: RecordRef,
    kind: ChangeKind,
}

impl RecordChange {
    /// Creates a notification.
    #[must_use]
    pub fn new(record: RecordRef, kind: ChangeKind) -> Self {
        Self { record, kind }
    }

    /// Shorthand for a save notification.
    #[must_use]
    pub fn saved(record: RecordRef) -> Self {
        Self::new(record, ChangeKind::Saved)
    }

    /// Shorthand for a destroy notification.
    #[must_use]
    pub fn destroyed(record: RecordRef) -> Self {
        Self::new(record, ChangeKind::Destroyed)
    }

    /// The changed record.
    #[must_use]
    pub fn record(&self) -> &RecordRef {
        &self.record
    }

    /// Its identity.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        self.record.key()
    }

    /// Event kind.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        self.kind
    }
}

/// What a subscription listens on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Events about one record.
    Record(RecordKey),
    /// Events about any record of a type (used by query dependencies).
    Type(Arc<str>),
}

/// Owner of a subscription: one node of one client's tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subscriber {
    /// Owning client.
    pub client: ClientId,
    /// Owning node.
    pub node: NodeId,
}

impl Subscriber {
    /// Creates a subscriber handle.
    #[must_use]
    pub const fn new(client: ClientId, node: NodeId) -> Self {
        Self { client, node }
    }
}

/// Changes reported for one client since its last push.
#[derive(Debug, Default)]
pub struct ChangeBuffer {
    pending: Mutex<Vec<RecordChange>>,
}

impl ChangeBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a change. A record already pending is replaced by its latest
    /// state; a destroy is never downgraded back to a save.
    pub fn push(&self, change: RecordChange) {
        let key = change.key();
        let mut pending = self.pending.lock();
        if let Some(existing) = pending.iter_mut().find(|c| c.key() == key) {
            let kind = if existing.kind == ChangeKind::Destroyed {
                ChangeKind::Destroyed
            } else {
                change.kind
            };
            *existing = RecordChange::new(change.record, kind);
        } else {
            pending.push(change);
        }
    }

    /// Takes every pending change. Changes pushed after this returns land
    /// in the next drain.
    pub fn drain(&self) -> Vec<RecordChange> {
        let mut pending = self.pending.lock();
        std::mem::take(&mut *pending)
    }

    /// Number of pending changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// True when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

#[derive(Debug, Default)]
struct Registry {
    by_topic: HashMap<Topic, HashSet<Subscriber>>,
    by_subscriber: HashMap<Subscriber, Vec<Topic>>,
}

impl Registry {
    fn remove_subscriber(&mut self, sub: Subscriber) -> usize {
        let Some(topics) = self.by_subscriber.remove(&sub) else {
            return 0;
        };
        for topic in &topics {
            if let Some(subs) = self.by_topic.get_mut(topic) {
                subs.remove(&sub);
                if subs.is_empty() {
                    self.by_topic.remove(topic);
                }
            }
        }
        topics.len()
    }
}

/// Routes lifecycle notifications to the clients whose nodes depend on them.
#[derive(Debug, Default)]
pub struct ChangeHub {
    registry: RwLock<Registry>,
    buffers: RwLock<HashMap<ClientId, Arc<ChangeBuffer>>>,
    notifications: AtomicU64,
}

impl ChangeHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // CLIENTS
    // =========================================================================

    /// Registers a client and returns its change buffer.
    ///
    /// Registering twice returns the existing buffer.
    pub fn register_client(&self, client: ClientId) -> Arc<ChangeBuffer> {
        let mut buffers = self.buffers.write();
        Arc::clone(buffers.entry(client).or_default())
    }

    /// Drops a client's buffer and every subscription it owns.
    pub fn unregister_client(&self, client: ClientId) {
        self.buffers.write().remove(&client);
        let mut registry = self.registry.write();
        let owned: Vec<Subscriber> = registry
            .by_subscriber
            .keys()
            .filter(|s| s.client == client)
            .copied()
            .collect();
        for sub in owned {
            registry.remove_subscriber(sub);
        }
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Adds `topics` to `sub`'s subscriptions.
    pub fn subscribe(&self, sub: Subscriber, topics: impl IntoIterator<Item = Topic>) {
        let mut registry = self.registry.write();
        for topic in topics {
            let added = registry
                .by_topic
                .entry(topic.clone())
                .or_default()
                .insert(sub);
            if added {
                registry.by_subscriber.entry(sub).or_default().push(topic);
            }
        }
    }

    /// Removes every subscription of `sub`; returns how many were removed.
    pub fn unsubscribe(&self, sub: Subscriber) -> usize {
        self.registry.write().remove_subscriber(sub)
    }

    /// Removes every subscription of every listed subscriber.
    pub fn unsubscribe_all(&self, subs: impl IntoIterator<Item = Subscriber>) -> usize {
        let mut registry = self.registry.write();
        subs.into_iter().map(|s| registry.remove_subscriber(s)).sum()
    }

    /// True if `sub` has at least one subscription.
    #[must_use]
    pub fn is_subscribed(&self, sub: Subscriber) -> bool {
        self.registry.read().by_subscriber.contains_key(&sub)
    }

    /// Topics `sub` listens on.
    #[must_use]
    pub fn topics_of(&self, sub: Subscriber) -> Vec<Topic> {
        self.registry
            .read()
            .by_subscriber
            .get(&sub)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of `(topic, subscriber)` registrations.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.registry.read().by_subscriber.values().map(Vec::len).sum()
    }

    // =========================================================================
    // NOTIFICATION
    // =========================================================================

    /// Delivers `change` to the buffer of every client with a node listening
    /// on the record or its type. Returns the number of clients reached.
    pub fn notify(&self, change: &RecordChange) -> usize {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        let key = change.key();
        let clients: HashSet<ClientId> = {
            let registry = self.registry.read();
            let by_record = registry.by_topic.get(&Topic::Record(key.clone()));
            let by_type = registry.by_topic.get(&Topic::Type(key.type_name_arc()));
            by_record
                .into_iter()
                .chain(by_type)
                .flatten()
                .map(|s| s.client)
                .collect()
        };
        if clients.is_empty() {
            tracing::trace!("No listeners for {}", key);
            return 0;
        }
        let buffers = self.buffers.read();
        let mut reached = 0;
        for client in clients {
            if let Some(buffer) = buffers.get(&client) {
                buffer.push(change.clone());
                reached += 1;
            }
        }
        tracing::debug!("Change to {} routed to {} client(s)", key, reached);
        reached
    }

    /// Notifications seen since creation.
    #[must_use]
    pub fn notification_count(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }
}

/// Subscriptions taken out by one render pass as its nodes first observe
/// data. Changes landing while the pass is still running reach the client.
///
/// Registrations of nodes that do not end up in a live tree (a discarded
/// re-render, a collapsed stage, a failed pass) are released afterwards.
#[derive(Debug)]
pub struct LiveSubscriptions {
    hub: Arc<ChangeHub>,
    client: ClientId,
    nodes: Mutex<Vec<NodeId>>,
}

impl LiveSubscriptions {
    /// Starts an empty set for `client`.
    #[must_use]
    pub fn new(hub: Arc<ChangeHub>, client: ClientId) -> Self {
        Self {
            hub,
            client,
            nodes: Mutex::new(Vec::new()),
        }
    }

    /// Owning client.
    #[must_use]
    pub const fn client(&self) -> ClientId {
        self.client
    }

    /// Subscribes `node` to `topic` right away.
    pub fn listen(&self, node: NodeId, topic: Topic) {
        self.hub.subscribe(Subscriber::new(self.client, node), [topic]);
        let mut nodes = self.nodes.lock();
        if !nodes.contains(&node) {
            nodes.push(node);
        }
    }

    /// Nodes registered so far.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeId> {
        self.nodes.lock().clone()
    }

    /// Unsubscribes every registered node `keep` rejects and forgets the
    /// rest. Returns the number of nodes released.
    pub fn release_unless(&self, keep: impl Fn(NodeId) -> bool) -> usize {
        let nodes = std::mem::take(&mut *self.nodes.lock());
        let dropped: Vec<Subscriber> = nodes
            .into_iter()
            .filter(|n| !keep(*n))
            .map(|n| Subscriber::new(self.client, n))
            .collect();
        let released = dropped.len();
        self.hub.unsubscribe_all(dropped);
        released
    }

    /// Unsubscribes every registered node.
    pub fn release(&self) -> usize {
        self.release_unless(|_| false)
    }
}
