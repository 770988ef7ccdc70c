//! Push cycles end to end: render for a client, change records through the
//! store, push, inspect published messages and the live tree.

use std::sync::Arc;
use tessera_core::record::memory::{MemRecord, MemStore};
use tessera_core::{ChangeHub, ClientId, QueryExecutor, NodeId, Record, RecordError, RecordKey, RecordRef, Schema, Subscriber, Value};
use tessera_push::{BroadcastPublisher, ChannelPublisher, ClientSession, Publisher, Pusher};
use tessera_security::{FieldSelector, Policy, PolicyConfig, PolicyContext, PolicyRegistry};
use tessera_shared::PushMessage;
use tessera_view::{MemorySource, NodeKind, RenderRequest, RendererConfig, ViewContext, ViewRenderer};

struct Fixture {
    hub: Arc<ChangeHub>,
    store: Arc<MemStore>,
    publisher: Arc<ChannelPublisher>,
    pusher: Pusher,
}

fn fixture(source: MemorySource) -> Fixture {
    let hub = Arc::new(ChangeHub::new());
    let store = Arc::new(MemStore::with_hub(Arc::clone(&hub)));
    let publisher = Arc::new(ChannelPublisher::unbounded());
    let ctx = ViewContext::new(RendererConfig::default(), Arc::new(Schema::new()), Box::new(source))
        .with_executor(Arc::clone(&store) as Arc<dyn QueryExecutor>);
    let pusher = Pusher::new(
        ViewRenderer::new(Arc::new(ctx)),
        Arc::clone(&hub),
        Arc::clone(&publisher) as Arc<dyn Publisher>,
    );
    Fixture {
        hub,
        store,
        publisher,
        pusher,
    }
}

fn connect(f: &Fixture, id: u64) -> ClientSession {
    ClientSession::connect(&f.hub, ClientId::new(id), MemRecord::new("Client", id).shared(), format!("tok{id}"), "/data/update/")
}

fn leaves(session: &ClientSession, handle: u64) -> Vec<NodeId> {
    let tree = session.tree(handle).unwrap();
    tree.preorder()
        .into_iter()
        .filter(|id| tree.get(*id).unwrap().kind() == NodeKind::Leaf)
        .collect()
}

#[test]
fn test_hi_room_push() {
    let f = fixture(MemorySource::new());
    let room = f.store.create("Room", [("name", "g708")]);
    let mut session = connect(&f, 1);

    let view = f
        .pusher
        .render(
            &mut session,
            RenderRequest::inline("Hi <%= room.name %>").with_local("room", Arc::clone(&room) as RecordRef),
        )
        .unwrap();
    let leaf = leaves(&session, view.handle)[0];
    assert_eq!(
        view.html,
        format!("Hi  <reds_{leaf}></reds_{leaf}> g708 <rede_{leaf}></rede_{leaf}> ")
    );

    room.set("name", "xxx");
    f.store.save(&room);
    let stats = f.pusher.push(&mut session).unwrap();
    assert_eq!(stats.changes, 1);
    assert_eq!(stats.dirty, 1);
    assert_eq!(stats.published, 1);

    let sent = f.publisher.drain();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, "/data/update/tok1");
    assert_eq!(sent[0].message, PushMessage::node_update(leaf.raw(), "xxx"));
    assert_eq!(session.tree(view.handle).unwrap().text(), "Hi xxx");
}

#[test]
fn test_swapped_node_keeps_listening() {
    let f = fixture(MemorySource::new());
    let room = f.store.create("Room", [("name", "g708")]);
    let mut session = connect(&f, 1);
    let view = f
        .pusher
        .render(
            &mut session,
            RenderRequest::inline("Hi <%= room.name %>").with_local("room", Arc::clone(&room) as RecordRef),
        )
        .unwrap();
    let leaf = leaves(&session, view.handle)[0];

    for name in ["xxx", "yyy"] {
        room.set("name", name);
        f.store.save(&room);
        assert_eq!(f.pusher.push(&mut session).unwrap().published, 1);
        assert!(f.hub.is_subscribed(Subscriber::new(session.id(), leaf)));
    }
    let sent = f.publisher.drain();
    assert_eq!(sent[1].message, PushMessage::node_update(leaf.raw(), "yyy"));
    assert_eq!(f.pusher.total_published(), 2);
    assert_eq!(f.hub.subscription_count(), 1);
}

#[test]
fn test_failing_node_does_not_block_others() {
    let registry = PolicyRegistry::new().with(
        Policy::new("Privacy", "Client")
            .restrict(FieldSelector::field("User", "status"))
            .reads()
            .described("status is hidden")
            .when(|_, s| s.record.read_field("hidden").as_bool() == Some(true)),
    );
    let policy = Arc::new(PolicyContext::new(registry, PolicyConfig::default()));
    let mut f = fixture(MemorySource::new());
    f.pusher = f.pusher.with_policy(policy).delimit_nodes(false);

    let room = f.store.create("Room", [("name", "g708")]);
    let user = f.store.create("User", [("status", Value::from("active")), ("hidden", Value::Bool(false))]);
    let mut session = connect(&f, 1);
    let view = f
        .pusher
        .render(
            &mut session,
            RenderRequest::inline("<%= room.name %>|<%= user.status %>")
                .with_local("room", Arc::clone(&room) as RecordRef)
                .with_local("user", Arc::clone(&user) as RecordRef),
        )
        .unwrap();
    assert_eq!(view.html, "g708|active");
    let room_leaf = leaves(&session, view.handle)[0];

    user.set("status", "away");
    user.set("hidden", true);
    f.store.save(&user);
    room.set("name", "xxx");
    f.store.save(&room);

    let stats = f.pusher.push(&mut session).unwrap();
    assert_eq!(stats.changes, 2);
    assert_eq!(stats.dirty, 2);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.published, 1);

    let sent = f.publisher.drain();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].message, PushMessage::node_update(room_leaf.raw(), "xxx"));
    assert_eq!(session.tree(view.handle).unwrap().text(), "xxx|active");
}

#[test]
fn test_denied_parent_still_updates_dirty_children() {
    let registry = PolicyRegistry::new().with(
        Policy::new("Lockdown", "Client")
            .restrict(FieldSelector::field("Room", "members"))
            .reads()
            .described("locked rooms hide their members")
            .when(|_, s| s.record.read_field("locked").as_bool() == Some(true)),
    );
    let policy = Arc::new(PolicyContext::new(registry, PolicyConfig::default()));
    let mut f = fixture(MemorySource::new().with("app/views/application/_user.erb", "<li><%= user.name %></li>"));
    f.pusher = f.pusher.with_policy(policy).delimit_nodes(false);

    let alice = f.store.create("User", [("name", "alice")]);
    let bob = f.store.create("User", [("name", "bob")]);
    let room = f
        .store
        .create("Room", [("members", Value::List(vec![Value::Record(Arc::clone(&alice) as RecordRef)]))]);
    let mut session = connect(&f, 1);
    let view = f
        .pusher
        .render(
            &mut session,
            RenderRequest::inline("<ul><%= render room.members %></ul>").with_local("room", Arc::clone(&room) as RecordRef),
        )
        .unwrap();
    assert_eq!(view.html, "<ul><li>alice</li></ul>");
    let name_leaf = leaves(&session, view.handle)[0];

    room.set(
        "members",
        Value::List(vec![
            Value::Record(Arc::clone(&alice) as RecordRef),
            Value::Record(bob as RecordRef),
        ]),
    );
    room.set("locked", true);
    f.store.save(&room);
    alice.set("name", "ally");
    f.store.save(&alice);

    let stats = f.pusher.push(&mut session).unwrap();
    assert_eq!(stats.changes, 2);
    assert_eq!(stats.dirty, 2);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.published, 1);

    let sent = f.publisher.drain();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].message, PushMessage::node_update(name_leaf.raw(), "ally"));
    assert_eq!(session.tree(view.handle).unwrap().text(), "<ul><li>ally</li></ul>");
}

/// Saves `room` under a new name whenever one of its own fields is read.
#[derive(Debug)]
struct Renamer {
    store: Arc<MemStore>,
    room: Arc<MemRecord>,
}

impl Record for Renamer {
    fn key(&self) -> RecordKey {
        RecordKey::new("Renamer", 1)
    }

    fn read_field(&self, _: &str) -> Value {
        self.room.set("name", "changed");
        self.store.save(&self.room);
        Value::from("t")
    }

    fn write_field(&self, _: &str, _: Value) -> Result<(), RecordError> {
        Ok(())
    }
}

#[test]
fn test_change_during_render_reaches_next_push() {
    let mut f = fixture(MemorySource::new());
    f.pusher = f.pusher.delimit_nodes(false);
    let room = f.store.create("Room", [("name", "g708")]);
    let renamer: RecordRef = Arc::new(Renamer {
        store: Arc::clone(&f.store),
        room: Arc::clone(&room),
    });
    let mut session = connect(&f, 1);
    let view = f
        .pusher
        .render(
            &mut session,
            RenderRequest::inline("<%= room.name %>|<%= trig.x %>")
                .with_local("room", Arc::clone(&room) as RecordRef)
                .with_local("trig", renamer),
        )
        .unwrap();
    assert_eq!(view.html, "g708|t");
    let room_leaf = leaves(&session, view.handle)[0];

    let stats = f.pusher.push(&mut session).unwrap();
    assert_eq!(stats.changes, 1);
    assert_eq!(stats.published, 1);
    assert_eq!(f.publisher.drain()[0].message, PushMessage::node_update(room_leaf.raw(), "changed"));
    assert_eq!(session.tree(view.handle).unwrap().text(), "changed|t");
    assert_eq!(f.hub.subscription_count(), 2);
}

#[test]
fn test_destroy_dirties_observing_nodes() {
    let f = fixture(MemorySource::new().with("app/views/application/_user.erb", "<li><%= user.name %></li>"));
    let alice = f.store.create("User", [("name", "alice")]);
    let bob = f.store.create("User", [("name", "bob")]);
    let mut session = connect(&f, 1);
    f.pusher
        .render(
            &mut session,
            RenderRequest::inline("<ul><%= render users %></ul>").with_local(
                "users",
                Value::List(vec![
                    Value::Record(Arc::clone(&alice) as RecordRef),
                    Value::Record(Arc::clone(&bob) as RecordRef),
                ]),
            ),
        )
        .unwrap();

    f.store.destroy(&bob).unwrap();
    let stats = f.pusher.push(&mut session).unwrap();
    assert_eq!(stats.dirty, 1);
    // the record object is still readable, so the text does not change
    assert_eq!(stats.unchanged, 1);
    assert!(stats.is_quiet());
}

#[test]
fn test_query_node_updates_on_create() {
    let f = fixture(MemorySource::new());
    f.store.create("User", [("name", "alice")]);
    let mut session = connect(&f, 1);
    let view = f
        .pusher
        .render(&mut session, RenderRequest::inline("<%= @User.count %> online"))
        .unwrap();
    let leaf = leaves(&session, view.handle)[0];

    let carol = f.store.create("User", [("name", "carol")]);
    f.store.save(&carol);
    let stats = f.pusher.push(&mut session).unwrap();
    assert_eq!(stats.published, 1);
    assert_eq!(f.publisher.drain()[0].message, PushMessage::node_update(leaf.raw(), "2"));
}

#[test]
fn test_clients_are_isolated() {
    let f = fixture(MemorySource::new());
    let room = f.store.create("Room", [("name", "g708")]);
    let other = f.store.create("Room", [("name", "h101")]);
    let mut first = connect(&f, 1);
    let mut second = connect(&f, 2);
    for (session, r) in [(&mut first, &room), (&mut second, &other)] {
        f.pusher
            .render(session, RenderRequest::inline("<%= room.name %>").with_local("room", Arc::clone(r) as RecordRef))
            .unwrap();
    }

    room.set("name", "xxx");
    f.store.save(&room);
    assert_eq!(f.pusher.push(&mut second).unwrap().changes, 0);
    assert_eq!(f.pusher.push(&mut first).unwrap().published, 1);
    assert_eq!(f.publisher.drain()[0].channel, "/data/update/tok1");
}

#[test]
fn test_disconnect_releases_everything() {
    let f = fixture(MemorySource::new());
    let room = f.store.create("Room", [("name", "g708")]);
    let mut session = connect(&f, 1);
    f.pusher
        .render(
            &mut session,
            RenderRequest::inline("<%= room.name %> <%= room.name %>").with_local("room", Arc::clone(&room) as RecordRef),
        )
        .unwrap();
    assert_eq!(f.hub.subscription_count(), 2);

    session.disconnect(&f.hub);
    assert_eq!(f.hub.subscription_count(), 0);
    room.set("name", "xxx");
    f.store.save(&room);
    assert_eq!(f.hub.notify(&tessera_core::RecordChange::saved(room as RecordRef)), 0);
}

#[test]
fn test_broadcast_delivery_as_json() {
    let hub = Arc::new(ChangeHub::new());
    let store = Arc::new(MemStore::with_hub(Arc::clone(&hub)));
    let broadcast = Arc::new(BroadcastPublisher::new(16));
    let mut rx = broadcast.subscribe();
    let ctx = ViewContext::new(RendererConfig::default(), Arc::new(Schema::new()), Box::new(MemorySource::new()));
    let pusher = Pusher::new(ViewRenderer::new(Arc::new(ctx)), Arc::clone(&hub), broadcast);

    let room = store.create("Room", [("name", "g708")]);
    let mut session =
        ClientSession::connect(&hub, ClientId::new(3), MemRecord::new("Client", 3).shared(), "abc", "/data/update/");
    pusher
        .render(&mut session, RenderRequest::inline("<%= room.name %>").with_local("room", Arc::clone(&room) as RecordRef))
        .unwrap();
    room.set("name", "xxx");
    store.save(&room);
    assert_eq!(pusher.push(&mut session).unwrap().published, 1);

    let (channel, json) = rx.try_recv().unwrap();
    assert_eq!(channel, "/data/update/abc");
    let PushMessage::NodeUpdate(update) = PushMessage::from_json(&json).unwrap() else {
        panic!("expected a node update");
    };
    assert_eq!(update.inner_html, "xxx");
}
