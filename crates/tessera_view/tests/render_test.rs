//! Render passes over a small chat data set: tree shape, dependency
//! capture, re-render and swap, template files, policies.

use std::sync::Arc;
use tessera_core::record::memory::{MemRecord, MemStore};
use tessera_core::{FieldInterceptor, Record, RecordKey, RecordRef, RecordType, Schema, Value};
use tessera_security::{AccessScope, FieldSelector, Policy, PolicyConfig, PolicyContext, PolicyRegistry};
use tessera_view::{
    Child, MemorySource, NodeKind, RenderRequest, RendererConfig, Rerendered, ViewContext, ViewError, ViewRenderer,
};

fn schema() -> Arc<Schema> {
    Arc::new(
        Schema::new()
            .with_type(RecordType::new("User").field("name").field("status"))
            .with_type(RecordType::new("ChatRoom").field("name").many("members")),
    )
}

fn renderer(source: MemorySource, store: Option<Arc<MemStore>>) -> ViewRenderer {
    let mut ctx = ViewContext::new(RendererConfig::default(), schema(), Box::new(source));
    if let Some(store) = store {
        ctx = ctx.with_executor(store);
    }
    ViewRenderer::new(Arc::new(ctx))
}

fn chat_views() -> MemorySource {
    MemorySource::new()
        .with(
            "app/views/chat_room/_chat_room.erb",
            "<h1><%= chat_room.name %></h1><ul><%= render chat_room.members %></ul>",
        )
        .with("app/views/chat_room/_user.erb", "<li><%= user.name %></li>")
        .with("app/views/chat_room/_header.html.erb", "<b><%= chat_room.name %></b>")
}

fn chat_room(store: &MemStore) -> (Arc<MemRecord>, Arc<MemRecord>, Arc<MemRecord>) {
    let alice = store.create("User", [("name", "alice"), ("status", "active")]);
    let bob = store.create("User", [("name", "bob"), ("status", "busy")]);
    let members = Value::List(vec![
        Value::Record(Arc::clone(&alice) as RecordRef),
        Value::Record(Arc::clone(&bob) as RecordRef),
    ]);
    let room = store.create("ChatRoom", [("name", Value::from("g708")), ("members", members)]);
    (room, alice, bob)
}

#[test]
fn test_hi_room_end_to_end() {
    let room = Arc::new(MemRecord::new("Room", 1).with("name", "g708"));
    let r = renderer(MemorySource::new(), None);
    let mut tree = r
        .render(
            RenderRequest::inline("Hi <%= room.name %>").with_local("room", Arc::clone(&room) as RecordRef),
            None,
        )
        .unwrap();
    assert_eq!(tree.text(), "Hi g708");

    let root_id = tree.root().unwrap();
    let root = tree.node(root_id).unwrap();
    assert_eq!(root.kind(), NodeKind::Composite);
    assert_eq!(root.children().len(), 2);
    assert!(matches!(&root.children()[0], Child::Const(c) if c.text() == "Hi "));
    let leaf_id = root.children()[1].id();
    let leaf = tree.node(leaf_id).unwrap();
    assert_eq!(leaf.kind(), NodeKind::Leaf);
    assert_eq!(leaf.deps().objects().len(), 1);
    assert_eq!(leaf.deps().accesses_for(&RecordKey::new("Room", 1))[0].value, Value::from("g708"));

    room.set("name", "xxx");
    let dirty: Vec<_> = tree
        .preorder()
        .into_iter()
        .filter(|id| tree.node(*id).unwrap().deps().affected_by_field_change(&*room))
        .collect();
    assert_eq!(dirty, vec![leaf_id]);

    let Rerendered::Fragment(fresh) = r.rerender_node(&tree, leaf_id, None).unwrap() else {
        panic!("leaf should re-render");
    };
    assert_eq!(fresh.text(), "xxx");
    // the stored tree is untouched until the swap
    assert_eq!(tree.text(), "Hi g708");

    tree.swap(leaf_id, fresh).unwrap();
    assert_eq!(tree.text(), "Hi xxx");
    assert_eq!(tree.node(leaf_id).unwrap().output(), Some("xxx"));
    assert!(!tree.node(leaf_id).unwrap().deps().affected_by_field_change(&*room));
}

#[test]
fn test_object_partial_and_member_collection() {
    let store = MemStore::new();
    let (room, _, _) = chat_room(&store);
    let r = renderer(chat_views(), None);
    let tree = r
        .render(RenderRequest::object(Value::Record(room as RecordRef)).in_view("chat_room"), None)
        .unwrap();
    assert_eq!(tree.text(), "<h1>g708</h1><ul><li>alice</li><li>bob</li></ul>");
    let elements = tree.nodes().filter(|n| n.source() == "collection").count();
    assert_eq!(elements, 2);
}

#[test]
fn test_composite_chain_collapses_stage() {
    let store = MemStore::new();
    let (room, alice, _) = chat_room(&store);
    let r = renderer(chat_views(), None);
    let tree = r
        .render(
            RenderRequest::partial("header")
                .in_view("chat_room")
                .with_local("chat_room", Arc::clone(&room) as RecordRef),
            None,
        )
        .unwrap();
    assert_eq!(tree.text(), "<b>g708</b>");

    // the .erb stage was folded into the root; the .html stage is constant
    let root = tree.node(tree.root().unwrap()).unwrap();
    assert_eq!(tree.len(), 1);
    assert!(root.deps().depends_on(&room.key()));
    assert!(!root.deps().depends_on(&alice.key()));

    room.set("name", "xxx");
    let Rerendered::Fragment(fresh) = r.rerender_node(&tree, root.id(), None).unwrap() else {
        panic!("root should re-render");
    };
    assert_eq!(fresh.text(), "<b>xxx</b>");
}

#[test]
fn test_busy_members_filtered_and_status_denied() {
    let store = MemStore::new();
    let (room, alice, _) = chat_room(&store);
    let registry = PolicyRegistry::new().with(
        Policy::new("Chat", "Client")
            .restrict(FieldSelector::field("ChatRoom", "members"))
            .reads()
            .reject(|_, s| {
                s.value
                    .and_then(Value::as_record)
                    .is_some_and(|m| m.read_field("status").as_str() == Some("busy"))
            })
            .restrict(FieldSelector::field("User", "status"))
            .reads()
            .described("status is private")
            .when(|_, _| true),
    );
    let mut scope = AccessScope::new(Arc::new(PolicyContext::new(registry, PolicyConfig::default())));
    let client = MemRecord::new("Client", 1)
        .with("user", Value::Record(alice as RecordRef))
        .shared();
    let r = renderer(chat_views(), None);

    let text = scope.with_policy_scope(&client, |s| {
        let mut guard = s.guard().unwrap();
        r.render(
            RenderRequest::object(Value::Record(Arc::clone(&room) as RecordRef)).in_view("chat_room"),
            Some(&mut guard as &mut dyn FieldInterceptor),
        )
        .map(|t| t.text())
    });
    assert_eq!(text.unwrap(), "<h1>g708</h1><ul><li>alice</li></ul>");

    let denied = scope.with_policy_scope(&client, |s| {
        let mut guard = s.guard().unwrap();
        r.render(
            RenderRequest::inline("<%= room.name %>: <%= user.status %>")
                .with_local("room", Arc::clone(&room) as RecordRef)
                .with_local("user", room.read_field("members").as_list().unwrap()[0].clone()),
            Some(&mut guard as &mut dyn FieldInterceptor),
        )
    });
    let err = denied.unwrap_err();
    let d = err.access_denied().expect("policy denial");
    assert_eq!(d.field, "User.status");
    assert_eq!(d.rule, "status is private");
}

#[test]
fn test_read_violation_renders_empty_when_configured() {
    let registry = PolicyRegistry::new().with(
        Policy::new("Secrets", "Client")
            .restrict(FieldSelector::field("User", "pswd"))
            .when(|_, _| true),
    );
    let mut scope =
        AccessScope::new(Arc::new(PolicyContext::new(registry, PolicyConfig::default()))).empty_on_read_violation(true);
    let user = MemRecord::new("User", 9).with("name", "eve").with("pswd", "hunter2").shared();
    let client = MemRecord::new("Client", 1).shared();
    let r = renderer(MemorySource::new(), None);

    let text = scope.with_policy_scope(&client, |s| {
        let mut guard = s.guard().unwrap();
        r.render(
            RenderRequest::inline("<%= user.name %>[<%= user.pswd %>]").with_local("user", user),
            Some(&mut guard as &mut dyn FieldInterceptor),
        )
        .map(|t| t.text())
    });
    assert_eq!(text.unwrap(), "eve[]");
}

#[test]
fn test_query_is_tracked() {
    let store = Arc::new(MemStore::new());
    chat_room(&store);
    let r = renderer(MemorySource::new(), Some(Arc::clone(&store)));
    let tree = r.render(RenderRequest::inline("<%= @User.count %> users"), None).unwrap();
    assert_eq!(tree.text(), "2 users");

    let leaf = tree.nodes().find(|n| n.kind() == NodeKind::Leaf).unwrap();
    assert_eq!(leaf.deps().queries().len(), 1);
    assert!(leaf.deps().affected_by_query_change(&*store).is_empty());

    store.create("User", [("name", "carol")]);
    let changes = leaf.deps().affected_by_query_change(&*store);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].new_result, Value::from(3_i64));
}

#[test]
fn test_leaf_output_is_escaped() {
    let user = MemRecord::new("User", 1).with("name", "<script>").shared();
    let r = renderer(MemorySource::new(), None);
    let tree = r
        .render(RenderRequest::inline("<%= user.name %>").with_local("user", user), None)
        .unwrap();
    assert_eq!(tree.text(), "&lt;script&gt;");
}

#[test]
fn test_unknown_template_reports_candidates() {
    let r = renderer(chat_views(), None);
    let err = r
        .render(RenderRequest::template("missing").in_view("chat_room"), None)
        .unwrap_err();
    match err {
        ViewError::TemplateNotFound { view, candidates, .. } => {
            assert_eq!(view, "chat_room");
            assert!(candidates.contains(&"app/views/chat_room/missing".to_owned()));
            assert!(candidates.contains(&"app/views/missing.*".to_owned()));
        }
        other => panic!("expected TemplateNotFound, got {other}"),
    }
}

#[test]
fn test_unbound_local() {
    let r = renderer(MemorySource::new(), None);
    let err = r.render(RenderRequest::inline("<%= nobody.name %>"), None).unwrap_err();
    assert!(matches!(err, ViewError::UnboundLocal(name) if name == "nobody"));
}
