//! # Tessera Chat Demo
//!
//! Scripted chat room: two clients watch the same room, records change,
//! pushes are logged.
//!
//! ```bash
//! RUST_LOG=debug tessera_chat [config.toml]
//! ```

use std::sync::Arc;
use tessera::core::record::memory::MemStore;
use tessera::core::{ChangeHub, RecordRef, RecordType, Schema, Value};
use tessera::security::{FieldSelector, Policy, PolicyRegistry};
use tessera::shared::StatusKind;
use tessera::view::{MemorySource, RenderRequest};
use tessera::{Engine, EngineConfig, EngineError};
use tracing_subscriber::EnvFilter;

fn templates() -> MemorySource {
    MemorySource::new()
        .with(
            "app/views/chat_room/_chat_room.erb",
            "<h1><%= chat_room.name %></h1><ul><%= render chat_room.members %></ul><p><%= @Message.count %> messages</p>",
        )
        .with("app/views/chat_room/_user.erb", "<li><%= user.name %> (<%= user.status %>)</li>")
}

fn policies() -> PolicyRegistry {
    PolicyRegistry::new().with(
        Policy::new("Presence", "Client")
            .restrict(FieldSelector::field("ChatRoom", "members"))
            .reads()
            .described("busy members are hidden")
            .reject(|_, s| {
                s.value
                    .and_then(Value::as_record)
                    .is_some_and(|m| m.read_field("status").as_str() == Some("busy"))
            }),
    )
}

fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let hub = Arc::new(ChangeHub::new());
    let store = Arc::new(MemStore::with_hub(Arc::clone(&hub)));
    let schema = Schema::new()
        .with_type(RecordType::new("User").field("name").field("status"))
        .with_type(RecordType::new("ChatRoom").field("name").many("members"))
        .with_type(RecordType::new("Message").field("text"));

    let engine = Engine::builder(config)
        .schema(Arc::new(schema))
        .templates(templates())
        .executor(Arc::clone(&store) as Arc<dyn tessera::core::QueryExecutor>)
        .policies(policies())
        .hub(Arc::clone(&hub))
        .build()?;
    let Some(outbox) = engine.outbox() else {
        return Ok(());
    };

    let alice = store.create("User", [("name", "alice"), ("status", "active")]);
    let bob = store.create("User", [("name", "bob"), ("status", "active")]);
    let members = Value::List(vec![
        Value::Record(Arc::clone(&alice) as RecordRef),
        Value::Record(Arc::clone(&bob) as RecordRef),
    ]);
    let room = store.create("ChatRoom", [("name", Value::from("g708")), ("members", members)]);

    let clients = [
        engine.connect(store.create("Client", [("user", Value::Record(Arc::clone(&alice) as RecordRef))]), "alice-token"),
        engine.connect(store.create("Client", [("user", Value::Record(Arc::clone(&bob) as RecordRef))]), "bob-token"),
    ];
    for client in clients {
        let view = engine.render_for(
            client,
            RenderRequest::object(Value::Record(Arc::clone(&room) as RecordRef)).in_view("chat_room"),
        )?;
        tracing::info!(client = %client, "initial page: {}", view.html);
    }

    room.set("name", "the lounge");
    store.save(&room);
    bob.set("status", "busy");
    store.save(&bob);
    let message = store.create("Message", [("text", "hello")]);
    store.save(&message);

    let stats = engine.push_all()?;
    tracing::info!(?stats, "push complete");
    engine.publish_status(clients[0], StatusKind::Success, "message sent", 200)?;

    for envelope in outbox.try_iter() {
        tracing::info!(channel = %envelope.channel, "{:?}", envelope.message);
    }
    Ok(())
}
