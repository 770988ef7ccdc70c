//! # Dirty Benchmark
//!
//! 1. Dirty scan of a member list where one member changed
//! 2. Full push cycle re-rendering a single leaf

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tessera_core::record::memory::{MemRecord, MemStore};
use tessera_core::{ChangeHub, ClientId, RecordChange, RecordRef, Schema, Value};
use tessera_push::{find_dirty, ChannelPublisher, ClientSession, Publisher, Pusher};
use tessera_view::{MemorySource, RenderRequest, RendererConfig, ViewContext, ViewRenderer};

fn renderer() -> ViewRenderer {
    let source = MemorySource::new().with("app/views/application/_user.erb", "<li><%= user.name %></li>");
    let ctx = ViewContext::new(RendererConfig::default(), Arc::new(Schema::new()), Box::new(source));
    ViewRenderer::new(Arc::new(ctx))
}

fn bench_find_dirty(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_dirty");
    let r = renderer();
    for n in [10_u64, 100, 1000] {
        let users: Vec<Arc<MemRecord>> = (1..=n)
            .map(|i| Arc::new(MemRecord::new("User", i).with("name", format!("user{i}"))))
            .collect();
        let list = Value::List(users.iter().map(|u| Value::Record(Arc::clone(u) as RecordRef)).collect());
        let Ok(tree) = r.render(RenderRequest::inline("<ul><%= render users %></ul>").with_local("users", list), None)
        else {
            return;
        };
        users[0].set("name", "changed");
        let changes = [RecordChange::saved(Arc::clone(&users[0]) as RecordRef)];
        group.bench_with_input(BenchmarkId::new("members", n), &changes, |b, changes| {
            b.iter(|| black_box(find_dirty(&tree, changes, None)));
        });
    }
    group.finish();
}

fn bench_push_cycle(c: &mut Criterion) {
    let hub = Arc::new(ChangeHub::new());
    let store = MemStore::with_hub(Arc::clone(&hub));
    let publisher = Arc::new(ChannelPublisher::unbounded());
    let pusher = Pusher::new(renderer(), Arc::clone(&hub), Arc::clone(&publisher) as Arc<dyn Publisher>);
    let room = store.create("Room", [("name", "g708")]);
    let mut session =
        ClientSession::connect(&hub, ClientId::new(1), MemRecord::new("Client", 1).shared(), "bench", "/data/update/");
    let request = RenderRequest::inline("Hi <%= room.name %>").with_local("room", Arc::clone(&room) as RecordRef);
    if pusher.render(&mut session, request).is_err() {
        return;
    }

    let mut flip = false;
    c.bench_function("push_cycle", |b| {
        b.iter(|| {
            flip = !flip;
            room.set("name", if flip { "xxx" } else { "g708" });
            store.save(&room);
            let stats = pusher.push(&mut session);
            let _ = publisher.drain();
            black_box(stats)
        });
    });
}

criterion_group!(benches, bench_find_dirty, bench_push_cycle);
criterion_main!(benches);
