//! # Render Benchmark
//!
//! 1. Full render of a collection partial over growing member lists
//! 2. Re-render of a single tracked leaf

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tessera_core::record::memory::MemRecord;
use tessera_core::{RecordRef, Schema, Value};
use tessera_view::{MemorySource, NodeKind, RenderRequest, RendererConfig, ViewContext, ViewRenderer};

fn renderer() -> ViewRenderer {
    let source = MemorySource::new().with("app/views/application/_user.erb", "<li><%= user.name %></li>");
    let ctx = ViewContext::new(RendererConfig::default(), Arc::new(Schema::new()), Box::new(source));
    ViewRenderer::new(Arc::new(ctx))
}

fn members(n: u64) -> Value {
    Value::List(
        (1..=n)
            .map(|i| Value::Record(MemRecord::new("User", i).with("name", format!("user{i}")).shared()))
            .collect(),
    )
}

fn bench_render_collection(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_collection");
    let r = renderer();
    for n in [10_u64, 100, 1000] {
        let users = members(n);
        group.bench_with_input(BenchmarkId::new("members", n), &users, |b, users| {
            b.iter(|| {
                let request = RenderRequest::inline("<ul><%= render users %></ul>").with_local("users", users.clone());
                black_box(r.render(request, None))
            });
        });
    }
    group.finish();
}

fn bench_rerender_leaf(c: &mut Criterion) {
    let r = renderer();
    let room: RecordRef = Arc::new(MemRecord::new("Room", 1).with("name", "g708"));
    let tree = r
        .render(RenderRequest::inline("Hi <%= room.name %>").with_local("room", room), None)
        .unwrap_or_default();
    let Some(leaf) = tree.nodes().find(|n| n.kind() == NodeKind::Leaf).map(|n| n.id()) else {
        return;
    };
    c.bench_function("rerender_leaf", |b| {
        b.iter(|| black_box(r.rerender_node(&tree, leaf, None)));
    });
}

criterion_group!(benches, bench_render_collection, bench_rerender_leaf);
criterion_main!(benches);
