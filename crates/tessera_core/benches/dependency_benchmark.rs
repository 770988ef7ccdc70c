//! # Dependency Check Benchmark
//!
//! Measures the staleness check run for every node of every subscribed tree
//! on each push:
//! 1. Field check against an unchanged record (the common, clean case)
//! 2. Field check after a change
//! 3. Change routing through the hub with many subscribers

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tessera_core::record::memory::MemRecord;
use tessera_core::{ChangeHub, ClientId, DependencySet, NodeId, Record, RecordChange, Subscriber, Topic};

fn deps_over(record: &MemRecord, fields: usize) -> DependencySet {
    let mut deps = DependencySet::new();
    for i in 0..fields {
        let name = format!("f{i}");
        deps.record_field_access(&record.key(), &name, record.read_field(&name));
    }
    deps
}

fn bench_field_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("affected_by_field_change");

    for fields in [1usize, 8, 64] {
        let record = MemRecord::new("User", 1);
        for i in 0..fields {
            record.set(&format!("f{i}"), i64::try_from(i).unwrap_or_default());
        }
        let deps = deps_over(&record, fields);

        group.bench_with_input(BenchmarkId::new("clean", fields), &fields, |b, _| {
            b.iter(|| black_box(deps.affected_by_field_change(black_box(&record))));
        });

        record.set("f0", "changed");
        group.bench_with_input(BenchmarkId::new("dirty", fields), &fields, |b, _| {
            b.iter(|| black_box(deps.affected_by_field_change(black_box(&record))));
        });
    }

    group.finish();
}

fn bench_hub_notify(c: &mut Criterion) {
    let mut group = c.benchmark_group("hub_notify");

    for clients in [10u64, 100, 500] {
        let hub = ChangeHub::new();
        let record = MemRecord::new("Room", 1).with("name", "g708").shared();
        for client in 0..clients {
            hub.register_client(ClientId::new(client));
            hub.subscribe(
                Subscriber::new(ClientId::new(client), NodeId::new(client)),
                [Topic::Record(record.key())],
            );
        }
        let change = RecordChange::saved(Arc::clone(&record));

        group.bench_with_input(BenchmarkId::new("clients", clients), &clients, |b, _| {
            b.iter(|| black_box(hub.notify(black_box(&change))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_field_check, bench_hub_notify);
criterion_main!(benches);
