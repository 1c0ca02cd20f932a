//! Throughput benchmarks for Roomcast.
//!
//! These benchmarks measure the raw broadcast throughput of the hub.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use roomcast_bench::{bench_config, payload, runtime, Fixture};
use roomcast_core::{Registry, RoomId};
use std::sync::Arc;

/// Benchmark registry join and leave.
fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    group.bench_function("join_leave_new_room", |b| {
        let registry = Arc::new(Registry::new());
        b.iter(|| {
            let session = registry.join(black_box(RoomId::new_v4())).unwrap();
            session.leave()
        });
    });

    group.bench_function("join_leave_shared_room", |b| {
        let registry = Arc::new(Registry::new());
        let room = RoomId::new_v4();
        let _anchor = registry.join(room).unwrap();
        b.iter(|| {
            let session = registry.join(black_box(room)).unwrap();
            session.leave()
        });
    });

    group.finish();
}

/// Benchmark broadcast with payloads of different sizes.
fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast");
    let rt = runtime();

    for size in [64usize, 1024, 65536] {
        let fixture = Fixture::new(1, bench_config(1));
        let data = payload(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    fixture.sender.send(black_box(data.clone())).await.unwrap();
                    fixture.drain_one().await;
                });
            });
        });
    }

    group.finish();
}

/// Benchmark fan-out scenarios.
fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");
    let rt = runtime();

    for size in [10usize, 100, 1000] {
        let fixture = Fixture::new(size, bench_config(size));
        let data = payload(64);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            // Listeners never read; drop-oldest keeps their queues bounded.
            b.iter(|| rt.block_on(fixture.sender.send(black_box(data.clone()))));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_registry,
    bench_broadcast,
    bench_fanout,
);
criterion_main!(benches);
