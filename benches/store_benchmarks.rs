// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for Polystore batching and the hash driver

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use polystore::{
    batch, HashDriver, HashInsert, HashLookup, InMemoryStore, RecordStore, SingleInsert,
    StoreAdapter,
};
use serde_json::json;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

fn inserts(n: usize) -> Vec<HashInsert> {
    (0..n)
        .map(|i| {
            HashInsert::new("bench", i.to_string())
                .field("id", json!(i))
                .field("label", json!(format!("entry {i}")))
        })
        .collect()
}

fn lookups(n: usize) -> Vec<HashLookup> {
    (0..n)
        .map(|i| HashLookup::new("bench", i.to_string(), "id"))
        .collect()
}

// ============================================================================
// Batcher Benchmarks
// ============================================================================

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    group.throughput(Throughput::Elements(10_000));

    for size in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("split", size), &size, |b, &size| {
            b.iter(|| black_box(batch((0..10_000u32).collect::<Vec<_>>(), size)))
        });
    }

    group.finish();
}

// ============================================================================
// Hash Driver Benchmarks
// ============================================================================

fn bench_driver(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    rt.block_on(store.connect()).unwrap();

    let mut group = c.benchmark_group("driver");
    group.throughput(Throughput::Elements(5_000));

    for batch_size in [10usize, 100, 1000] {
        let driver = HashDriver::new(store.clone()).with_batch_size(batch_size);

        group.bench_with_input(
            BenchmarkId::new("insert_many", batch_size),
            &batch_size,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    driver
                        .insert_many(inserts(5_000), &CancellationToken::new())
                        .await
                        .unwrap()
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("find_many", batch_size),
            &batch_size,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    black_box(
                        driver
                            .find_many(lookups(5_000), &CancellationToken::new())
                            .await
                            .unwrap(),
                    )
                })
            },
        );
    }

    group.finish();
}

// ============================================================================
// Record Store Benchmarks
// ============================================================================

fn bench_record_store(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path().join("bench.redb"), "bench");
    rt.block_on(store.connect()).unwrap();

    let records: Vec<SingleInsert> = (0..1000)
        .map(|i| SingleInsert::new(i.to_string(), json!({"n": i})))
        .collect();
    let keys: Vec<String> = (0..1000).map(|i: u32| i.to_string()).collect();

    let mut group = c.benchmark_group("record_store");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("insert_many", |b| {
        b.to_async(&rt)
            .iter(|| async { store.insert_many("bench", &records).await.unwrap() });
    });

    group.bench_function("find_many", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(store.find_many("bench", &keys).await.unwrap()) });
    });

    group.finish();
    rt.block_on(store.close());
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(batch_benches, bench_batch);

criterion_group!(driver_benches, bench_driver);

criterion_group!(record_benches, bench_record_store);

criterion_main!(batch_benches, driver_benches, record_benches);
