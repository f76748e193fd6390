use std::sync::Arc;

use cache::{Cache, InMemoryCache, keys};
use common::AggregateId;
use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use dispatch::{DispatcherConfig, OutboxDispatcher, invalidation_handlers};
use serde_json::json;
use store::{ChangeSet, InMemoryStore, OutboxEntry, Store};

/// Commits `n` CategoryRenamed entries, each for its own category.
async fn seed_outbox(n: usize) -> InMemoryStore {
    let store = InMemoryStore::new();
    let mut changes = ChangeSet::new();
    for i in 0..n {
        let id = AggregateId::new();
        changes.outbox.push(
            OutboxEntry::builder()
                .aggregate_id(id)
                .aggregate_type("Category")
                .event_type("CategoryRenamed")
                .payload_raw(json!({
                    "type": "CategoryRenamed",
                    "data": { "category_id": id, "slug": format!("category-{i}") }
                }))
                .build(),
        );
    }
    store.commit(changes).await.unwrap();
    store
}

fn bench_dispatch_batch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("dispatch/batch");

    for size in [10usize, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || rt.block_on(seed_outbox(size)),
                |store| {
                    rt.block_on(async {
                        let cache = InMemoryCache::new();
                        let mut dispatcher =
                            OutboxDispatcher::new(store, DispatcherConfig::default());
                        dispatcher.register_all(invalidation_handlers(Arc::new(cache)));
                        let report = dispatcher.dispatch_batch().await.unwrap();
                        assert_eq!(report.dispatched, size);
                    });
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_pattern_eviction(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("dispatch/evict_listings_from_1000_keys", |b| {
        b.iter_batched(
            || {
                rt.block_on(async {
                    let cache = InMemoryCache::new();
                    for i in 0..1000 {
                        let key = if i % 2 == 0 {
                            format!("categories-children-{i}")
                        } else {
                            keys::category(AggregateId::new())
                        };
                        cache.set(&key, "x".to_string(), None).await.unwrap();
                    }
                    cache
                })
            },
            |cache| {
                rt.block_on(async {
                    let removed = cache.remove_by_pattern(keys::CATEGORIES_PATTERN).await.unwrap();
                    assert_eq!(removed, 500);
                });
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_dispatch_batch, bench_pattern_eviction);
criterion_main!(benches);
