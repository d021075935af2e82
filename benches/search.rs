//! Search Benchmarks
//!
//! Run with: cargo bench --bench search

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use embedx_db::search::{top_k, SearchResult, TopK};
use embedx_db::{Embedder, MemoryStore, RecordStore};
use rand::Rng;

fn random_vector(dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dim).map(|_| rng.gen::<f32>() - 0.5).collect()
}

fn bench_brute_force(c: &mut Criterion) {
    let dim = 128;
    let counts = [1_000, 10_000];

    let mut group = c.benchmark_group("search");

    for count in counts {
        let store = MemoryStore::new();
        for i in 0..count {
            store.add(&format!("v{}", i), &random_vector(dim), None).unwrap();
        }
        let engine = Embedder::new(store);
        let query = random_vector(dim);

        group.throughput(Throughput::Elements(count as u64));

        group.bench_function(format!("engine_k10_n{}", count), |bencher| {
            bencher.iter(|| engine.search(black_box(&query), 10).unwrap())
        });

        group.bench_function(format!("store_k10_n{}", count), |bencher| {
            bencher.iter(|| engine.store().search(black_box(&query), 10).unwrap())
        });
    }

    group.finish();
}

fn bench_top_k(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let results: Vec<SearchResult> = (0..50_000)
        .map(|i| SearchResult::new(format!("v{}", i), rng.gen::<f32>()))
        .collect();

    let mut group = c.benchmark_group("top_k");
    group.throughput(Throughput::Elements(results.len() as u64));

    group.bench_function("heap_k10", |bencher| {
        bencher.iter(|| {
            let mut heap = TopK::new(10);
            heap.extend(results.iter().cloned());
            heap.into_sorted_vec()
        })
    });

    group.bench_function("sort_k10", |bencher| {
        bencher.iter(|| top_k(black_box(results.clone()), 10))
    });

    group.finish();
}

criterion_group!(benches, bench_brute_force, bench_top_k);
criterion_main!(benches);
