//! Kernel Benchmarks
//!
//! Run with: cargo bench --bench kernel

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use embedx_db::simd::{dot_blocked, dot_generic, kernel};
use embedx_db::tune::BLOCK_CANDIDATES;
use embedx_db::{BatchExecutor, KernelConfig};
use rand::Rng;

fn random_vector(dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dim).map(|_| rng.gen::<f32>() - 0.5).collect()
}

fn bench_dot_kernels(c: &mut Criterion) {
    let dims = [64, 256, 768, 1536];

    let mut group = c.benchmark_group("dot");

    for dim in dims {
        group.throughput(Throughput::Elements(dim as u64));

        let a = random_vector(dim);
        let b = random_vector(dim);

        group.bench_function(format!("generic_dim_{}", dim), |bencher| {
            bencher.iter(|| dot_generic(black_box(&a), black_box(&b)))
        });

        let bound = kernel();
        group.bench_function(format!("{}_dim_{}", bound.kind().name(), dim), |bencher| {
            bencher.iter(|| bound.dot_unchecked(black_box(&a), black_box(&b)))
        });
    }

    group.finish();
}

fn bench_block_sizes(c: &mut Criterion) {
    let dim = 1024;
    let a = random_vector(dim);
    let b = random_vector(dim);

    let mut group = c.benchmark_group("dot_blocked");
    group.throughput(Throughput::Elements(dim as u64));

    for block in BLOCK_CANDIDATES {
        group.bench_function(format!("block_{}", block), |bencher| {
            bencher.iter(|| dot_blocked(black_box(&a), black_box(&b), block as usize))
        });
    }

    group.finish();
}

fn bench_dot_batch(c: &mut Criterion) {
    let dim = 384;
    let rows: Vec<Vec<f32>> = (0..4096).map(|_| random_vector(dim)).collect();
    let query = random_vector(dim);

    let executor = BatchExecutor::new(KernelConfig::tuned()).unwrap();

    let mut group = c.benchmark_group("dot_batch");
    group.throughput(Throughput::Elements(rows.len() as u64));

    group.bench_function("serial_4096x384", |bencher| {
        bencher.iter(|| executor.dot_batch_serial(black_box(&query), black_box(&rows)))
    });

    group.bench_function("parallel_4096x384", |bencher| {
        bencher.iter(|| executor.dot_batch_parallel(black_box(&query), black_box(&rows)))
    });

    group.finish();
}

criterion_group!(benches, bench_dot_kernels, bench_block_sizes, bench_dot_batch);
criterion_main!(benches);
