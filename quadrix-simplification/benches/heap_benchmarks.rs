//! Enqueue/dequeue throughput of the sentinel binary heap

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use quadrix_simplification::BinaryHeap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_keys(n: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..n).map(|_| rng.gen_range(0.0..1000.0)).collect()
}

fn bench_fill_and_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap_fill_drain");

    for &n in &[1_000, 10_000, 100_000] {
        let keys = random_keys(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &keys, |b, keys| {
            b.iter(|| {
                let mut heap = BinaryHeap::new(keys.len(), f32::NEG_INFINITY, f32::INFINITY);
                for (i, &k) in keys.iter().enumerate() {
                    heap.enqueue(k, i);
                }
                while let Some(entry) = heap.dequeue() {
                    black_box(entry);
                }
            });
        });
    }

    group.finish();
}

/// Pop one, push a few: the access pattern of the decimation loop
fn bench_interleaved(c: &mut Criterion) {
    let mut group = c.benchmark_group("heap_interleaved");

    for &n in &[10_000, 100_000] {
        let keys = random_keys(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &keys, |b, keys| {
            b.iter(|| {
                let mut heap = BinaryHeap::new(4 * keys.len(), f32::NEG_INFINITY, f32::INFINITY);
                for (i, &k) in keys.iter().enumerate() {
                    heap.enqueue(k, i);
                }
                for (i, &k) in keys.iter().enumerate().take(n / 2) {
                    if let Some((top, _)) = heap.dequeue() {
                        heap.enqueue(top + k, i);
                        heap.enqueue(top + 0.5 * k, i);
                    }
                }
                black_box(heap.len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fill_and_drain, bench_interleaved);
criterion_main!(benches);
