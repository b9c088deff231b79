use chrono::{Duration, Utc};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use layout::{project, LayoutConfig};
use std::hint::black_box;
use vector::{partition, AnnConfig, AnnIndex, Candidate};

/// Vectors scattered around a handful of topic centres.
fn topic_vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let centres: Vec<Vec<f32>> = (0..8)
        .map(|_| (0..dim).map(|_| rng.f32() * 2.0 - 1.0).collect())
        .collect();
    (0..count)
        .map(|i| {
            centres[i % centres.len()]
                .iter()
                .map(|c| c + (rng.f32() - 0.5) * 0.2)
                .collect()
        })
        .collect()
}

/// Benchmark the 2-D layout at the sizes a grid cell sees
fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout_project");
    group.sample_size(10);
    let dim = 128;

    for size in [100, 500, 1000] {
        let rows = topic_vectors(size, dim, 42);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("project_{size}"), |b| {
            b.iter(|| project(black_box(&rows), &LayoutConfig::default()).unwrap());
        });
    }

    group.finish();
}

/// Benchmark threshold clustering, exact scan vs HNSW
fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster_partition");
    let dim = 128;
    let now = Utc::now();

    for (label, ann) in [
        ("exact", AnnConfig::default().with_enabled(false)),
        ("hnsw", AnnConfig::default()),
    ] {
        for size in [500, 2000] {
            let mut index = AnnIndex::new(dim, ann);
            let candidates: Vec<Candidate> = topic_vectors(size, dim, 7)
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    let id = i as i64;
                    index.upsert(id, v).unwrap();
                    Candidate {
                        id,
                        last_seen_at: now - Duration::minutes(id),
                    }
                })
                .collect();
            index.build_if_needed();

            group.throughput(Throughput::Elements(size as u64));
            group.bench_function(format!("{label}_{size}"), |b| {
                b.iter(|| partition(black_box(&index), &candidates, 0.6).unwrap());
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_layout, bench_partition);
criterion_main!(benches);
