use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use stockcore::{EngineConfig, RankingMode};
use stockcore_benchmarks::{single_line_order, stocked_engine};
use tokio::runtime::Runtime;

/// End-to-end move-out against the in-memory store. Each iteration ships a
/// single unit, so the stock levels are sized to outlast the measurement.
fn bench_move_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("move_out");
    group.throughput(Throughput::Elements(1));

    for (label, ranking) in [("computed", RankingMode::Computed), ("cached", RankingMode::Cached)] {
        let config = EngineConfig {
            ranking,
            ..EngineConfig::default()
        };
        let (engine, product) = rt
            .block_on(stocked_engine(25, 1_000_000, config))
            .unwrap();

        group.bench_function(BenchmarkId::new("single_unit", label), |b| {
            b.to_async(&rt).iter(|| async {
                black_box(
                    engine
                        .move_out(single_line_order(product, 1, "10080"))
                        .await
                        .unwrap(),
                )
            });
        });
    }
    group.finish();
}

/// Building a ranked catalog. Each registration ranks the new warehouse
/// against every existing one.
fn bench_registration(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("build_catalog");

    for existing in [10usize, 100] {
        group.bench_with_input(
            BenchmarkId::new("warehouses", existing),
            &existing,
            |b, &existing| {
                b.to_async(&rt).iter(|| async move {
                    black_box(
                        stocked_engine(existing, 1, EngineConfig::default())
                            .await
                            .unwrap(),
                    )
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_move_out, bench_registration);
criterion_main!(benches);
