//! Criterion micro-benchmarks for wave queries and full update cycles.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use undertow_bench::{inline_profile, query_field, reference_profile, warmed_ocean};
use undertow_ocean::{evaluate, QueryMode};

/// Benchmark: 1K direct queries per mode against a published cycle.
fn bench_query_modes(c: &mut Criterion) {
    let ocean = warmed_ocean(reference_profile(42)).unwrap();
    let set = ocean.snapshot();
    let scaling = ocean.scaling();
    let mask = ocean.enabled_buffer_mask();
    let mut group = c.benchmark_group("query_1k");
    for mode in [QueryMode::Height, QueryMode::Displacement, QueryMode::Position] {
        let mut queries: Vec<_> = query_field(1000, 500.0)
            .into_iter()
            .map(|q| q.with_mode(mode))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(format!("{mode:?}")), &mode, |b, _| {
            b.iter(|| {
                for q in &mut queries {
                    evaluate(q, &set, mask, &scaling, 0.0, None);
                }
                std::hint::black_box(&queries);
            });
        });
    }
    group.finish();
}

/// Benchmark: one inline `Ocean::update`, evolution and range scan
/// included.
fn bench_update_cycle(c: &mut Criterion) {
    let mut ocean = warmed_ocean(inline_profile(reference_profile(42))).unwrap();
    let mut t = 1.0f32;
    c.bench_function("ocean_update_inline_64", |b| {
        b.iter(|| {
            t += 1.0 / 60.0;
            ocean.update(t).unwrap();
        });
    });
}

criterion_group!(benches, bench_query_modes, bench_update_cycle);
criterion_main!(benches);
