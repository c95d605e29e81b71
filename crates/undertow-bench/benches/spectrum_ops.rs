//! Criterion micro-benchmarks for spectrum generation.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use undertow_core::NeverCancel;
use undertow_spectrum::{
    build_amplitudes, build_wtable, CascadeLayout, SpectrumConditionKey, SpectrumModel,
    SpectrumParams, WaveSpectrumCondition,
};

const UNIFIED: SpectrumParams = SpectrumParams::Unified {
    wind_speed: 10.0,
    wave_age: 0.84,
};

/// Benchmark: amplitude tables for four cascades.
fn bench_amplitudes(c: &mut Criterion) {
    let layout = CascadeLayout::for_grids(4).unwrap();
    let mut group = c.benchmark_group("amplitudes_4_cascades");
    for params in [UNIFIED, SpectrumParams::Phillips { wind_speed: 10.0 }] {
        let model = SpectrumModel::new(params, 30.0);
        for size in [64, 256] {
            group.bench_with_input(
                BenchmarkId::new(params.kind().name(), size),
                &size,
                |b, &size| {
                    let mut rng = ChaCha8Rng::seed_from_u64(7);
                    b.iter(|| {
                        let tables =
                            build_amplitudes(size, &layout, &model, &mut rng, &NeverCancel);
                        std::hint::black_box(tables);
                    });
                },
            );
        }
    }
    group.finish();
}

/// Benchmark: dispersion table.
fn bench_wtable(c: &mut Criterion) {
    let layout = CascadeLayout::for_grids(4).unwrap();
    c.bench_function("wtable_256", |b| {
        b.iter(|| std::hint::black_box(build_wtable(256, &layout, &NeverCancel)));
    });
}

/// Benchmark: a complete generation task run inline, including
/// publication.
fn bench_generate_condition(c: &mut Criterion) {
    let key = SpectrumConditionKey::new(64, 30.0, 4, UNIFIED).unwrap();
    let condition = std::sync::Arc::new(WaveSpectrumCondition::new(key).unwrap());
    c.bench_function("generate_condition_64", |b| {
        b.iter(|| {
            let task = condition.generation_task(1).unwrap();
            task.complete_now();
        });
    });
}

criterion_group!(benches, bench_amplitudes, bench_wtable, bench_generate_condition);
criterion_main!(benches);
