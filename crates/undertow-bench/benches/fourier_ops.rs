//! Criterion micro-benchmarks for the 2D Fourier engines.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use undertow_core::NeverCancel;
use undertow_fourier::{
    ButterflyTable, CpuFourier, DeviceCaps, Direction, FourierBuffer, Packing, ParallelFourier,
    Transform2d,
};
use undertow_test_utils::fixtures::random_cells;

fn filled(size: usize, seed: u64) -> FourierBuffer {
    let mut buf = FourierBuffer::new(size, Packing::Double);
    buf.input_mut().copy_from_slice(&random_cells(size, seed));
    buf
}

/// Benchmark: build the butterfly table.
fn bench_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("butterfly_table");
    for size in [64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| std::hint::black_box(ButterflyTable::new(size).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark: one inverse transform of three buffers, the per-cycle load
/// of a four-cascade ocean.
fn bench_inverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("inverse_3_buffers");
    for size in [64, 128, 256] {
        let cpu = CpuFourier::new(size).unwrap();
        let par = ParallelFourier::new(size, 3, DeviceCaps::default()).unwrap();
        let engines: [(&str, &dyn Transform2d); 2] = [("cpu", &cpu), ("parallel", &par)];
        for (name, engine) in engines {
            let mut buffers: Vec<FourierBuffer> = (0..3).map(|i| filled(size, i)).collect();
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| {
                    let side = engine
                        .transform(&mut buffers, Direction::Inverse, &NeverCancel)
                        .unwrap();
                    std::hint::black_box(side);
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_table, bench_inverse);
criterion_main!(benches);
