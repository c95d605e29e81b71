//! Numeric fixtures: seeded random grids and a brute-force reference DFT.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// `n * n` cells of four uniform values in `[-1, 1)`, reproducible from
/// `seed`. Each cell holds two complex numbers `(re0, im0, re1, im1)`.
pub fn random_cells(n: usize, seed: u64) -> Vec<[f32; 4]> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n * n)
        .map(|_| {
            [
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            ]
        })
        .collect()
}

/// Extract complex lane `lane` (0 or 1) of every cell.
pub fn lane(cells: &[[f32; 4]], lane: usize) -> Vec<[f32; 2]> {
    cells
        .iter()
        .map(|c| [c[lane * 2], c[lane * 2 + 1]])
        .collect()
}

/// Unnormalized 2D DFT computed directly in `f64`:
/// `out[kx, ky] = sum in[x, y] * exp(sign * 2*pi*i * (kx*x + ky*y) / n)`.
///
/// `sign = +1.0` is the inverse transform, `-1.0` the forward one.
pub fn reference_dft_2d(input: &[[f32; 2]], n: usize, sign: f64) -> Vec<[f64; 2]> {
    assert_eq!(input.len(), n * n);
    let tau = std::f64::consts::TAU;
    let mut out = vec![[0.0f64; 2]; n * n];
    for ky in 0..n {
        for kx in 0..n {
            let mut re = 0.0;
            let mut im = 0.0;
            for y in 0..n {
                for x in 0..n {
                    let phase = sign * tau * ((kx * x + ky * y) % n) as f64 / n as f64;
                    let (s, c) = phase.sin_cos();
                    let [a, b] = input[x + y * n];
                    let (a, b) = (a as f64, b as f64);
                    re += a * c - b * s;
                    im += a * s + b * c;
                }
            }
            out[kx + ky * n] = [re, im];
        }
    }
    out
}

/// Largest absolute component difference between two complex grids.
pub fn max_abs_diff(a: &[[f32; 2]], b: &[[f64; 2]]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            (x[0] as f64 - y[0])
                .abs()
                .max((x[1] as f64 - y[1]).abs())
        })
        .fold(0.0, f64::max)
}
