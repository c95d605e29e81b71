//! World-space extent, choppiness and amplitude of each cascade.

use std::f32::consts::{PI, TAU};

use undertow_core::SpectrumError;

use crate::key::MAX_CASCADES;

/// Per-cascade constants, fixed by the cascade count.
///
/// Unused cascades keep placeholder values of `1.0` so that divisions by
/// grid size stay finite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeLayout {
    num_grids: usize,
    /// World size in metres covered by one tile of each cascade.
    pub grid_sizes: [f32; MAX_CASCADES],
    /// Horizontal displacement multiplier of each cascade.
    pub choppiness: [f32; MAX_CASCADES],
    /// Spectrum energy multiplier of each cascade.
    pub wave_amps: [f32; MAX_CASCADES],
}

impl CascadeLayout {
    /// The layout used for `num_grids` cascades.
    pub fn for_grids(num_grids: usize) -> Result<Self, SpectrumError> {
        let (grid_sizes, choppiness, wave_amps) = match num_grids {
            1 => ([772.0, 1.0, 1.0, 1.0], [2.3, 1.0, 1.0, 1.0], [1.0, 1.0, 1.0, 1.0]),
            2 => (
                [1372.0, 392.0, 1.0, 1.0],
                [2.38, 1.5, 1.0, 1.0],
                [0.625, 0.65, 1.0, 1.0],
            ),
            3 => (
                [1372.0, 392.0, 31.0, 1.0],
                [2.38, 1.5, 1.25, 1.0],
                [0.67, 0.68, 0.7, 1.0],
            ),
            4 => (
                [1372.0, 392.0, 31.0, 4.0],
                [2.38, 1.5, 1.25, 1.0],
                [0.67, 0.68, 0.7, 0.8],
            ),
            count => return Err(SpectrumError::InvalidCascadeCount { count }),
        };
        Ok(Self {
            num_grids,
            grid_sizes,
            choppiness,
            wave_amps,
        })
    }

    /// Active cascade count.
    pub fn num_grids(&self) -> usize {
        self.num_grids
    }

    /// Wavenumber spacing `2*pi / grid_size` of each cascade.
    pub fn wavenumber_steps(&self) -> [f32; MAX_CASCADES] {
        self.grid_sizes.map(|g| TAU / g)
    }

    /// `2*pi*size / grid_size`: scales a normalized signed texel index to
    /// a wavenumber.
    pub fn inverse_grid_sizes(&self, size: usize) -> [f32; MAX_CASCADES] {
        let factor = TAU * size as f32;
        self.grid_sizes.map(|g| factor / g)
    }

    /// Smallest wavenumber component each cascade keeps.
    ///
    /// Cascade 0 only drops the constant term. Every finer cascade drops
    /// the band already covered by the cascade before it, whose Nyquist
    /// wavenumber is `pi * size / grid_size`.
    pub fn min_wavenumbers(&self, size: usize) -> [f32; MAX_CASCADES] {
        let n = size as f32;
        let g = self.grid_sizes;
        [PI / g[0], PI * n / g[0], PI * n / g[1], PI * n / g[2]]
    }
}

/// Map a texel index to its signed frequency index, `x - n` for the upper
/// half of the grid.
#[inline]
pub fn signed_index(x: usize, n: usize) -> f32 {
    if x >= n / 2 {
        x as f32 - n as f32
    } else {
        x as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_exist_for_one_to_four() {
        for n in 1..=4 {
            let l = CascadeLayout::for_grids(n).unwrap();
            assert_eq!(l.num_grids(), n);
            assert!(l.grid_sizes.iter().all(|&g| g > 0.0));
        }
        assert_eq!(
            CascadeLayout::for_grids(0).unwrap_err(),
            SpectrumError::InvalidCascadeCount { count: 0 }
        );
    }

    #[test]
    fn finer_cascades_start_above_coarser_nyquist() {
        let l = CascadeLayout::for_grids(4).unwrap();
        let k = l.min_wavenumbers(64);
        let dk = l.wavenumber_steps();
        // Cascade 0 keeps the first harmonic.
        assert!(dk[0] >= k[0]);
        assert!(k[1] > k[0] && k[2] > k[1] && k[3] > k[2]);
    }

    #[test]
    fn signed_indices_wrap_upper_half() {
        let got: Vec<f32> = (0..4).map(|x| signed_index(x, 4)).collect();
        assert_eq!(got, vec![0.0, 1.0, -2.0, -1.0]);
    }
}
