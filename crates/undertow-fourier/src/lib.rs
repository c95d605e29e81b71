//! Butterfly-table 2D FFT engines for the undertow ocean engine.
//!
//! Two interchangeable engines implement [`Transform2d`]:
//!
//! - [`CpuFourier`] runs every pass sequentially and polls its cancel
//!   token once per row;
//! - [`ParallelFourier`] runs each pass as a full-grid rayon sweep over
//!   up to four buffers at once.
//!
//! Both use the same [`ButterflyTable`], the same integer addressing and
//! the same per-row kernels, so they agree to rounding. Grids are
//! `N x N` cells of `[f32; 4]`, each holding one or two complex numbers
//! (see [`Packing`]). Transforms run row passes first, then column passes,
//! ping-ponging between the two sides of a [`FourierBuffer`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod butterfly;
pub mod cpu;
pub mod parallel;

pub use butterfly::{bit_reverse, Butterfly, ButterflyTable, Direction, FourierBuffer, Packing};
pub use cpu::CpuFourier;
pub use parallel::{DeviceCaps, ParallelFourier};

use undertow_core::{CancelToken, FourierError};

/// A 2D power-of-two Fourier transform over ping-pong buffers.
pub trait Transform2d: Send + Sync {
    /// Grid edge length this engine was built for.
    fn size(&self) -> usize;

    /// Transform every buffer in place.
    ///
    /// Input is read from side 0. Returns the side holding the result, or
    /// `None` if `cancel` fired part-way (buffer contents are then
    /// unspecified).
    fn transform(
        &self,
        buffers: &mut [FourierBuffer],
        direction: Direction,
        cancel: &dyn CancelToken,
    ) -> Result<Option<usize>, FourierError>;

    /// Shorthand for an inverse transform.
    fn inverse(
        &self,
        buffers: &mut [FourierBuffer],
        cancel: &dyn CancelToken,
    ) -> Result<Option<usize>, FourierError> {
        self.transform(buffers, Direction::Inverse, cancel)
    }
}

/// Which engine to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FourierBackend {
    /// [`CpuFourier`].
    #[default]
    Cpu,
    /// [`ParallelFourier`].
    Parallel,
}

/// Build an engine for `size x size` grids that will transform up to
/// `targets` buffers per call.
pub fn build_engine(
    backend: FourierBackend,
    size: usize,
    targets: usize,
    caps: DeviceCaps,
) -> Result<Box<dyn Transform2d>, FourierError> {
    match backend {
        FourierBackend::Cpu => Ok(Box::new(CpuFourier::new(size)?)),
        FourierBackend::Parallel => Ok(Box::new(ParallelFourier::new(size, targets, caps)?)),
    }
}
