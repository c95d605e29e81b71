//! Data-parallel 2D FFT.
//!
//! Runs the same butterfly passes as [`CpuFourier`](crate::CpuFourier),
//! but each pass is a full-grid parallel sweep: every output row of every
//! target is computed independently from the previous pass's side, the way
//! a multi-render-target blit would. Up to [`DeviceCaps::max_render_targets`]
//! buffers are transformed together so that all cascades share one pass
//! sequence.

use std::sync::Arc;

use rayon::prelude::*;
use undertow_core::{CancelToken, FourierError};

use crate::butterfly::{self, ButterflyTable, Direction, FourierBuffer};
use crate::Transform2d;

/// Capabilities of the device running the parallel engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Number of buffers a single pass can write at once.
    pub max_render_targets: usize,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            max_render_targets: 4,
        }
    }
}

/// Data-parallel engine.
#[derive(Clone, Debug)]
pub struct ParallelFourier {
    table: Arc<ButterflyTable>,
    targets: usize,
}

impl ParallelFourier {
    /// Build an engine that transforms up to `targets` buffers per call.
    ///
    /// Fails with [`FourierError::MissingTargets`] when the device cannot
    /// write that many targets in one pass.
    pub fn new(size: usize, targets: usize, caps: DeviceCaps) -> Result<Self, FourierError> {
        Self::with_table(Arc::new(ButterflyTable::new(size)?), targets, caps)
    }

    /// Build an engine sharing an existing table.
    pub fn with_table(
        table: Arc<ButterflyTable>,
        targets: usize,
        caps: DeviceCaps,
    ) -> Result<Self, FourierError> {
        let targets = targets.max(1);
        if targets > caps.max_render_targets {
            return Err(FourierError::MissingTargets {
                required: targets,
                available: caps.max_render_targets,
            });
        }
        log::debug!(
            "parallel fourier engine: size {}, {} target(s)",
            table.size(),
            targets
        );
        Ok(Self { table, targets })
    }

    /// Maximum buffers per call.
    pub fn targets(&self) -> usize {
        self.targets
    }
}

impl Transform2d for ParallelFourier {
    fn size(&self) -> usize {
        self.table.size()
    }

    fn transform(
        &self,
        buffers: &mut [FourierBuffer],
        direction: Direction,
        cancel: &dyn CancelToken,
    ) -> Result<Option<usize>, FourierError> {
        if buffers.len() > self.targets {
            return Err(FourierError::MissingTargets {
                required: buffers.len(),
                available: self.targets,
            });
        }
        butterfly::check_sizes(&self.table, buffers)?;
        let n = self.table.size();
        let passes = self.table.passes();
        let table = &*self.table;

        for p in 0..2 * passes {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let read = p % 2;
            buffers.par_iter_mut().for_each(|buf| {
                let lanes = buf.lanes();
                let (src, dst) = buf.split(read);
                if p < passes {
                    let pass = table.pass(p);
                    dst.par_chunks_mut(n)
                        .zip(src.par_chunks(n))
                        .for_each(|(w, r)| butterfly::row_pass(pass, r, w, lanes, direction));
                } else {
                    let pass = table.pass(p - passes);
                    dst.par_chunks_mut(n)
                        .zip(pass.par_iter())
                        .for_each(|(w, b)| {
                            butterfly::column_pass(b, src, n, w, lanes, direction)
                        });
                }
            });
        }

        let result = (2 * passes) % 2;
        if direction == Direction::Forward {
            buffers.par_iter_mut().for_each(|buf| {
                let lanes = buf.lanes();
                butterfly::normalize(buf.side_mut(result), n, lanes);
            });
        }
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Packing;
    use undertow_core::NeverCancel;

    #[test]
    fn construction_checks_render_targets() {
        let caps = DeviceCaps {
            max_render_targets: 1,
        };
        assert!(ParallelFourier::new(8, 1, caps).is_ok());
        assert_eq!(
            ParallelFourier::new(8, 3, caps).unwrap_err(),
            FourierError::MissingTargets {
                required: 3,
                available: 1
            }
        );
    }

    #[test]
    fn too_many_buffers_per_call_is_rejected() {
        let engine = ParallelFourier::new(8, 2, DeviceCaps::default()).unwrap();
        let mut bufs = vec![FourierBuffer::new(8, Packing::Single); 3];
        assert_eq!(
            engine.transform(&mut bufs, Direction::Inverse, &NeverCancel),
            Err(FourierError::MissingTargets {
                required: 3,
                available: 2
            })
        );
    }
}
