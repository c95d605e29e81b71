//! Sequential 2D FFT.

use std::sync::Arc;

use undertow_core::{CancelToken, FourierError};

use crate::butterfly::{self, ButterflyTable, Direction, FourierBuffer};
use crate::Transform2d;

/// Sequential engine: every pass walks every row of every buffer on the
/// calling thread, polling the cancel token once per row.
#[derive(Clone, Debug)]
pub struct CpuFourier {
    table: Arc<ButterflyTable>,
}

impl CpuFourier {
    /// Build an engine for `size x size` grids.
    pub fn new(size: usize) -> Result<Self, FourierError> {
        Ok(Self::with_table(Arc::new(ButterflyTable::new(size)?)))
    }

    /// Build an engine sharing an existing table.
    pub fn with_table(table: Arc<ButterflyTable>) -> Self {
        Self { table }
    }

    /// The butterfly table in use.
    pub fn table(&self) -> &Arc<ButterflyTable> {
        &self.table
    }
}

impl Transform2d for CpuFourier {
    fn size(&self) -> usize {
        self.table.size()
    }

    fn transform(
        &self,
        buffers: &mut [FourierBuffer],
        direction: Direction,
        cancel: &dyn CancelToken,
    ) -> Result<Option<usize>, FourierError> {
        butterfly::check_sizes(&self.table, buffers)?;
        let n = self.table.size();
        let passes = self.table.passes();

        for p in 0..2 * passes {
            let read = p % 2;
            for buf in buffers.iter_mut() {
                let lanes = buf.lanes();
                let (src, dst) = buf.split(read);
                if p < passes {
                    let pass = self.table.pass(p);
                    for (r, w) in src.chunks(n).zip(dst.chunks_mut(n)) {
                        if cancel.is_cancelled() {
                            return Ok(None);
                        }
                        butterfly::row_pass(pass, r, w, lanes, direction);
                    }
                } else {
                    let pass = self.table.pass(p - passes);
                    for (b, w) in pass.iter().zip(dst.chunks_mut(n)) {
                        if cancel.is_cancelled() {
                            return Ok(None);
                        }
                        butterfly::column_pass(b, src, n, w, lanes, direction);
                    }
                }
            }
        }

        let result = (2 * passes) % 2;
        if direction == Direction::Forward {
            for buf in buffers.iter_mut() {
                let lanes = buf.lanes();
                butterfly::normalize(buf.side_mut(result), n, lanes);
            }
        }
        Ok(Some(result))
    }
}
