//! Bounds on how far the surface moves from its rest position.
//!
//! External culling code needs the worst-case horizontal and vertical
//! excursion of the field. [`FindRangeTask`] scans the READ snapshot after
//! a swap, sums each enabled cascade's peak magnitudes with the same
//! scaling queries use, and publishes the result on the updating thread.

use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use undertow_core::{CancelToken, TaskError};
use undertow_sched::{Step, Task, TaskContext};

use crate::buffer::{DisplacementSet, CHANNELS, CHANNEL_DX, CHANNEL_DZ, CHANNEL_HEIGHT};
use crate::query::QueryGridScaling;

/// Largest displacement of the surface from rest, in metres.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MaxDisplacement {
    /// Largest of the x and z extents.
    pub horizontal: f32,
    /// Largest vertical extent.
    pub vertical: f32,
}

fn channel_peaks(texels: &[f32], parallel: bool) -> [f32; CHANNELS] {
    let fold = |mut acc: [f32; CHANNELS], texel: &[f32]| {
        for (a, v) in acc.iter_mut().zip(texel) {
            *a = a.max(v.abs());
        }
        acc
    };
    let merge = |a: [f32; CHANNELS], b: [f32; CHANNELS]| {
        [a[0].max(b[0]), a[1].max(b[1]), a[2].max(b[2])]
    };
    if parallel {
        texels
            .par_chunks(CHANNELS)
            .fold(|| [0.0; CHANNELS], fold)
            .reduce(|| [0.0; CHANNELS], merge)
    } else {
        texels.chunks(CHANNELS).fold([0.0; CHANNELS], fold)
    }
}

/// Sum the per-cascade peaks of every cascade in `mask`. Returns `None`
/// if `cancel` fired between cascades.
pub fn scan(
    set: &DisplacementSet,
    mask: u8,
    scaling: &QueryGridScaling,
    parallel: bool,
    cancel: &dyn CancelToken,
) -> Option<MaxDisplacement> {
    let mut extent = [0.0f32; 3];
    let grids = scaling.num_grids.min(set.num_grids());
    for g in 0..grids {
        if mask & (1 << g) == 0 {
            continue;
        }
        if cancel.is_cancelled() {
            return None;
        }
        let peaks = channel_peaks(set.grid(g).data(), parallel);
        extent[0] += peaks[CHANNEL_DX] * scaling.choppiness[g];
        extent[1] += peaks[CHANNEL_HEIGHT] * scaling.scale_y;
        extent[2] += peaks[CHANNEL_DZ] * scaling.choppiness[g];
    }
    Some(MaxDisplacement {
        horizontal: extent[0].max(extent[2]),
        vertical: extent[1],
    })
}

/// Threaded scan of one snapshot into a shared [`MaxDisplacement`].
pub struct FindRangeTask {
    set: Arc<DisplacementSet>,
    mask: u8,
    scaling: QueryGridScaling,
    parallel: bool,
    threaded: bool,
    found: Option<MaxDisplacement>,
    target: Arc<Mutex<MaxDisplacement>>,
}

impl FindRangeTask {
    /// Scan `set` and store the bounds in `target` when done.
    pub fn new(
        set: Arc<DisplacementSet>,
        mask: u8,
        scaling: QueryGridScaling,
        target: Arc<Mutex<MaxDisplacement>>,
    ) -> Self {
        Self {
            set,
            mask,
            scaling,
            parallel: false,
            threaded: true,
            found: None,
            target,
        }
    }

    /// Split each cascade's scan across the rayon pool.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run on the updating thread instead of a worker.
    pub fn threaded(mut self, threaded: bool) -> Self {
        self.threaded = threaded;
        self
    }

    /// Cycle of the scanned snapshot.
    pub fn cycle(&self) -> u64 {
        self.set.cycle()
    }
}

impl Task for FindRangeTask {
    fn name(&self) -> &str {
        "find-range"
    }

    fn is_threaded(&self) -> bool {
        self.threaded
    }

    fn run(&mut self, cx: &TaskContext<'_>) -> Result<Step, TaskError> {
        self.found = scan(&self.set, self.mask, &self.scaling, self.parallel, cx);
        Ok(Step::Finished)
    }

    fn end(&mut self) {
        if let Some(found) = self.found.take() {
            *self.target.lock().unwrap() = found;
            log::trace!(
                "cycle {} range: horizontal {}, vertical {}",
                self.set.cycle(),
                found.horizontal,
                found.vertical
            );
        }
    }
}
