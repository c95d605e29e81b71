//! The spectrum generation task.
//!
//! Generation fills two tables per condition:
//!
//! - the dispersion table, one angular frequency per cell and cascade;
//! - the amplitude tables, one random-phase complex amplitude per cell
//!   and cascade, with magnitude `sqrt(S(k) * amp / 2) * dk`.
//!
//! Cells map to wavenumbers through signed (FFT-centred) indexing, so
//! cell `x >= n/2` stands for frequency `x - n`.

use std::f32::consts::{SQRT_2, TAU};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use undertow_core::{CancelToken, NeverCancel, TaskError};
use undertow_sched::{Step, Task, TaskContext};

use crate::condition::{ConditionData, WaveSpectrumCondition};
use crate::layout::{signed_index, CascadeLayout};
use crate::model::{dispersion, SpectrumModel};

/// Build the dispersion table for a grid of edge `size`. Returns `None`
/// if cancelled.
pub fn build_wtable(
    size: usize,
    layout: &CascadeLayout,
    cancel: &dyn CancelToken,
) -> Option<Vec<[f32; 4]>> {
    let grids = layout.num_grids();
    let inv = layout.inverse_grid_sizes(size);
    let n = size as f32;
    let mut table = vec![[0.0f32; 4]; size * size];
    for y in 0..size {
        let sy = signed_index(y, size) / n;
        for x in 0..size {
            if cancel.is_cancelled() {
                return None;
            }
            let sx = signed_index(x, size) / n;
            let r = (sx * sx + sy * sy).sqrt();
            let cell = &mut table[x + y * size];
            for (g, w) in cell.iter_mut().enumerate().take(grids) {
                *w = dispersion(r * inv[g]);
            }
        }
    }
    Some(table)
}

fn sample(model: &SpectrumModel, i: f32, j: f32, dk: f32, k_min: f32, amp: f32) -> f32 {
    let kx = i * dk;
    let kz = j * dk;
    if kx.abs() < k_min && kz.abs() < k_min {
        return 0.0;
    }
    let h = (model.spectrum(kx, kz) * amp * 0.5).sqrt() * dk;
    if h.is_finite() {
        h
    } else {
        0.0
    }
}

/// Sample `model` for every cell and active cascade, drawing one uniform
/// phase per cell and cascade from `rng`. Returns the `(cascades 0-1,
/// cascades 2-3)` tables, or `None` if cancelled.
pub fn build_amplitudes<R: Rng>(
    size: usize,
    layout: &CascadeLayout,
    model: &SpectrumModel,
    rng: &mut R,
    cancel: &dyn CancelToken,
) -> Option<(Vec<[f32; 4]>, Vec<[f32; 4]>)> {
    let grids = layout.num_grids();
    let dk = layout.wavenumber_steps();
    let k_min = layout.min_wavenumbers(size);
    let amps = layout.wave_amps;

    let mut s01 = vec![[0.0f32; 4]; size * size];
    let mut s23 = if grids > 2 {
        vec![[0.0f32; 4]; size * size]
    } else {
        Vec::new()
    };

    for y in 0..size {
        let j = signed_index(y, size);
        for x in 0..size {
            if cancel.is_cancelled() {
                return None;
            }
            let i = signed_index(x, size);
            let idx = x + y * size;
            for g in 0..grids {
                let phi = rng.random::<f32>() * TAU;
                let h = sample(model, i, j, dk[g], k_min[g], amps[g]) * SQRT_2;
                let (s, c) = phi.sin_cos();
                let (table, lane) = match g {
                    0 => (&mut s01, 0),
                    1 => (&mut s01, 2),
                    2 => (&mut s23, 0),
                    _ => (&mut s23, 2),
                };
                table[idx][lane] = h * c;
                table[idx][lane + 1] = h * s;
            }
        }
    }
    Some((s01, s23))
}

/// Generates the tables of one condition and publishes them from `end()`.
///
/// Threaded by default. The condition's "generating" mark is held for the
/// lifetime of the task.
pub struct SpectrumTask {
    condition: Arc<WaveSpectrumCondition>,
    model: SpectrumModel,
    rng: ChaCha8Rng,
    threaded: bool,
    result: Option<ConditionData>,
}

impl SpectrumTask {
    pub(crate) fn new(condition: Arc<WaveSpectrumCondition>, seed: u64) -> Self {
        let key = condition.key();
        let model = SpectrumModel::new(key.params(), key.wind_dir());
        Self {
            condition,
            model,
            rng: ChaCha8Rng::seed_from_u64(seed),
            threaded: true,
            result: None,
        }
    }

    /// Run on the updating thread instead of a worker.
    pub fn threaded(mut self, threaded: bool) -> Self {
        self.threaded = threaded;
        self
    }

    /// The condition being generated.
    pub fn condition(&self) -> &Arc<WaveSpectrumCondition> {
        &self.condition
    }

    /// Compute the tables. Returns `None` if cancelled part way.
    pub fn generate(&mut self, cancel: &dyn CancelToken) -> Option<ConditionData> {
        let size = self.condition.size();
        let layout = *self.condition.layout();
        let wtable = build_wtable(size, &layout, cancel)?;
        let (spectrum01, spectrum23) =
            build_amplitudes(size, &layout, &self.model, &mut self.rng, cancel)?;
        Some(ConditionData {
            spectrum01,
            spectrum23,
            wtable,
        })
    }

    /// Generate and publish on the calling thread, bypassing the
    /// scheduler.
    pub fn complete_now(mut self) {
        if let Some(data) = self.generate(&NeverCancel) {
            self.condition.publish(data);
        }
    }
}

impl Task for SpectrumTask {
    fn name(&self) -> &str {
        "spectrum"
    }

    fn is_threaded(&self) -> bool {
        self.threaded
    }

    fn run(&mut self, cx: &TaskContext<'_>) -> Result<Step, TaskError> {
        // `None` only when cancelled; the scheduler then skips `end()`.
        self.result = self.generate(cx);
        Ok(Step::Finished)
    }

    fn end(&mut self) {
        if let Some(data) = self.result.take() {
            self.condition.publish(data);
        }
    }
}

impl Drop for SpectrumTask {
    fn drop(&mut self) {
        self.condition.generation_released();
    }
}
