//! Time evolution of a generated spectrum into the WRITE displacement set.
//!
//! Each cycle evolves every cascade's amplitudes to time `t`,
//!
//! ```text
//! h(k, t) = a(k) e^{i w t} + conj(a(-k)) e^{-i w t}
//! ```
//!
//! and packs three Fourier buffers:
//!
//! | buffer | lanes                          | after the inverse transform |
//! |--------|--------------------------------|-----------------------------|
//! | 0      | `h0 + i h1`, `h2 + i h3`       | heights of all cascades     |
//! | 1      | `i k^ h0`, `i k^ h1`           | x/z displacement, 0 and 1   |
//! | 2      | `i k^ h2`, `i k^ h3`           | x/z displacement, 2 and 3   |
//!
//! where `k^` is the unit wavevector packed as `kx + i kz`. Every input is
//! Hermitian, so each complex lane carries two real fields.

use std::sync::{Arc, Mutex};

use undertow_core::{CancelToken, ConditionGeneration, FourierError, SpectrumError, TaskError};
use undertow_fourier::{FourierBuffer, Packing, Transform2d};
use undertow_sched::{Step, Task, TaskContext};
use undertow_spectrum::{
    signed_index, ConditionData, SpectrumKind, WaveSpectrumCondition, MAX_CASCADES,
};

use crate::buffer::{DisplacementBuffer, DisplacementSet, CHANNEL_DX, CHANNEL_DZ, CHANNEL_HEIGHT};

/// Per-condition working memory of the evolution step: wavevector tables,
/// Fourier buffers and the last copied condition tables.
#[derive(Debug)]
pub struct EvolutionScratch {
    size: usize,
    kind: SpectrumKind,
    num_grids: usize,
    /// `(kx, kz, 1/|k|)` per cell, one table per active cascade.
    ktables: Vec<Vec<[f32; 3]>>,
    fourier: Vec<FourierBuffer>,
    seen: ConditionGeneration,
    data: Option<Arc<ConditionData>>,
}

impl EvolutionScratch {
    /// Allocate for `condition` and copy its tables if published.
    pub fn new(condition: &WaveSpectrumCondition) -> Self {
        let size = condition.size();
        let num_grids = condition.key().num_grids();
        let inv = condition.layout().inverse_grid_sizes(size);
        let n = size as f32;

        let ktables = (0..num_grids)
            .map(|g| {
                let mut table = Vec::with_capacity(size * size);
                for y in 0..size {
                    let kz = signed_index(y, size) / n * inv[g];
                    for x in 0..size {
                        let kx = signed_index(x, size) / n * inv[g];
                        let len = (kx * kx + kz * kz).sqrt();
                        let inv_len = if len > 0.0 { 1.0 / len } else { 0.0 };
                        table.push([kx, kz, inv_len]);
                    }
                }
                table
            })
            .collect();

        let buffers = if num_grids > 2 { 3 } else { 2 };
        let fourier = (0..buffers)
            .map(|b| FourierBuffer::new(size, packing_for(b, num_grids)))
            .collect();

        let mut scratch = Self {
            size,
            kind: condition.kind(),
            num_grids,
            ktables,
            fourier,
            seen: ConditionGeneration::NONE,
            data: None,
        };
        scratch.refresh(condition);
        scratch
    }

    /// Point the scratch at `condition`, which must have the same kind,
    /// size and cascade count as the one it was built for.
    pub fn reset(&mut self, condition: &WaveSpectrumCondition) -> Result<(), SpectrumError> {
        if condition.kind() != self.kind {
            return Err(SpectrumError::ConditionMismatch {
                reason: format!(
                    "scratch built for {} spectrum, got {}",
                    self.kind.name(),
                    condition.kind().name()
                ),
            });
        }
        if condition.size() != self.size || condition.key().num_grids() != self.num_grids {
            return Err(SpectrumError::ConditionMismatch {
                reason: format!(
                    "scratch built for size {} with {} cascade(s), got size {} with {}",
                    self.size,
                    self.num_grids,
                    condition.size(),
                    condition.key().num_grids()
                ),
            });
        }
        self.refresh(condition);
        Ok(())
    }

    /// Copy the condition's tables when their generation changed.
    fn refresh(&mut self, condition: &WaveSpectrumCondition) {
        if condition.generation() == self.seen {
            return;
        }
        if let Some((generation, data)) = condition.snapshot() {
            self.seen = generation;
            self.data = Some(data);
        }
    }

    /// Generation of the copied tables.
    pub fn seen_generation(&self) -> ConditionGeneration {
        self.seen
    }

    /// Evolve to `time`, transform, and write the result into `out`.
    ///
    /// Cascades whose bit is clear in `mask` are left flat. Returns
    /// `Ok(false)` when there is nothing to evolve yet or `cancel` fired.
    pub fn evolve(
        &mut self,
        time: f32,
        mask: u8,
        engine: &dyn Transform2d,
        out: &mut DisplacementSet,
        cancel: &dyn CancelToken,
    ) -> Result<bool, FourierError> {
        let Some(data) = self.data.clone() else {
            return Ok(false);
        };
        if !self.pack(&data, time, mask, cancel) {
            return Ok(false);
        }
        let Some(side) = engine.inverse(&mut self.fourier, cancel)? else {
            return Ok(false);
        };
        self.unpack(side, out);
        out.set_time(time);
        out.set_num_grids(self.num_grids);
        Ok(true)
    }

    fn pack(&mut self, data: &ConditionData, time: f32, mask: u8, cancel: &dyn CancelToken) -> bool {
        let n = self.size;
        let grids = self.num_grids;
        let Self {
            ktables, fourier, ..
        } = self;
        let (first, rest) = fourier.split_at_mut(1);
        let data0 = first[0].input_mut();
        let (second, third) = rest.split_at_mut(1);
        let data1 = second[0].input_mut();
        let mut data2 = third.first_mut().map(|b| b.input_mut());

        for y in 0..n {
            if cancel.is_cancelled() {
                return false;
            }
            for x in 0..n {
                let idx = x + y * n;
                let mirror = (n - x) % n + ((n - y) % n) * n;
                // The Nyquist row and column are their own mirror, so a
                // derivative there is not Hermitian and would leak between
                // the x and z lanes.
                let nyquist = x == n / 2 || y == n / 2;

                let mut h = [[0.0f32; 2]; MAX_CASCADES];
                let mut d = [[0.0f32; 2]; MAX_CASCADES];
                for g in 0..grids {
                    if mask & (1 << g) == 0 {
                        continue;
                    }
                    let a = data.amplitude(g, idx);
                    let ac = data.amplitude(g, mirror);
                    let (s, c) = (data.wtable[idx][g] * time).sin_cos();
                    let hx = (a[0] + ac[0]) * c - (a[1] + ac[1]) * s;
                    let hy = (a[0] - ac[0]) * s + (a[1] - ac[1]) * c;
                    h[g] = [hx, hy];

                    if nyquist {
                        continue;
                    }
                    let [kx, kz, inv_len] = ktables[g][idx];
                    d[g] = [
                        (-(kx * hy) - kz * hx) * inv_len,
                        (kx * hx - kz * hy) * inv_len,
                    ];
                }

                data0[idx] = [
                    h[0][0] - h[1][1],
                    h[0][1] + h[1][0],
                    h[2][0] - h[3][1],
                    h[2][1] + h[3][0],
                ];
                data1[idx] = [d[0][0], d[0][1], d[1][0], d[1][1]];
                if let Some(data2) = data2.as_deref_mut() {
                    data2[idx] = [d[2][0], d[2][1], d[3][0], d[3][1]];
                }
            }
        }
        true
    }

    fn unpack(&self, side: usize, out: &mut DisplacementSet) {
        let n = self.size;
        let heights = self.fourier[0].side(side);
        let disp01 = self.fourier[1].side(side);
        let disp23 = self.fourier.get(2).map(|b| b.side(side));

        for g in 0..MAX_CASCADES {
            let grid = out.grid_mut(g);
            if g >= self.num_grids {
                grid.clear();
                continue;
            }
            let lane = (g % 2) * 2;
            let disp = if g < 2 { Some(disp01) } else { disp23 };
            for y in 0..n {
                for x in 0..n {
                    let idx = x + y * n;
                    let height = heights[idx][g];
                    let (dx, dz) = match disp {
                        Some(cells) => (cells[idx][lane], cells[idx][lane + 1]),
                        None => (0.0, 0.0),
                    };
                    grid.set(x, y, CHANNEL_DX, dx);
                    grid.set(x, y, CHANNEL_HEIGHT, height);
                    grid.set(x, y, CHANNEL_DZ, dz);
                }
            }
        }
    }
}

/// Packing of Fourier buffer `buffer` for `num_grids` cascades.
pub fn packing_for(buffer: usize, num_grids: usize) -> Packing {
    let double = match buffer {
        0 => num_grids > 2,
        1 => num_grids > 1,
        _ => num_grids > 3,
    };
    if double {
        Packing::Double
    } else {
        Packing::Single
    }
}

/// Where an idle [`EvolutionScratch`] waits between cycles.
#[derive(Debug, Default)]
pub struct ScratchStash(Mutex<Option<EvolutionScratch>>);

impl ScratchStash {
    /// An empty stash.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the stashed scratch, if any.
    pub fn take(&self) -> Option<EvolutionScratch> {
        self.0.lock().unwrap().take()
    }

    /// Store a scratch for the next cycle.
    pub fn put(&self, scratch: EvolutionScratch) {
        *self.0.lock().unwrap() = Some(scratch);
    }

    /// Claim a scratch for `condition`, rebuilding it when the stashed one
    /// was made for a different kind, size or cascade count.
    pub fn claim(&self, condition: &WaveSpectrumCondition) -> EvolutionScratch {
        match self.take() {
            Some(mut scratch) => match scratch.reset(condition) {
                Ok(()) => scratch,
                Err(e) => {
                    log::debug!("rebuilding evolution scratch: {e}");
                    EvolutionScratch::new(condition)
                }
            },
            None => EvolutionScratch::new(condition),
        }
    }
}

/// One simulation cycle: evolve, inverse transform, publish.
///
/// The WRITE set is claimed in `start()` and published in `end()`, both on
/// the updating thread. A cycle that was cancelled, or had no published
/// condition to evolve, hands its set back untouched.
pub struct EvolutionTask {
    condition: Arc<WaveSpectrumCondition>,
    buffer: Arc<DisplacementBuffer>,
    engine: Arc<dyn Transform2d>,
    stash: Arc<ScratchStash>,
    time: f32,
    threaded: bool,
    output: Option<DisplacementSet>,
    scratch: Option<EvolutionScratch>,
    evolved: bool,
}

impl EvolutionTask {
    /// A cycle evolving `condition` to `time` into `buffer`.
    pub fn new(
        condition: Arc<WaveSpectrumCondition>,
        buffer: Arc<DisplacementBuffer>,
        engine: Arc<dyn Transform2d>,
        stash: Arc<ScratchStash>,
        time: f32,
    ) -> Self {
        Self {
            condition,
            buffer,
            engine,
            stash,
            time,
            threaded: true,
            output: None,
            scratch: None,
            evolved: false,
        }
    }

    /// Run on the updating thread instead of a worker.
    pub fn threaded(mut self, threaded: bool) -> Self {
        self.threaded = threaded;
        self
    }
}

impl Task for EvolutionTask {
    fn name(&self) -> &str {
        "evolution"
    }

    fn is_threaded(&self) -> bool {
        self.threaded
    }

    fn start(&mut self) {
        self.output = Some(self.buffer.take_write_side());
    }

    fn run(&mut self, cx: &TaskContext<'_>) -> Result<Step, TaskError> {
        let mut scratch = self.stash.claim(&self.condition);
        let mask = self.buffer.enabled_mask();
        let result = match self.output.as_mut() {
            Some(out) => scratch.evolve(self.time, mask, self.engine.as_ref(), out, cx),
            None => Ok(false),
        };
        self.scratch = Some(scratch);
        self.evolved = result.map_err(|e| TaskError::failed(e.to_string()))?;
        Ok(Step::Finished)
    }

    fn end(&mut self) {
        if !self.evolved {
            return;
        }
        if let Some(set) = self.output.take() {
            let cycle = self.buffer.publish(set);
            log::trace!("evolved to t={} as cycle {cycle}", self.time);
        }
    }
}

impl Drop for EvolutionTask {
    fn drop(&mut self) {
        if let Some(set) = self.output.take() {
            self.buffer.restore(set);
        }
        if let Some(scratch) = self.scratch.take() {
            self.stash.put(scratch);
        }
    }
}
