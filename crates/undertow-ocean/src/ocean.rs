//! The [`Ocean`] context: one scheduler driving generation, evolution,
//! range scans and query batches over a shared displacement buffer.
//!
//! Call [`Ocean::update`] once per frame with the simulation time. Each
//! update makes sure the active condition is generated (or being
//! generated), queues one evolution cycle unless the previous one is still
//! in flight, advances the scheduler, and queues a range scan for every
//! newly published cycle.

use std::sync::{Arc, Mutex};

use undertow_core::TaskId;
use undertow_fourier::{build_engine, FourierBackend, Transform2d};
use undertow_sched::{Scheduler, Task};
use undertow_spectrum::{
    ConditionCache, SpectrumConditionKey, SpectrumParams, WaveSpectrumCondition,
};

use crate::batch::{BatchMode, QueryCallback, QuerySource, SteppedQueryTask, ThreadedQueryTask};
use crate::buffer::{DisplacementBuffer, DisplacementSet};
use crate::config::OceanConfig;
use crate::error::OceanError;
use crate::evolution::{EvolutionTask, ScratchStash};
use crate::query::{evaluate, OverlaySampler, QueryGridScaling, WaveQuery};
use crate::range::{FindRangeTask, MaxDisplacement};

/// A running ocean simulation.
pub struct Ocean {
    config: OceanConfig,
    scheduler: Scheduler,
    cache: ConditionCache,
    engine: Arc<dyn Transform2d>,
    buffer: Arc<DisplacementBuffer>,
    stash: Arc<ScratchStash>,
    condition: Arc<WaveSpectrumCondition>,
    generation_task: Option<TaskId>,
    evolution_task: Option<TaskId>,
    range_task: Option<TaskId>,
    range: Arc<Mutex<MaxDisplacement>>,
    ranged_cycle: u64,
    offset: [f32; 2],
    time: f32,
    overlay: Option<Arc<dyn OverlaySampler>>,
}

impl Ocean {
    /// Validate `config`, build the Fourier engine and scheduler, and
    /// queue generation of the initial condition.
    ///
    /// Fails if the parallel backend's device cannot write every Fourier
    /// buffer of a cycle in one pass.
    pub fn new(config: OceanConfig) -> Result<Self, OceanError> {
        config.validate()?;
        let size = config.fourier_size;
        let engine: Arc<dyn Transform2d> = Arc::from(build_engine(
            config.backend,
            size,
            config.fourier_targets(),
            config.device,
        )?);
        let scheduler = Scheduler::new(config.scheduler.clone())?;
        let key = SpectrumConditionKey::new(size, config.wind_dir, config.num_grids, config.spectrum)?;
        let mut cache = ConditionCache::new(config.cache_capacity);
        let condition = cache.get_or_create(key)?.into_condition();
        log::debug!(
            "ocean {size}x{size}, {} cascade(s), {:?} backend, {} spectrum",
            config.num_grids,
            config.backend,
            condition.kind().name()
        );

        let mut ocean = Self {
            buffer: Arc::new(DisplacementBuffer::new(size)),
            config,
            scheduler,
            cache,
            engine,
            stash: Arc::new(ScratchStash::new()),
            condition,
            generation_task: None,
            evolution_task: None,
            range_task: None,
            range: Arc::new(Mutex::new(MaxDisplacement::default())),
            ranged_cycle: 0,
            offset: [0.0, 0.0],
            time: 0.0,
            overlay: None,
        };
        ocean.ensure_generation();
        Ok(ocean)
    }

    // ── Driving ─────────────────────────────────────────────────────

    /// Advance one frame to simulation time `time` (seconds).
    ///
    /// A deferred task failure from this or an earlier cycle is returned;
    /// the simulation keeps going on the next call.
    pub fn update(&mut self, time: f32) -> Result<(), OceanError> {
        self.time = time;
        self.ensure_generation();
        if !self.in_flight(self.evolution_task) {
            self.evolution_task = self.schedule_evolution();
        }
        self.scheduler.update()?;
        self.schedule_range();
        Ok(())
    }

    fn in_flight(&self, id: Option<TaskId>) -> bool {
        id.is_some_and(|id| self.scheduler.contains(id))
    }

    fn ensure_generation(&mut self) {
        if self.condition.is_ready() || self.in_flight(self.generation_task) {
            return;
        }
        // `None` while an untracked body still owns the condition's
        // generation; it publishes on its own.
        if let Some(task) = self.condition.generation_task(self.config.seed) {
            let task = task.threaded(self.config.threaded);
            self.generation_task = Some(self.scheduler.add(Box::new(task)));
        }
    }

    fn schedule_evolution(&mut self) -> Option<TaskId> {
        let generating = self.generation_task.filter(|&id| self.scheduler.contains(id));
        if generating.is_none() && !self.condition.is_ready() {
            return None;
        }
        let task = EvolutionTask::new(
            Arc::clone(&self.condition),
            Arc::clone(&self.buffer),
            Arc::clone(&self.engine),
            Arc::clone(&self.stash),
            self.time,
        )
        .threaded(self.config.threaded);
        let id = self.scheduler.insert(Box::new(task));
        let waited = generating.is_some_and(|generation| {
            match self.scheduler.wait_on(id, generation) {
                Ok(()) => true,
                Err(e) => {
                    log::debug!("evolution not waiting on generation: {e}");
                    false
                }
            }
        });
        if !waited {
            if let Err(e) = self.scheduler.schedule(id) {
                log::warn!("could not schedule evolution: {e}");
                return None;
            }
        }
        Some(id)
    }

    fn schedule_range(&mut self) {
        let cycle = self.buffer.cycle();
        if cycle == self.ranged_cycle || self.in_flight(self.range_task) {
            return;
        }
        let task = FindRangeTask::new(
            self.buffer.snapshot(),
            self.buffer.enabled_mask(),
            self.scaling(),
            Arc::clone(&self.range),
        )
        .parallel(self.config.backend == FourierBackend::Parallel)
        .threaded(self.config.threaded);
        self.ranged_cycle = cycle;
        self.range_task = Some(self.scheduler.add(Box::new(task)));
    }

    // ── Conditions ──────────────────────────────────────────────────

    /// Switch to a new spectrum and wind direction.
    ///
    /// The condition is taken from the cache when one exists for the new
    /// key, otherwise created and queued for generation. A pending
    /// generation of the old condition is cancelled together with any
    /// evolution waiting on it. Until the new condition is published,
    /// queries keep seeing the last evolved field.
    pub fn set_conditions(&mut self, params: SpectrumParams, wind_dir: f32) -> Result<(), OceanError> {
        let key = SpectrumConditionKey::new(
            self.config.fourier_size,
            wind_dir,
            self.config.num_grids,
            params,
        )?;
        if key == *self.condition.key() {
            return Ok(());
        }
        if let Some(id) = self.generation_task.take() {
            match self.scheduler.cancel(id) {
                Ok(true) => log::debug!("cancelled generation {id}"),
                Ok(false) => log::debug!("generation {id} no longer pending"),
                Err(_) => {}
            }
        }
        let lookup = self.cache.get_or_create(key)?;
        log::debug!(
            "conditions now {} wind {} dir {wind_dir} ({})",
            params.kind().name(),
            params.wind_speed(),
            if lookup.is_hit() { "cached" } else { "new" }
        );
        self.condition = lookup.into_condition();
        self.config.spectrum = params;
        self.config.wind_dir = wind_dir;
        self.ensure_generation();
        Ok(())
    }

    /// Change wind speed and direction, keeping the spectrum model.
    pub fn set_wind(&mut self, wind_speed: f32, wind_dir: f32) -> Result<(), OceanError> {
        let params = self.config.spectrum.with_wind_speed(wind_speed);
        self.set_conditions(params, wind_dir)
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Mapping from world coordinates to the active cascades.
    pub fn scaling(&self) -> QueryGridScaling {
        QueryGridScaling::new(
            self.condition.layout(),
            self.config.grid_scale,
            self.config.choppiness_scale,
            self.offset,
        )
    }

    /// Answer `query` now against the latest published cycle.
    pub fn query_waves(&self, query: &mut WaveQuery) {
        let set = self.buffer.snapshot();
        evaluate(
            query,
            &set,
            self.enabled_buffer_mask(),
            &self.scaling(),
            self.config.ocean_level,
            self.overlay.as_deref(),
        );
    }

    /// Queue a batch of queries. `callback` receives them, answered, from
    /// a later [`update`](Self::update).
    ///
    /// Only [`BatchMode::Stepped`] batches consult the overlay sampler.
    pub fn schedule_query_batch(
        &mut self,
        queries: Vec<WaveQuery>,
        callback: QueryCallback,
        mode: BatchMode,
    ) -> TaskId {
        let source = QuerySource::new(
            Arc::clone(&self.buffer),
            self.scaling(),
            self.config.ocean_level,
        );
        let body: Box<dyn Task> = match mode {
            BatchMode::Threaded => Box::new(ThreadedQueryTask::new(source, queries, callback)),
            BatchMode::Stepped { per_step } => Box::new(
                SteppedQueryTask::new(source, queries, callback, per_step)
                    .with_overlay(self.overlay.clone()),
            ),
        };
        self.scheduler.add(body)
    }

    /// Cancel a batch that has not started. Returns `false` once it is
    /// running.
    pub fn cancel_query_batch(&mut self, id: TaskId) -> Result<bool, OceanError> {
        Ok(self.scheduler.cancel(id)?)
    }

    /// Bounds of the surface excursion, from the latest range scan.
    pub fn max_displacement(&self) -> MaxDisplacement {
        *self.range.lock().unwrap()
    }

    /// Enable or disable simulation and sampling of one cascade.
    pub fn set_cascade_enabled(&mut self, index: usize, enabled: bool) -> Result<(), OceanError> {
        if index >= self.config.num_grids {
            return Err(OceanError::InvalidCascade { index });
        }
        self.buffer.set_enabled(index, enabled);
        Ok(())
    }

    /// Bit `i` set means cascade `i` is active and enabled.
    pub fn enabled_buffer_mask(&self) -> u8 {
        let active = (1u8 << self.config.num_grids) - 1;
        self.buffer.enabled_mask() & active
    }

    /// The latest published displacement field.
    pub fn snapshot(&self) -> Arc<DisplacementSet> {
        self.buffer.snapshot()
    }

    /// Scroll the ocean by a world offset `(x, z)`.
    pub fn set_offset(&mut self, offset: [f32; 2]) {
        self.offset = offset;
    }

    /// Current scroll offset.
    pub fn offset(&self) -> [f32; 2] {
        self.offset
    }

    /// Install or remove the overlay sampler.
    pub fn set_overlay_sampler(&mut self, overlay: Option<Arc<dyn OverlaySampler>>) {
        self.overlay = overlay;
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// The configuration, with the current spectrum and wind.
    pub fn config(&self) -> &OceanConfig {
        &self.config
    }

    /// The active condition.
    pub fn condition(&self) -> &Arc<WaveSpectrumCondition> {
        &self.condition
    }

    /// The condition cache.
    pub fn cache(&self) -> &ConditionCache {
        &self.cache
    }

    /// The scheduler, for callers adding their own tasks.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The scheduler, mutably.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Time passed to the last update.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Evolution cycles published so far.
    pub fn cycle(&self) -> u64 {
        self.buffer.cycle()
    }

    /// Whether the active condition has been generated.
    pub fn is_ready(&self) -> bool {
        self.condition.is_ready()
    }

    /// Cancel everything, waiting up to the scheduler's `max_wait`, and
    /// stop the worker threads.
    pub fn shutdown(&mut self) {
        self.scheduler.shutdown();
        self.generation_task = None;
        self.evolution_task = None;
        self.range_task = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use undertow_sched::SchedulerConfig;

    fn inline(num_grids: usize) -> OceanConfig {
        OceanConfig {
            fourier_size: 16,
            num_grids,
            threaded: false,
            scheduler: SchedulerConfig {
                disable_multithreading: true,
                ..SchedulerConfig::default()
            },
            ..OceanConfig::default()
        }
    }

    #[test]
    fn generation_queued_at_construction() {
        let ocean = Ocean::new(inline(2)).unwrap();
        assert!(ocean.in_flight(ocean.generation_task));
        assert!(!ocean.is_ready());
    }

    #[test]
    fn first_update_generates_second_publishes() {
        let mut ocean = Ocean::new(inline(1)).unwrap();
        // Generation runs and publishes in the first update; the
        // evolution queued behind it is released and runs in the next.
        ocean.update(0.0).unwrap();
        assert!(ocean.is_ready());
        ocean.update(0.1).unwrap();
        assert!(ocean.cycle() >= 1);
    }

    #[test]
    fn cascade_index_checked_against_count() {
        let mut ocean = Ocean::new(inline(2)).unwrap();
        assert_eq!(
            ocean.set_cascade_enabled(2, false),
            Err(OceanError::InvalidCascade { index: 2 })
        );
        assert_eq!(ocean.enabled_buffer_mask(), 0b11);
        ocean.set_cascade_enabled(1, false).unwrap();
        assert_eq!(ocean.enabled_buffer_mask(), 0b01);
    }

    #[test]
    fn same_conditions_are_a_no_op() {
        let mut ocean = Ocean::new(inline(1)).unwrap();
        let before = ocean.generation_task;
        let params = ocean.config().spectrum;
        ocean.set_conditions(params, 0.0).unwrap();
        assert_eq!(ocean.generation_task, before);
        assert_eq!(ocean.cache().misses(), 1);
    }

    #[test]
    fn invalid_wind_is_rejected() {
        let mut ocean = Ocean::new(inline(1)).unwrap();
        assert!(matches!(
            ocean.set_wind(f32::NAN, 0.0),
            Err(OceanError::Spectrum(_))
        ));
    }
}
