//! A generated spectrum: the frequency-domain amplitudes and dispersion
//! table for one [`SpectrumConditionKey`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use undertow_core::{ConditionGeneration, SpectrumError};

use crate::generate::SpectrumTask;
use crate::key::SpectrumConditionKey;
use crate::layout::CascadeLayout;
use crate::model::SpectrumKind;

/// Tables produced by one generation run. Every table holds `size * size`
/// cells in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionData {
    /// Amplitudes of cascades 0 and 1 as `(re0, im0, re1, im1)`.
    pub spectrum01: Vec<[f32; 4]>,
    /// Amplitudes of cascades 2 and 3. Empty with two cascades or fewer.
    pub spectrum23: Vec<[f32; 4]>,
    /// Angular frequency of each cell, one lane per cascade.
    pub wtable: Vec<[f32; 4]>,
}

impl ConditionData {
    /// Amplitude of `cascade` at cell `index` as `(re, im)`.
    #[inline]
    pub fn amplitude(&self, cascade: usize, index: usize) -> [f32; 2] {
        let (table, lane) = match cascade {
            0 => (&self.spectrum01, 0),
            1 => (&self.spectrum01, 2),
            2 => (&self.spectrum23, 0),
            _ => (&self.spectrum23, 2),
        };
        match table.get(index) {
            Some(c) => [c[lane], c[lane + 1]],
            None => [0.0, 0.0],
        }
    }
}

/// The cached condition for one key.
///
/// Invalid until a [`SpectrumTask`] publishes its tables. Readers take a
/// cheap `Arc` to the current tables and compare generations to detect
/// regeneration.
#[derive(Debug)]
pub struct WaveSpectrumCondition {
    key: SpectrumConditionKey,
    layout: CascadeLayout,
    data: RwLock<Option<Arc<ConditionData>>>,
    generation: AtomicU64,
    generating: AtomicBool,
}

impl WaveSpectrumCondition {
    /// An empty condition for `key`.
    pub fn new(key: SpectrumConditionKey) -> Result<Self, SpectrumError> {
        let layout = CascadeLayout::for_grids(key.num_grids())?;
        Ok(Self {
            key,
            layout,
            data: RwLock::new(None),
            generation: AtomicU64::new(ConditionGeneration::NONE.get()),
            generating: AtomicBool::new(false),
        })
    }

    /// The key this condition was built for.
    pub fn key(&self) -> &SpectrumConditionKey {
        &self.key
    }

    /// Cascade constants.
    pub fn layout(&self) -> &CascadeLayout {
        &self.layout
    }

    /// Grid edge length.
    pub fn size(&self) -> usize {
        self.key.size()
    }

    /// Model kind.
    pub fn kind(&self) -> SpectrumKind {
        self.key.kind()
    }

    /// Generation of the published tables, [`ConditionGeneration::NONE`]
    /// before the first publication.
    pub fn generation(&self) -> ConditionGeneration {
        ConditionGeneration::from_raw(self.generation.load(Ordering::Acquire))
    }

    /// Whether tables have been published.
    pub fn is_ready(&self) -> bool {
        self.generation().is_valid()
    }

    /// The published tables, if any.
    pub fn data(&self) -> Option<Arc<ConditionData>> {
        self.data.read().unwrap().clone()
    }

    /// The published tables together with their generation, read
    /// consistently.
    pub fn snapshot(&self) -> Option<(ConditionGeneration, Arc<ConditionData>)> {
        let guard = self.data.read().unwrap();
        guard.as_ref().map(|d| (self.generation(), Arc::clone(d)))
    }

    /// Whether a generation task for this condition is alive.
    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::Acquire)
    }

    /// A generation task seeded with `seed`, or `None` if one is already
    /// alive for this condition.
    pub fn generation_task(self: &Arc<Self>, seed: u64) -> Option<SpectrumTask> {
        self.generating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SpectrumTask::new(Arc::clone(self), seed))
    }

    pub(crate) fn generation_released(&self) {
        self.generating.store(false, Ordering::Release);
    }

    /// Replace the tables and bump the generation.
    pub(crate) fn publish(&self, data: ConditionData) {
        let mut guard = self.data.write().unwrap();
        *guard = Some(Arc::new(data));
        let generation = ConditionGeneration::next();
        self.generation.store(generation.get(), Ordering::Release);
        drop(guard);
        log::debug!(
            "published {} condition size={} grids={} as generation {generation}",
            self.kind().name(),
            self.size(),
            self.key.num_grids()
        );
    }
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<WaveSpectrumCondition>();
};
