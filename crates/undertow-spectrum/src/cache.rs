//! Bounded, insertion-ordered cache of spectrum conditions.

use std::sync::Arc;

use indexmap::IndexMap;
use undertow_core::SpectrumError;

use crate::condition::WaveSpectrumCondition;
use crate::key::SpectrumConditionKey;

/// Default number of conditions kept alive.
pub const DEFAULT_CACHE_CAPACITY: usize = 10;

/// Result of a cache lookup.
#[derive(Debug)]
pub enum CacheLookup {
    /// The key was present; its condition may still be generating.
    Hit(Arc<WaveSpectrumCondition>),
    /// A new, empty condition was created and inserted.
    Miss(Arc<WaveSpectrumCondition>),
}

impl CacheLookup {
    /// The condition either way.
    pub fn condition(&self) -> &Arc<WaveSpectrumCondition> {
        match self {
            Self::Hit(c) | Self::Miss(c) => c,
        }
    }

    /// Consume the lookup, keeping the condition.
    pub fn into_condition(self) -> Arc<WaveSpectrumCondition> {
        match self {
            Self::Hit(c) | Self::Miss(c) => c,
        }
    }

    /// Whether the key was already cached.
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// Maps condition keys to generated conditions.
///
/// When full, inserting evicts the entry inserted earliest. Lookups do
/// not refresh an entry's position. Evicted conditions stay alive for as
/// long as someone else holds them.
#[derive(Debug)]
pub struct ConditionCache {
    entries: IndexMap<SpectrumConditionKey, Arc<WaveSpectrumCondition>>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl Default for ConditionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ConditionCache {
    /// An empty cache holding at most `capacity` conditions (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: IndexMap::with_capacity(capacity),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    /// Return the cached condition for `key`, creating it on a miss.
    pub fn get_or_create(
        &mut self,
        key: SpectrumConditionKey,
    ) -> Result<CacheLookup, SpectrumError> {
        if let Some(c) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(CacheLookup::Hit(Arc::clone(c)));
        }
        let condition = Arc::new(WaveSpectrumCondition::new(key)?);
        while self.entries.len() >= self.capacity {
            if let Some((evicted, _)) = self.entries.shift_remove_index(0) {
                log::debug!(
                    "evicted {} condition size={} from cache",
                    evicted.kind().name(),
                    evicted.size()
                );
            }
        }
        self.entries.insert(key, Arc::clone(&condition));
        self.misses += 1;
        log::debug!(
            "condition cache miss: {} size={} grids={} ({} cached)",
            key.kind().name(),
            key.size(),
            key.num_grids(),
            self.entries.len()
        );
        Ok(CacheLookup::Miss(condition))
    }

    /// Look up without inserting.
    pub fn get(&self, key: &SpectrumConditionKey) -> Option<Arc<WaveSpectrumCondition>> {
        self.entries.get(key).cloned()
    }

    /// Whether `key` is cached.
    pub fn contains(&self, key: &SpectrumConditionKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop one entry.
    pub fn remove(&mut self, key: &SpectrumConditionKey) -> Option<Arc<WaveSpectrumCondition>> {
        self.entries.shift_remove(key)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Cached entry count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum entry count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lookups that found their key.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that created a condition.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}
