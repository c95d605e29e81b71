//! Strongly-typed identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Handle to a task stored in the scheduler's task arena.
///
/// The `index` addresses a slot in the arena; the `generation` is bumped
/// every time the slot is reused, so a stale handle never aliases a newer
/// task that happens to occupy the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    index: u32,
    generation: u32,
}

impl TaskId {
    /// Create a handle from a slot index and generation.
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index.
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Slot generation this handle was issued for.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}v{}", self.index, self.generation)
    }
}

/// Counter for [`ConditionGeneration`] allocation. Starts at 1 so that
/// zero can mean "never generated".
static CONDITION_GENERATION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Monotonic stamp attached to every published spectrum condition table.
///
/// Consumers remember the last generation they copied and only re-copy
/// when the stamp changes. Allocated from a process-wide counter so two
/// publications never share a stamp, even across different conditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ConditionGeneration(u64);

impl ConditionGeneration {
    /// The "never generated" stamp.
    pub const NONE: Self = Self(0);

    /// Allocate a fresh, strictly increasing stamp. Thread-safe.
    pub fn next() -> Self {
        Self(CONDITION_GENERATION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuild a stamp from a value previously returned by
    /// [`get`](Self::get).
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value.
    pub fn get(self) -> u64 {
        self.0
    }

    /// Whether this stamp refers to a published table.
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ConditionGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_accessors() {
        let id = TaskId::new(7, 3);
        assert_eq!(id.index(), 7);
        assert_eq!(id.generation(), 3);
        assert_eq!(id.to_string(), "task#7v3");
    }

    #[test]
    fn stale_generation_is_distinct() {
        assert_ne!(TaskId::new(1, 0), TaskId::new(1, 1));
    }

    #[test]
    fn condition_generations_increase() {
        let a = ConditionGeneration::next();
        let b = ConditionGeneration::next();
        assert!(b > a);
        assert!(a.is_valid());
        assert!(!ConditionGeneration::NONE.is_valid());
    }
}
