//! The double-buffered displacement field.
//!
//! Two [`DisplacementSet`]s alternate between the READ role (visible to
//! queries) and the WRITE role (filled by the evolution task). Readers
//! take an `Arc` to the READ set, so a set they hold is never written
//! again: when the writer next claims that slot while a reader still holds
//! it, the writer gets a fresh allocation instead.
//!
//! ```text
//! slots[read]      ──► snapshot()      queries
//! slots[1 - read]  ──► take_write_side() ──► evolution ──► publish()
//!                                                          (read ^= 1)
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use undertow_core::{BoundaryMode, InterpolatedArray};
use undertow_spectrum::MAX_CASCADES;

/// Channels per texel: horizontal x displacement, height, horizontal z
/// displacement.
pub const CHANNELS: usize = 3;
/// Channel of the x displacement.
pub const CHANNEL_DX: usize = 0;
/// Channel of the height.
pub const CHANNEL_HEIGHT: usize = 1;
/// Channel of the z displacement.
pub const CHANNEL_DZ: usize = 2;

/// Mask with every cascade enabled.
pub const ALL_CASCADES: u8 = (1 << MAX_CASCADES) - 1;

/// One complete displacement field: a wrapped `size x size` grid per
/// cascade.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplacementSet {
    grids: [InterpolatedArray; MAX_CASCADES],
    num_grids: usize,
    cycle: u64,
    time: f32,
}

impl DisplacementSet {
    /// A zeroed set with every cascade allocated.
    pub fn new(size: usize) -> Self {
        Self {
            grids: std::array::from_fn(|_| {
                InterpolatedArray::new(size, size, CHANNELS, BoundaryMode::Wrap)
            }),
            num_grids: 0,
            cycle: 0,
            time: 0.0,
        }
    }

    /// Grid edge length.
    pub fn size(&self) -> usize {
        self.grids[0].width()
    }

    /// One cascade's grid.
    pub fn grid(&self, cascade: usize) -> &InterpolatedArray {
        &self.grids[cascade]
    }

    /// One cascade's grid, mutably.
    pub fn grid_mut(&mut self, cascade: usize) -> &mut InterpolatedArray {
        &mut self.grids[cascade]
    }

    /// Every cascade's grid.
    pub fn grids(&self) -> &[InterpolatedArray; MAX_CASCADES] {
        &self.grids
    }

    /// Cascades holding data.
    pub fn num_grids(&self) -> usize {
        self.num_grids
    }

    /// Set the cascade count.
    pub fn set_num_grids(&mut self, num_grids: usize) {
        self.num_grids = num_grids.min(MAX_CASCADES);
    }

    /// Simulation cycle that produced this set; 0 for the initial flat sea.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Simulation time the set was evolved to.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Set the simulation time.
    pub fn set_time(&mut self, time: f32) {
        self.time = time;
    }

    /// Zero every grid.
    pub fn clear(&mut self) {
        for g in &mut self.grids {
            g.clear();
        }
    }
}

#[derive(Debug)]
struct Slots {
    sets: [Option<Arc<DisplacementSet>>; 2],
    read: usize,
    cycle: u64,
}

/// The READ/WRITE pair plus the enabled-cascade mask.
#[derive(Debug)]
pub struct DisplacementBuffer {
    size: usize,
    slots: Mutex<Slots>,
    enabled: AtomicU8,
}

impl DisplacementBuffer {
    /// Two flat sets of edge `size`, all cascades enabled.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            slots: Mutex::new(Slots {
                sets: [
                    Some(Arc::new(DisplacementSet::new(size))),
                    Some(Arc::new(DisplacementSet::new(size))),
                ],
                read: 0,
                cycle: 0,
            }),
            enabled: AtomicU8::new(ALL_CASCADES),
        }
    }

    /// Grid edge length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The current READ set.
    pub fn snapshot(&self) -> Arc<DisplacementSet> {
        let slots = self.slots.lock().unwrap();
        match &slots.sets[slots.read] {
            Some(set) => Arc::clone(set),
            None => Arc::new(DisplacementSet::new(self.size)),
        }
    }

    /// Index of the READ slot, 0 or 1.
    pub fn read_index(&self) -> usize {
        self.slots.lock().unwrap().read
    }

    /// Completed cycles so far.
    pub fn cycle(&self) -> u64 {
        self.slots.lock().unwrap().cycle
    }

    /// Claim the WRITE set for a new cycle.
    ///
    /// The stored set is reused when no reader holds it; otherwise (or if
    /// it is already claimed) a new zeroed set is allocated.
    pub fn take_write_side(&self) -> DisplacementSet {
        let mut slots = self.slots.lock().unwrap();
        let write = 1 - slots.read;
        match slots.sets[write].take() {
            Some(set) => Arc::try_unwrap(set).unwrap_or_else(|shared| {
                log::trace!("write side still shared by {} reader(s)", Arc::strong_count(&shared) - 1);
                DisplacementSet::new(self.size)
            }),
            None => DisplacementSet::new(self.size),
        }
    }

    /// Make `set` the READ side. Returns the new cycle number.
    pub fn publish(&self, mut set: DisplacementSet) -> u64 {
        let mut slots = self.slots.lock().unwrap();
        slots.cycle += 1;
        set.cycle = slots.cycle;
        let write = 1 - slots.read;
        slots.sets[write] = Some(Arc::new(set));
        slots.read = write;
        log::trace!("displacement cycle {} now readable from slot {write}", slots.cycle);
        slots.cycle
    }

    /// Give back a claimed set that was not published.
    pub fn restore(&self, set: DisplacementSet) {
        let mut slots = self.slots.lock().unwrap();
        let write = 1 - slots.read;
        if slots.sets[write].is_none() {
            slots.sets[write] = Some(Arc::new(set));
        }
    }

    /// Bit `i` set means cascade `i` is simulated and sampled.
    pub fn enabled_mask(&self) -> u8 {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable one cascade. Indices past the last cascade are
    /// ignored.
    pub fn set_enabled(&self, cascade: usize, enabled: bool) {
        if cascade >= MAX_CASCADES {
            return;
        }
        let bit = 1u8 << cascade;
        if enabled {
            self.enabled.fetch_or(bit, Ordering::AcqRel);
        } else {
            self.enabled.fetch_and(!bit, Ordering::AcqRel);
        }
    }

    /// Whether one cascade is enabled.
    pub fn is_enabled(&self, cascade: usize) -> bool {
        cascade < MAX_CASCADES && self.enabled_mask() & (1 << cascade) != 0
    }
}

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<DisplacementBuffer>();
    assert::<DisplacementSet>();
};

#[cfg(test)]
mod tests {
    use super::*;

    fn marked(size: usize, value: f32) -> DisplacementSet {
        let mut set = DisplacementSet::new(size);
        set.grid_mut(0).set(0, 0, CHANNEL_HEIGHT, value);
        set
    }

    #[test]
    fn publish_flips_read_index() {
        let buf = DisplacementBuffer::new(4);
        assert_eq!(buf.read_index(), 0);
        let w = buf.take_write_side();
        assert_eq!(buf.publish(w), 1);
        assert_eq!(buf.read_index(), 1);
        let w = buf.take_write_side();
        assert_eq!(buf.publish(w), 2);
        assert_eq!(buf.read_index(), 0);
        assert_eq!(buf.snapshot().cycle(), 2);
    }

    #[test]
    fn held_snapshot_is_never_rewritten() {
        let buf = DisplacementBuffer::new(4);
        buf.take_write_side();
        buf.publish(marked(4, 1.0));
        let held = buf.snapshot();

        buf.publish(marked(4, 2.0));
        // The held set now sits on the write side; claiming it must not
        // hand out the reader's storage.
        let mut w = buf.take_write_side();
        w.grid_mut(0).set(0, 0, CHANNEL_HEIGHT, 3.0);
        assert_eq!(held.grid(0).get(0, 0, CHANNEL_HEIGHT), 1.0);
        buf.publish(w);
        assert_eq!(buf.snapshot().grid(0).get(0, 0, CHANNEL_HEIGHT), 3.0);
        assert_eq!(held.cycle(), 1);
    }

    #[test]
    fn unshared_write_side_is_reused() {
        let buf = DisplacementBuffer::new(4);
        buf.publish(marked(4, 5.0));
        buf.publish(marked(4, 6.0));
        // Nobody holds cycle 1, so the writer gets it back as is.
        let w = buf.take_write_side();
        assert_eq!(w.cycle(), 1);
        assert_eq!(w.grid(0).get(0, 0, CHANNEL_HEIGHT), 5.0);
    }

    #[test]
    fn restore_returns_unpublished_set() {
        let buf = DisplacementBuffer::new(4);
        let w = buf.take_write_side();
        buf.restore(w);
        assert_eq!(buf.cycle(), 0);
        assert_eq!(buf.read_index(), 0);
        let again = buf.take_write_side();
        assert_eq!(again.size(), 4);
    }

    #[test]
    fn enabled_mask_toggles() {
        let buf = DisplacementBuffer::new(2);
        assert_eq!(buf.enabled_mask(), 0b1111);
        buf.set_enabled(2, false);
        assert_eq!(buf.enabled_mask(), 0b1011);
        assert!(!buf.is_enabled(2));
        buf.set_enabled(2, true);
        buf.set_enabled(9, false);
        assert_eq!(buf.enabled_mask(), ALL_CASCADES);
    }
}
