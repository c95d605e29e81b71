//! Spectrum generation driven through the scheduler.

use std::time::{Duration, Instant};

use undertow_sched::{Scheduler, SchedulerConfig, TaskState};
use undertow_spectrum::{ConditionCache, SpectrumConditionKey, SpectrumParams};

fn key(size: usize, grids: usize) -> SpectrumConditionKey {
    SpectrumConditionKey::new(
        size,
        30.0,
        grids,
        SpectrumParams::Unified {
            wind_speed: 9.0,
            wave_age: 0.84,
        },
    )
    .unwrap()
}

fn pump(sched: &mut Scheduler, done: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        sched.update().unwrap();
        assert!(Instant::now() < deadline, "timed out");
        std::thread::yield_now();
    }
}

#[test]
fn threaded_generation_publishes_on_end() {
    let mut sched = Scheduler::new(SchedulerConfig::default()).unwrap();
    let mut cache = ConditionCache::new(4);
    let condition = cache.get_or_create(key(32, 4)).unwrap().into_condition();

    let task = condition.generation_task(0).unwrap();
    let id = sched.add(Box::new(task));
    assert!(!condition.is_ready());

    pump(&mut sched, || condition.is_ready());
    assert_eq!(sched.state(id), Some(TaskState::Done));
    assert!(!condition.is_generating());

    let data = condition.data().unwrap();
    assert_eq!(data.spectrum01.len(), 32 * 32);
    assert_eq!(data.spectrum23.len(), 32 * 32);
    assert!(data.spectrum01.iter().any(|c| c[0] != 0.0));
    assert!(data.wtable.iter().flatten().all(|w| w.is_finite()));
}

#[test]
fn regeneration_bumps_the_generation() {
    let mut sched = Scheduler::new(SchedulerConfig {
        disable_multithreading: true,
        ..SchedulerConfig::default()
    })
    .unwrap();
    let mut cache = ConditionCache::default();
    let condition = cache.get_or_create(key(16, 1)).unwrap().into_condition();

    sched.add(Box::new(condition.generation_task(1).unwrap()));
    sched.update().unwrap();
    let first = condition.generation();
    assert!(first.is_valid());

    sched.add(Box::new(condition.generation_task(1).unwrap()));
    sched.update().unwrap();
    let second = condition.generation();
    assert!(second > first);
    // Same seed, same tables.
    assert!(cache.get_or_create(key(16, 1)).unwrap().is_hit());
}

#[test]
fn cancelled_generation_leaves_condition_empty() {
    let mut sched = Scheduler::new(SchedulerConfig::default()).unwrap();
    let mut cache = ConditionCache::default();
    let condition = cache.get_or_create(key(64, 2)).unwrap().into_condition();

    let id = sched.add(Box::new(condition.generation_task(0).unwrap()));
    assert!(sched.cancel(id).unwrap());
    sched.update().unwrap();

    assert_eq!(sched.state(id), Some(TaskState::Cancelled));
    assert!(!condition.is_ready());
    assert!(!condition.is_generating());
}
