//! Scheduler lifecycle, ordering, dependency and failure tests.

use std::thread;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use undertow_core::{SchedulerError, TaskError};
use undertow_sched::{Scheduler, SchedulerConfig, TaskState};
use undertow_test_utils::{Behaviour, RecordingTask, TaskLog};

fn inline(max_tasks: usize) -> Scheduler {
    Scheduler::new(SchedulerConfig {
        max_tasks_per_update: max_tasks,
        disable_multithreading: true,
        ..SchedulerConfig::default()
    })
    .unwrap()
}

fn threaded() -> Scheduler {
    Scheduler::new(SchedulerConfig {
        worker_count: Some(2),
        max_wait: Duration::from_millis(1000),
        ..SchedulerConfig::default()
    })
    .unwrap()
}

/// Update until `done` holds or five seconds pass.
fn pump(s: &mut Scheduler, mut done: impl FnMut(&Scheduler) -> bool) -> Result<(), SchedulerError> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(s) {
        assert!(Instant::now() < deadline, "scheduler did not settle");
        s.update()?;
        thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}

// ── Ordering ──────────────────────────────────────────────────

#[test]
fn one_task_per_update_in_fifo_order() {
    let log = TaskLog::new();
    let mut s = inline(1);
    for name in ["a", "b", "c"] {
        s.add(RecordingTask::new(name, &log).boxed());
    }

    s.update().unwrap();
    assert_eq!(log.names_for("run"), ["a"]);
    assert_eq!(s.tasks_ran_this_update(), 1);
    s.update().unwrap();
    assert_eq!(log.names_for("run"), ["a", "b"]);
    s.update().unwrap();
    assert_eq!(log.names_for("run"), ["a", "b", "c"]);
    assert!(!s.has_tasks());
}

#[test]
fn finish_budget_defers_end() {
    let log = TaskLog::new();
    let mut s = Scheduler::new(SchedulerConfig {
        max_finish_per_update: 1,
        disable_multithreading: true,
        ..SchedulerConfig::default()
    })
    .unwrap();
    let a = s.add(RecordingTask::new("a", &log).boxed());
    let b = s.add(RecordingTask::new("b", &log).boxed());

    s.update().unwrap();
    assert_eq!(log.names_for("end"), ["a"]);
    assert!(s.is_finishing(b));
    assert_eq!(s.state(a), Some(TaskState::Done));

    s.update().unwrap();
    assert_eq!(log.names_for("end"), ["a", "b"]);
}

// ── Dependencies ──────────────────────────────────────────────

#[test]
fn waiter_released_only_after_last_dependency() {
    let log = TaskLog::new();
    let mut s = inline(1);
    let b = s.add(RecordingTask::new("b", &log).boxed());
    let c = s.add(RecordingTask::new("c", &log).boxed());
    let a = s.insert(RecordingTask::new("a", &log).boxed());
    s.wait_on(a, b).unwrap();
    s.wait_on(a, c).unwrap();
    assert!(s.is_waiting(a));
    assert_eq!(s.waiting_count(a), Some(2));

    s.update().unwrap();
    assert_eq!(s.state(b), Some(TaskState::Done));
    assert_eq!(s.waiting_count(a), Some(1));
    assert!(s.is_waiting(a));

    s.update().unwrap();
    assert_eq!(s.state(c), Some(TaskState::Done));
    assert!(s.is_scheduled(a));
    assert_eq!(log.count("run:a"), 0);

    s.update().unwrap();
    assert_eq!(log.names_for("run"), ["b", "c", "a"]);
}

#[test]
fn scheduled_waiter_moves_to_waiting_queue() {
    let log = TaskLog::new();
    let mut s = inline(100);
    let a = s.add(RecordingTask::new("a", &log).boxed());
    let b = s.insert(RecordingTask::new("b", &log).boxed());
    s.wait_on(a, b).unwrap();
    assert!(s.is_waiting(a));
    assert_eq!(s.scheduled_tasks().count(), 0);

    s.schedule(b).unwrap();
    s.update().unwrap();
    assert!(s.is_scheduled(a));
    s.update().unwrap();
    assert_eq!(log.names_for("end"), ["b", "a"]);
}

#[test]
fn run_on_stop_waiting_runs_in_same_update() {
    let log = TaskLog::new();
    let mut s = inline(100);
    let b = s.add(RecordingTask::new("b", &log).boxed());
    let a = s.add_waiting(RecordingTask::new("a", &log).run_on_stop_waiting().boxed());
    s.wait_on(a, b).unwrap();

    s.update().unwrap();
    assert_eq!(log.names_for("run"), ["b", "a"]);
}

#[test]
fn stop_waiting_releases_early() {
    let log = TaskLog::new();
    let mut s = inline(100);
    let a = s.add_waiting(RecordingTask::new("a", &log).boxed());
    s.stop_waiting(a, false).unwrap();
    assert!(s.is_scheduled(a));
    s.update().unwrap();
    assert_eq!(log.count("end:a"), 1);
}

#[test]
fn no_finish_task_releases_dependents_without_end() {
    let log = TaskLog::new();
    let mut s = inline(100);
    let b = s.add(RecordingTask::new("b", &log).no_finish().boxed());
    let a = s.insert(RecordingTask::new("a", &log).boxed());
    s.wait_on(a, b).unwrap();

    s.update().unwrap();
    assert_eq!(log.count("end:b"), 0);
    assert_eq!(s.state(b), Some(TaskState::Done));
    assert!(s.is_scheduled(a) || s.state(a) == Some(TaskState::Done));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn lifecycle_and_notification_happen_exactly_once(dependents in 0usize..8) {
        let log = TaskLog::new();
        let mut s = inline(100);
        let root = s.add(RecordingTask::new("root", &log).boxed());
        let mut deps = Vec::new();
        for i in 0..dependents {
            let d = s.insert(RecordingTask::new(format!("d{i}"), &log).boxed());
            s.wait_on(d, root).unwrap();
            deps.push(d);
        }

        for _ in 0..4 {
            s.update().unwrap();
        }

        prop_assert_eq!(log.count("start:root"), 1);
        prop_assert_eq!(log.count("run:root"), 1);
        prop_assert_eq!(log.count("end:root"), 1);
        prop_assert_eq!(s.state(root), Some(TaskState::Done));
        for i in 0..dependents {
            prop_assert_eq!(log.count(&format!("run:d{i}")), 1);
            prop_assert_eq!(log.count(&format!("end:d{i}")), 1);
        }
        for d in deps {
            prop_assert_eq!(s.state(d), Some(TaskState::Done));
        }
        prop_assert!(!s.has_tasks());
    }
}

// ── Preconditions ─────────────────────────────────────────────

#[test]
fn waiting_on_finished_task_is_rejected() {
    let log = TaskLog::new();
    let mut s = inline(100);
    let b = s.add(RecordingTask::new("b", &log).boxed());
    s.update().unwrap();
    let a = s.insert(RecordingTask::new("a", &log).boxed());
    assert_eq!(
        s.wait_on(a, b),
        Err(SchedulerError::WaitOnFinished {
            waiter: a,
            target: b
        })
    );
}

#[test]
fn waiting_on_cancelled_task_is_rejected() {
    let log = TaskLog::new();
    let mut s = inline(100);
    let b = s.add(RecordingTask::new("b", &log).boxed());
    assert!(s.cancel(b).unwrap());
    assert_eq!(log.count("cancel:b"), 1);
    let a = s.insert(RecordingTask::new("a", &log).boxed());
    assert_eq!(
        s.wait_on(a, b),
        Err(SchedulerError::WaitOnCancelled {
            waiter: a,
            target: b
        })
    );
}

#[test]
fn inline_task_cannot_wait_on_threaded_no_finish() {
    let log = TaskLog::new();
    let mut s = inline(100);
    let b = s.insert(RecordingTask::new("b", &log).threaded().no_finish().boxed());
    let a = s.insert(RecordingTask::new("a", &log).boxed());
    assert_eq!(
        s.wait_on(a, b),
        Err(SchedulerError::WaitOnNoFinishThreaded {
            waiter: a,
            target: b
        })
    );
    let c = s.insert(RecordingTask::new("c", &log).threaded().boxed());
    assert!(s.wait_on(c, b).is_ok());
}

#[test]
fn self_wait_is_rejected() {
    let log = TaskLog::new();
    let mut s = inline(100);
    let a = s.insert(RecordingTask::new("a", &log).boxed());
    assert_eq!(s.wait_on(a, a), Err(SchedulerError::WaitOnSelf { id: a }));
}

// ── Threads, failures and cancellation ───────────────────────

#[test]
fn threaded_failure_surfaces_from_update() {
    let log = TaskLog::new();
    let mut s = threaded();
    s.add(
        RecordingTask::new("bad", &log)
            .threaded()
            .behaviour(Behaviour::Fail("no data".into()))
            .boxed(),
    );
    let err = pump(&mut s, |_| false).unwrap_err();
    assert_eq!(
        err,
        SchedulerError::TaskFailed {
            name: "bad".into(),
            source: TaskError::failed("no data"),
        }
    );
    assert_eq!(log.count("end:bad"), 0);
}

#[test]
fn threaded_panic_surfaces_from_update() {
    let log = TaskLog::new();
    let mut s = threaded();
    s.add(
        RecordingTask::new("boom", &log)
            .threaded()
            .behaviour(Behaviour::Panic("worker exploded".into()))
            .boxed(),
    );
    match pump(&mut s, |_| false) {
        Err(SchedulerError::TaskFailed {
            name,
            source: TaskError::Panicked { message },
        }) => {
            assert_eq!(name, "boom");
            assert_eq!(message, "worker exploded");
        }
        other => panic!("expected panic failure, got {other:?}"),
    }
    // The worker survived and still serves jobs.
    let ok = s.add(RecordingTask::new("ok", &log).threaded().boxed());
    pump(&mut s, |s| s.state(ok) == Some(TaskState::Done)).unwrap();
}

#[test]
fn inline_failure_cancels_dependents() {
    let log = TaskLog::new();
    let mut s = inline(100);
    let b = s.add(
        RecordingTask::new("b", &log)
            .behaviour(Behaviour::Fail("bad input".into()))
            .boxed(),
    );
    let a = s.insert(RecordingTask::new("a", &log).boxed());
    s.wait_on(a, b).unwrap();
    assert!(matches!(
        s.update(),
        Err(SchedulerError::TaskFailed { .. })
    ));
    assert_eq!(s.state(a), Some(TaskState::Cancelled));
    s.update().unwrap();
    assert_eq!(log.count("run:a"), 0);
}

#[test]
fn threaded_tasks_release_threaded_dependents() {
    let log = TaskLog::new();
    let mut s = threaded();
    let gen = s.add(RecordingTask::new("gen", &log).threaded().boxed());
    let evo = s.insert(RecordingTask::new("evo", &log).threaded().boxed());
    s.wait_on(evo, gen).unwrap();
    pump(&mut s, |s| s.state(evo) == Some(TaskState::Done)).unwrap();
    assert_eq!(log.names_for("end"), ["gen", "evo"]);
}

#[test]
fn cancel_all_stops_cooperative_threaded_task_within_timeout() {
    let log = TaskLog::new();
    let mut s = threaded();
    let id = s.add(
        RecordingTask::new("spin", &log)
            .threaded()
            .behaviour(Behaviour::SpinUntilCancelled)
            .boxed(),
    );
    s.update().unwrap();
    // Wait for the worker to pick the job up.
    let deadline = Instant::now() + Duration::from_secs(5);
    while log.count("run:spin") == 0 {
        assert!(Instant::now() < deadline, "worker never started");
        thread::sleep(Duration::from_millis(1));
    }
    let pending = s.add(RecordingTask::new("pending", &log).boxed());

    let started = Instant::now();
    s.cancel_all();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(1000), "cancel_all took {elapsed:?}");
    assert_eq!(s.running_tasks().count(), 0);
    assert_eq!(s.scheduled_tasks().count(), 0);
    assert!(!s.has_tasks());
    assert_eq!(s.state(id), Some(TaskState::Cancelled));
    assert_eq!(log.count("end:spin"), 0);
    assert_eq!(s.state(pending), Some(TaskState::Cancelled));
    assert_eq!(log.count("cancel:pending"), 1);
}

#[test]
fn yielding_task_is_cancelled_by_cancel_all() {
    let log = TaskLog::new();
    let mut s = inline(100);
    let id = s.add(RecordingTask::new("slow", &log).steps(10).boxed());
    s.update().unwrap();
    assert!(s.is_running(id));
    s.cancel_all();
    assert_eq!(log.count("cancel:slow"), 1);
    assert!(!s.has_tasks());
}

#[test]
fn shutting_down_drops_new_work() {
    let log = TaskLog::new();
    let mut s = inline(100);
    s.set_shutting_down(true);
    s.add(RecordingTask::new("late", &log).boxed());
    s.update().unwrap();
    assert!(log.events().is_empty());
    s.set_shutting_down(false);
    s.add(RecordingTask::new("ok", &log).boxed());
    s.update().unwrap();
    assert_eq!(log.count("end:ok"), 1);
}

#[test]
fn clear_resets_pending_queues() {
    let log = TaskLog::new();
    let mut s = inline(100);
    s.add(RecordingTask::new("a", &log).boxed());
    s.add_waiting(RecordingTask::new("b", &log).boxed());
    s.clear().unwrap();
    assert!(!s.has_tasks());
    s.update().unwrap();
    assert!(log.events().is_empty());
}
