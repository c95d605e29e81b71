//! Test utilities for undertow development.
//!
//! Provides [`RecordingTask`], a configurable [`Task`] that logs every
//! lifecycle call into a shared [`TaskLog`], plus numeric fixtures in
//! [`fixtures`] (seeded random grids and a brute-force reference DFT).

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use undertow_core::TaskError;
use undertow_sched::{Step, Task, TaskContext};

/// Shared, ordered record of lifecycle events.
///
/// Events are strings of the form `"<hook>:<task name>"`, e.g. `"run:a"`.
#[derive(Debug, Default)]
pub struct TaskLog {
    events: Mutex<Vec<String>>,
}

impl TaskLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Number of events exactly equal to `event`.
    pub fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == event)
            .count()
    }

    /// Events starting with `hook:`, in order, with the prefix stripped.
    pub fn names_for(&self, hook: &str) -> Vec<String> {
        let prefix = format!("{hook}:");
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }
}

/// What a [`RecordingTask`] does when run.
#[derive(Clone, Debug)]
pub enum Behaviour {
    /// Finish after the configured number of steps.
    Complete,
    /// Return `TaskError::Failed` with this reason.
    Fail(String),
    /// Panic with this message.
    Panic(String),
    /// Sleep in 1 ms slices until cancelled (gives up after 10 s).
    SpinUntilCancelled,
}

/// A task that records its lifecycle into a [`TaskLog`].
pub struct RecordingTask {
    name: String,
    log: Arc<TaskLog>,
    threaded: bool,
    no_finish: bool,
    run_on_stop_waiting: bool,
    steps: usize,
    behaviour: Behaviour,
}

impl RecordingTask {
    pub fn new(name: impl Into<String>, log: &Arc<TaskLog>) -> Self {
        Self {
            name: name.into(),
            log: Arc::clone(log),
            threaded: false,
            no_finish: false,
            run_on_stop_waiting: false,
            steps: 1,
            behaviour: Behaviour::Complete,
        }
    }

    pub fn threaded(mut self) -> Self {
        self.threaded = true;
        self
    }

    pub fn no_finish(mut self) -> Self {
        self.no_finish = true;
        self
    }

    pub fn run_on_stop_waiting(mut self) -> Self {
        self.run_on_stop_waiting = true;
        self
    }

    /// Number of `run` calls before the task reports `Finished`.
    pub fn steps(mut self, steps: usize) -> Self {
        self.steps = steps.max(1);
        self
    }

    pub fn behaviour(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    pub fn boxed(self) -> Box<dyn Task> {
        Box::new(self)
    }

    fn record(&self, hook: &str) {
        self.log.push(format!("{hook}:{}", self.name));
    }
}

impl Task for RecordingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_threaded(&self) -> bool {
        self.threaded
    }

    fn no_finish(&self) -> bool {
        self.no_finish
    }

    fn run_on_stop_waiting(&self) -> bool {
        self.run_on_stop_waiting
    }

    fn start(&mut self) {
        self.record("start");
    }

    fn run(&mut self, cx: &TaskContext<'_>) -> Result<Step, TaskError> {
        self.record("run");
        match &self.behaviour {
            Behaviour::Complete => {}
            Behaviour::Fail(reason) => return Err(TaskError::failed(reason.clone())),
            Behaviour::Panic(message) => panic!("{message}"),
            Behaviour::SpinUntilCancelled => {
                let deadline = Instant::now() + Duration::from_secs(10);
                while !cx.is_cancelled() && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(1));
                }
                return Ok(Step::Finished);
            }
        }
        if self.steps > 1 {
            self.steps -= 1;
            Ok(Step::Yield)
        } else {
            Ok(Step::Finished)
        }
    }

    fn end(&mut self) {
        self.record("end");
    }

    fn cancel(&mut self) {
        self.record("cancel");
    }
}
