//! Asynchronous batches of wave queries.
//!
//! A batch runs either as one threaded task that answers every query on a
//! worker, or as a main-thread task that answers a fixed number of queries
//! per scheduler update and may consult an [`OverlaySampler`]. Either way
//! every result is cleared when the batch is built, and the callback runs
//! from `end()` on the updating thread once all queries have results. A
//! cancelled batch never calls back.

use std::sync::Arc;

use undertow_core::TaskError;
use undertow_sched::{Step, Task, TaskContext};

use crate::buffer::{DisplacementBuffer, DisplacementSet};
use crate::query::{evaluate, OverlaySampler, QueryGridScaling, WaveQuery};

/// Queries answered per update by a stepped batch unless told otherwise.
pub const DEFAULT_QUERIES_PER_STEP: usize = 16;

/// Receives the answered queries.
pub type QueryCallback = Box<dyn FnOnce(Vec<WaveQuery>) + Send>;

/// How a batch is evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// All at once on a worker thread. Overlays are not sampled.
    #[default]
    Threaded,
    /// `per_step` queries per update on the updating thread.
    Stepped {
        /// Queries answered per update; at least 1.
        per_step: usize,
    },
}

impl BatchMode {
    /// Stepped evaluation with [`DEFAULT_QUERIES_PER_STEP`].
    pub fn stepped() -> Self {
        Self::Stepped {
            per_step: DEFAULT_QUERIES_PER_STEP,
        }
    }
}

/// Where a batch reads the ocean from.
///
/// The READ set is captured when the task starts, so a batch sees one
/// consistent cycle even if it spans several updates.
#[derive(Clone, Debug)]
pub struct QuerySource {
    buffer: Arc<DisplacementBuffer>,
    scaling: QueryGridScaling,
    ocean_level: f32,
}

impl QuerySource {
    /// Read from `buffer` with the given mapping and base level.
    pub fn new(buffer: Arc<DisplacementBuffer>, scaling: QueryGridScaling, ocean_level: f32) -> Self {
        Self {
            buffer,
            scaling,
            ocean_level,
        }
    }

    fn view(&self) -> QueryView {
        QueryView {
            set: self.buffer.snapshot(),
            enabled: self.buffer.enabled_mask(),
            scaling: self.scaling,
            ocean_level: self.ocean_level,
        }
    }
}

struct QueryView {
    set: Arc<DisplacementSet>,
    enabled: u8,
    scaling: QueryGridScaling,
    ocean_level: f32,
}

impl QueryView {
    fn answer(&self, query: &mut WaveQuery, overlay: Option<&dyn OverlaySampler>) {
        evaluate(
            query,
            &self.set,
            self.enabled,
            &self.scaling,
            self.ocean_level,
            overlay,
        );
    }
}

fn cleared(mut queries: Vec<WaveQuery>) -> Vec<WaveQuery> {
    for q in &mut queries {
        q.result.clear();
    }
    queries
}

// ── Threaded ────────────────────────────────────────────────────

/// Answers a whole batch on a worker thread.
pub struct ThreadedQueryTask {
    source: QuerySource,
    view: Option<QueryView>,
    queries: Vec<WaveQuery>,
    callback: Option<QueryCallback>,
}

impl ThreadedQueryTask {
    /// A batch over `queries` that hands them to `callback` when done.
    pub fn new(source: QuerySource, queries: Vec<WaveQuery>, callback: QueryCallback) -> Self {
        Self {
            source,
            view: None,
            queries: cleared(queries),
            callback: Some(callback),
        }
    }
}

impl Task for ThreadedQueryTask {
    fn name(&self) -> &str {
        "query-batch"
    }

    fn is_threaded(&self) -> bool {
        true
    }

    fn start(&mut self) {
        self.view = Some(self.source.view());
    }

    fn run(&mut self, cx: &TaskContext<'_>) -> Result<Step, TaskError> {
        let view = self.view.get_or_insert_with(|| self.source.view());
        for query in &mut self.queries {
            if cx.is_cancelled() {
                break;
            }
            view.answer(query, None);
        }
        Ok(Step::Finished)
    }

    fn end(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(std::mem::take(&mut self.queries));
        }
    }
}

// ── Stepped ─────────────────────────────────────────────────────

/// Answers a batch a chunk at a time on the updating thread.
pub struct SteppedQueryTask {
    source: QuerySource,
    view: Option<QueryView>,
    overlay: Option<Arc<dyn OverlaySampler>>,
    queries: Vec<WaveQuery>,
    callback: Option<QueryCallback>,
    per_step: usize,
    cursor: usize,
}

impl SteppedQueryTask {
    /// A batch answering `per_step` queries (at least 1) per update.
    pub fn new(
        source: QuerySource,
        queries: Vec<WaveQuery>,
        callback: QueryCallback,
        per_step: usize,
    ) -> Self {
        Self {
            source,
            view: None,
            overlay: None,
            queries: cleared(queries),
            callback: Some(callback),
            per_step: per_step.max(1),
            cursor: 0,
        }
    }

    /// Consult `overlay` for queries that ask for it.
    pub fn with_overlay(mut self, overlay: Option<Arc<dyn OverlaySampler>>) -> Self {
        self.overlay = overlay;
        self
    }

    /// Queries answered so far.
    pub fn answered(&self) -> usize {
        self.cursor
    }
}

impl Task for SteppedQueryTask {
    fn name(&self) -> &str {
        "query-batch-stepped"
    }

    fn start(&mut self) {
        self.view = Some(self.source.view());
    }

    fn run(&mut self, cx: &TaskContext<'_>) -> Result<Step, TaskError> {
        let view = self.view.get_or_insert_with(|| self.source.view());
        let overlay = self.overlay.as_deref();
        let stop = (self.cursor + self.per_step).min(self.queries.len());
        while self.cursor < stop {
            if cx.is_cancelled() {
                return Ok(Step::Finished);
            }
            view.answer(&mut self.queries[self.cursor], overlay);
            self.cursor += 1;
        }
        if self.cursor < self.queries.len() {
            Ok(Step::Yield)
        } else {
            Ok(Step::Finished)
        }
    }

    fn end(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(std::mem::take(&mut self.queries));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use undertow_sched::{Scheduler, SchedulerConfig, TaskState};
    use undertow_spectrum::MAX_CASCADES;

    use crate::buffer::CHANNEL_HEIGHT;

    fn source(height: f32, level: f32) -> QuerySource {
        let buffer = Arc::new(DisplacementBuffer::new(4));
        let mut set = buffer.take_write_side();
        set.set_num_grids(1);
        for y in 0..4 {
            for x in 0..4 {
                set.grid_mut(0).set(x, y, CHANNEL_HEIGHT, height);
            }
        }
        buffer.publish(set);
        let scaling = QueryGridScaling {
            inv_grid_sizes: [0.25; MAX_CASCADES],
            choppiness: [1.0; MAX_CASCADES],
            scale_y: 1.0,
            offset: [0.0, 0.0],
            num_grids: 1,
        };
        QuerySource::new(buffer, scaling, level)
    }

    fn batch(n: usize) -> Vec<WaveQuery> {
        (0..n)
            .map(|i| {
                let mut q = WaveQuery::new(i as f32, 0.5);
                q.result.height = -7.0;
                q
            })
            .collect()
    }

    fn sink() -> (Arc<Mutex<Option<Vec<WaveQuery>>>>, QueryCallback) {
        let out = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&out);
        let cb: QueryCallback = Box::new(move |qs| *slot.lock().unwrap() = Some(qs));
        (out, cb)
    }

    fn inline_scheduler() -> Scheduler {
        Scheduler::new(SchedulerConfig {
            disable_multithreading: true,
            ..SchedulerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn threaded_batch_answers_everything() {
        let mut sched = inline_scheduler();
        let (out, cb) = sink();
        sched.add(Box::new(ThreadedQueryTask::new(source(2.0, 1.0), batch(5), cb)));
        sched.update().unwrap();
        let results = out.lock().unwrap().take().unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|q| (q.result.height - 3.0).abs() < 1e-6));
    }

    #[test]
    fn stepped_batch_spans_updates() {
        let mut sched = inline_scheduler();
        let (out, cb) = sink();
        let id = sched.add(Box::new(SteppedQueryTask::new(
            source(1.0, 0.0),
            batch(5),
            cb,
            2,
        )));
        sched.update().unwrap();
        assert!(out.lock().unwrap().is_none());
        sched.update().unwrap();
        assert!(out.lock().unwrap().is_none());
        sched.update().unwrap();
        assert_eq!(sched.state(id), Some(TaskState::Done));
        let results = out.lock().unwrap().take().unwrap();
        assert!(results.iter().all(|q| (q.result.height - 1.0).abs() < 1e-6));
    }

    #[test]
    fn cancelled_batch_never_calls_back() {
        let mut sched = inline_scheduler();
        let (out, cb) = sink();
        let id = sched.add(Box::new(SteppedQueryTask::new(
            source(1.0, 0.0),
            batch(8),
            cb,
            2,
        )));
        sched.update().unwrap();
        // Mid-batch the task is running; only cancel_all can stop it.
        assert!(!sched.cancel(id).unwrap());
        sched.cancel_all();
        assert_eq!(sched.state(id), Some(TaskState::Cancelled));
        sched.update().unwrap();
        assert!(out.lock().unwrap().is_none());

        let (out, cb) = sink();
        let id = sched.add(Box::new(ThreadedQueryTask::new(source(1.0, 0.0), batch(2), cb)));
        assert!(sched.cancel(id).unwrap());
        sched.update().unwrap();
        assert!(out.lock().unwrap().is_none());
    }

    #[test]
    fn zero_step_is_raised_to_one() {
        let (_, cb) = sink();
        let task = SteppedQueryTask::new(source(0.0, 0.0), batch(1), cb, 0);
        assert_eq!(task.per_step, 1);
        assert_eq!(task.answered(), 0);
    }

    #[test]
    fn results_start_cleared() {
        let (_, cb) = sink();
        let task = ThreadedQueryTask::new(source(0.0, 0.0), batch(3), cb);
        assert!(task.queries.iter().all(|q| q.result.height == 0.0));
    }
}
