//! Worker thread pool for threaded task bodies.
//!
//! Each worker receives a [`Job`] (the boxed body plus its shared flags)
//! over a crossbeam channel, runs it until it finishes, fails, or observes
//! cancellation, then hands the body back on the completion channel. The
//! scheduler drains completions on its own thread, so lifecycle hooks and
//! dependent notification never run on a worker.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use undertow_core::{SchedulerError, TaskError, TaskId};

use crate::task::{Step, Task, TaskContext, TaskFlags};

/// A threaded body dispatched to a worker.
pub(crate) struct Job {
    pub id: TaskId,
    pub body: Box<dyn Task>,
    pub flags: Arc<TaskFlags>,
}

/// How a threaded body stopped.
#[derive(Debug)]
pub(crate) enum Outcome {
    Finished,
    Cancelled,
    Failed(TaskError),
}

/// A body returning from a worker.
pub(crate) struct Completion {
    pub id: TaskId,
    pub body: Box<dyn Task>,
    pub outcome: Outcome,
}

/// Run a body to completion on the current thread, polling the cancel flag
/// between steps and converting panics into [`TaskError::Panicked`].
pub(crate) fn drive(id: TaskId, body: &mut dyn Task, flags: &TaskFlags) -> Outcome {
    let cx = TaskContext::new(id, flags);
    loop {
        if flags.is_cancelled() {
            return Outcome::Cancelled;
        }
        let step = panic::catch_unwind(AssertUnwindSafe(|| body.run(&cx)));
        match step {
            Ok(Ok(Step::Finished)) => return Outcome::Finished,
            Ok(Ok(Step::Yield)) => continue,
            Ok(Err(e)) => return Outcome::Failed(e),
            Err(payload) => return Outcome::Failed(panic_error(payload)),
        }
    }
}

/// Convert a panic payload into a task error, keeping string messages.
pub(crate) fn panic_error(payload: Box<dyn std::any::Any + Send>) -> TaskError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    };
    TaskError::Panicked { message }
}

fn worker_loop(job_rx: Receiver<Job>, done_tx: Sender<Completion>) {
    while let Ok(job) = job_rx.recv() {
        let Job {
            id,
            mut body,
            flags,
        } = job;
        let outcome = drive(id, body.as_mut(), &flags);
        flags.mark_ran();
        log::trace!("{id} left worker: {outcome:?}");
        // The scheduler may already be gone; the body is dropped here then.
        let _ = done_tx.send(Completion { id, body, outcome });
    }
}

/// Fixed-size pool of worker threads sharing one job queue.
pub(crate) struct WorkerPool {
    job_tx: Option<Sender<Job>>,
    done_rx: Receiver<Completion>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(count: usize) -> Result<Self, SchedulerError> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<Job>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<Completion>();
        let mut handles = Vec::with_capacity(count);
        for i in 0..count {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("undertow-worker-{i}"))
                .spawn(move || worker_loop(job_rx, done_tx))
                .map_err(|e| SchedulerError::WorkerSpawnFailed {
                    reason: format!("worker {i}: {e}"),
                })?;
            handles.push(handle);
        }
        log::debug!("spawned {count} scheduler worker(s)");
        Ok(Self {
            job_tx: Some(job_tx),
            done_rx,
            handles,
        })
    }

    /// Queue a job. Returns the job back if the pool has shut down.
    pub fn submit(&self, job: Job) -> Result<(), Job> {
        match &self.job_tx {
            Some(tx) => tx.send(job).map_err(|e| e.into_inner()),
            None => Err(job),
        }
    }

    pub fn completions(&self) -> &Receiver<Completion> {
        &self.done_rx
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Close the job queue and join the workers that exit within `wait`.
    /// Workers still busy after the deadline are detached.
    pub fn shutdown(&mut self, wait: Duration) {
        self.job_tx = None;
        let deadline = Instant::now() + wait;
        while self.handles.iter().any(|h| !h.is_finished()) && Instant::now() < deadline {
            thread::yield_now();
        }
        let mut detached = 0usize;
        for handle in self.handles.drain(..) {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                detached += 1;
            }
        }
        if detached > 0 {
            log::warn!("{detached} worker(s) still busy at shutdown, detaching");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.shutdown(Duration::from_millis(100));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Once;
    impl Task for Once {
        fn run(&mut self, _cx: &TaskContext<'_>) -> Result<Step, TaskError> {
            Ok(Step::Finished)
        }
    }

    struct Boom;
    impl Task for Boom {
        fn run(&mut self, _cx: &TaskContext<'_>) -> Result<Step, TaskError> {
            panic!("kaboom");
        }
    }

    #[test]
    fn drive_reports_panic_message() {
        let flags = TaskFlags::default();
        let mut body = Boom;
        match drive(TaskId::new(0, 0), &mut body, &flags) {
            Outcome::Failed(TaskError::Panicked { message }) => assert_eq!(message, "kaboom"),
            other => panic!("expected panic outcome, got {other:?}"),
        }
    }

    #[test]
    fn drive_skips_cancelled_body() {
        let flags = TaskFlags::default();
        flags.mark_cancelled();
        let mut body = Once;
        assert!(matches!(
            drive(TaskId::new(0, 0), &mut body, &flags),
            Outcome::Cancelled
        ));
    }

    #[test]
    fn pool_round_trips_job() {
        let mut pool = WorkerPool::spawn(2).unwrap();
        assert_eq!(pool.worker_count(), 2);
        let flags = Arc::new(TaskFlags::default());
        let id = TaskId::new(3, 1);
        assert!(pool
            .submit(Job {
                id,
                body: Box::new(Once),
                flags: Arc::clone(&flags),
            })
            .is_ok());
        let done = pool
            .completions()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(done.id, id);
        assert!(matches!(done.outcome, Outcome::Finished));
        assert!(flags.has_ran());
        pool.shutdown(Duration::from_secs(1));
        assert_eq!(pool.worker_count(), 0);
    }
}
