//! The task abstraction driven by the [`Scheduler`](crate::Scheduler).
//!
//! A task is a boxed [`Task`] body plus scheduler-owned bookkeeping
//! ([`TaskFlags`], lifecycle [`TaskState`], listener edges). Bodies never
//! hold references to other tasks; dependencies are recorded as
//! [`TaskId`] edges inside the scheduler's arena.

use std::sync::atomic::{AtomicBool, Ordering};

use undertow_core::{CancelToken, TaskError, TaskId};

/// Outcome of a single `run` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// The body has finished its work; this is the completion signal.
    Finished,
    /// The body has more work and wants to be resumed on a later cycle.
    /// A threaded body is simply run again on its worker.
    Yield,
}

/// Lifecycle position of a task inside the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Inserted but not queued.
    Created,
    /// Blocked until every task it waits on has signalled.
    Waiting,
    /// In the FIFO run queue.
    Scheduled,
    /// Dispatched to a worker, or a multi-cycle body between steps.
    Running,
    /// Ran to completion, awaiting `end()`.
    Finishing,
    /// Completed; `end()` has been called (unless the task skips it).
    Done,
    /// Cancelled before completing.
    Cancelled,
}

impl TaskState {
    /// Short lowercase name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Waiting => "waiting",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Finishing => "finishing",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the task has left the scheduler for good.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

/// Lifecycle flags shared between the scheduler and whichever thread is
/// running the body.
#[derive(Debug, Default)]
pub struct TaskFlags {
    started: AtomicBool,
    ran: AtomicBool,
    done: AtomicBool,
    cancelled: AtomicBool,
}

impl TaskFlags {
    /// `start()` has been called.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// The body has stopped running, either finished or cancelled.
    pub fn has_ran(&self) -> bool {
        self.ran.load(Ordering::Acquire)
    }

    /// The task has completed.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    pub(crate) fn mark_ran(&self) {
        self.ran.store(true, Ordering::Release);
    }

    pub(crate) fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }

    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl CancelToken for TaskFlags {
    fn is_cancelled(&self) -> bool {
        TaskFlags::is_cancelled(self)
    }
}

/// View handed to a body while it runs.
///
/// Implements [`CancelToken`], so it can be passed straight into
/// cancellable loops such as the Fourier engines.
pub struct TaskContext<'a> {
    id: TaskId,
    flags: &'a TaskFlags,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(id: TaskId, flags: &'a TaskFlags) -> Self {
        Self { id, flags }
    }

    /// Handle of the running task.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether the scheduler has asked this task to stop.
    pub fn is_cancelled(&self) -> bool {
        self.flags.is_cancelled()
    }
}

impl CancelToken for TaskContext<'_> {
    fn is_cancelled(&self) -> bool {
        self.flags.is_cancelled()
    }
}

/// A unit of work.
///
/// The scheduler calls `start` once, then `run` one or more times until it
/// returns [`Step::Finished`], then `end` once from the updating thread.
/// `cancel` replaces `end` when the task is cancelled while the scheduler
/// holds the body.
///
/// Threaded bodies run on a worker thread and must poll
/// [`TaskContext::is_cancelled`] at loop granularity.
pub trait Task: Send {
    /// Name used in logs and error reports.
    fn name(&self) -> &str {
        "task"
    }

    /// Whether `run` executes on a worker thread.
    fn is_threaded(&self) -> bool {
        false
    }

    /// Skip the finishing stage: dependents are released as soon as the
    /// body finishes and `end()` is never called.
    fn no_finish(&self) -> bool {
        false
    }

    /// When the last dependency signals, run immediately instead of
    /// joining the back of the scheduled queue.
    fn run_on_stop_waiting(&self) -> bool {
        false
    }

    /// Called on the updating thread just before the first `run`.
    fn start(&mut self) {}

    /// Do the work, or the next chunk of it.
    fn run(&mut self, cx: &TaskContext<'_>) -> Result<Step, TaskError>;

    /// Called on the updating thread after the body finished.
    fn end(&mut self) {}

    /// Called on the updating thread when the task is cancelled.
    fn cancel(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_start_clear() {
        let flags = TaskFlags::default();
        assert!(!flags.is_started());
        assert!(!flags.has_ran());
        assert!(!flags.is_done());
        assert!(!CancelToken::is_cancelled(&flags));
    }

    #[test]
    fn context_reflects_cancellation() {
        let flags = TaskFlags::default();
        let cx = TaskContext::new(TaskId::new(0, 0), &flags);
        assert!(!cx.is_cancelled());
        flags.mark_cancelled();
        assert!(cx.is_cancelled());
        assert!(CancelToken::is_cancelled(&cx));
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Done.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Finishing.is_terminal());
        assert_eq!(TaskState::Waiting.name(), "waiting");
    }
}
