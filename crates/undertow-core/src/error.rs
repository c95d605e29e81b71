//! Error types for the undertow ocean engine.
//!
//! Organised by subsystem: task bodies, the scheduler, the Fourier
//! engines and spectrum generation. Cancellation is never an error and
//! has no variant here.

use std::error::Error;
use std::fmt;

use crate::id::TaskId;

/// Failure raised by a task body.
///
/// Produced on whatever thread ran the task and carried back to the
/// scheduling thread, where it is wrapped in [`SchedulerError::TaskFailed`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskError {
    /// The body returned an error.
    Failed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The body panicked; the payload message is preserved when it was a
    /// string.
    Panicked {
        /// Panic payload, or a placeholder for non-string payloads.
        message: String,
    },
}

impl TaskError {
    /// Convenience constructor for [`TaskError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { reason } => write!(f, "task failed: {reason}"),
            Self::Panicked { message } => write!(f, "task panicked: {message}"),
        }
    }
}

impl Error for TaskError {}

/// Errors reported by the scheduler.
///
/// Everything except [`TaskFailed`](Self::TaskFailed) is a precondition
/// violation detected synchronously at the call site.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    /// The handle does not name a live task (never issued, or its slot has
    /// been reused).
    UnknownTask {
        /// The stale or foreign handle.
        id: TaskId,
    },
    /// The task is already in one of the scheduler's queues.
    AlreadyQueued {
        /// The offending task.
        id: TaskId,
    },
    /// Attempted to wait on a task that has already completed.
    WaitOnFinished {
        /// The task that would have waited.
        waiter: TaskId,
        /// The completed task.
        target: TaskId,
    },
    /// Attempted to wait on a task that has been cancelled.
    WaitOnCancelled {
        /// The task that would have waited.
        waiter: TaskId,
        /// The cancelled task.
        target: TaskId,
    },
    /// A non-threaded task attempted to wait on a threaded task that skips
    /// the finishing stage; its completion signal would arrive on a worker.
    WaitOnNoFinishThreaded {
        /// The task that would have waited.
        waiter: TaskId,
        /// The threaded no-finish task.
        target: TaskId,
    },
    /// A task may not wait on itself.
    WaitOnSelf {
        /// The offending task.
        id: TaskId,
    },
    /// The operation is not valid for the task's current lifecycle state.
    InvalidState {
        /// The offending task.
        id: TaskId,
        /// Name of the state the task was in.
        state: &'static str,
    },
    /// A worker thread could not be spawned.
    WorkerSpawnFailed {
        /// Description of the spawn failure.
        reason: String,
    },
    /// `clear()` was called while tasks were still running.
    TasksRunning {
        /// Number of running tasks at the time of the call.
        count: usize,
    },
    /// A task body failed. Deferred from the thread that ran it and
    /// surfaced at the next update or error check.
    TaskFailed {
        /// Name of the failing task.
        name: String,
        /// The underlying task error.
        source: TaskError,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTask { id } => write!(f, "unknown task {id}"),
            Self::AlreadyQueued { id } => write!(f, "{id} is already queued"),
            Self::WaitOnFinished { waiter, target } => {
                write!(f, "{waiter} cannot wait on finished {target}")
            }
            Self::WaitOnCancelled { waiter, target } => {
                write!(f, "{waiter} cannot wait on cancelled {target}")
            }
            Self::WaitOnNoFinishThreaded { waiter, target } => write!(
                f,
                "non-threaded {waiter} cannot wait on threaded no-finish {target}"
            ),
            Self::WaitOnSelf { id } => write!(f, "{id} cannot wait on itself"),
            Self::InvalidState { id, state } => {
                write!(f, "operation not valid for {id} in state {state}")
            }
            Self::WorkerSpawnFailed { reason } => {
                write!(f, "failed to spawn worker thread: {reason}")
            }
            Self::TasksRunning { count } => {
                write!(f, "cannot clear scheduler with {count} running task(s)")
            }
            Self::TaskFailed { name, source } => write!(f, "task '{name}': {source}"),
        }
    }
}

impl Error for SchedulerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TaskFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors from Fourier engine construction and execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FourierError {
    /// The transform size is zero or not a power of two.
    NotPowerOfTwo {
        /// The rejected size.
        size: usize,
    },
    /// The parallel engine was asked to transform more grids at once than
    /// the device exposes output targets for.
    MissingTargets {
        /// Targets the call needs.
        required: usize,
        /// Targets the device supports.
        available: usize,
    },
    /// A buffer handed to the engine does not hold `size * size` cells.
    BufferSizeMismatch {
        /// Expected cell count.
        expected: usize,
        /// Actual cell count.
        actual: usize,
    },
}

impl fmt::Display for FourierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPowerOfTwo { size } => {
                write!(f, "fourier size {size} is not a power of two")
            }
            Self::MissingTargets {
                required,
                available,
            } => write!(
                f,
                "transform needs {required} output targets, device supports {available}"
            ),
            Self::BufferSizeMismatch { expected, actual } => {
                write!(f, "buffer holds {actual} cells, expected {expected}")
            }
        }
    }
}

impl Error for FourierError {}

/// Errors from spectrum models, condition keys and generation.
#[derive(Clone, Debug, PartialEq)]
pub enum SpectrumError {
    /// Cascade count outside `1..=4`.
    InvalidCascadeCount {
        /// The rejected count.
        count: usize,
    },
    /// A model parameter is non-finite or out of its valid range.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The rejected value.
        value: f32,
    },
    /// The grid size is zero or not a power of two.
    InvalidSize {
        /// The rejected size.
        size: usize,
    },
    /// A consumer was reset against a condition of a different kind or size.
    ConditionMismatch {
        /// Description of the mismatch.
        reason: String,
    },
}

impl fmt::Display for SpectrumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCascadeCount { count } => {
                write!(f, "cascade count {count} outside 1..=4")
            }
            Self::InvalidParameter { name, value } => {
                write!(f, "invalid spectrum parameter {name} = {value}")
            }
            Self::InvalidSize { size } => {
                write!(f, "spectrum size {size} is not a power of two")
            }
            Self::ConditionMismatch { reason } => write!(f, "condition mismatch: {reason}"),
        }
    }
}

impl Error for SpectrumError {}
