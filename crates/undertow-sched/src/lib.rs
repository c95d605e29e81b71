//! Cooperative task scheduler for the undertow ocean engine.
//!
//! A [`Scheduler`] owns an arena of [`Task`] bodies and four queues
//! (scheduled, running, waiting, finishing). It is driven by calling
//! [`Scheduler::update`] once per simulation cycle. Three execution modes
//! are supported:
//!
//! - inline tasks run to completion inside `update`;
//! - threaded tasks run on a crossbeam-fed worker pool;
//! - multi-cycle tasks return [`Step::Yield`] and are resumed on later
//!   updates with whatever cursor they saved.
//!
//! Worker failures (errors and panics) travel back over a channel and are
//! returned from the next `update` as
//! [`SchedulerError::TaskFailed`](undertow_core::SchedulerError::TaskFailed).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod scheduler;
pub mod task;
mod worker;

pub use config::SchedulerConfig;
pub use scheduler::Scheduler;
pub use task::{Step, Task, TaskContext, TaskFlags, TaskState};
