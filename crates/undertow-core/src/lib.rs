//! Core types for the undertow ocean engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the identifiers, error types, cancellation primitives and the
//! bilinear-sampled [`InterpolatedArray`] grid used throughout the
//! workspace.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cancel;
pub mod error;
pub mod id;
pub mod interp;

pub use cancel::{CancelFlag, CancelToken, NeverCancel};
pub use error::{FourierError, SchedulerError, SpectrumError, TaskError};
pub use id::{ConditionGeneration, TaskId};
pub use interp::{BoundaryMode, InterpolatedArray};
