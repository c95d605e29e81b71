//! Undertow: spectral ocean waves driven by a cooperative task scheduler.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all undertow sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use undertow::prelude::*;
//!
//! let mut ocean = Ocean::new(OceanConfig {
//!     fourier_size: 16,
//!     num_grids: 1,
//!     ..OceanConfig::default()
//! })
//! .unwrap();
//!
//! let mut t = 0.0;
//! while ocean.cycle() == 0 {
//!     t += 1.0 / 60.0;
//!     ocean.update(t).unwrap();
//!     std::thread::yield_now();
//! }
//!
//! let mut query = WaveQuery::new(12.0, -3.5);
//! ocean.query_waves(&mut query);
//! assert!(query.result.height.is_finite());
//! ocean.shutdown();
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `undertow-core` | Ids, errors, cancellation, `InterpolatedArray` |
//! | [`sched`] | `undertow-sched` | `Task` trait and `Scheduler` |
//! | [`fourier`] | `undertow-fourier` | Butterfly tables and the 2D FFT engines |
//! | [`spectrum`] | `undertow-spectrum` | Spectrum models, conditions and their cache |
//! | [`ocean`] | `undertow-ocean` | Displacement buffer, evolution, queries, `Ocean` |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types (`undertow-core`).
pub use undertow_core as types;

/// Task scheduling (`undertow-sched`).
///
/// Implement [`sched::Task`] to run your own work on the ocean's
/// scheduler via [`ocean::Ocean::scheduler_mut`].
pub use undertow_sched as sched;

/// 2D Fourier engines (`undertow-fourier`).
pub use undertow_fourier as fourier;

/// Spectrum models and generated conditions (`undertow-spectrum`).
pub use undertow_spectrum as spectrum;

/// The ocean context and wave queries (`undertow-ocean`).
pub use undertow_ocean as ocean;

/// Common imports for typical undertow usage.
pub mod prelude {
    // Ocean
    pub use undertow_ocean::{
        BatchMode, MaxDisplacement, Ocean, OceanConfig, OverlaySampler, QueryMode, WaveQuery,
        WaveQueryResult,
    };

    // Conditions
    pub use undertow_spectrum::{SpectrumKind, SpectrumParams};

    // Engines
    pub use undertow_fourier::{DeviceCaps, FourierBackend};

    // Scheduling
    pub use undertow_sched::{SchedulerConfig, Step, Task, TaskContext};

    // Errors
    pub use undertow_core::{FourierError, SchedulerError, SpectrumError, TaskError};
    pub use undertow_ocean::{ConfigError, OceanError};
}
