//! Ocean surface simulation on top of the undertow scheduler.
//!
//! A [`DisplacementBuffer`] holds two displacement sets: queries read one
//! while an [`EvolutionTask`] writes the other, and a single index flip
//! publishes each cycle. The [`Ocean`] context wires the pieces together:
//!
//! ```text
//!  SpectrumTask ──► EvolutionTask ──► publish ──► FindRangeTask
//!  (per condition)  (per update)      (swap)      (per cycle)
//!                                        │
//!                                        └──► query_waves / query batches
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod batch;
pub mod buffer;
pub mod config;
pub mod error;
pub mod evolution;
pub mod ocean;
pub mod query;
pub mod range;

pub use batch::{
    BatchMode, QueryCallback, QuerySource, SteppedQueryTask, ThreadedQueryTask,
    DEFAULT_QUERIES_PER_STEP,
};
pub use buffer::{
    DisplacementBuffer, DisplacementSet, ALL_CASCADES, CHANNELS, CHANNEL_DX, CHANNEL_DZ,
    CHANNEL_HEIGHT,
};
pub use config::{ConfigError, OceanConfig};
pub use error::OceanError;
pub use evolution::{packing_for, EvolutionScratch, EvolutionTask, ScratchStash};
pub use ocean::Ocean;
pub use query::{
    evaluate, query_waves, sample_displacement, sample_height, OverlaySampler, QueryGridScaling,
    QueryMode, WaveQuery, WaveQueryResult, MAX_POSITION_ITERATIONS, POSITION_TOLERANCE,
};
pub use range::{scan, FindRangeTask, MaxDisplacement};
