//! Wave spectra and generated spectrum conditions for the undertow ocean
//! engine.
//!
//! A [`SpectrumConditionKey`] names one configuration (grid size, wind,
//! model, cascade count). The [`ConditionCache`] maps keys to shared
//! [`WaveSpectrumCondition`]s, and a [`SpectrumTask`] fills a condition's
//! amplitude and dispersion tables on a scheduler worker. Consumers read
//! the tables through [`WaveSpectrumCondition::snapshot`] and re-copy
//! only when the [`ConditionGeneration`](undertow_core::ConditionGeneration)
//! changes.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod condition;
pub mod generate;
pub mod key;
pub mod layout;
pub mod model;

pub use cache::{CacheLookup, ConditionCache, DEFAULT_CACHE_CAPACITY};
pub use condition::{ConditionData, WaveSpectrumCondition};
pub use generate::{build_amplitudes, build_wtable, SpectrumTask};
pub use key::{SpectrumConditionKey, MAX_CASCADES};
pub use layout::{signed_index, CascadeLayout};
pub use model::{
    dispersion, Phillips, SpectrumKind, SpectrumModel, SpectrumParams, Unified, GRAVITY,
    MIN_WAVENUMBER, WAVE_CM, WAVE_KM,
};
