//! Ocean configuration, validation, and error types.
//!
//! [`OceanConfig`] is the builder-input for an [`Ocean`](crate::Ocean).
//! [`validate()`](OceanConfig::validate) checks it once at construction;
//! nothing is re-validated per update.

use std::error::Error;
use std::fmt;

use undertow_core::SpectrumError;
use undertow_fourier::{DeviceCaps, FourierBackend};
use undertow_sched::SchedulerConfig;
use undertow_spectrum::{SpectrumParams, DEFAULT_CACHE_CAPACITY, MAX_CASCADES};

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`OceanConfig::validate()`].
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// `fourier_size` is below 2 or not a power of two.
    InvalidFourierSize {
        /// The rejected size.
        size: usize,
    },
    /// `num_grids` is outside `1..=4`.
    InvalidCascadeCount {
        /// The rejected count.
        count: usize,
    },
    /// A scale factor must be finite and strictly positive.
    NonPositive {
        /// Field name.
        name: &'static str,
        /// The rejected value.
        value: f32,
    },
    /// A value must be finite.
    NonFinite {
        /// Field name.
        name: &'static str,
        /// The rejected value.
        value: f32,
    },
    /// The spectrum parameters are invalid.
    Spectrum(SpectrumError),
    /// `cache_capacity` is zero.
    CacheCapacityZero,
    /// The device exposes no render targets.
    NoRenderTargets,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFourierSize { size } => {
                write!(f, "fourier_size {size} must be a power of two >= 2")
            }
            Self::InvalidCascadeCount { count } => {
                write!(f, "num_grids {count} outside 1..={MAX_CASCADES}")
            }
            Self::NonPositive { name, value } => {
                write!(f, "{name} must be finite and > 0, got {value}")
            }
            Self::NonFinite { name, value } => write!(f, "{name} must be finite, got {value}"),
            Self::Spectrum(e) => write!(f, "spectrum: {e}"),
            Self::CacheCapacityZero => write!(f, "cache_capacity must be at least 1"),
            Self::NoRenderTargets => write!(f, "device must expose at least one render target"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spectrum(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SpectrumError> for ConfigError {
    fn from(e: SpectrumError) -> Self {
        Self::Spectrum(e)
    }
}

// ── OceanConfig ────────────────────────────────────────────────────

/// Everything needed to build an [`Ocean`](crate::Ocean).
#[derive(Clone, Debug)]
pub struct OceanConfig {
    /// Edge length of every cascade's grid. Power of two. Default: 64.
    pub fourier_size: usize,
    /// Active cascades, `1..=4`. Default: 4.
    pub num_grids: usize,
    /// Spectrum model and its parameters. Default: unified, 8 m/s.
    pub spectrum: SpectrumParams,
    /// Wind direction in degrees. Default: 0.
    pub wind_dir: f32,
    /// World-size multiplier applied to every cascade. Default: 1.
    pub grid_scale: f32,
    /// Horizontal displacement multiplier. Default: 1.
    pub choppiness_scale: f32,
    /// Height of the still surface. Default: 0.
    pub ocean_level: f32,
    /// Fourier engine. Default: [`FourierBackend::Cpu`].
    pub backend: FourierBackend,
    /// Run generation, evolution and range scans on workers. Default: true.
    pub threaded: bool,
    /// Seed for the random phases of generated conditions. Default: 0.
    pub seed: u64,
    /// Conditions kept in the cache. Default: 10.
    pub cache_capacity: usize,
    /// Capabilities of the parallel engine's device.
    pub device: DeviceCaps,
    /// Scheduler budgets and threading.
    pub scheduler: SchedulerConfig,
}

impl Default for OceanConfig {
    fn default() -> Self {
        Self {
            fourier_size: 64,
            num_grids: 4,
            spectrum: SpectrumParams::default(),
            wind_dir: 0.0,
            grid_scale: 1.0,
            choppiness_scale: 1.0,
            ocean_level: 0.0,
            backend: FourierBackend::Cpu,
            threaded: true,
            seed: 0,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            device: DeviceCaps::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl OceanConfig {
    /// Check structural invariants. Called by [`Ocean::new`](crate::Ocean::new).
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. Grid size must be a power of two the FFT can split.
        if self.fourier_size < 2 || !self.fourier_size.is_power_of_two() {
            return Err(ConfigError::InvalidFourierSize {
                size: self.fourier_size,
            });
        }
        // 2. Cascade count.
        if !(1..=MAX_CASCADES).contains(&self.num_grids) {
            return Err(ConfigError::InvalidCascadeCount {
                count: self.num_grids,
            });
        }
        // 3. Scale factors.
        for (name, value) in [
            ("grid_scale", self.grid_scale),
            ("choppiness_scale", self.choppiness_scale),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        // 4. Free-valued floats only need to be finite.
        for (name, value) in [("wind_dir", self.wind_dir), ("ocean_level", self.ocean_level)] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { name, value });
            }
        }
        // 5. Spectrum parameters.
        self.spectrum.validate()?;
        // 6. Cache must hold at least the active condition.
        if self.cache_capacity == 0 {
            return Err(ConfigError::CacheCapacityZero);
        }
        // 7. Device. Too few targets for the cascade count is a Fourier
        //    error raised when the engine is built.
        if self.device.max_render_targets == 0 {
            return Err(ConfigError::NoRenderTargets);
        }
        Ok(())
    }

    /// Fourier buffers transformed together per cycle: heights plus one
    /// displacement buffer per pair of cascades.
    pub fn fourier_targets(&self) -> usize {
        if self.num_grids > 2 {
            3
        } else {
            2
        }
    }
}
