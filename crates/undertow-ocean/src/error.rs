//! Top-level error for the [`Ocean`](crate::Ocean) context.

use std::error::Error;
use std::fmt;

use undertow_core::{FourierError, SchedulerError, SpectrumError};

use crate::config::ConfigError;

/// Anything an [`Ocean`](crate::Ocean) call can fail with.
#[derive(Debug, PartialEq)]
pub enum OceanError {
    /// The configuration failed validation.
    Config(ConfigError),
    /// A condition key or model parameter was rejected.
    Spectrum(SpectrumError),
    /// The Fourier engine could not be built.
    Fourier(FourierError),
    /// The scheduler rejected a call or a task failed.
    Scheduler(SchedulerError),
    /// A cascade index past the last cascade.
    InvalidCascade {
        /// The rejected index.
        index: usize,
    },
}

impl fmt::Display for OceanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Spectrum(e) => write!(f, "spectrum: {e}"),
            Self::Fourier(e) => write!(f, "fourier: {e}"),
            Self::Scheduler(e) => write!(f, "scheduler: {e}"),
            Self::InvalidCascade { index } => write!(f, "no cascade {index}"),
        }
    }
}

impl Error for OceanError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Spectrum(e) => Some(e),
            Self::Fourier(e) => Some(e),
            Self::Scheduler(e) => Some(e),
            Self::InvalidCascade { .. } => None,
        }
    }
}

impl From<ConfigError> for OceanError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<SpectrumError> for OceanError {
    fn from(e: SpectrumError) -> Self {
        Self::Spectrum(e)
    }
}

impl From<FourierError> for OceanError {
    fn from(e: FourierError) -> Self {
        Self::Fourier(e)
    }
}

impl From<SchedulerError> for OceanError {
    fn from(e: SchedulerError) -> Self {
        Self::Scheduler(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_and_chains() {
        let err: OceanError = FourierError::MissingTargets {
            required: 3,
            available: 2,
        }
        .into();
        assert!(err.to_string().starts_with("fourier: "));
        assert!(err.source().is_some());
        assert!(OceanError::InvalidCascade { index: 7 }.source().is_none());
    }
}
