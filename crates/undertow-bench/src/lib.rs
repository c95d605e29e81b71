//! Benchmark profiles for the undertow ocean engine.
//!
//! - [`reference_profile`]: 64x64 grids, four cascades, CPU engine
//! - [`stress_profile`]: 256x256 grids, four cascades, parallel engine
//! - [`warmed_ocean`]: an ocean pumped until its first cycle is published

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::time::{Duration, Instant};

use undertow_fourier::FourierBackend;
use undertow_ocean::{Ocean, OceanConfig, OceanError, WaveQuery};
use undertow_sched::SchedulerConfig;
use undertow_spectrum::SpectrumParams;

/// Reference profile: 64x64 grids, four cascades, unified spectrum at
/// 10 m/s, sequential CPU engine.
pub fn reference_profile(seed: u64) -> OceanConfig {
    OceanConfig {
        fourier_size: 64,
        num_grids: 4,
        spectrum: SpectrumParams::Unified {
            wind_speed: 10.0,
            wave_age: 0.84,
        },
        wind_dir: 30.0,
        seed,
        ..OceanConfig::default()
    }
}

/// Stress profile: 256x256 grids on the parallel engine.
pub fn stress_profile(seed: u64) -> OceanConfig {
    OceanConfig {
        fourier_size: 256,
        backend: FourierBackend::Parallel,
        ..reference_profile(seed)
    }
}

/// `config` with every task run on the updating thread, for timings
/// that exclude worker hand-off.
pub fn inline_profile(config: OceanConfig) -> OceanConfig {
    OceanConfig {
        threaded: false,
        scheduler: SchedulerConfig {
            disable_multithreading: true,
            ..config.scheduler.clone()
        },
        ..config
    }
}

/// Build an ocean and update it until the first evolution cycle is
/// readable. Gives up after ten seconds and returns what it has.
pub fn warmed_ocean(config: OceanConfig) -> Result<Ocean, OceanError> {
    let mut ocean = Ocean::new(config)?;
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut t = 0.0;
    while ocean.cycle() == 0 && Instant::now() < deadline {
        t += 1.0 / 60.0;
        ocean.update(t)?;
        std::thread::yield_now();
    }
    Ok(ocean)
}

/// `n` queries spread over a square of side `extent` metres, walked in a
/// fixed low-discrepancy order.
pub fn query_field(n: usize, extent: f32) -> Vec<WaveQuery> {
    const GOLDEN: f32 = 0.618_034;
    (0..n)
        .map(|i| {
            let u = (i as f32 * GOLDEN).fract();
            let v = (i as f32 + 0.5) / n as f32;
            WaveQuery::new((u - 0.5) * extent, (v - 0.5) * extent)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_validate() {
        assert!(reference_profile(0).validate().is_ok());
        assert!(stress_profile(0).validate().is_ok());
        assert!(!inline_profile(reference_profile(0)).threaded);
    }

    #[test]
    fn query_field_stays_inside_extent() {
        let qs = query_field(100, 50.0);
        assert_eq!(qs.len(), 100);
        assert!(qs.iter().all(|q| q.x.abs() <= 25.0 && q.z.abs() <= 25.0));
    }
}
