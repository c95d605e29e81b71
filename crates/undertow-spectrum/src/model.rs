//! Analytic wave spectra.
//!
//! Both models map a wavevector `(kx, kz)` in radians per metre to an
//! energy density. They are pure functions of the wavevector once built;
//! every constant that depends only on the wind is computed up front.

use std::f32::consts::{PI, TAU};

use undertow_core::SpectrumError;

/// Gravitational acceleration used by the dispersion relation.
pub const GRAVITY: f32 = 9.818_286;

/// Phase speed of the capillary peak, m/s.
pub const WAVE_CM: f32 = 0.23;

/// Wavenumber of the capillary peak, rad/m.
pub const WAVE_KM: f32 = 370.0;

/// Wavenumbers with a smaller magnitude carry no energy.
pub const MIN_WAVENUMBER: f32 = 1e-6;

/// Deep-water dispersion with capillary correction: angular frequency of
/// a wave with wavenumber `k`.
#[inline]
pub fn dispersion(k: f32) -> f32 {
    let r = k / WAVE_KM;
    (GRAVITY * k * (1.0 + r * r)).sqrt()
}

/// Which model a condition uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpectrumKind {
    /// Wind-aligned Phillips spectrum.
    Phillips,
    /// Elfouhaily et al. unified directional spectrum.
    Unified,
}

impl SpectrumKind {
    /// Lowercase name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Phillips => "phillips",
            Self::Unified => "unified",
        }
    }
}

/// Model-specific parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpectrumParams {
    /// Phillips spectrum.
    Phillips {
        /// Wind speed in m/s, `>= 0`.
        wind_speed: f32,
    },
    /// Unified directional spectrum.
    Unified {
        /// Wind speed ten metres above the surface, m/s, `> 0`.
        wind_speed: f32,
        /// Inverse wave age `U10 / cp`, `> 0`. Around 0.84 for a fully
        /// developed sea, larger for young wind seas.
        wave_age: f32,
    },
}

impl Default for SpectrumParams {
    fn default() -> Self {
        Self::Unified {
            wind_speed: 8.0,
            wave_age: 0.84,
        }
    }
}

impl SpectrumParams {
    /// The model these parameters select.
    pub fn kind(&self) -> SpectrumKind {
        match self {
            Self::Phillips { .. } => SpectrumKind::Phillips,
            Self::Unified { .. } => SpectrumKind::Unified,
        }
    }

    /// Wind speed, m/s.
    pub fn wind_speed(&self) -> f32 {
        match *self {
            Self::Phillips { wind_speed } | Self::Unified { wind_speed, .. } => wind_speed,
        }
    }

    /// Same model with a different wind speed.
    pub fn with_wind_speed(self, wind_speed: f32) -> Self {
        match self {
            Self::Phillips { .. } => Self::Phillips { wind_speed },
            Self::Unified { wave_age, .. } => Self::Unified {
                wind_speed,
                wave_age,
            },
        }
    }

    /// Check the parameters lie in the model's valid range.
    pub fn validate(&self) -> Result<(), SpectrumError> {
        match *self {
            Self::Phillips { wind_speed } => {
                if !wind_speed.is_finite() || wind_speed < 0.0 {
                    return Err(SpectrumError::InvalidParameter {
                        name: "wind_speed",
                        value: wind_speed,
                    });
                }
            }
            Self::Unified {
                wind_speed,
                wave_age,
            } => {
                if !wind_speed.is_finite() || wind_speed <= 0.0 {
                    return Err(SpectrumError::InvalidParameter {
                        name: "wind_speed",
                        value: wind_speed,
                    });
                }
                if !wave_age.is_finite() || wave_age <= 0.0 {
                    return Err(SpectrumError::InvalidParameter {
                        name: "wave_age",
                        value: wave_age,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Unit wind vector for a direction in degrees.
fn wind_vector(wind_dir: f32) -> [f32; 2] {
    let theta = wind_dir * PI / 180.0;
    [theta.cos(), theta.sin()]
}

#[inline]
fn rotate(kx: f32, kz: f32, w: [f32; 2]) -> (f32, f32) {
    (kx * w[0] - kz * w[1], kx * w[1] + kz * w[0])
}

// ── Phillips ───────────────────────────────────────────────────────

/// Phillips spectrum with a short-wave damping term.
#[derive(Clone, Debug, PartialEq)]
pub struct Phillips {
    wind: [f32; 2],
    length2: f32,
    damped_length2: f32,
}

impl Phillips {
    const AMP: f32 = 0.02;

    /// Build for a wind speed (m/s) and direction (degrees).
    pub fn new(wind_speed: f32, wind_dir: f32) -> Self {
        let l = wind_speed * wind_speed / GRAVITY;
        let length2 = l * l;
        Self {
            wind: wind_vector(wind_dir),
            length2,
            damped_length2: length2 * 0.001 * 0.001,
        }
    }

    /// Energy density at `(kx, kz)`.
    pub fn spectrum(&self, kx: f32, kz: f32) -> f32 {
        let (u, v) = rotate(kx, kz, self.wind);
        let k = (u * u + v * v).sqrt();
        if k < MIN_WAVENUMBER {
            return 0.0;
        }
        let k2 = k * k;
        let k4 = k2 * k2;
        let kdotw = u / k;
        let kdotw2 = kdotw * kdotw;
        let kdotw6 = kdotw2 * kdotw2 * kdotw2;
        Self::AMP * (-1.0 / (k2 * self.length2)).exp() / k4
            * kdotw6
            * (-k2 * self.damped_length2).exp()
    }
}

// ── Unified ────────────────────────────────────────────────────────

/// Unified directional spectrum for long and short wind-driven waves
/// (Elfouhaily, Chapron, Katsaros, Vandemark 1997).
#[derive(Clone, Debug, PartialEq)]
pub struct Unified {
    wind: [f32; 2],
    wave_age: f32,
    kp: f32,
    cp: f32,
    gamma: f32,
    sq_sigma_2: f32,
    half_alpha_p_cp: f32,
    half_alpham_cm: f32,
    am: f32,
}

impl Unified {
    const LOG_2_4: f32 = std::f32::consts::LN_2 / 4.0;

    /// Build for a wind speed (m/s), direction (degrees) and inverse wave
    /// age.
    pub fn new(wind_speed: f32, wind_dir: f32, wave_age: f32) -> Self {
        let u10 = wind_speed;
        let ratio = wave_age / u10;
        let kp = GRAVITY * ratio * ratio;
        let cp = dispersion(kp) / kp;

        // Friction velocity.
        let z0 = 3.7e-5 * u10 * u10 / 9.81 * (u10 / cp).powf(0.9);
        let u_star = 0.41 * u10 / (10.0 / z0).ln();

        let gamma = if wave_age < 1.0 {
            1.7
        } else {
            1.7 + 6.0 * wave_age.ln()
        };
        let sigma = 0.08 * (1.0 + 4.0 / wave_age.powi(3));
        let alpha_p = 0.006 * wave_age.sqrt();
        let alpham = 0.01
            * if u_star < WAVE_CM {
                1.0 + (u_star / WAVE_CM).ln()
            } else {
                1.0 + 3.0 * (u_star / WAVE_CM).ln()
            };

        Self {
            wind: wind_vector(wind_dir),
            wave_age,
            kp,
            cp,
            gamma,
            sq_sigma_2: sigma * sigma * 2.0,
            half_alpha_p_cp: 0.5 * alpha_p * cp,
            half_alpham_cm: 0.5 * alpham * WAVE_CM,
            am: 0.13 * u_star / WAVE_CM,
        }
    }

    /// Wavenumber of the spectral peak.
    pub fn peak_wavenumber(&self) -> f32 {
        self.kp
    }

    /// Energy density at `(kx, kz)`. Zero for waves travelling against the
    /// wind.
    pub fn spectrum(&self, kx: f32, kz: f32) -> f32 {
        let (kx, kz) = rotate(kx, kz, self.wind);
        let k = (kx * kx + kz * kz).sqrt();
        if k < MIN_WAVENUMBER || kx < 0.0 {
            return 0.0;
        }
        let c = dispersion(k) / k;

        // Long-wave (gravity) regime.
        let kp_k = self.kp / k;
        let lpm = (-1.25 * kp_k * kp_k).exp();
        let peak = (k / self.kp).sqrt() - 1.0;
        let big_gamma = (-1.0 / self.sq_sigma_2 * peak * peak).exp();
        let jp = self.gamma.powf(big_gamma);
        let fp = lpm * jp * (-self.wave_age / 10f32.sqrt() * peak).exp();
        let bl = self.half_alpha_p_cp / c * fp;

        // Short-wave (capillary) regime.
        let km = k / WAVE_KM - 1.0;
        let fm = (-0.25 * km * km).exp();
        let bh = self.half_alpham_cm / c * fm * lpm;

        // Directional spreading.
        let delta = (Self::LOG_2_4
            + 4.0 * (c / self.cp).powf(2.5)
            + self.am * (WAVE_CM / c).powf(2.5))
        .tanh();
        let phi = kz.atan2(kx);

        let (bl, bh) = (bl * 2.0, bh * 2.0);
        // Suppress waves perpendicular to the wind.
        let tweak = (kx / k).max(0.0).sqrt();
        let k4 = k * k * k * k;
        (bl + bh) * (1.0 + delta * (2.0 * phi).cos()) / (TAU * k4) * tweak
    }
}

// ── Dispatch ───────────────────────────────────────────────────────

/// A built spectrum model.
#[derive(Clone, Debug, PartialEq)]
pub enum SpectrumModel {
    /// See [`Phillips`].
    Phillips(Phillips),
    /// See [`Unified`].
    Unified(Unified),
}

impl SpectrumModel {
    /// Build the model selected by `params` for a wind direction in
    /// degrees.
    pub fn new(params: SpectrumParams, wind_dir: f32) -> Self {
        match params {
            SpectrumParams::Phillips { wind_speed } => {
                Self::Phillips(Phillips::new(wind_speed, wind_dir))
            }
            SpectrumParams::Unified {
                wind_speed,
                wave_age,
            } => Self::Unified(Unified::new(wind_speed, wind_dir, wave_age)),
        }
    }

    /// The model's kind.
    pub fn kind(&self) -> SpectrumKind {
        match self {
            Self::Phillips(_) => SpectrumKind::Phillips,
            Self::Unified(_) => SpectrumKind::Unified,
        }
    }

    /// Energy density at `(kx, kz)`.
    #[inline]
    pub fn spectrum(&self, kx: f32, kz: f32) -> f32 {
        match self {
            Self::Phillips(m) => m.spectrum(kx, kz),
            Self::Unified(m) => m.spectrum(kx, kz),
        }
    }
}
