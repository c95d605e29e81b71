//! The value-typed cache key describing one spectrum configuration.

use std::hash::{Hash, Hasher};

use undertow_core::SpectrumError;

use crate::model::{SpectrumKind, SpectrumParams};

/// Maximum number of cascades a condition can carry.
pub const MAX_CASCADES: usize = 4;

/// Everything that determines a generated spectrum.
///
/// Equality is structural over the bit patterns of the float fields, with
/// `-0.0` treated as `0.0`, so the key is usable in hashed collections.
/// The cascade layout is derived from `num_grids` and is therefore not
/// part of the key.
#[derive(Clone, Copy, Debug)]
pub struct SpectrumConditionKey {
    size: usize,
    wind_dir: f32,
    num_grids: usize,
    params: SpectrumParams,
}

impl SpectrumConditionKey {
    /// Build a key, validating every field.
    pub fn new(
        size: usize,
        wind_dir: f32,
        num_grids: usize,
        params: SpectrumParams,
    ) -> Result<Self, SpectrumError> {
        if size < 2 || !size.is_power_of_two() {
            return Err(SpectrumError::InvalidSize { size });
        }
        if !(1..=MAX_CASCADES).contains(&num_grids) {
            return Err(SpectrumError::InvalidCascadeCount { count: num_grids });
        }
        if !wind_dir.is_finite() {
            return Err(SpectrumError::InvalidParameter {
                name: "wind_dir",
                value: wind_dir,
            });
        }
        params.validate()?;
        Ok(Self {
            size,
            wind_dir,
            num_grids,
            params,
        })
    }

    /// Grid edge length of every cascade.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Wind direction in degrees.
    pub fn wind_dir(&self) -> f32 {
        self.wind_dir
    }

    /// Number of cascades, `1..=4`.
    pub fn num_grids(&self) -> usize {
        self.num_grids
    }

    /// Model parameters.
    pub fn params(&self) -> SpectrumParams {
        self.params
    }

    /// Model kind.
    pub fn kind(&self) -> SpectrumKind {
        self.params.kind()
    }

    fn bits(&self) -> (usize, u32, usize, u8, u32, u32) {
        let (tag, a, b) = match self.params {
            SpectrumParams::Phillips { wind_speed } => (0u8, wind_speed, 0.0),
            SpectrumParams::Unified {
                wind_speed,
                wave_age,
            } => (1u8, wind_speed, wave_age),
        };
        (
            self.size,
            canonical_bits(self.wind_dir),
            self.num_grids,
            tag,
            canonical_bits(a),
            canonical_bits(b),
        )
    }
}

fn canonical_bits(v: f32) -> u32 {
    if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

impl PartialEq for SpectrumConditionKey {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for SpectrumConditionKey {}

impl Hash for SpectrumConditionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn phillips(size: usize, dir: f32, grids: usize, speed: f32) -> SpectrumConditionKey {
        SpectrumConditionKey::new(
            size,
            dir,
            grids,
            SpectrumParams::Phillips { wind_speed: speed },
        )
        .unwrap()
    }

    #[test]
    fn equal_fields_are_equal_keys() {
        assert_eq!(phillips(64, 10.0, 2, 5.0), phillips(64, 10.0, 2, 5.0));
        assert_eq!(phillips(64, 0.0, 1, 5.0), phillips(64, -0.0, 1, 5.0));
    }

    #[test]
    fn any_field_change_is_a_different_key() {
        let base = phillips(64, 10.0, 2, 5.0);
        let mut set = HashSet::new();
        set.insert(base);
        assert!(!set.contains(&phillips(128, 10.0, 2, 5.0)));
        assert!(!set.contains(&phillips(64, 11.0, 2, 5.0)));
        assert!(!set.contains(&phillips(64, 10.0, 3, 5.0)));
        assert!(!set.contains(&phillips(64, 10.0, 2, 5.5)));
        let unified = SpectrumConditionKey::new(
            64,
            10.0,
            2,
            SpectrumParams::Unified {
                wind_speed: 5.0,
                wave_age: 0.84,
            },
        )
        .unwrap();
        assert!(!set.contains(&unified));
        assert!(set.contains(&phillips(64, 10.0, 2, 5.0)));
    }

    #[test]
    fn rejects_bad_fields() {
        let p = SpectrumParams::Phillips { wind_speed: 5.0 };
        assert_eq!(
            SpectrumConditionKey::new(48, 0.0, 1, p).unwrap_err(),
            SpectrumError::InvalidSize { size: 48 }
        );
        assert_eq!(
            SpectrumConditionKey::new(1, 0.0, 1, p).unwrap_err(),
            SpectrumError::InvalidSize { size: 1 }
        );
        assert_eq!(
            SpectrumConditionKey::new(64, 0.0, 5, p).unwrap_err(),
            SpectrumError::InvalidCascadeCount { count: 5 }
        );
        assert_eq!(
            SpectrumConditionKey::new(64, 0.0, 0, p).unwrap_err(),
            SpectrumError::InvalidCascadeCount { count: 0 }
        );
        assert!(SpectrumConditionKey::new(64, f32::INFINITY, 1, p).is_err());
    }
}
