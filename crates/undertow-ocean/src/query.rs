//! Point queries against a displacement snapshot.
//!
//! World coordinates map into each cascade's texture space through
//! [`QueryGridScaling`]; each enabled cascade is sampled bilinearly and
//! the samples are summed with per-cascade choppiness on the horizontal
//! channels and a common vertical scale on the height.

use undertow_spectrum::{CascadeLayout, MAX_CASCADES};

use crate::buffer::{DisplacementSet, ALL_CASCADES, CHANNELS, CHANNEL_DX, CHANNEL_DZ, CHANNEL_HEIGHT};

/// Fixed-point iterations allowed when solving [`QueryMode::Position`].
pub const MAX_POSITION_ITERATIONS: usize = 8;

/// Horizontal error, in metres, at which position solving stops.
pub const POSITION_TOLERANCE: f32 = 1e-3;

/// What a query computes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// Height of the sampled texel at the query point. Cheapest.
    #[default]
    Height,
    /// Full displacement vector at the query point, plus normal and foam.
    Displacement,
    /// Height of the surface point whose horizontally displaced position
    /// lands on the query point.
    Position,
}

/// Accumulated answer to one query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaveQueryResult {
    /// Surface height, including the ocean level.
    pub height: f32,
    /// Displacement `(x, y, z)` at the sampled point.
    pub displacement: [f32; 3],
    /// Unit surface normal. Straight up unless computed.
    pub normal: [f32; 3],
    /// Foam coverage in `[0, 1]`, from surface compression.
    pub foam: f32,
    /// Set by an overlay that masks the ocean at this point.
    pub clipped: bool,
}

impl Default for WaveQueryResult {
    fn default() -> Self {
        Self {
            height: 0.0,
            displacement: [0.0; 3],
            normal: [0.0, 1.0, 0.0],
            foam: 0.0,
            clipped: false,
        }
    }
}

impl WaveQueryResult {
    /// Reset to the cleared defaults.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// A point query and its result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaveQuery {
    /// World x.
    pub x: f32,
    /// World z.
    pub z: f32,
    /// What to compute.
    pub mode: QueryMode,
    /// Sample the spectrum displacement field.
    pub sample_spectrum: bool,
    /// Let an [`OverlaySampler`] contribute, where the evaluator supports
    /// one.
    pub sample_overlays: bool,
    /// Cascades to sample; combined with the ocean's enabled mask.
    pub mask: u8,
    /// Filled by evaluation.
    pub result: WaveQueryResult,
}

impl WaveQuery {
    /// A height query at `(x, z)` sampling every cascade.
    pub fn new(x: f32, z: f32) -> Self {
        Self {
            x,
            z,
            mode: QueryMode::Height,
            sample_spectrum: true,
            sample_overlays: true,
            mask: ALL_CASCADES,
            result: WaveQueryResult::default(),
        }
    }

    /// Builder-style mode selection.
    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder-style cascade mask.
    pub fn with_mask(mut self, mask: u8) -> Self {
        self.mask = mask;
        self
    }
}

/// Adds main-thread data (wakes, shore masks, clip volumes) to a query.
///
/// Only consulted by evaluators running on the updating thread.
pub trait OverlaySampler: Send + Sync {
    /// Contribute to `query.result`.
    fn query_waves(&self, query: &mut WaveQuery);
}

/// Everything needed to map world coordinates into the cascades.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueryGridScaling {
    /// `1 / (grid_size * grid_scale)` per cascade.
    pub inv_grid_sizes: [f32; MAX_CASCADES],
    /// Horizontal multiplier per cascade.
    pub choppiness: [f32; MAX_CASCADES],
    /// Vertical multiplier.
    pub scale_y: f32,
    /// World scroll offset `(x, z)` added before mapping.
    pub offset: [f32; 2],
    /// Active cascade count.
    pub num_grids: usize,
}

impl QueryGridScaling {
    /// Scaling for `layout` at the given global scale factors.
    pub fn new(
        layout: &CascadeLayout,
        grid_scale: f32,
        choppiness_scale: f32,
        offset: [f32; 2],
    ) -> Self {
        Self {
            inv_grid_sizes: layout.grid_sizes.map(|g| 1.0 / (g * grid_scale)),
            choppiness: layout
                .choppiness
                .map(|c| c * choppiness_scale * grid_scale),
            scale_y: grid_scale,
            offset,
            num_grids: layout.num_grids(),
        }
    }
}

/// Sum the displacement of every cascade in `mask` at world `(x, z)`.
pub fn sample_displacement(
    set: &DisplacementSet,
    x: f32,
    z: f32,
    mask: u8,
    scaling: &QueryGridScaling,
) -> [f32; 3] {
    let mut total = [0.0f32; 3];
    let mut texel = [0.0f32; CHANNELS];
    let grids = scaling.num_grids.min(set.num_grids());
    for g in 0..grids {
        if mask & (1 << g) == 0 {
            continue;
        }
        let inv = scaling.inv_grid_sizes[g];
        let u = (x + scaling.offset[0]) * inv;
        let v = (z + scaling.offset[1]) * inv;
        set.grid(g).sample(u, v, &mut texel);
        total[0] += texel[CHANNEL_DX] * scaling.choppiness[g];
        total[1] += texel[CHANNEL_HEIGHT] * scaling.scale_y;
        total[2] += texel[CHANNEL_DZ] * scaling.choppiness[g];
    }
    total
}

/// Summed height only.
pub fn sample_height(
    set: &DisplacementSet,
    x: f32,
    z: f32,
    mask: u8,
    scaling: &QueryGridScaling,
) -> f32 {
    let grids = scaling.num_grids.min(set.num_grids());
    let mut height = 0.0;
    for g in 0..grids {
        if mask & (1 << g) == 0 {
            continue;
        }
        let inv = scaling.inv_grid_sizes[g];
        let u = (x + scaling.offset[0]) * inv;
        let v = (z + scaling.offset[1]) * inv;
        height += set.grid(g).sample_channel(u, v, CHANNEL_HEIGHT) * scaling.scale_y;
    }
    height
}

/// Finite-difference step: one texel of the finest sampled cascade.
fn texel_step(set: &DisplacementSet, mask: u8, scaling: &QueryGridScaling) -> f32 {
    let grids = scaling.num_grids.min(set.num_grids());
    let finest = (0..grids)
        .filter(|&g| mask & (1 << g) != 0)
        .map(|g| scaling.inv_grid_sizes[g])
        .fold(0.0f32, f32::max);
    if finest > 0.0 {
        1.0 / (finest * set.size() as f32)
    } else {
        1.0
    }
}

/// Normal and foam from central differences around `(x, z)`.
fn surface_derivatives(
    set: &DisplacementSet,
    x: f32,
    z: f32,
    mask: u8,
    scaling: &QueryGridScaling,
) -> ([f32; 3], f32) {
    let e = texel_step(set, mask, scaling);
    let px = sample_displacement(set, x + e, z, mask, scaling);
    let nx = sample_displacement(set, x - e, z, mask, scaling);
    let pz = sample_displacement(set, x, z + e, mask, scaling);
    let nz = sample_displacement(set, x, z - e, mask, scaling);
    let inv = 1.0 / (2.0 * e);

    let dh_dx = (px[1] - nx[1]) * inv;
    let dh_dz = (pz[1] - nz[1]) * inv;
    let n = [-dh_dx, 1.0, -dh_dz];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    let normal = [n[0] / len, n[1] / len, n[2] / len];

    // Jacobian of the horizontal map (x, z) -> (x + Dx, z + Dz).
    let jxx = 1.0 + (px[0] - nx[0]) * inv;
    let jzz = 1.0 + (pz[2] - nz[2]) * inv;
    let jxz = (pz[0] - nz[0]) * inv;
    let jzx = (px[2] - nx[2]) * inv;
    let jacobian = jxx * jzz - jxz * jzx;
    let foam = (1.0 - jacobian).clamp(0.0, 1.0);

    (normal, foam)
}

/// Evaluate the spectrum part of `query` against `set`, accumulating into
/// `query.result`. `enabled` is the ocean-wide cascade mask. The result is
/// not cleared and the ocean level is not added.
pub fn query_waves(
    query: &mut WaveQuery,
    set: &DisplacementSet,
    enabled: u8,
    scaling: &QueryGridScaling,
) {
    let mask = query.mask & enabled;
    if mask == 0 {
        return;
    }
    let (x, z) = (query.x, query.z);
    match query.mode {
        QueryMode::Height => {
            let h = sample_height(set, x, z, mask, scaling);
            query.result.height += h;
            query.result.displacement[1] += h;
        }
        QueryMode::Displacement => {
            let d = sample_displacement(set, x, z, mask, scaling);
            let (normal, foam) = surface_derivatives(set, x, z, mask, scaling);
            let r = &mut query.result;
            r.height += d[1];
            for (acc, v) in r.displacement.iter_mut().zip(d) {
                *acc += v;
            }
            r.normal = normal;
            r.foam = foam;
        }
        QueryMode::Position => {
            let (mut px, mut pz) = (x, z);
            let mut d = sample_displacement(set, px, pz, mask, scaling);
            for _ in 0..MAX_POSITION_ITERATIONS {
                let ex = px + d[0] - x;
                let ez = pz + d[2] - z;
                if ex.abs() < POSITION_TOLERANCE && ez.abs() < POSITION_TOLERANCE {
                    break;
                }
                px -= ex;
                pz -= ez;
                d = sample_displacement(set, px, pz, mask, scaling);
            }
            let r = &mut query.result;
            r.height += d[1];
            for (acc, v) in r.displacement.iter_mut().zip(d) {
                *acc += v;
            }
        }
    }
}

/// Clear, evaluate, consult the overlay, add the ocean level.
pub fn evaluate(
    query: &mut WaveQuery,
    set: &DisplacementSet,
    enabled: u8,
    scaling: &QueryGridScaling,
    ocean_level: f32,
    overlay: Option<&dyn OverlaySampler>,
) {
    query.result.clear();
    if query.sample_spectrum {
        query_waves(query, set, enabled, scaling);
    }
    if query.sample_overlays {
        if let Some(sampler) = overlay {
            sampler.query_waves(query);
        }
    }
    query.result.height += ocean_level;
}
