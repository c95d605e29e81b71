//! Dense 2D multi-channel grid with wrap/clamp addressing and bilinear
//! sampling.
//!
//! Storage is a flat `Vec<f32>` laid out as `(x + y * width) * channels + c`.
//! The displacement field of every cascade lives in one of these.

/// How out-of-range integer indices are brought back into the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BoundaryMode {
    /// Modulo into `[0, size)`, so the grid tiles.
    #[default]
    Wrap,
    /// Saturate into `[0, size - 1]`.
    Clamp,
}

impl BoundaryMode {
    /// Resolve a possibly out-of-range index into `[0, size)`.
    ///
    /// `size` must be non-zero.
    pub fn resolve(self, index: i64, size: usize) -> usize {
        let n = size as i64;
        match self {
            Self::Wrap => index.rem_euclid(n) as usize,
            Self::Clamp => index.clamp(0, n - 1) as usize,
        }
    }
}

/// A `width x height` grid of `channels`-wide `f32` texels.
#[derive(Clone, Debug, PartialEq)]
pub struct InterpolatedArray {
    width: usize,
    height: usize,
    channels: usize,
    mode: BoundaryMode,
    half_pixel_offset: bool,
    data: Vec<f32>,
}

impl InterpolatedArray {
    /// Allocate a zero-filled grid. Half-pixel offset is on by default.
    ///
    /// # Panics
    ///
    /// Panics if any dimension is zero.
    pub fn new(width: usize, height: usize, channels: usize, mode: BoundaryMode) -> Self {
        assert!(
            width > 0 && height > 0 && channels > 0,
            "InterpolatedArray dimensions must be non-zero"
        );
        Self {
            width,
            height,
            channels,
            mode,
            half_pixel_offset: true,
            data: vec![0.0; width * height * channels],
        }
    }

    /// Builder-style toggle for the half-pixel convention.
    pub fn with_half_pixel_offset(mut self, enabled: bool) -> Self {
        self.half_pixel_offset = enabled;
        self
    }

    /// Grid width in texels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in texels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Values per texel.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Current boundary mode.
    pub fn mode(&self) -> BoundaryMode {
        self.mode
    }

    /// Change the boundary mode.
    pub fn set_mode(&mut self, mode: BoundaryMode) {
        self.mode = mode;
    }

    /// Whether normalized coordinates address texel centres.
    pub fn half_pixel_offset(&self) -> bool {
        self.half_pixel_offset
    }

    /// Change the half-pixel convention.
    pub fn set_half_pixel_offset(&mut self, enabled: bool) {
        self.half_pixel_offset = enabled;
    }

    /// Raw texel storage.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable raw texel storage.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Zero every texel.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Copy another grid's contents into this one.
    ///
    /// # Panics
    ///
    /// Panics if the dimensions differ.
    pub fn copy_from(&mut self, other: &InterpolatedArray) {
        assert_eq!(
            (self.width, self.height, self.channels),
            (other.width, other.height, other.channels),
            "InterpolatedArray::copy_from dimension mismatch"
        );
        self.data.copy_from_slice(&other.data);
    }

    #[inline]
    fn offset(&self, x: usize, y: usize, c: usize) -> usize {
        debug_assert!(c < self.channels, "channel {c} out of range");
        (x + y * self.width) * self.channels + c
    }

    /// Read one texel channel at exact, in-range indices.
    #[inline]
    pub fn get(&self, x: usize, y: usize, c: usize) -> f32 {
        self.data[self.offset(x, y, c)]
    }

    /// Write one texel channel at exact, in-range indices.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, c: usize, value: f32) {
        let i = self.offset(x, y, c);
        self.data[i] = value;
    }

    /// Read one texel channel, resolving the indices through the boundary
    /// mode first.
    #[inline]
    pub fn get_resolved(&self, x: i64, y: i64, c: usize) -> f32 {
        let x = self.mode.resolve(x, self.width);
        let y = self.mode.resolve(y, self.height);
        self.get(x, y, c)
    }

    fn to_texel(&self, coord: f32, size: usize) -> f32 {
        if self.half_pixel_offset {
            coord * size as f32 - 0.5
        } else {
            coord * (size as f32 - 1.0)
        }
    }

    /// Bilinearly sample every channel at normalized coordinates `(u, v)`.
    ///
    /// `out` must hold at least `channels` values; the first `channels`
    /// entries are overwritten.
    pub fn sample(&self, u: f32, v: f32, out: &mut [f32]) {
        let (x0, x1, fx) = self.axis(self.to_texel(u, self.width), self.width);
        let (y0, y1, fy) = self.axis(self.to_texel(v, self.height), self.height);

        for (c, slot) in out.iter_mut().take(self.channels).enumerate() {
            let v0 = self.get(x0, y0, c) * (1.0 - fx) + self.get(x1, y0, c) * fx;
            let v1 = self.get(x0, y1, c) * (1.0 - fx) + self.get(x1, y1, c) * fx;
            *slot = v0 * (1.0 - fy) + v1 * fy;
        }
    }

    /// Bilinearly sample a single channel.
    pub fn sample_channel(&self, u: f32, v: f32, c: usize) -> f32 {
        let (x0, x1, fx) = self.axis(self.to_texel(u, self.width), self.width);
        let (y0, y1, fy) = self.axis(self.to_texel(v, self.height), self.height);
        let v0 = self.get(x0, y0, c) * (1.0 - fx) + self.get(x1, y0, c) * fx;
        let v1 = self.get(x0, y1, c) * (1.0 - fx) + self.get(x1, y1, c) * fx;
        v0 * (1.0 - fy) + v1 * fy
    }

    /// Split a texel-space coordinate into the two neighbouring indices and
    /// the blend weight toward the second one. The neighbour lies on the
    /// side of zero the coordinate points away from.
    fn axis(&self, t: f32, size: usize) -> (usize, usize, f32) {
        // Keep the integer part small so the cast and neighbour step
        // cannot saturate or overflow.
        let n = size as f32;
        let t = match self.mode {
            BoundaryMode::Wrap => t.rem_euclid(n),
            BoundaryMode::Clamp => t.clamp(-1.0, n),
        };
        let whole = t.trunc();
        let step = if t > 0.0 {
            1
        } else if t < 0.0 {
            -1
        } else {
            0
        };
        let i0 = whole as i64;
        let frac = (t - whole).abs();
        (
            self.mode.resolve(i0, size),
            self.mode.resolve(i0.saturating_add(step), size),
            frac,
        )
    }
}
