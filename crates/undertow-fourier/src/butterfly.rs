//! Precomputed butterfly tables and the per-row pass kernels shared by
//! both engines.
//!
//! A table for size `N` holds `log2(N)` passes of `N` entries. Entry `i` of
//! pass `p` names the two input positions combined into output position
//! `i` and the twiddle applied to the second one:
//!
//! ```text
//! out[i] = in[read_a] + twiddle * in[read_b]
//! ```
//!
//! The first pass reads through bit-reversed positions; later passes read
//! in place. Twiddles are `exp(+2*pi*i*k*blocks/N)`, so a plain run is an
//! unnormalized inverse DFT. The forward direction conjugates them.

use undertow_core::FourierError;

/// One output position of one pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Butterfly {
    /// Position of the un-twiddled input.
    pub read_a: u32,
    /// Position of the twiddled input.
    pub read_b: u32,
    /// `(cos, sin)` of the twiddle angle.
    pub twiddle: [f32; 2],
}

/// Reverse the low `bits` bits of `index`.
pub fn bit_reverse(index: usize, bits: u32) -> usize {
    if bits == 0 {
        return 0;
    }
    index.reverse_bits() >> (usize::BITS - bits)
}

/// Butterfly table for one power-of-two size.
#[derive(Clone, Debug)]
pub struct ButterflyTable {
    size: usize,
    passes: usize,
    entries: Vec<Butterfly>,
}

impl ButterflyTable {
    /// Build the table. Fails unless `size` is a non-zero power of two.
    pub fn new(size: usize) -> Result<Self, FourierError> {
        if size == 0 || !size.is_power_of_two() {
            return Err(FourierError::NotPowerOfTwo { size });
        }
        let passes = size.trailing_zeros() as usize;
        let bits = passes as u32;
        let placeholder = Butterfly {
            read_a: 0,
            read_b: 0,
            twiddle: [1.0, 0.0],
        };
        let mut entries = vec![placeholder; passes * size];

        for pass in 0..passes {
            let blocks = 1usize << (passes - 1 - pass);
            let half = 1usize << pass;
            let row = &mut entries[pass * size..(pass + 1) * size];
            for block in 0..blocks {
                for k in 0..half {
                    let i1 = block * half * 2 + k;
                    let i2 = i1 + half;
                    let (j1, j2) = if pass == 0 {
                        (bit_reverse(i1, bits), bit_reverse(i2, bits))
                    } else {
                        (i1, i2)
                    };
                    let angle =
                        std::f64::consts::TAU * (k * blocks) as f64 / size as f64;
                    let (s, c) = angle.sin_cos();
                    let (c, s) = (c as f32, s as f32);
                    row[i1] = Butterfly {
                        read_a: j1 as u32,
                        read_b: j2 as u32,
                        twiddle: [c, s],
                    };
                    row[i2] = Butterfly {
                        read_a: j1 as u32,
                        read_b: j2 as u32,
                        twiddle: [-c, -s],
                    };
                }
            }
        }

        Ok(Self {
            size,
            passes,
            entries,
        })
    }

    /// Transform size `N`.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Passes per axis, `log2(N)`.
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Entries of one pass, indexed by output position.
    pub fn pass(&self, pass: usize) -> &[Butterfly] {
        &self.entries[pass * self.size..(pass + 1) * self.size]
    }
}

// ── Buffers ────────────────────────────────────────────────────────

/// How many complex numbers each `[f32; 4]` cell carries.
///
/// Evolution needs four complex fields per cascade pair (height plus the
/// x and z displacement). There is no wider packing, so those fields run
/// as two `Double` passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Packing {
    /// One complex number in lanes `0..2`; lanes `2..4` are zeroed.
    Single,
    /// Two complex numbers, `(re0, im0, re1, im1)`.
    #[default]
    Double,
}

impl Packing {
    fn lanes(self) -> usize {
        match self {
            Self::Single => 1,
            Self::Double => 2,
        }
    }
}

/// Transform direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// `exp(+i)` twiddles, no scaling. Frequency domain to spatial.
    Inverse,
    /// `exp(-i)` twiddles, scaled by `1 / N^2` so that a forward transform
    /// followed by an inverse one is the identity.
    Forward,
}

/// A ping-pong pair of `N * N` cell grids.
///
/// Input goes in side 0. Every pass reads one side and writes the other;
/// engines return the index of the side holding the result.
#[derive(Clone, Debug)]
pub struct FourierBuffer {
    size: usize,
    packing: Packing,
    sides: [Vec<[f32; 4]>; 2],
}

impl FourierBuffer {
    /// Allocate a zeroed buffer pair.
    pub fn new(size: usize, packing: Packing) -> Self {
        Self {
            size,
            packing,
            sides: [vec![[0.0; 4]; size * size], vec![[0.0; 4]; size * size]],
        }
    }

    /// Grid edge length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Cell packing.
    pub fn packing(&self) -> Packing {
        self.packing
    }

    /// Change the cell packing.
    pub fn set_packing(&mut self, packing: Packing) {
        self.packing = packing;
    }

    /// The input side.
    pub fn input_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.sides[0]
    }

    /// One side.
    pub fn side(&self, index: usize) -> &[[f32; 4]] {
        &self.sides[index]
    }

    /// One side, mutably.
    pub fn side_mut(&mut self, index: usize) -> &mut [[f32; 4]] {
        &mut self.sides[index]
    }

    /// Read side `read` and write the other.
    pub(crate) fn split(&mut self, read: usize) -> (&[[f32; 4]], &mut [[f32; 4]]) {
        let [a, b] = &mut self.sides;
        if read == 0 {
            (a.as_slice(), b.as_mut_slice())
        } else {
            (b.as_slice(), a.as_mut_slice())
        }
    }

    pub(crate) fn lanes(&self) -> usize {
        self.packing.lanes()
    }
}

/// Check that every buffer matches the table size.
pub(crate) fn check_sizes(
    table: &ButterflyTable,
    buffers: &[FourierBuffer],
) -> Result<(), FourierError> {
    let expected = table.size() * table.size();
    for b in buffers {
        let actual = b.size() * b.size();
        if actual != expected {
            return Err(FourierError::BufferSizeMismatch { expected, actual });
        }
    }
    Ok(())
}

// ── Kernels ────────────────────────────────────────────────────────

#[inline]
fn combine(a: &[f32; 4], b: &[f32; 4], w: [f32; 2], lanes: usize, out: &mut [f32; 4]) {
    for l in 0..lanes {
        let (ar, ai) = (a[2 * l], a[2 * l + 1]);
        let (br, bi) = (b[2 * l], b[2 * l + 1]);
        out[2 * l] = ar + w[0] * br - w[1] * bi;
        out[2 * l + 1] = ai + w[0] * bi + w[1] * br;
    }
    for v in out.iter_mut().skip(2 * lanes) {
        *v = 0.0;
    }
}

#[inline]
fn twiddle(b: &Butterfly, direction: Direction) -> [f32; 2] {
    match direction {
        Direction::Inverse => b.twiddle,
        Direction::Forward => [b.twiddle[0], -b.twiddle[1]],
    }
}

/// Horizontal pass over one row: `read_row` and `write_row` are the same
/// row on opposite sides.
pub(crate) fn row_pass(
    pass: &[Butterfly],
    read_row: &[[f32; 4]],
    write_row: &mut [[f32; 4]],
    lanes: usize,
    direction: Direction,
) {
    for (out, b) in write_row.iter_mut().zip(pass) {
        let a = &read_row[b.read_a as usize];
        let c = &read_row[b.read_b as usize];
        combine(a, c, twiddle(b, direction), lanes, out);
    }
}

/// Vertical pass producing row `y` of the write side from the whole read
/// side.
pub(crate) fn column_pass(
    b: &Butterfly,
    read: &[[f32; 4]],
    size: usize,
    write_row: &mut [[f32; 4]],
    lanes: usize,
    direction: Direction,
) {
    let row_a = &read[b.read_a as usize * size..(b.read_a as usize + 1) * size];
    let row_b = &read[b.read_b as usize * size..(b.read_b as usize + 1) * size];
    let w = twiddle(b, direction);
    for ((out, a), c) in write_row.iter_mut().zip(row_a).zip(row_b) {
        combine(a, c, w, lanes, out);
    }
}

/// Scale every active lane by `1 / N^2`.
pub(crate) fn normalize(cells: &mut [[f32; 4]], size: usize, lanes: usize) {
    let scale = 1.0 / (size * size) as f32;
    for cell in cells {
        for v in cell.iter_mut().take(2 * lanes) {
            *v *= scale;
        }
    }
}
