// src/field.rs

use std::cell::UnsafeCell;

use rayon::prelude::*;

use crate::error::{FdtdError, Result};
use crate::grid::Grid3;
use crate::simd::F4;

/// One field over the full lattice: 3 components x nx x ny x nv vector
/// slots of four z lanes each, in the layout described by `Grid3`.
///
/// The store is shared mutably between worker threads during iteration.
/// That is sound under the scheduler's discipline, which the engine
/// enforces by construction:
///
/// - tiles executing concurrently within one phase are write-disjoint;
/// - the iterate barrier between phases is a full fence, so every write of
///   phase `k` happens-before every read of phase `k + 1`;
/// - off-pool access (probes, reset, energy sums) only happens while the
///   workers are parked at the start barrier.
pub struct SimdField {
    grid: Grid3,
    data: UnsafeCell<Box<[F4]>>,
}

// SAFETY: see the discipline documented on the type. All aliased writes are
// separated either spatially (write-disjoint tiles) or by a barrier.
unsafe impl Sync for SimdField {}

impl SimdField {
    /// Allocate a zero-filled field. Fails instead of aborting when the
    /// allocation cannot be satisfied.
    pub fn new(grid: Grid3) -> Result<Self> {
        let n = grid.n_slots();
        let mut v: Vec<F4> = Vec::new();
        v.try_reserve_exact(n).map_err(|e| {
            FdtdError::Alloc(format!("{} field slots ({} bytes): {e}", n, n * 16))
        })?;
        v.resize(n, F4::ZERO);
        Ok(Self {
            grid,
            data: UnsafeCell::new(v.into_boxed_slice()),
        })
    }

    #[inline]
    pub fn grid(&self) -> &Grid3 {
        &self.grid
    }

    /// Read-only view of the raw slots. Only meaningful off the hot path
    /// (workers parked); used by probes, diagnostics and tests.
    #[inline]
    pub fn as_slice(&self) -> &[F4] {
        unsafe { &*self.data.get() }
    }

    #[inline]
    fn slots(&self) -> *mut F4 {
        unsafe { (*self.data.get()).as_mut_ptr() }
    }

    /// Load the vector slot of component `c` at `(i, j, zv)`.
    #[inline]
    pub fn vec(&self, c: usize, i: usize, j: usize, zv: usize) -> F4 {
        let s = self.grid.slot(c, i, j, zv);
        unsafe { *self.slots().add(s) }
    }

    /// Store the vector slot of component `c` at `(i, j, zv)`.
    #[inline]
    pub fn set_vec(&self, c: usize, i: usize, j: usize, zv: usize, v: F4) {
        let s = self.grid.slot(c, i, j, zv);
        unsafe { *self.slots().add(s) = v };
    }

    /// Scalar probe of one cell. Constant-time, not for the hot path.
    #[inline]
    pub fn get(&self, c: usize, i: usize, j: usize, k: usize) -> f32 {
        let (zv, lane) = self.grid.z_split(k);
        self.vec(c, i, j, zv).0[lane]
    }

    /// Scalar store into one cell.
    #[inline]
    pub fn set(&self, c: usize, i: usize, j: usize, k: usize, v: f32) {
        let (zv, lane) = self.grid.z_split(k);
        let s = self.grid.slot(c, i, j, zv);
        unsafe { (*self.slots().add(s)).0[lane] = v };
    }

    /// Add into one cell.
    #[inline]
    pub fn add(&self, c: usize, i: usize, j: usize, k: usize, v: f32) {
        let (zv, lane) = self.grid.z_split(k);
        let s = self.grid.slot(c, i, j, zv);
        unsafe { (*self.slots().add(s)).0[lane] += v };
    }

    /// Zero the whole field. Requires the pool to be parked (off-pool
    /// exclusive phase); chunked through rayon for large lattices.
    pub fn fill_zero(&self) {
        let data = unsafe { &mut *self.data.get() };
        data.par_chunks_mut(4096).for_each(|chunk| {
            for q in chunk {
                *q = F4::ZERO;
            }
        });
    }
}

/// The two primary fields advanced by the engine, handed to extension
/// hooks as a unit.
pub struct FieldPair {
    pub volt: SimdField,
    pub curr: SimdField,
}

impl FieldPair {
    pub fn new(grid: Grid3) -> Result<Self> {
        Ok(Self {
            volt: SimdField::new(grid)?,
            curr: SimdField::new(grid)?,
        })
    }
}

/// Flat scalar auxiliary storage used by extension state (UPML flux, ADE
/// histories). Shares the `SimdField` concurrency contract: concurrently
/// executing tiles touch disjoint index sets.
pub struct AuxArray {
    data: UnsafeCell<Box<[f32]>>,
}

// SAFETY: same discipline as `SimdField`.
unsafe impl Sync for AuxArray {}

impl AuxArray {
    pub fn new(len: usize) -> Result<Self> {
        let mut v: Vec<f32> = Vec::new();
        v.try_reserve_exact(len)
            .map_err(|e| FdtdError::Alloc(format!("{len} aux values: {e}")))?;
        v.resize(len, 0.0);
        Ok(Self {
            data: UnsafeCell::new(v.into_boxed_slice()),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        unsafe { (&*self.data.get()).len() }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, i: usize) -> f32 {
        unsafe { (*self.data.get())[i] }
    }

    #[inline]
    pub fn set(&self, i: usize, v: f32) {
        unsafe { (*self.data.get())[i] = v };
    }

    pub fn fill_zero(&self) {
        let data = unsafe { &mut *self.data.get() };
        data.fill(0.0);
    }
}

/// Region-local scalar field with the `(3, nx, ny, nz)` index space of the
/// main lattice but plain (unvectorized) z storage. Extensions size these
/// by the bounding box of the cells they claim.
pub struct LocalField {
    pub num_lines: [usize; 3],
    data: AuxArray,
}

impl LocalField {
    pub fn new(num_lines: [usize; 3]) -> Result<Self> {
        let n = 3 * num_lines[0] * num_lines[1] * num_lines[2];
        Ok(Self {
            num_lines,
            data: AuxArray::new(n)?,
        })
    }

    #[inline]
    fn idx(&self, c: usize, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i < self.num_lines[0] && j < self.num_lines[1] && k < self.num_lines[2]);
        ((i * self.num_lines[1] + j) * self.num_lines[2] + k) * 3 + c
    }

    #[inline]
    pub fn get(&self, c: usize, i: usize, j: usize, k: usize) -> f32 {
        self.data.get(self.idx(c, i, j, k))
    }

    #[inline]
    pub fn set(&self, c: usize, i: usize, j: usize, k: usize, v: f32) {
        self.data.set(self.idx(c, i, j, k), v);
    }

    pub fn fill_zero(&self) {
        self.data.fill_zero();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_field_is_zero() {
        let g = Grid3::new(4, 4, 9);
        let f = SimdField::new(g).unwrap();
        assert!(f.as_slice().iter().all(|q| *q == F4::ZERO));
    }

    #[test]
    fn scalar_roundtrip_covers_lane_seams() {
        let g = Grid3::new(3, 2, 10); // nv = 3, strips of length 3 (pad at tail)
        let f = SimdField::new(g).unwrap();
        // write a distinct value into every real cell
        for c in 0..3 {
            for i in 0..3 {
                for j in 0..2 {
                    for k in 0..10 {
                        let v = (c * 1000 + i * 100 + j * 10 + k) as f32;
                        f.set(c, i, j, k, v);
                    }
                }
            }
        }
        for c in 0..3 {
            for i in 0..3 {
                for j in 0..2 {
                    for k in 0..10 {
                        let v = (c * 1000 + i * 100 + j * 10 + k) as f32;
                        assert_eq!(f.get(c, i, j, k), v, "c={} i={} j={} k={}", c, i, j, k);
                    }
                }
            }
        }
    }

    #[test]
    fn fill_zero_clears_everything() {
        let g = Grid3::new(2, 2, 4);
        let f = SimdField::new(g).unwrap();
        f.set(1, 1, 1, 3, 7.5);
        f.fill_zero();
        assert!(f.as_slice().iter().all(|q| *q == F4::ZERO));
    }

    #[test]
    fn local_field_indexing() {
        let lf = LocalField::new([2, 3, 4]).unwrap();
        lf.set(2, 1, 2, 3, 42.0);
        assert_eq!(lf.get(2, 1, 2, 3), 42.0);
        assert_eq!(lf.get(0, 0, 0, 0), 0.0);
    }
}
