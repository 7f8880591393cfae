// src/coeffs.rs
//
// Assembly of the four precomputed update-coefficient fields consumed by
// the stencil kernels. Geometry/material ingestion proper is outside the
// core; this module provides what the demo binary and the test suite need:
// uniform or per-cell isotropic media plus the boundary overlays.

use crate::error::Result;
use crate::field::SimdField;
use crate::grid::Grid3;
use crate::mesh::{AxisBoundary, Mesh};

pub const EPS0: f64 = 8.854_187_812_8e-12;
pub const MU0: f64 = 1.256_637_061_4e-6;
pub const C0: f64 = 299_792_458.0;

/// The four coefficient fields of the Yee update:
///
/// `volt <- volt * vv + vi * curl(curr)` and
/// `curr <- curr * ii + iv * curl(volt)`.
///
/// All four share the lattice and layout of the primary fields. Padding
/// lanes stay zero so they can never inject energy into the real domain.
/// `apply_boundaries` must run after the material fill: it freezes the
/// high-z current row (the kernel suppresses the x/y high faces itself)
/// and applies the per-axis PEC/PMC codes.
pub struct CoeffSet {
    grid: Grid3,
    pub vv: SimdField,
    pub vi: SimdField,
    pub ii: SimdField,
    pub iv: SimdField,
}

impl CoeffSet {
    pub fn new(grid: Grid3) -> Result<Self> {
        Ok(Self {
            grid,
            vv: SimdField::new(grid)?,
            vi: SimdField::new(grid)?,
            ii: SimdField::new(grid)?,
            iv: SimdField::new(grid)?,
        })
    }

    #[inline]
    pub fn grid(&self) -> &Grid3 {
        &self.grid
    }

    /// Uniform vacuum over the whole lattice.
    pub fn vacuum(grid: Grid3, delta: f64, dt: f64) -> Result<Self> {
        let mut c = Self::new(grid)?;
        c.fill_uniform(1.0, 1.0, 0.0, delta, dt);
        Ok(c)
    }

    /// Fill every real cell with one isotropic material.
    pub fn fill_uniform(&mut self, eps_r: f64, mu_r: f64, sigma: f64, delta: f64, dt: f64) {
        for i in 0..self.grid.nx {
            for j in 0..self.grid.ny {
                for k in 0..self.grid.nz {
                    self.set_cell_material(i, j, k, eps_r, mu_r, sigma, delta, dt);
                }
            }
        }
    }

    /// Set one cell's isotropic material coefficients.
    pub fn set_cell_material(
        &mut self,
        i: usize,
        j: usize,
        k: usize,
        eps_r: f64,
        mu_r: f64,
        sigma: f64,
        delta: f64,
        dt: f64,
    ) {
        let eps = EPS0 * eps_r;
        let mu = MU0 * mu_r;
        let loss = sigma * dt / (2.0 * eps);
        let vv = ((1.0 - loss) / (1.0 + loss)) as f32;
        let vi = ((dt / (eps * delta)) / (1.0 + loss)) as f32;
        let iv = (dt / (mu * delta)) as f32;
        for c in 0..3 {
            self.vv.set(c, i, j, k, vv);
            self.vi.set(c, i, j, k, vi);
            self.ii.set(c, i, j, k, 1.0);
            self.iv.set(c, i, j, k, iv);
        }
    }

    /// Freeze the high-z current row and apply the per-axis boundary codes.
    /// UPML regions additionally override coefficients through
    /// `extension::upml::create_upml`.
    pub fn apply_boundaries(&mut self, mesh: &Mesh) {
        let n = [self.grid.nx, self.grid.ny, self.grid.nz];

        // high-z current row: the x/y high faces are suppressed by the
        // planner's window clamp, the z row through the coefficients
        self.for_face(2, n[2] - 1, |s, c, i, j, k| {
            s.ii.set(c, i, j, k, 1.0);
            s.iv.set(c, i, j, k, 0.0);
        });

        for axis in 0..3 {
            match mesh.boundary[axis] {
                AxisBoundary::Pec => {
                    for coord in [0, n[axis] - 1] {
                        self.for_face(axis, coord, |s, c, i, j, k| {
                            if c != axis {
                                s.vv.set(c, i, j, k, 0.0);
                                s.vi.set(c, i, j, k, 0.0);
                            }
                        });
                    }
                }
                AxisBoundary::Pmc => {
                    self.for_face(axis, 0, |s, c, i, j, k| {
                        if c != axis {
                            s.ii.set(c, i, j, k, 1.0);
                            s.iv.set(c, i, j, k, 0.0);
                        }
                    });
                }
                // the UPML overlay rebuilds the region's coefficients and
                // terminates it with the kernel's own PEC walls
                AxisBoundary::Upml { .. } => {}
            }
        }
    }

    fn for_face(&mut self, axis: usize, coord: usize, f: impl Fn(&mut Self, usize, usize, usize, usize)) {
        let n = [self.grid.nx, self.grid.ny, self.grid.nz];
        let (ua, va) = match axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };
        for u in 0..n[ua] {
            for v in 0..n[va] {
                let mut p = [0; 3];
                p[axis] = coord;
                p[ua] = u;
                p[va] = v;
                for c in 0..3 {
                    f(self, c, p[0], p[1], p[2]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vacuum_coefficients_reduce_to_the_free_space_update() {
        let grid = Grid3::new(4, 4, 4);
        let delta = 1e-3;
        let dt = 0.5 * delta / (C0 * (3.0f64).sqrt());
        let c = CoeffSet::vacuum(grid, delta, dt).unwrap();
        let vi = c.vi.get(0, 1, 1, 1) as f64;
        let iv = c.iv.get(0, 1, 1, 1) as f64;
        assert!((vi - dt / (EPS0 * delta)).abs() / vi < 1e-6);
        assert!((iv - dt / (MU0 * delta)).abs() / iv < 1e-6);
        assert_eq!(c.vv.get(2, 3, 3, 3), 1.0);
        assert_eq!(c.ii.get(2, 3, 3, 3), 1.0);
    }

    #[test]
    fn boundary_overlay_freezes_the_high_z_current_row() {
        let grid = Grid3::new(4, 4, 8);
        let mesh = Mesh::new(4, 4, 8);
        let mut c = CoeffSet::vacuum(grid, 1e-3, 1e-12).unwrap();
        c.apply_boundaries(&mesh);
        for c_idx in 0..3 {
            for i in 0..4 {
                for j in 0..4 {
                    assert_eq!(c.iv.get(c_idx, i, j, 7), 0.0);
                    assert_eq!(c.ii.get(c_idx, i, j, 7), 1.0);
                }
            }
        }
    }

    #[test]
    fn pec_axis_zeroes_tangential_voltage_coefficients() {
        let grid = Grid3::new(4, 4, 8);
        let mesh = Mesh::new(4, 4, 8); // all axes PEC
        let mut c = CoeffSet::vacuum(grid, 1e-3, 1e-12).unwrap();
        c.apply_boundaries(&mesh);
        // tangential components on the x = 0 face
        assert_eq!(c.vv.get(1, 0, 2, 3), 0.0);
        assert_eq!(c.vi.get(2, 0, 2, 3), 0.0);
        // normal component stays live
        assert!(c.vv.get(0, 0, 2, 3) != 0.0);
    }
}
