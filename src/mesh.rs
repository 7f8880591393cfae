// src/mesh.rs

use crate::grid::Grid3;

/// Boundary treatment for one mesh axis (applied to both faces of the axis).
///
/// Independently of these codes, the update kernels always substitute the
/// self-index for `-1` reads at the low faces (a PEC-like curl) and suppress
/// the current update on the high faces (a PMC-like wall); the codes select
/// what the coefficient assembly layers on top of that.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AxisBoundary {
    /// Perfect electric conductor: tangential voltages on both faces are
    /// frozen to zero through the coefficients.
    Pec,
    /// Perfect magnetic conductor: tangential currents on both faces are
    /// frozen through `ii = 1, iv = 0`.
    Pmc,
    /// Uniaxial PML of the given cell thickness on both ends of the axis,
    /// with a polynomial conductivity profile of the given exponent,
    /// terminated by a PEC wall.
    Upml { thickness: usize, exponent: f32 },
}

/// Rectangular mesh descriptor consumed by the engine: dimensions plus
/// per-axis boundary codes.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub grid: Grid3,
    pub boundary: [AxisBoundary; 3],
}

impl Mesh {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            grid: Grid3::new(nx, ny, nz),
            boundary: [AxisBoundary::Pec; 3],
        }
    }

    pub fn with_boundary(mut self, boundary: [AxisBoundary; 3]) -> Self {
        self.boundary = boundary;
        self
    }

    /// Thickest UPML layer requested on any axis, 0 if none.
    pub fn max_pml_thickness(&self) -> usize {
        self.boundary
            .iter()
            .map(|b| match b {
                AxisBoundary::Upml { thickness, .. } => *thickness,
                _ => 0,
            })
            .max()
            .unwrap_or(0)
    }
}
