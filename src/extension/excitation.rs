// src/extension/excitation.rs
//
// Soft excitation: adds `amp * signal(t - delay)` onto selected field
// components after the stencil update, without overwriting what the
// update produced. Cell lists are fixed at construction; each hook
// invocation touches only the cells inside the current tile.

use super::{Extension, PRIO_EXCITATION};
use crate::error::Result;
use crate::field::FieldPair;
use crate::signal::Signal;
use crate::tiling::Window;

/// One excited field component.
#[derive(Debug, Clone, Copy)]
pub struct ExcCell {
    pub pos: [usize; 3],
    /// Polarization index 0..3.
    pub dir: usize,
    pub amp: f32,
    /// Start delay in timesteps.
    pub delay: usize,
}

pub struct ExcitationExt {
    signal: Signal,
    volt_cells: Vec<ExcCell>,
    curr_cells: Vec<ExcCell>,
}

impl ExcitationExt {
    pub fn new(signal: Signal, volt_cells: Vec<ExcCell>, curr_cells: Vec<ExcCell>) -> Self {
        Self {
            signal,
            volt_cells,
            curr_cells,
        }
    }

    /// Convenience: a single voltage-side source cell.
    pub fn volt_point(signal: Signal, pos: [usize; 3], dir: usize, amp: f32, delay: usize) -> Self {
        Self::new(signal, vec![ExcCell { pos, dir, amp, delay }], Vec::new())
    }

    /// Convenience: a single current-side source cell.
    pub fn curr_point(signal: Signal, pos: [usize; 3], dir: usize, amp: f32, delay: usize) -> Self {
        Self::new(signal, Vec::new(), vec![ExcCell { pos, dir, amp, delay }])
    }
}

impl Extension for ExcitationExt {
    fn name(&self) -> &'static str {
        "excitation"
    }

    fn priority(&self) -> i32 {
        PRIO_EXCITATION
    }

    fn supports_tiling(&self) -> bool {
        true
    }

    fn apply_voltages(&self, ts: usize, win: &Window, f: &FieldPair) -> Result<()> {
        for cell in &self.volt_cells {
            if !win.contains(cell.pos[0], cell.pos[1], cell.pos[2]) {
                continue;
            }
            let v = cell.amp * self.signal.sample_volt(ts, cell.delay);
            if v != 0.0 {
                f.volt.add(cell.dir, cell.pos[0], cell.pos[1], cell.pos[2], v);
            }
        }
        Ok(())
    }

    fn apply_currents(&self, ts: usize, win: &Window, f: &FieldPair) -> Result<()> {
        for cell in &self.curr_cells {
            if !win.contains(cell.pos[0], cell.pos[1], cell.pos[2]) {
                continue;
            }
            let v = cell.amp * self.signal.sample_curr(ts, cell.delay);
            if v != 0.0 {
                f.curr.add(cell.dir, cell.pos[0], cell.pos[1], cell.pos[2], v);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid3;

    #[test]
    fn source_applies_only_inside_the_tile() {
        let ext = ExcitationExt::new(
            Signal::impulse(),
            vec![
                ExcCell {
                    pos: [2, 2, 2],
                    dir: 2,
                    amp: 3.0,
                    delay: 0,
                },
                ExcCell {
                    pos: [6, 6, 6],
                    dir: 2,
                    amp: 3.0,
                    delay: 0,
                },
            ],
            Vec::new(),
        );
        let f = FieldPair::new(Grid3::new(8, 8, 8)).unwrap();
        let win = Window::new([0, 0, 0], [3, 3, 3]);
        ext.apply_voltages(0, &win, &f).unwrap();
        assert_eq!(f.volt.get(2, 2, 2, 2), 3.0);
        assert_eq!(f.volt.get(2, 6, 6, 6), 0.0);
    }

    #[test]
    fn delayed_source_stays_silent_until_its_start() {
        let ext =
            ExcitationExt::volt_point(Signal::impulse(), [1, 1, 1], 0, 1.0, 7);
        let f = FieldPair::new(Grid3::new(4, 4, 4)).unwrap();
        let win = Window::new([0, 0, 0], [3, 3, 3]);
        ext.apply_voltages(3, &win, &f).unwrap();
        assert_eq!(f.volt.get(0, 1, 1, 1), 0.0);
        ext.apply_voltages(7, &win, &f).unwrap();
        assert_eq!(f.volt.get(0, 1, 1, 1), 1.0);
    }
}
