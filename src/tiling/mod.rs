// src/tiling/mod.rs
//
// Tile windows, phases and schedules for the space/time decomposition of
// the update loop. Two schedules coexist: a diamond (time-skewed) schedule
// advancing `h` timesteps per traversal, and a rectangular fallback that
// advances exactly one.

pub mod combine;
pub mod diamond;
pub mod rect;

use crate::grid::Grid3;

/// Inclusive 3D index range. Empty whenever `start[a] > stop[a]` on any
/// axis (valley tiles legitimately produce empty voltage windows at their
/// first timestep).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub start: [usize; 3],
    pub stop: [usize; 3],
}

impl Window {
    pub fn new(start: [usize; 3], stop: [usize; 3]) -> Self {
        Self { start, stop }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        (0..3).any(|a| self.start[a] > self.stop[a])
    }

    #[inline]
    pub fn contains(&self, i: usize, j: usize, k: usize) -> bool {
        let p = [i, j, k];
        (0..3).all(|a| self.start[a] <= p[a] && p[a] <= self.stop[a])
    }

    /// Component-wise intersection, `None` if disjoint or empty.
    pub fn intersect(&self, other: &Window) -> Option<Window> {
        let mut start = [0; 3];
        let mut stop = [0; 3];
        for a in 0..3 {
            start[a] = self.start[a].max(other.start[a]);
            stop[a] = self.stop[a].min(other.stop[a]);
            if start[a] > stop[a] {
                return None;
            }
        }
        Some(Window { start, stop })
    }

    pub fn n_cells(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        (0..3).map(|a| self.stop[a] - self.start[a] + 1).product()
    }
}

/// Where and when one stencil application happens: the voltage range, the
/// current range, and the whole-timestep offset relative to the batch base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepWindow {
    pub t_offset: usize,
    pub volt: Window,
    pub curr: Window,
}

/// One geometric tile: its per-timestep windows, executed in order on a
/// single worker so each timestep sees the tile's previous one.
#[derive(Debug, Clone)]
pub struct Tile {
    pub steps: Vec<StepWindow>,
}

/// Tiles that may run concurrently; the iterate barrier separates phases.
#[derive(Debug, Clone, Default)]
pub struct Phase {
    pub tiles: Vec<Tile>,
}

/// An ordered list of phases advancing `timesteps_per_pass` timesteps.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub phases: Vec<Phase>,
    pub timesteps_per_pass: usize,
}

impl Schedule {
    /// All step windows of the schedule, flattened. Used to key the
    /// extensions' tile index maps.
    pub fn step_windows(&self) -> Vec<StepWindow> {
        self.phases
            .iter()
            .flat_map(|p| p.tiles.iter())
            .flat_map(|t| t.steps.iter().copied())
            .collect()
    }

    pub fn n_tiles(&self) -> usize {
        self.phases.iter().map(|p| p.tiles.len()).sum()
    }
}

/// Full-domain voltage window.
pub fn full_volt_window(grid: &Grid3) -> Window {
    Window::new([0, 0, 0], [grid.nx - 1, grid.ny - 1, grid.nz - 1])
}

/// Full-domain current window (high faces suppressed on x/y; the z-axis
/// PMC row is coefficient-encoded, so the z range stays full-vector).
pub fn full_curr_window(grid: &Grid3) -> Window {
    Window::new([0, 0, 0], [grid.nx - 2, grid.ny - 2, grid.nz - 2])
}

/// The whole-domain step used by the rectangular-exclusive hook path and
/// registered in every extension's tile map.
pub fn full_domain_step(grid: &Grid3) -> StepWindow {
    StepWindow {
        t_offset: 0,
        volt: full_volt_window(grid),
        curr: full_curr_window(grid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_contains_nothing() {
        let w = Window::new([5, 0, 0], [4, 9, 9]);
        assert!(w.is_empty());
        assert!(!w.contains(4, 0, 0));
        assert_eq!(w.n_cells(), 0);
    }

    #[test]
    fn intersect_clips_to_overlap() {
        let a = Window::new([0, 0, 0], [9, 9, 9]);
        let b = Window::new([5, 5, 5], [15, 15, 15]);
        let c = a.intersect(&b).unwrap();
        assert_eq!(c, Window::new([5, 5, 5], [9, 9, 9]));
        let d = Window::new([20, 0, 0], [25, 9, 9]);
        assert!(a.intersect(&d).is_none());
    }
}
