// src/extension/mod.rs
//
// Pluggable per-cell hooks that run in phase with the core update. Each
// extension declares a priority (used to linearize hook ordering) and
// whether it supports the tiled schedules; its private state is owned by
// the extension itself and touched only through the hook calls.

pub mod dispersive;
pub mod excitation;
pub mod upml;

use std::collections::HashMap;

use crate::error::Result;
use crate::field::FieldPair;
use crate::tiling::{StepWindow, Window};

/// Absorbing boundary runs before everything else.
pub const PRIO_UPML: i32 = 5000;
/// Sources apply after the material extensions touched the fields.
pub const PRIO_EXCITATION: i32 = 3000;
pub const PRIO_DISPERSIVE: i32 = 1000;

/// Hook surface of one extension.
///
/// Per timestep per tile the engine calls, in order: `pre_voltage_update`
/// (highest priority last), the voltage stencil, `post_voltage_update` and
/// `apply_voltages` (highest priority first), then the mirrored current
/// sequence. Voltage-side hooks receive the tile's voltage window,
/// current-side hooks the current window.
///
/// When `supports_tiling` is true a hook may be invoked many times per
/// timestep, each restricted to one tile; the invocations over a timestep
/// cover the extension's claim region exactly once. Extensions that do not
/// support tiling force the engine onto the rectangular schedule with
/// whole-domain hook invocations.
pub trait Extension: Send + Sync {
    fn name(&self) -> &'static str;
    fn priority(&self) -> i32;
    fn supports_tiling(&self) -> bool;

    /// Called once at engine construction with every step window of both
    /// schedules (plus the whole-domain window), so the extension can
    /// index its claimed cells per tile.
    fn initialize_tiling(&mut self, _steps: &[StepWindow]) {}

    /// Zero all per-extension run state (flux, ADE histories).
    fn reset(&self) {}

    fn pre_voltage_update(&self, _ts: usize, _win: &Window, _f: &FieldPair) -> Result<()> {
        Ok(())
    }
    fn post_voltage_update(&self, _ts: usize, _win: &Window, _f: &FieldPair) -> Result<()> {
        Ok(())
    }
    fn apply_voltages(&self, _ts: usize, _win: &Window, _f: &FieldPair) -> Result<()> {
        Ok(())
    }

    fn pre_current_update(&self, _ts: usize, _win: &Window, _f: &FieldPair) -> Result<()> {
        Ok(())
    }
    fn post_current_update(&self, _ts: usize, _win: &Window, _f: &FieldPair) -> Result<()> {
        Ok(())
    }
    fn apply_currents(&self, _ts: usize, _win: &Window, _f: &FieldPair) -> Result<()> {
        Ok(())
    }
}

/// Highest priority first; ties keep registration order.
pub fn sort_by_priority(exts: &mut [Box<dyn Extension>]) {
    exts.sort_by_key(|e| std::cmp::Reverse(e.priority()));
}

/// Key of a tile-local cell list: the ADE order (0 for extensions without
/// one) and the window bounds, compared componentwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub order: usize,
    pub start: [usize; 3],
    pub stop: [usize; 3],
}

impl TileKey {
    pub fn new(order: usize, win: &Window) -> Self {
        Self {
            order,
            start: win.start,
            stop: win.stop,
        }
    }
}

/// Per-tile index lists, built once at schedule time, read-only afterwards.
pub type TileMap = HashMap<TileKey, Vec<u32>>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(&'static str, i32);
    impl Extension for Dummy {
        fn name(&self) -> &'static str {
            self.0
        }
        fn priority(&self) -> i32 {
            self.1
        }
        fn supports_tiling(&self) -> bool {
            true
        }
    }

    #[test]
    fn registry_sorts_highest_priority_first() {
        let mut exts: Vec<Box<dyn Extension>> = vec![
            Box::new(Dummy("disp", PRIO_DISPERSIVE)),
            Box::new(Dummy("upml", PRIO_UPML)),
            Box::new(Dummy("exc", PRIO_EXCITATION)),
        ];
        sort_by_priority(&mut exts);
        let names: Vec<_> = exts.iter().map(|e| e.name()).collect();
        assert_eq!(names, ["upml", "exc", "disp"]);
    }

    #[test]
    fn tile_keys_compare_componentwise() {
        let w1 = Window::new([0, 0, 0], [9, 9, 9]);
        let w2 = Window::new([0, 0, 0], [9, 9, 8]);
        assert_eq!(TileKey::new(1, &w1), TileKey::new(1, &w1));
        assert_ne!(TileKey::new(1, &w1), TileKey::new(2, &w1));
        assert_ne!(TileKey::new(1, &w1), TileKey::new(1, &w2));
    }
}
