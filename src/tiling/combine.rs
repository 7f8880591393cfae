// src/tiling/combine.rs
//
// Cartesian combination of three 1D axis tilings into the 3D diamond
// schedule. Phases are the product of per-axis phase kinds (mountain or
// valley), ordered by how many valley axes they contain, so every phase
// only reads values produced by earlier phases or by itself.

use super::diamond::AxisTiling;
use super::{Phase, Schedule, StepWindow, Tile, Window};

/// All eight phase kinds, `false` = mountain, `true` = valley, sorted by
/// valley count. Kinds whose valley axes have no tiles are skipped by the
/// combiner (single-block axes have no valleys).
const PHASE_KINDS: [[bool; 3]; 8] = [
    [false, false, false],
    [true, false, false],
    [false, true, false],
    [false, false, true],
    [true, true, false],
    [true, false, true],
    [false, true, true],
    [true, true, true],
];

/// Combine per-axis tilings into the 3D schedule advancing `h` timesteps
/// per pass.
pub fn combine_3d(axes: &[AxisTiling; 3], h: usize) -> Schedule {
    let mut phases = Vec::new();

    for kind in PHASE_KINDS {
        let lists: Vec<&[super::diamond::AxisRanges]> = (0..3)
            .map(|a| {
                if kind[a] {
                    axes[a].valleys.as_slice()
                } else {
                    axes[a].mountains.as_slice()
                }
            })
            .collect();
        if lists.iter().any(|l| l.is_empty()) {
            continue;
        }

        let mut phase = Phase::default();
        for rx in lists[0] {
            for ry in lists[1] {
                for rz in lists[2] {
                    let mut steps = Vec::with_capacity(h);
                    for t in 0..h {
                        let volt = Window::new(
                            [rx.volt[t].0, ry.volt[t].0, rz.volt[t].0],
                            [rx.volt[t].1, ry.volt[t].1, rz.volt[t].1],
                        );
                        let curr = Window::new(
                            [rx.curr[t].0, ry.curr[t].0, rz.curr[t].0],
                            [rx.curr[t].1, ry.curr[t].1, rz.curr[t].1],
                        );
                        if volt.is_empty() && curr.is_empty() {
                            continue;
                        }
                        steps.push(StepWindow {
                            t_offset: t,
                            volt,
                            curr,
                        });
                    }
                    if !steps.is_empty() {
                        phase.tiles.push(Tile { steps });
                    }
                }
            }
        }
        if !phase.tiles.is_empty() {
            phases.push(phase);
        }
    }

    Schedule {
        phases,
        timesteps_per_pass: h,
    }
}
