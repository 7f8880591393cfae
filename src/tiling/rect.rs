// src/tiling/rect.rs
//
// Rectangular fallback: the same spatial block decomposition as the
// diamond schedule but with no temporal skew. One traversal advances a
// single timestep; the worker loop splits it into a voltage half-phase
// and a current half-phase separated by the iterate barrier, so neighbour
// reads across block seams always see the previous half-step.

use super::diamond::block_count;
use super::{Phase, Schedule, StepWindow, Tile, Window};
use crate::grid::Grid3;

/// Build the rectangular (single-timestep) schedule.
pub fn rect_schedule(grid: &Grid3, block: [usize; 3]) -> Schedule {
    let n = [grid.nx, grid.ny, grid.nz];
    let nb: Vec<usize> = (0..3).map(|a| block_count(n[a], block[a])).collect();

    let mut tiles = Vec::with_capacity(nb[0] * nb[1] * nb[2]);
    for bx in 0..nb[0] {
        for by in 0..nb[1] {
            for bz in 0..nb[2] {
                let b = [bx, by, bz];
                let mut start = [0usize; 3];
                let mut v_stop = [0usize; 3];
                let mut c_stop = [0usize; 3];
                for a in 0..3 {
                    start[a] = b[a] * block[a];
                    v_stop[a] = if b[a] == nb[a] - 1 {
                        n[a] - 1
                    } else {
                        (b[a] + 1) * block[a] - 1
                    };
                    c_stop[a] = v_stop[a].min(n[a] - 2);
                }
                tiles.push(Tile {
                    steps: vec![StepWindow {
                        t_offset: 0,
                        volt: Window::new(start, v_stop),
                        curr: Window::new(start, c_stop),
                    }],
                });
            }
        }
    }

    Schedule {
        phases: vec![Phase { tiles }],
        timesteps_per_pass: 1,
    }
}
