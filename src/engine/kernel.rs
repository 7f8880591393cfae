// src/engine/kernel.rs
//
// The staggered-grid Yee update over one tile window, vectorized four z
// cells at a time. Reads reach one cell outside the window; writes stay
// strictly inside it, which is what makes tiles of one phase freely
// parallel.
//
// Boundary rules baked into the kernel:
// - at i = 0 / j = 0 the "-1" neighbour index is replaced by the cell's
//   own index, cancelling that curl pair (PEC);
// - at k = 0 the "-1" term is a lane-shifted copy of the last z slot with
//   lane 0 masked to zero;
// - reads past the last z slot use the mirrored lane shift of slot 0;
// - the x/y high faces are excluded from the current window by the
//   planner, and the z high row is frozen through its coefficients.

use crate::coeffs::CoeffSet;
use crate::field::FieldPair;
use crate::tiling::Window;

/// `volt <- volt * vv + vi * curl(curr)` over the window's cells.
pub fn update_voltages(f: &FieldPair, op: &CoeffSet, win: &Window) {
    if win.is_empty() {
        return;
    }
    let g = *f.volt.grid();
    debug_assert!(
        win.start[2] == 0 && win.stop[2] == g.nz - 1,
        "partial z tiling is unsupported"
    );
    let nv = g.nv;
    let volt = &f.volt;
    let curr = &f.curr;

    for i in win.start[0]..=win.stop[0] {
        let im = i.max(1) - 1;
        for j in win.start[1]..=win.stop[1] {
            let jm = j.max(1) - 1;

            for zv in 1..nv {
                let vx = volt.vec(0, i, j, zv) * op.vv.vec(0, i, j, zv)
                    + op.vi.vec(0, i, j, zv)
                        * (curr.vec(2, i, j, zv) - curr.vec(2, i, jm, zv) - curr.vec(1, i, j, zv)
                            + curr.vec(1, i, j, zv - 1));
                volt.set_vec(0, i, j, zv, vx);

                let vy = volt.vec(1, i, j, zv) * op.vv.vec(1, i, j, zv)
                    + op.vi.vec(1, i, j, zv)
                        * (curr.vec(0, i, j, zv) - curr.vec(0, i, j, zv - 1) - curr.vec(2, i, j, zv)
                            + curr.vec(2, im, j, zv));
                volt.set_vec(1, i, j, zv, vy);

                let vz = volt.vec(2, i, j, zv) * op.vv.vec(2, i, j, zv)
                    + op.vi.vec(2, i, j, zv)
                        * (curr.vec(1, i, j, zv) - curr.vec(1, im, j, zv) - curr.vec(0, i, j, zv)
                            + curr.vec(0, i, jm, zv));
                volt.set_vec(2, i, j, zv, vz);
            }

            // zv = 0: the k-1 neighbour crosses the lane seam
            let seam_y = curr.vec(1, i, j, nv - 1).lane_shift_up();
            let vx = volt.vec(0, i, j, 0) * op.vv.vec(0, i, j, 0)
                + op.vi.vec(0, i, j, 0)
                    * (curr.vec(2, i, j, 0) - curr.vec(2, i, jm, 0) - curr.vec(1, i, j, 0)
                        + seam_y);
            volt.set_vec(0, i, j, 0, vx);

            let seam_x = curr.vec(0, i, j, nv - 1).lane_shift_up();
            let vy = volt.vec(1, i, j, 0) * op.vv.vec(1, i, j, 0)
                + op.vi.vec(1, i, j, 0)
                    * (curr.vec(0, i, j, 0) - seam_x - curr.vec(2, i, j, 0)
                        + curr.vec(2, im, j, 0));
            volt.set_vec(1, i, j, 0, vy);

            let vz = volt.vec(2, i, j, 0) * op.vv.vec(2, i, j, 0)
                + op.vi.vec(2, i, j, 0)
                    * (curr.vec(1, i, j, 0) - curr.vec(1, im, j, 0) - curr.vec(0, i, j, 0)
                        + curr.vec(0, i, jm, 0));
            volt.set_vec(2, i, j, 0, vz);
        }
    }
}

/// `curr <- curr * ii + iv * curl(volt)` over the window's cells, with the
/// dual sign pattern and forward neighbours.
pub fn update_currents(f: &FieldPair, op: &CoeffSet, win: &Window) {
    if win.is_empty() {
        return;
    }
    let g = *f.curr.grid();
    debug_assert!(
        win.start[2] == 0 && win.stop[2] == g.nz - 2,
        "partial z tiling is unsupported"
    );
    debug_assert!(win.stop[0] <= g.nx - 2 && win.stop[1] <= g.ny - 2);
    let nv = g.nv;
    let volt = &f.volt;
    let curr = &f.curr;

    for i in win.start[0]..=win.stop[0] {
        let ip = i + 1;
        for j in win.start[1]..=win.stop[1] {
            let jp = j + 1;

            for zv in 0..nv - 1 {
                let cx = curr.vec(0, i, j, zv) * op.ii.vec(0, i, j, zv)
                    + op.iv.vec(0, i, j, zv)
                        * (volt.vec(2, i, j, zv) - volt.vec(2, i, jp, zv) - volt.vec(1, i, j, zv)
                            + volt.vec(1, i, j, zv + 1));
                curr.set_vec(0, i, j, zv, cx);

                let cy = curr.vec(1, i, j, zv) * op.ii.vec(1, i, j, zv)
                    + op.iv.vec(1, i, j, zv)
                        * (volt.vec(0, i, j, zv) - volt.vec(0, i, j, zv + 1) - volt.vec(2, i, j, zv)
                            + volt.vec(2, ip, j, zv));
                curr.set_vec(1, i, j, zv, cy);

                let cz = curr.vec(2, i, j, zv) * op.ii.vec(2, i, j, zv)
                    + op.iv.vec(2, i, j, zv)
                        * (volt.vec(1, i, j, zv) - volt.vec(1, ip, j, zv) - volt.vec(0, i, j, zv)
                            + volt.vec(0, i, jp, zv));
                curr.set_vec(2, i, j, zv, cz);
            }

            // zv = nv - 1: the k+1 neighbour crosses the lane seam
            let last = nv - 1;
            let seam_y = volt.vec(1, i, j, 0).lane_shift_down();
            let cx = curr.vec(0, i, j, last) * op.ii.vec(0, i, j, last)
                + op.iv.vec(0, i, j, last)
                    * (volt.vec(2, i, j, last) - volt.vec(2, i, jp, last) - volt.vec(1, i, j, last)
                        + seam_y);
            curr.set_vec(0, i, j, last, cx);

            let seam_x = volt.vec(0, i, j, 0).lane_shift_down();
            let cy = curr.vec(1, i, j, last) * op.ii.vec(1, i, j, last)
                + op.iv.vec(1, i, j, last)
                    * (volt.vec(0, i, j, last) - seam_x - volt.vec(2, i, j, last)
                        + volt.vec(2, ip, j, last));
            curr.set_vec(1, i, j, last, cy);

            let cz = curr.vec(2, i, j, last) * op.ii.vec(2, i, j, last)
                + op.iv.vec(2, i, j, last)
                    * (volt.vec(1, i, j, last) - volt.vec(1, ip, j, last) - volt.vec(0, i, j, last)
                        + volt.vec(0, i, jp, last));
            curr.set_vec(2, i, j, last, cz);
        }
    }
}
