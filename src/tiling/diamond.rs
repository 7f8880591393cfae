// src/tiling/diamond.rs
//
// Per-axis 1D construction for the diamond (time-skewed) schedule.
//
// The axis is split into blocks of `block` cells (the last block absorbs
// the remainder). Each block spawns a "mountain" tile whose range loses
// one cell per timestep from every interior flank; every interior block
// seam spawns a "valley" tile that grows around the seam by one cell per
// timestep. Flanks on the domain boundary do not shrink: there the
// boundary rule, not a neighbour value, satisfies the dependency.
//
// Dependency structure (mountains execute first, valleys second):
// a mountain's shrinking range only ever reads cells it wrote itself one
// timestep earlier, or pre-batch values at its first step; a valley's
// range at timestep `t` reads seam cells whose last mountain write was
// exactly at `t - 1`, because the mountain flank retreats at the same
// rate the valley advances.

/// Per-timestep inclusive ranges of one tile on one axis. A range with
/// `lo > hi` is empty (valleys at `t = 0` have an empty voltage range).
#[derive(Debug, Clone)]
pub struct AxisRanges {
    pub volt: Vec<(usize, usize)>,
    pub curr: Vec<(usize, usize)>,
}

/// The 1D tiling of one axis: mountain tiles (phase 0) and valley tiles
/// (phase 1). An axis covered by a single block has no valleys and its
/// mountain ranges never shrink, which degenerates to rectangular tiling
/// on that axis.
#[derive(Debug, Clone)]
pub struct AxisTiling {
    pub n: usize,
    pub mountains: Vec<AxisRanges>,
    pub valleys: Vec<AxisRanges>,
}

/// Number of blocks the axis decomposes into.
pub fn block_count(n: usize, block: usize) -> usize {
    if block >= n {
        1
    } else {
        n / block
    }
}

/// Build the 1D diamond tiling of an axis of `n` cells with block width
/// `block` over `h` timesteps per pass.
///
/// Caller must ensure `block >= 2 * h` whenever the axis has more than one
/// block; narrower blocks would make mountain ranges invert before the
/// pass ends.
pub fn diamond_axis(n: usize, block: usize, h: usize) -> AxisTiling {
    assert!(n >= 2, "axis too small");
    let nb = block_count(n, block);

    let mut mountains = Vec::with_capacity(nb);
    for b in 0..nb {
        let first = b == 0;
        let last = b == nb - 1;
        let lo0 = b * block;
        let hi0 = if last { n - 1 } else { (b + 1) * block - 1 };

        let mut volt = Vec::with_capacity(h);
        let mut curr = Vec::with_capacity(h);
        for t in 0..h {
            let lo = if first { 0 } else { lo0 + t };
            let v_hi = if last { n - 1 } else { hi0 - t };
            let c_hi = if last { n - 2 } else { hi0 - 1 - t };
            volt.push((lo, v_hi));
            curr.push((lo, c_hi));
        }
        mountains.push(AxisRanges { volt, curr });
    }

    let mut valleys = Vec::with_capacity(nb.saturating_sub(1));
    for b in 1..nb {
        let seam = b * block;
        let mut volt = Vec::with_capacity(h);
        let mut curr = Vec::with_capacity(h);
        for t in 0..h {
            // empty at t = 0: the mountains covered the whole axis there
            volt.push((seam - t, seam + t - 1));
            curr.push((seam - t - 1, seam + t - 1));
        }
        valleys.push(AxisRanges { volt, curr });
    }

    AxisTiling { n, mountains, valleys }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coverage(n: usize, ranges: &[(usize, usize)]) -> Vec<u32> {
        let mut hits = vec![0u32; n];
        for &(lo, hi) in ranges {
            if lo > hi {
                continue;
            }
            for x in lo..=hi {
                hits[x] += 1;
            }
        }
        hits
    }

    #[test]
    fn mountains_and_valleys_tile_the_axis_exactly_once() {
        let n = 43;
        let block = 10;
        let h = 5;
        let ax = diamond_axis(n, block, h);
        assert_eq!(ax.mountains.len(), 4);
        assert_eq!(ax.valleys.len(), 3);

        for t in 0..h {
            let volt: Vec<_> = ax
                .mountains
                .iter()
                .chain(ax.valleys.iter())
                .map(|r| r.volt[t])
                .collect();
            let hits = coverage(n, &volt);
            assert!(
                hits.iter().all(|&c| c == 1),
                "voltage coverage at t={} is not exact: {:?}",
                t,
                hits
            );

            let curr: Vec<_> = ax
                .mountains
                .iter()
                .chain(ax.valleys.iter())
                .map(|r| r.curr[t])
                .collect();
            let hits = coverage(n, &curr);
            assert!(
                hits[..n - 1].iter().all(|&c| c == 1),
                "current coverage at t={} is not exact: {:?}",
                t,
                hits
            );
            assert_eq!(hits[n - 1], 0, "current row n-1 must stay suppressed");
        }
    }

    #[test]
    fn valley_reads_are_covered_by_mountain_writes_one_step_earlier() {
        // a valley voltage range at t must sit inside the union of the
        // previous timestep's current footprints (its own plus the
        // adjacent mountains')
        let n = 40;
        let block = 10;
        let h = 5;
        let ax = diamond_axis(n, block, h);
        for v in &ax.valleys {
            for t in 1..h {
                let (vl, vh) = v.volt[t];
                // reads curr at vl-1 .. vh
                let mut need: Vec<usize> = (vl - 1..=vh).collect();
                need.retain(|&x| {
                    let own = v.curr[t - 1];
                    let in_own = own.0 <= x && x <= own.1;
                    let in_mnt = ax
                        .mountains
                        .iter()
                        .any(|m| m.curr[t - 1].0 <= x && x <= m.curr[t - 1].1);
                    !(in_own || in_mnt)
                });
                assert!(need.is_empty(), "unsatisfied reads at t={}: {:?}", t, need);
            }
        }
    }

    #[test]
    fn single_block_axis_never_skews() {
        let ax = diamond_axis(8, 8, 5);
        assert_eq!(ax.mountains.len(), 1);
        assert!(ax.valleys.is_empty());
        for t in 0..5 {
            assert_eq!(ax.mountains[0].volt[t], (0, 7));
            assert_eq!(ax.mountains[0].curr[t], (0, 6));
        }
    }

    #[test]
    fn last_block_absorbs_the_remainder() {
        let ax = diamond_axis(25, 10, 3);
        assert_eq!(ax.mountains.len(), 2);
        // second block spans [10, 24]
        assert_eq!(ax.mountains[1].volt[0], (10, 24));
        assert_eq!(ax.mountains[1].volt[2], (12, 24));
    }
}
