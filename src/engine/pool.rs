// src/engine/pool.rs
//
// Fixed worker pool, synchronized through three barriers:
//
//   start   (P + 1 parties)  driver releases the workers into a batch
//   iterate (P parties)      workers rendezvous between phases
//   stop    (P + 1 parties)  workers hand the finished batch back
//
// Workers suspend only at barriers; no lock is held while a tile
// computes. The stop flag is a relaxed atomic observed right after the
// start barrier. A hook failure parks the error in the fault slot; the
// remaining barrier protocol still runs so the pool never deadlocks, and
// the driver surfaces the error after the stop barrier.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread::JoinHandle;

use log::trace;

use crate::error::{FdtdError, Result};
use crate::tiling::{full_curr_window, full_volt_window, StepWindow};

use super::kernel;
use super::EngineState;

pub(crate) struct PoolSync {
    pub start: Barrier,
    pub iterate: Barrier,
    pub stop: Barrier,
    pub stop_flag: AtomicBool,
    pub iter_ts: AtomicUsize,
    pub faulted: AtomicBool,
    pub fault: Mutex<Option<FdtdError>>,
}

impl PoolSync {
    fn new(nthreads: usize) -> Self {
        Self {
            start: Barrier::new(nthreads + 1),
            iterate: Barrier::new(nthreads),
            stop: Barrier::new(nthreads + 1),
            stop_flag: AtomicBool::new(false),
            iter_ts: AtomicUsize::new(0),
            faulted: AtomicBool::new(false),
            fault: Mutex::new(None),
        }
    }

    fn record_fault(&self, err: FdtdError) {
        let mut slot = self.fault.lock().unwrap();
        if slot.is_none() {
            *slot = Some(err);
        }
        self.faulted.store(true, Ordering::Release);
    }

    #[inline]
    fn ok(&self) -> bool {
        !self.faulted.load(Ordering::Acquire)
    }
}

pub(crate) fn spawn_pool(
    state: &Arc<EngineState>,
    nthreads: usize,
) -> (Arc<PoolSync>, Vec<JoinHandle<()>>) {
    let sync = Arc::new(PoolSync::new(nthreads));
    let workers = (0..nthreads)
        .map(|tid| {
            let state = Arc::clone(state);
            let sync = Arc::clone(&sync);
            std::thread::Builder::new()
                .name(format!("fdtd-worker-{tid}"))
                .spawn(move || worker_main(state, sync, tid, nthreads))
                .expect("spawning worker thread")
        })
        .collect();
    (sync, workers)
}

/// Flush denormals to zero for this thread; the UPML tails otherwise decay
/// through the denormal range at a large per-cell cost.
#[cfg(target_arch = "x86_64")]
fn configure_fp_environment() {
    // SAFETY: MXCSR is thread-local state; setting FTZ | DAZ only affects
    // rounding of this worker's arithmetic.
    unsafe {
        use std::arch::x86_64::{_mm_getcsr, _mm_setcsr};
        _mm_setcsr(_mm_getcsr() | 0x8040);
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn configure_fp_environment() {}

fn worker_main(state: Arc<EngineState>, sync: Arc<PoolSync>, tid: usize, nthreads: usize) {
    configure_fp_environment();

    loop {
        sync.start.wait();
        if sync.stop_flag.load(Ordering::Relaxed) {
            return;
        }

        let iter_ts = sync.iter_ts.load(Ordering::Relaxed);
        let mut ts = state.num_ts.load(Ordering::Relaxed);

        let (batches, leftover) = match &state.diamond {
            Some(d) => (iter_ts / d.timesteps_per_pass, iter_ts % d.timesteps_per_pass),
            None => (0, iter_ts),
        };

        if let Some(diamond) = &state.diamond {
            for _ in 0..batches {
                for phase in &diamond.phases {
                    if sync.ok() {
                        for (n, tile) in phase.tiles.iter().enumerate() {
                            if n % nthreads != tid {
                                continue;
                            }
                            for step in &tile.steps {
                                run_tile_step(&state, &sync, ts + step.t_offset, step);
                            }
                        }
                    }
                    sync.iterate.wait();
                }
                ts += diamond.timesteps_per_pass;
            }
        }

        for _ in 0..leftover {
            if state.exclusive_hooks {
                exclusive_timestep(&state, &sync, ts, tid, nthreads);
            } else {
                rect_timestep(&state, &sync, ts, tid, nthreads);
            }
            ts += 1;
        }

        if tid == 0 {
            // only the first worker advances the global counter
            state.num_ts.store(ts, Ordering::Relaxed);
            trace!("pool advanced to timestep {ts}");
        }
        sync.stop.wait();
    }
}

/// One whole timestep of one tile: voltage side, then current side, with
/// the extension hooks in their contract order.
fn run_tile_step(state: &EngineState, sync: &PoolSync, ts: usize, step: &StepWindow) {
    if let Err(e) = tile_step_inner(state, ts, step) {
        sync.record_fault(e);
    }
}

fn tile_step_inner(state: &EngineState, ts: usize, step: &StepWindow) -> Result<()> {
    let f = &state.fields;

    for ext in state.exts.iter().rev() {
        ext.pre_voltage_update(ts, &step.volt, f)?;
    }
    kernel::update_voltages(f, &state.coeffs, &step.volt);
    for ext in state.exts.iter() {
        ext.post_voltage_update(ts, &step.volt, f)?;
    }
    for ext in state.exts.iter() {
        ext.apply_voltages(ts, &step.volt, f)?;
    }

    for ext in state.exts.iter().rev() {
        ext.pre_current_update(ts, &step.curr, f)?;
    }
    kernel::update_currents(f, &state.coeffs, &step.curr);
    for ext in state.exts.iter() {
        ext.post_current_update(ts, &step.curr, f)?;
    }
    for ext in state.exts.iter() {
        ext.apply_currents(ts, &step.curr, f)?;
    }
    Ok(())
}

/// One rectangular timestep: all voltage tiles, barrier, all current
/// tiles, barrier. Hooks run per tile (every extension is tileable here).
fn rect_timestep(state: &EngineState, sync: &PoolSync, ts: usize, tid: usize, nthreads: usize) {
    let f = &state.fields;
    let tiles = &state.rect.phases[0].tiles;

    if sync.ok() {
        for (n, tile) in tiles.iter().enumerate() {
            if n % nthreads != tid {
                continue;
            }
            let step = &tile.steps[0];
            let r = (|| -> Result<()> {
                for ext in state.exts.iter().rev() {
                    ext.pre_voltage_update(ts, &step.volt, f)?;
                }
                kernel::update_voltages(f, &state.coeffs, &step.volt);
                for ext in state.exts.iter() {
                    ext.post_voltage_update(ts, &step.volt, f)?;
                }
                for ext in state.exts.iter() {
                    ext.apply_voltages(ts, &step.volt, f)?;
                }
                Ok(())
            })();
            if let Err(e) = r {
                sync.record_fault(e);
            }
        }
    }
    sync.iterate.wait();

    if sync.ok() {
        for (n, tile) in tiles.iter().enumerate() {
            if n % nthreads != tid {
                continue;
            }
            let step = &tile.steps[0];
            let r = (|| -> Result<()> {
                for ext in state.exts.iter().rev() {
                    ext.pre_current_update(ts, &step.curr, f)?;
                }
                kernel::update_currents(f, &state.coeffs, &step.curr);
                for ext in state.exts.iter() {
                    ext.post_current_update(ts, &step.curr, f)?;
                }
                for ext in state.exts.iter() {
                    ext.apply_currents(ts, &step.curr, f)?;
                }
                Ok(())
            })();
            if let Err(e) = r {
                sync.record_fault(e);
            }
        }
    }
    sync.iterate.wait();
}

/// Rectangular timestep for registries holding an extension that cannot
/// be tiled: every hook stage runs once over the whole domain on worker
/// 0 (the "exclusive claim"), with barriers fencing it from the parallel
/// stencil stages.
fn exclusive_timestep(state: &EngineState, sync: &PoolSync, ts: usize, tid: usize, nthreads: usize) {
    let f = &state.fields;
    let grid = &state.grid;
    let volt_win = full_volt_window(grid);
    let curr_win = full_curr_window(grid);
    let tiles = &state.rect.phases[0].tiles;

    let hook_stage = |stage: &dyn Fn() -> Result<()>| {
        if tid == 0 && sync.ok() {
            if let Err(e) = stage() {
                sync.record_fault(e);
            }
        }
        sync.iterate.wait();
    };

    hook_stage(&|| {
        for ext in state.exts.iter().rev() {
            ext.pre_voltage_update(ts, &volt_win, f)?;
        }
        Ok(())
    });

    if sync.ok() {
        for (n, tile) in tiles.iter().enumerate() {
            if n % nthreads == tid {
                kernel::update_voltages(f, &state.coeffs, &tile.steps[0].volt);
            }
        }
    }
    sync.iterate.wait();

    hook_stage(&|| {
        for ext in state.exts.iter() {
            ext.post_voltage_update(ts, &volt_win, f)?;
        }
        for ext in state.exts.iter() {
            ext.apply_voltages(ts, &volt_win, f)?;
        }
        Ok(())
    });

    hook_stage(&|| {
        for ext in state.exts.iter().rev() {
            ext.pre_current_update(ts, &curr_win, f)?;
        }
        Ok(())
    });

    if sync.ok() {
        for (n, tile) in tiles.iter().enumerate() {
            if n % nthreads == tid {
                kernel::update_currents(f, &state.coeffs, &tile.steps[0].curr);
            }
        }
    }
    sync.iterate.wait();

    hook_stage(&|| {
        for ext in state.exts.iter() {
            ext.post_current_update(ts, &curr_win, f)?;
        }
        for ext in state.exts.iter() {
            ext.apply_currents(ts, &curr_win, f)?;
        }
        Ok(())
    });
}
