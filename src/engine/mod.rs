// src/engine/mod.rs
//
// The driver: owns the fields, coefficients, extension registry and both
// schedules, runs the barrier-synchronized worker pool, and exposes the
// public iterate/probe/reset/shutdown surface.

pub mod kernel;
mod pool;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use log::{debug, info};

use crate::coeffs::CoeffSet;
use crate::error::{FdtdError, Result};
use crate::extension::{sort_by_priority, Extension};
use crate::field::FieldPair;
use crate::grid::Grid3;
use crate::tiling::combine::combine_3d;
use crate::tiling::diamond::{block_count, diamond_axis};
use crate::tiling::rect::rect_schedule;
use crate::tiling::{full_domain_step, Schedule, StepWindow};

use pool::{spawn_pool, PoolSync};

/// Engine configuration.
///
/// `threads = 0` enables auto-tuning: the pool starts at one worker and
/// grows while throughput improves, stepping back once on the first
/// regression and then holding. `block_size` entries of 0 pick the
/// defaults (10 cells on x/y, the full axis on z; the z axis cannot be
/// tiled).
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub threads: usize,
    /// Timesteps advanced per diamond pass (`H`).
    pub block_timesteps: usize,
    /// Per-axis block width in cells (`B`).
    pub block_size: [usize; 3],
    /// Log volume knob recorded in run configs; the library itself logs
    /// through the `log` facade.
    pub verbose: u8,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            threads: 0,
            block_timesteps: 5,
            block_size: [0, 0, 0],
            verbose: 0,
        }
    }
}

pub(crate) struct EngineState {
    pub grid: Grid3,
    pub fields: FieldPair,
    pub coeffs: CoeffSet,
    pub exts: Vec<Box<dyn Extension>>,
    pub diamond: Option<Schedule>,
    pub rect: Schedule,
    pub exclusive_hooks: bool,
    pub num_ts: AtomicUsize,
}

struct AutoTune {
    enabled: bool,
    frozen: bool,
    last_speed: f64,
}

/// Driver handle over the running worker pool.
pub struct FdtdEngine {
    state: Arc<EngineState>,
    sync: Arc<PoolSync>,
    workers: Vec<JoinHandle<()>>,
    nthreads: usize,
    max_threads: usize,
    autotune: AutoTune,
}

impl FdtdEngine {
    /// Validate the configuration, plan both schedules, bind the
    /// extensions to them and spawn the pool.
    pub fn new(
        coeffs: CoeffSet,
        mut extensions: Vec<Box<dyn Extension>>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let grid = *coeffs.grid();
        if grid.nx < 2 || grid.ny < 2 || grid.nz < 2 {
            return Err(FdtdError::Config(format!(
                "lattice {}x{}x{} too small, need at least 2 cells per axis",
                grid.nx, grid.ny, grid.nz
            )));
        }
        let h = settings.block_timesteps;
        if h == 0 {
            return Err(FdtdError::Config("block_timesteps must be >= 1".into()));
        }

        let mut block = settings.block_size;
        if block[0] == 0 {
            block[0] = 10;
        }
        if block[1] == 0 {
            block[1] = 10;
        }
        if block[2] == 0 {
            block[2] = grid.nz;
        }
        if block[2] != grid.nz {
            return Err(FdtdError::Config(format!(
                "partial tiling of the z axis is unsupported (block_size[2] = {}, nz = {})",
                block[2], grid.nz
            )));
        }
        for a in 0..2 {
            let n = grid.num_lines(a);
            if block_count(n, block[a]) >= 2 && block[a] < 2 * h {
                return Err(FdtdError::Config(format!(
                    "axis {a}: block width {} cannot sustain {} timesteps per pass (needs >= {})",
                    block[a],
                    h,
                    2 * h
                )));
            }
        }

        sort_by_priority(&mut extensions);
        let exclusive_hooks = extensions.iter().any(|e| !e.supports_tiling());

        let rect = rect_schedule(&grid, block);
        let diamond = if exclusive_hooks {
            info!("a registered extension does not support tiling; using the rectangular schedule only");
            None
        } else {
            let ax = diamond_axis(grid.nx, block[0], h);
            let ay = diamond_axis(grid.ny, block[1], h);
            let az = diamond_axis(grid.nz, block[2], h);
            Some(combine_3d(&[ax, ay, az], h))
        };

        let mut windows: Vec<StepWindow> = Vec::new();
        if let Some(d) = &diamond {
            windows.extend(d.step_windows());
        }
        windows.extend(rect.step_windows());
        windows.push(full_domain_step(&grid));
        for ext in extensions.iter_mut() {
            debug!("binding extension '{}' to {} tile windows", ext.name(), windows.len());
            ext.initialize_tiling(&windows);
        }

        let max_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let (nthreads, autotune) = if settings.threads == 0 {
            (
                1,
                AutoTune {
                    enabled: true,
                    frozen: false,
                    last_speed: 0.0,
                },
            )
        } else {
            (
                settings.threads,
                AutoTune {
                    enabled: false,
                    frozen: true,
                    last_speed: 0.0,
                },
            )
        };

        let state = Arc::new(EngineState {
            grid,
            fields: FieldPair::new(grid)?,
            coeffs,
            exts: extensions,
            diamond,
            rect,
            exclusive_hooks,
            num_ts: AtomicUsize::new(0),
        });
        let (sync, workers) = spawn_pool(&state, nthreads);

        info!(
            "FDTD engine: {}x{}x{} cells, {} worker(s), {} diamond tiles in {} phases, {} fallback tiles",
            grid.nx,
            grid.ny,
            grid.nz,
            nthreads,
            state.diamond.as_ref().map_or(0, |d| d.n_tiles()),
            state.diamond.as_ref().map_or(0, |d| d.phases.len()),
            state.rect.n_tiles(),
        );

        Ok(Self {
            state,
            sync,
            workers,
            nthreads,
            max_threads,
            autotune,
        })
    }

    /// Advance the simulation by `n` timesteps.
    pub fn iterate_ts(&mut self, n: usize) -> Result<()> {
        if self.workers.is_empty() {
            return Err(FdtdError::Invariant("engine is shut down".into()));
        }
        if n == 0 {
            return Ok(());
        }

        self.sync.iter_ts.store(n, Ordering::Relaxed);
        let t0 = Instant::now();
        self.sync.start.wait();
        self.sync.stop.wait();

        if let Some(err) = self.sync.fault.lock().unwrap().take() {
            self.sync.faulted.store(false, Ordering::Release);
            return Err(err);
        }

        let elapsed = t0.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let speed = (self.state.grid.n_cells() * n) as f64 / elapsed / 1e6;
            debug!("{} timesteps at {:.1} MCells/s with {} worker(s)", n, speed, self.nthreads);
            self.next_interval(speed);
        }
        Ok(())
    }

    /// Auto-threading policy: grow while throughput improves; on the
    /// first regression step back one worker and hold there.
    fn next_interval(&mut self, speed: f64) {
        if !self.autotune.enabled || self.autotune.frozen {
            return;
        }
        if self.autotune.last_speed > 0.0 && speed < self.autotune.last_speed {
            self.autotune.frozen = true;
            let n = (self.nthreads - 1).max(1);
            info!("auto-threading settled on {} worker(s)", n);
            self.change_num_threads(n);
        } else if self.nthreads < self.max_threads {
            self.autotune.last_speed = speed;
            self.change_num_threads(self.nthreads + 1);
        } else {
            self.autotune.frozen = true;
        }
    }

    fn change_num_threads(&mut self, n: usize) {
        self.stop_pool();
        let (sync, workers) = spawn_pool(&self.state, n);
        self.sync = sync;
        self.workers = workers;
        self.nthreads = n;
    }

    fn stop_pool(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.sync.stop_flag.store(true, Ordering::Relaxed);
        self.sync.start.wait();
        for w in self.workers.drain(..) {
            let _ = w.join();
        }
    }

    /// Probe one voltage component. Constant-time; not for the hot path.
    #[inline]
    pub fn volt(&self, c: usize, i: usize, j: usize, k: usize) -> f32 {
        self.state.fields.volt.get(c, i, j, k)
    }

    /// Probe one current component.
    #[inline]
    pub fn curr(&self, c: usize, i: usize, j: usize, k: usize) -> f32 {
        self.state.fields.curr.get(c, i, j, k)
    }

    /// Completed timesteps since construction or the last reset.
    pub fn timestep(&self) -> usize {
        self.state.num_ts.load(Ordering::Relaxed)
    }

    pub fn num_threads(&self) -> usize {
        self.nthreads
    }

    /// Shared view of the primary fields for diagnostics; only meaningful
    /// between `iterate_ts` calls.
    pub fn fields(&self) -> &FieldPair {
        &self.state.fields
    }

    /// Zero the primary fields and all extension state; coefficients are
    /// retained. The timestep counter restarts at zero.
    pub fn reset(&mut self) {
        self.state.fields.volt.fill_zero();
        self.state.fields.curr.fill_zero();
        for ext in &self.state.exts {
            ext.reset();
        }
        self.state.num_ts.store(0, Ordering::Relaxed);
    }

    /// Stop and join the worker pool. Further `iterate_ts` calls fail.
    pub fn shutdown(&mut self) {
        self.stop_pool();
    }
}

impl Drop for FdtdEngine {
    fn drop(&mut self) {
        self.stop_pool();
    }
}
