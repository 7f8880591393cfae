// src/main.rs
//
// Demo run: a Gaussian dipole pulse in a UPML-walled vacuum box. Prints
// an energy trace while the pulse is absorbed by the boundary.

use std::path::PathBuf;

use fdtd_sim::coeffs::{CoeffSet, C0};
use fdtd_sim::config::{GeometryConfig, NumericsConfig, RunConfig, RunInfo};
use fdtd_sim::energy::field_energy;
use fdtd_sim::engine::{EngineSettings, FdtdEngine};
use fdtd_sim::extension::excitation::ExcitationExt;
use fdtd_sim::extension::upml::create_upml;
use fdtd_sim::extension::Extension;
use fdtd_sim::mesh::{AxisBoundary, Mesh};
use fdtd_sim::signal::Signal;

struct Args {
    size: usize,
    steps: usize,
    threads: usize,
    block_timesteps: usize,
    block: usize,
    pml: usize,
    verbose: u8,
    out_dir: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            size: 48,
            steps: 400,
            threads: 0,
            block_timesteps: 5,
            block: 12,
            pml: 8,
            verbose: 0,
            out_dir: None,
        }
    }
}

fn parse_args() -> Args {
    let mut args = Args::default();
    for arg in std::env::args().skip(1) {
        let (key, value) = match arg.split_once('=') {
            Some((k, v)) => (k, v),
            None => (arg.as_str(), ""),
        };
        match key {
            "--size" => args.size = value.parse().unwrap_or(args.size),
            "--steps" => args.steps = value.parse().unwrap_or(args.steps),
            "--threads" => args.threads = value.parse().unwrap_or(args.threads),
            "--h" => args.block_timesteps = value.parse().unwrap_or(args.block_timesteps),
            "--block" => args.block = value.parse().unwrap_or(args.block),
            "--pml" => args.pml = value.parse().unwrap_or(args.pml),
            "--out" => args.out_dir = Some(PathBuf::from(value)),
            "--verbose" => args.verbose = value.parse().unwrap_or(1),
            "-v" => args.verbose = 1,
            "-vv" => args.verbose = 2,
            "-vvv" => args.verbose = 3,
            _ => eprintln!("Warning: ignoring unknown argument '{arg}'"),
        }
    }
    args
}

fn main() {
    let args = parse_args();

    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let n = args.size;
    let delta = 1e-3; // 1 mm cells
    let dt = 0.95 * delta / (C0 * (3.0f64).sqrt());

    let mesh = Mesh::new(n, n, n).with_boundary([
        AxisBoundary::Upml {
            thickness: args.pml,
            exponent: 3.0,
        };
        3
    ]);

    let mut coeffs = match CoeffSet::vacuum(mesh.grid, delta, dt) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("coefficient allocation failed: {e}");
            std::process::exit(1);
        }
    };
    coeffs.apply_boundaries(&mesh);

    let mut extensions: Vec<Box<dyn Extension>> = Vec::new();
    match create_upml(&mesh, &mut coeffs, delta, dt) {
        Ok(boxes) => extensions.extend(boxes.into_iter().map(|b| Box::new(b) as Box<dyn Extension>)),
        Err(e) => {
            eprintln!("UPML setup failed: {e}");
            std::process::exit(1);
        }
    }

    // Gaussian dipole in the middle of the box
    let f0 = 30.0e9;
    let fc = 20.0e9;
    let centre = [n / 2, n / 2, n / 2];
    extensions.push(Box::new(ExcitationExt::volt_point(
        Signal::gaussian_pulse(f0, fc, dt),
        centre,
        2,
        1.0,
        0,
    )));

    let settings = EngineSettings {
        threads: args.threads,
        block_timesteps: args.block_timesteps,
        block_size: [args.block, args.block, n],
        verbose: args.verbose,
    };

    println!("--- fdtd-sim demo run ---");
    println!("grid:   {n}x{n}x{n}, delta = {delta:.1e} m, dt = {dt:.3e} s");
    println!("pml:    {} cells per face", args.pml);
    println!("source: Gaussian pulse f0 = {:.0} GHz at {:?}", f0 / 1e9, centre);
    println!(
        "tiling: H = {} timesteps, block = {} cells, threads = {}",
        args.block_timesteps,
        args.block,
        if args.threads == 0 { "auto".into() } else { args.threads.to_string() }
    );

    if let Some(dir) = &args.out_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("cannot create output directory: {e}");
            std::process::exit(1);
        }
        let cfg = RunConfig {
            geometry: GeometryConfig {
                nx: n,
                ny: n,
                nz: n,
                delta,
            },
            numerics: NumericsConfig {
                dt,
                steps: args.steps,
                threads: args.threads,
                block_timesteps: args.block_timesteps,
                block_size: [args.block, args.block, n],
                verbose: args.verbose,
            },
            run: RunInfo {
                binary: "fdtd-sim".into(),
                run_id: format!("demo-{n}c-{}ts", args.steps),
            },
        };
        if let Err(e) = cfg.write_to_dir(dir) {
            eprintln!("cannot write config.json: {e}");
        }
    }

    let mut engine = match FdtdEngine::new(coeffs, extensions, settings) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("engine init failed: {e}");
            std::process::exit(1);
        }
    };

    let chunk = (args.steps / 10).max(1);
    let mut done = 0;
    while done < args.steps {
        let n_steps = chunk.min(args.steps - done);
        if let Err(e) = engine.iterate_ts(n_steps) {
            eprintln!("iteration failed: {e}");
            std::process::exit(1);
        }
        done += n_steps;
        println!(
            "ts {:5}  energy {:.4e}  ({} workers)",
            engine.timestep(),
            field_energy(engine.fields()),
            engine.num_threads()
        );
    }

    println!("done: {} timesteps", engine.timestep());
}
