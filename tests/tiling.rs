// tests/tiling.rs
//
// Schedule-equivalence properties: whatever the thread count, pass depth
// and block sizes, the tiled engine must reproduce the single-tile,
// single-timestep reference bit for bit.
// Run with: cargo test --test tiling

use fdtd_sim::coeffs::{CoeffSet, C0};
use fdtd_sim::engine::{EngineSettings, FdtdEngine};
use fdtd_sim::error::FdtdError;
use fdtd_sim::extension::excitation::ExcitationExt;
use fdtd_sim::extension::Extension;
use fdtd_sim::field::FieldPair;
use fdtd_sim::grid::Grid3;
use fdtd_sim::mesh::Mesh;
use fdtd_sim::signal::Signal;
use fdtd_sim::tiling::Window;

const NX: usize = 24;
const NY: usize = 20;
const NZ: usize = 8;

/// Inhomogeneous medium: permittivity varies cell by cell so that tiling
/// mistakes cannot hide behind translation symmetry.
fn varied_coeffs() -> CoeffSet {
    let grid = Grid3::new(NX, NY, NZ);
    let delta = 1e-3;
    let dt = 0.5 * delta / (C0 * (3.0f64).sqrt());
    let mut c = CoeffSet::vacuum(grid, delta, dt).unwrap();
    for i in 0..NX {
        for j in 0..NY {
            for k in 0..NZ {
                let eps = 1.0 + ((i + 2 * j + 3 * k) % 5) as f64 * 0.5;
                c.set_cell_material(i, j, k, eps, 1.0, 0.0, delta, dt);
            }
        }
    }
    c.apply_boundaries(&Mesh::new(NX, NY, NZ));
    c
}

fn impulse_source() -> Box<dyn Extension> {
    Box::new(ExcitationExt::curr_point(
        Signal::impulse(),
        [NX / 2, NY / 2, NZ / 2],
        2,
        1.0,
        0,
    ))
}

fn engine(threads: usize, h: usize, block: [usize; 3]) -> FdtdEngine {
    FdtdEngine::new(
        varied_coeffs(),
        vec![impulse_source()],
        EngineSettings {
            threads,
            block_timesteps: h,
            block_size: block,
            verbose: 0,
        },
    )
    .unwrap()
}

fn snapshot(f: &FieldPair) -> Vec<u32> {
    let mut out = Vec::with_capacity(2 * 3 * NX * NY * NZ);
    for field in [&f.volt, &f.curr] {
        for c in 0..3 {
            for i in 0..NX {
                for j in 0..NY {
                    for k in 0..NZ {
                        out.push(field.get(c, i, j, k).to_bits());
                    }
                }
            }
        }
    }
    out
}

fn first_mismatch(a: &[u32], b: &[u32]) -> Option<usize> {
    a.iter().zip(b.iter()).position(|(x, y)| x != y)
}

#[test]
fn tiled_run_matches_the_reference_bitwise() {
    // reference: one tile, one timestep per pass, one worker
    let mut reference = engine(1, 1, [NX, NY, NZ]);
    reference.iterate_ts(23).unwrap();
    let expected = snapshot(reference.fields());

    for (threads, h, block) in [
        (4, 5, [10, 10, NZ]),
        (2, 3, [10, 10, NZ]),
        (3, 1, [8, 7, NZ]),
    ] {
        let mut e = engine(threads, h, block);
        e.iterate_ts(23).unwrap(); // 23 = 4 * 5 + 3 exercises the fallback too
        let got = snapshot(e.fields());
        assert_eq!(
            first_mismatch(&expected, &got),
            None,
            "P={} H={} B={:?} diverged from the reference",
            threads,
            h,
            block
        );
    }
}

#[test]
fn thread_count_does_not_change_the_fields() {
    let mut reference = engine(1, 5, [10, 10, NZ]);
    reference.iterate_ts(20).unwrap();
    let expected = snapshot(reference.fields());

    for threads in [2, 4, 8] {
        let mut e = engine(threads, 5, [10, 10, NZ]);
        e.iterate_ts(20).unwrap();
        assert_eq!(
            first_mismatch(&expected, &snapshot(e.fields())),
            None,
            "P={} changed the result",
            threads
        );
    }
}

#[test]
fn split_iteration_equals_one_call() {
    let mut a = engine(2, 5, [10, 10, NZ]);
    a.iterate_ts(22).unwrap();

    let mut b = engine(2, 5, [10, 10, NZ]);
    b.iterate_ts(13).unwrap();
    b.iterate_ts(9).unwrap();

    assert_eq!(
        first_mismatch(&snapshot(a.fields()), &snapshot(b.fields())),
        None,
        "iterate(13); iterate(9) differs from iterate(22)"
    );
    assert_eq!(a.timestep(), b.timestep());
}

#[test]
fn reset_round_trips_bitwise() {
    let mut e = engine(2, 5, [10, 10, NZ]);
    e.iterate_ts(17).unwrap();
    let first = snapshot(e.fields());

    e.reset();
    assert_eq!(e.timestep(), 0);
    assert!(snapshot(e.fields()).iter().all(|b| *b == 0));

    e.iterate_ts(17).unwrap();
    assert_eq!(
        first_mismatch(&first, &snapshot(e.fields())),
        None,
        "rerun after reset diverged"
    );
}

/// An extension that cannot be tiled: forces the rectangular-exclusive
/// path, which must still match the reference bitwise.
struct WholeDomainNoop;

impl Extension for WholeDomainNoop {
    fn name(&self) -> &'static str {
        "whole-domain-noop"
    }
    fn priority(&self) -> i32 {
        0
    }
    fn supports_tiling(&self) -> bool {
        false
    }
}

#[test]
fn non_tiling_extension_forces_the_fallback_and_stays_exact() {
    let mut reference = engine(1, 1, [NX, NY, NZ]);
    reference.iterate_ts(11).unwrap();

    let mut e = FdtdEngine::new(
        varied_coeffs(),
        vec![impulse_source(), Box::new(WholeDomainNoop)],
        EngineSettings {
            threads: 3,
            block_timesteps: 5,
            block_size: [10, 10, NZ],
            verbose: 0,
        },
    )
    .unwrap();
    e.iterate_ts(11).unwrap();

    assert_eq!(
        first_mismatch(&snapshot(reference.fields()), &snapshot(e.fields())),
        None,
        "exclusive hook path diverged from the reference"
    );
}

/// A hook that always fails, to exercise the fault protocol.
struct FailingHook;

impl Extension for FailingHook {
    fn name(&self) -> &'static str {
        "failing-hook"
    }
    fn priority(&self) -> i32 {
        0
    }
    fn supports_tiling(&self) -> bool {
        true
    }
    fn apply_voltages(
        &self,
        ts: usize,
        _win: &Window,
        _f: &FieldPair,
    ) -> fdtd_sim::error::Result<()> {
        Err(FdtdError::Extension {
            name: "failing-hook",
            timestep: ts,
            reason: "synthetic failure".into(),
        })
    }
}

#[test]
fn extension_fault_aborts_the_iteration_with_an_error() {
    let mut e = FdtdEngine::new(
        varied_coeffs(),
        vec![Box::new(FailingHook)],
        EngineSettings {
            threads: 2,
            block_timesteps: 2,
            block_size: [10, 10, NZ],
            verbose: 0,
        },
    )
    .unwrap();
    let err = e.iterate_ts(4).expect_err("fault must surface");
    assert!(matches!(err, FdtdError::Extension { name: "failing-hook", .. }));
    // the pool survives the fault and accepts further requests
    e.iterate_ts(1).expect_err("hook still failing");
}
