// src/extension/dispersive.rs
//
// Dispersive material advanced with auxiliary differential equations.
// Each dispersion order carries a sparse cell list plus per-cell
// recurrence coefficients; the pre-hooks advance the ADE state from the
// primary field, the apply-hooks subtract the accumulated contribution.
//
// The plain recurrence (Drude-like pole)
//     ade <- int * ade + ext * field
// gains a first-order companion for Lorentz poles:
//     lor <- lor + lor_coeff * ade
//     ade <- int * ade + ext * (field - lor)

use log::debug;

use super::{Extension, TileKey, TileMap, PRIO_DISPERSIVE};
use crate::error::Result;
use crate::field::{AuxArray, FieldPair};
use crate::tiling::{StepWindow, Window};

/// One dispersion order: the claimed cells and their recurrence
/// coefficients, per polarization.
pub struct AdeOrder {
    pub cells: Vec<[usize; 3]>,
    pub volt_on: bool,
    pub curr_on: bool,
    pub volt_lor_on: bool,
    pub curr_lor_on: bool,
    pub v_int: [Vec<f32>; 3],
    pub v_ext: [Vec<f32>; 3],
    pub v_lor: [Vec<f32>; 3],
    pub i_int: [Vec<f32>; 3],
    pub i_ext: [Vec<f32>; 3],
    pub i_lor: [Vec<f32>; 3],
}

impl AdeOrder {
    fn empty(cells: Vec<[usize; 3]>) -> Self {
        let n = cells.len();
        let z = || [vec![0.0; n], vec![0.0; n], vec![0.0; n]];
        Self {
            cells,
            volt_on: false,
            curr_on: false,
            volt_lor_on: false,
            curr_lor_on: false,
            v_int: z(),
            v_ext: z(),
            v_lor: z(),
            i_int: z(),
            i_ext: z(),
            i_lor: z(),
        }
    }

    /// Drude pole on the voltage side: plasma frequency `omega_p` (rad/s)
    /// and collision rate `gamma` (1/s).
    pub fn drude_volt(cells: Vec<[usize; 3]>, omega_p: f64, gamma: f64, dt: f64) -> Self {
        let mut o = Self::empty(cells);
        o.volt_on = true;
        let int = ((2.0 - gamma * dt) / (2.0 + gamma * dt)) as f32;
        let ext = (2.0 * omega_p * omega_p * dt * dt / (2.0 + gamma * dt)) as f32;
        for c in 0..3 {
            o.v_int[c].fill(int);
            o.v_ext[c].fill(ext);
        }
        o
    }

    /// Lorentz pole on the voltage side: adds the restoring-force
    /// companion at resonance `omega_0` (rad/s).
    pub fn lorentz_volt(
        cells: Vec<[usize; 3]>,
        omega_p: f64,
        omega_0: f64,
        gamma: f64,
        dt: f64,
    ) -> Self {
        let mut o = Self::drude_volt(cells, omega_p, gamma, dt);
        o.volt_lor_on = true;
        let lor = (omega_0 * omega_0 * dt * dt) as f32;
        for c in 0..3 {
            o.v_lor[c].fill(lor);
        }
        o
    }

    /// Magnetic Drude pole on the current side.
    pub fn drude_curr(cells: Vec<[usize; 3]>, omega_p: f64, gamma: f64, dt: f64) -> Self {
        let mut o = Self::empty(cells);
        o.curr_on = true;
        let int = ((2.0 - gamma * dt) / (2.0 + gamma * dt)) as f32;
        let ext = (2.0 * omega_p * omega_p * dt * dt / (2.0 + gamma * dt)) as f32;
        for c in 0..3 {
            o.i_int[c].fill(int);
            o.i_ext[c].fill(ext);
        }
        o
    }

    /// Magnetic Lorentz pole on the current side: adds the restoring-force
    /// companion at resonance `omega_0` (rad/s).
    pub fn lorentz_curr(
        cells: Vec<[usize; 3]>,
        omega_p: f64,
        omega_0: f64,
        gamma: f64,
        dt: f64,
    ) -> Self {
        let mut o = Self::drude_curr(cells, omega_p, gamma, dt);
        o.curr_lor_on = true;
        let lor = (omega_0 * omega_0 * dt * dt) as f32;
        for c in 0..3 {
            o.i_lor[c].fill(lor);
        }
        o
    }
}

/// The assembled operator data: one entry per dispersion order.
pub struct DispersiveOp {
    pub orders: Vec<AdeOrder>,
}

struct AdeState {
    volt: Option<[AuxArray; 3]>,
    curr: Option<[AuxArray; 3]>,
    volt_lor: Option<[AuxArray; 3]>,
    curr_lor: Option<[AuxArray; 3]>,
}

/// Engine side: per-order ADE histories plus the tile-keyed cell index
/// maps built at schedule time.
pub struct DispersiveExt {
    op: DispersiveOp,
    state: Vec<AdeState>,
    volt_map: TileMap,
    curr_map: TileMap,
}

fn aux3(n: usize) -> Result<[AuxArray; 3]> {
    Ok([AuxArray::new(n)?, AuxArray::new(n)?, AuxArray::new(n)?])
}

impl DispersiveExt {
    pub fn new(op: DispersiveOp) -> Result<Self> {
        let mut state = Vec::with_capacity(op.orders.len());
        for o in &op.orders {
            let n = o.cells.len();
            state.push(AdeState {
                volt: if o.volt_on { Some(aux3(n)?) } else { None },
                curr: if o.curr_on { Some(aux3(n)?) } else { None },
                volt_lor: if o.volt_lor_on { Some(aux3(n)?) } else { None },
                curr_lor: if o.curr_lor_on { Some(aux3(n)?) } else { None },
            });
        }
        Ok(Self {
            op,
            state,
            volt_map: TileMap::new(),
            curr_map: TileMap::new(),
        })
    }

    fn cells_in<'a>(map: &'a TileMap, order: usize, win: &Window) -> &'a [u32] {
        map.get(&TileKey::new(order, win))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

impl Extension for DispersiveExt {
    fn name(&self) -> &'static str {
        "dispersive"
    }

    fn priority(&self) -> i32 {
        PRIO_DISPERSIVE
    }

    fn supports_tiling(&self) -> bool {
        true
    }

    fn initialize_tiling(&mut self, steps: &[StepWindow]) {
        for step in steps {
            for (o, order) in self.op.orders.iter().enumerate() {
                if order.volt_on {
                    let key = TileKey::new(o, &step.volt);
                    self.volt_map.entry(key).or_insert_with(|| {
                        order
                            .cells
                            .iter()
                            .enumerate()
                            .filter(|(_, p)| step.volt.contains(p[0], p[1], p[2]))
                            .map(|(i, _)| i as u32)
                            .collect()
                    });
                }
                if order.curr_on {
                    let key = TileKey::new(o, &step.curr);
                    self.curr_map.entry(key).or_insert_with(|| {
                        order
                            .cells
                            .iter()
                            .enumerate()
                            .filter(|(_, p)| step.curr.contains(p[0], p[1], p[2]))
                            .map(|(i, _)| i as u32)
                            .collect()
                    });
                }
            }
        }
        debug!(
            "dispersive tile maps: {} volt keys, {} curr keys",
            self.volt_map.len(),
            self.curr_map.len()
        );
    }

    fn reset(&self) {
        for s in &self.state {
            for arrays in [&s.volt, &s.curr, &s.volt_lor, &s.curr_lor]
                .into_iter()
                .flatten()
            {
                for a in arrays {
                    a.fill_zero();
                }
            }
        }
    }

    fn pre_voltage_update(&self, _ts: usize, win: &Window, f: &FieldPair) -> Result<()> {
        for (o, order) in self.op.orders.iter().enumerate() {
            if !order.volt_on {
                continue;
            }
            let Some(ade) = self.state[o].volt.as_ref() else {
                continue;
            };
            let cells = Self::cells_in(&self.volt_map, o, win);

            if let Some(lor) = self.state[o].volt_lor.as_ref() {
                for &i in cells {
                    let i = i as usize;
                    let p = order.cells[i];

                    lor[0].set(i, lor[0].get(i) + order.v_lor[0][i] * ade[0].get(i));
                    let mut a0 = ade[0].get(i) * order.v_int[0][i];
                    a0 += order.v_ext[0][i] * (f.volt.get(0, p[0], p[1], p[2]) - lor[0].get(i));
                    ade[0].set(i, a0);

                    // kept as found upstream: the y recurrence reads the
                    // z companion
                    lor[1].set(i, lor[1].get(i) + order.v_lor[1][i] * ade[1].get(i));
                    let mut a1 = ade[1].get(i) * order.v_int[1][i];
                    a1 += order.v_ext[1][i] * (f.volt.get(1, p[0], p[1], p[2]) - lor[2].get(i));
                    ade[1].set(i, a1);

                    lor[2].set(i, lor[2].get(i) + order.v_lor[2][i] * ade[2].get(i));
                    let mut a2 = ade[2].get(i) * order.v_int[2][i];
                    a2 += order.v_ext[2][i] * (f.volt.get(2, p[0], p[1], p[2]) - lor[2].get(i));
                    ade[2].set(i, a2);
                }
            } else {
                for &i in cells {
                    let i = i as usize;
                    let p = order.cells[i];
                    for c in 0..3 {
                        let mut a = ade[c].get(i) * order.v_int[c][i];
                        a += order.v_ext[c][i] * f.volt.get(c, p[0], p[1], p[2]);
                        ade[c].set(i, a);
                    }
                }
            }
        }
        Ok(())
    }

    fn pre_current_update(&self, _ts: usize, win: &Window, f: &FieldPair) -> Result<()> {
        for (o, order) in self.op.orders.iter().enumerate() {
            if !order.curr_on {
                continue;
            }
            let Some(ade) = self.state[o].curr.as_ref() else {
                continue;
            };
            let cells = Self::cells_in(&self.curr_map, o, win);

            if let Some(lor) = self.state[o].curr_lor.as_ref() {
                for &i in cells {
                    let i = i as usize;
                    let p = order.cells[i];
                    for c in 0..3 {
                        lor[c].set(i, lor[c].get(i) + order.i_lor[c][i] * ade[c].get(i));
                        let mut a = ade[c].get(i) * order.i_int[c][i];
                        a += order.i_ext[c][i] * (f.curr.get(c, p[0], p[1], p[2]) - lor[c].get(i));
                        ade[c].set(i, a);
                    }
                }
            } else {
                for &i in cells {
                    let i = i as usize;
                    let p = order.cells[i];
                    for c in 0..3 {
                        let mut a = ade[c].get(i) * order.i_int[c][i];
                        a += order.i_ext[c][i] * f.curr.get(c, p[0], p[1], p[2]);
                        ade[c].set(i, a);
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_voltages(&self, _ts: usize, win: &Window, f: &FieldPair) -> Result<()> {
        for (o, order) in self.op.orders.iter().enumerate() {
            if !order.volt_on {
                continue;
            }
            let Some(ade) = self.state[o].volt.as_ref() else {
                continue;
            };
            for &i in Self::cells_in(&self.volt_map, o, win) {
                let i = i as usize;
                let p = order.cells[i];
                for c in 0..3 {
                    f.volt
                        .set(c, p[0], p[1], p[2], f.volt.get(c, p[0], p[1], p[2]) - ade[c].get(i));
                }
            }
        }
        Ok(())
    }

    fn apply_currents(&self, _ts: usize, win: &Window, f: &FieldPair) -> Result<()> {
        for (o, order) in self.op.orders.iter().enumerate() {
            if !order.curr_on {
                continue;
            }
            let Some(ade) = self.state[o].curr.as_ref() else {
                continue;
            };
            for &i in Self::cells_in(&self.curr_map, o, win) {
                let i = i as usize;
                let p = order.cells[i];
                for c in 0..3 {
                    f.curr
                        .set(c, p[0], p[1], p[2], f.curr.get(c, p[0], p[1], p[2]) - ade[c].get(i));
                }
            }
        }
        Ok(())
    }
}
