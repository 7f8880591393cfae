// src/energy.rs

use rayon::prelude::*;

use crate::field::FieldPair;

/// Diagnostic field energy: sum of squares of both primary fields, with
/// the material factors left out (good enough to watch boundedness and
/// decay). Padding lanes hold zeros, so summing the raw slots is exact.
pub fn field_energy(f: &FieldPair) -> f64 {
    let sum = |slots: &[crate::simd::F4]| -> f64 {
        slots
            .par_chunks(4096)
            .map(|chunk| {
                chunk
                    .iter()
                    .flat_map(|q| q.0.iter())
                    .map(|v| (*v as f64) * (*v as f64))
                    .sum::<f64>()
            })
            .sum()
    };
    sum(f.volt.as_slice()) + sum(f.curr.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid3;

    #[test]
    fn energy_counts_both_fields() {
        let f = FieldPair::new(Grid3::new(4, 4, 4)).unwrap();
        assert_eq!(field_energy(&f), 0.0);
        f.volt.set(0, 1, 1, 1, 2.0);
        f.curr.set(2, 2, 2, 2, 3.0);
        assert!((field_energy(&f) - 13.0).abs() < 1e-12);
    }
}
