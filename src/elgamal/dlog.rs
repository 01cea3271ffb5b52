//! Baby-step/giant-step discrete-log recovery on BabyJubJub.
//!
//! Exponential ElGamal decrypts to the point `m*G`; this solver recovers the
//! integer `m` for tallies bounded by `max_value`. Time and memory are both
//! Θ(√max_value), so the bound doubles as a cooperative cancellation knob.

use std::collections::HashMap;

use num_integer::Roots;
use tracing::trace;

use super::error::ElGamalError;
use crate::curve::{Fr, Point, GENERATOR, IDENTITY};

const LOG_TARGET: &str = "ballot_engine::elgamal::dlog";

/// Solve `m * G = point` for `m` in `[0, max_value]`.
///
/// Baby steps tabulate `j*G` for `j` in `[0, s)` with `s = ⌈√max_value⌉ + 1`;
/// giant steps walk `point - i*s*G` until the table hits. The table is keyed
/// by the affine point itself (structural hash over both coordinates), never
/// by a truncated representation. The first match with `m <= max_value` wins.
pub fn solve_dlog(point: &Point, max_value: u64) -> Result<u64, ElGamalError> {
    if *point == IDENTITY {
        return Ok(0);
    }

    let step_size = max_value.sqrt() + 1;
    trace!(target: LOG_TARGET, max_value, step_size, "starting baby-step giant-step search");

    let mut baby_steps: HashMap<Point, u64> = HashMap::with_capacity(step_size as usize);
    let mut current = IDENTITY;
    for j in 0..step_size {
        baby_steps.insert(current, j);
        current = current.add(&GENERATOR)?;
    }

    let giant_stride = GENERATOR.mul_scalar(&Fr::from(step_size))?.neg();

    let mut current = *point;
    for i in 0..=step_size {
        if let Some(&j) = baby_steps.get(&current) {
            let m = i * step_size + j;
            if m <= max_value {
                return Ok(m);
            }
        }
        current = current.add(&giant_stride)?;
    }

    Err(ElGamalError::DlogOutOfRange { max_value })
}
