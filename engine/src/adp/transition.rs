// src/adp/transition.rs

use crate::error::{ensure_len, Result};

/// Pre-decision state: R ⊙ h.
pub fn pre_decision(h_prev: &[f64], r: &[f64]) -> Result<Vec<f64>> {
    ensure_len("return vector", h_prev.len(), r.len())?;
    Ok(h_prev.iter().zip(r).map(|(h, r)| h * r).collect())
}

pub fn total_wealth(h: &[f64]) -> f64 {
    h.iter().sum()
}

/// Transitie h⁺_{t-1} → h⁺_t: eerst rendement, dan kopen/verkopen.
///
/// Index 0 is cash; kopen kost (1+θ), verkopen levert (1−θ) op.
/// Lekkage van vermogen is exact θ·(Σx + Σy).
pub fn transition(
    h_prev: &[f64],
    r: &[f64],
    buys: &[f64],
    sells: &[f64],
    theta: f64,
) -> Result<Vec<f64>> {
    let n1 = h_prev.len();
    ensure_len("return vector", n1, r.len())?;
    ensure_len("buys", n1.saturating_sub(1), buys.len())?;
    ensure_len("sells", n1.saturating_sub(1), sells.len())?;

    let mut h_plus = vec![0.0; n1];
    for i in 1..n1 {
        h_plus[i] = r[i] * h_prev[i] + buys[i - 1] - sells[i - 1];
    }

    let bought: f64 = buys.iter().sum();
    let sold: f64 = sells.iter().sum();
    h_plus[0] = r[0] * h_prev[0] - (1.0 + theta) * bought + (1.0 - theta) * sold;

    Ok(h_plus)
}
