// src/adp/baseline.rs

use crate::error::{ensure_len, AdpError, Result};

/// Offline vergelijkingsportefeuille: scenario's + kansen → gewichten over cash+N.
///
/// Draait nooit in de trainingslus.
pub trait BaselineSolver {
    fn solve(&self, scenarios: &[Vec<f64>], probabilities: &[f64]) -> Result<Vec<f64>>;
}

fn check_inputs(scenarios: &[Vec<f64>], probabilities: &[f64]) -> Result<usize> {
    let width = scenarios
        .first()
        .map(Vec::len)
        .ok_or_else(|| AdpError::InvalidConfig("baseline needs at least one scenario".into()))?;
    if width < 2 {
        return Err(AdpError::DimensionMismatch {
            what: "baseline scenario",
            expected: 2,
            got: width,
        });
    }
    ensure_len("scenario probabilities", scenarios.len(), probabilities.len())?;
    for s in scenarios {
        ensure_len("baseline scenario", width, s.len())?;
    }

    let total: f64 = probabilities.iter().sum();
    if probabilities.iter().any(|p| !(*p >= 0.0)) || (total - 1.0).abs() > 1e-6 {
        return Err(AdpError::InvalidConfig(format!(
            "scenario probabilities must be >= 0 and sum to 1, got sum {}",
            total
        )));
    }
    Ok(width)
}

/// 1/N in elk instrument, niets in cash.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualWeightBaseline;

impl BaselineSolver for EqualWeightBaseline {
    fn solve(&self, scenarios: &[Vec<f64>], probabilities: &[f64]) -> Result<Vec<f64>> {
        let width = check_inputs(scenarios, probabilities)?;
        let n = width - 1;

        let mut w = vec![1.0 / n as f64; width];
        w[0] = 0.0;
        Ok(w)
    }
}

/// Alles in de component (cash meegeteld) met het hoogste verwachte bruto rendement.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxExpectedReturnBaseline;

impl BaselineSolver for MaxExpectedReturnBaseline {
    fn solve(&self, scenarios: &[Vec<f64>], probabilities: &[f64]) -> Result<Vec<f64>> {
        let width = check_inputs(scenarios, probabilities)?;

        let mut expected = vec![0.0; width];
        for (s, p) in scenarios.iter().zip(probabilities) {
            for (e, r) in expected.iter_mut().zip(s) {
                *e += p * r;
            }
        }

        // gelijke verwachting → laagste index
        let mut best = 0;
        for (i, e) in expected.iter().enumerate() {
            if *e > expected[best] {
                best = i;
            }
        }

        let mut w = vec![0.0; width];
        w[best] = 1.0;
        Ok(w)
    }
}

/// Vermogenspad van een vaste startverdeling zonder herbalancering.
///
/// Eerste element is `capital`, daarna het totaal na elke rendementsrij.
pub fn buy_and_hold_wealth(weights: &[f64], capital: f64, returns: &[Vec<f64>]) -> Result<Vec<f64>> {
    let mut h: Vec<f64> = weights.iter().map(|w| w * capital).collect();
    let mut path = Vec::with_capacity(returns.len() + 1);
    path.push(h.iter().sum());

    for r in returns {
        ensure_len("return vector", h.len(), r.len())?;
        for (x, g) in h.iter_mut().zip(r) {
            *x *= g;
        }
        path.push(h.iter().sum());
    }
    Ok(path)
}
