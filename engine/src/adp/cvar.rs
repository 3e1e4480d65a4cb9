// src/adp/cvar.rs

use crate::adp::memory::TrainingMemory;
use crate::error::{AdpError, Result};

/// l = ceil(S·(1−β)), geklemd op [1, S].
///
/// De kleine marge voorkomt dat 100·(1−0.9) = 10.000000000000002 naar 11 afrondt.
pub fn tail_count(s: usize, beta: f64) -> usize {
    let raw = s as f64 * (1.0 - beta);
    let l = (raw - 1e-9).ceil();
    let l = if l.is_finite() && l > 0.0 { l as usize } else { 1 };
    l.clamp(1, s.max(1))
}

/// Empirische β-CVaR van uitkomsten (vermogen), als verlies uitgedrukt.
///
/// Acerbi–Tasche met lineaire interpolatie op de kwantielgrens:
/// CVaR = −( Σ_{i<l−1} f_i / (S(1−β)) + f_{l−1}·(1 − (l−1)/(S(1−β))) )
pub fn empirical_cvar(outcomes: &[f64], beta: f64) -> Result<f64> {
    if outcomes.is_empty() {
        return Err(AdpError::EmptyMemory);
    }
    if !(beta > 0.0 && beta < 1.0) {
        return Err(AdpError::InvalidConfig(format!(
            "beta must be in (0, 1), got {}",
            beta
        )));
    }

    let mut f = outcomes.to_vec();
    f.sort_by(|a, b| a.total_cmp(b));

    let s = f.len();
    let denom = s as f64 * (1.0 - beta);
    let l = tail_count(s, beta);

    let tail_sum: f64 = f[..l - 1].iter().sum();
    let boundary_weight = (1.0 - (l - 1) as f64 / denom).clamp(0.0, 1.0);

    Ok(-(tail_sum / denom + f[l - 1] * boundary_weight))
}

/// CVaR van een verliessteekproef (uitkomst = −verlies).
pub fn cvar_of_losses(losses: &[f64], beta: f64) -> Result<f64> {
    let outcomes: Vec<f64> = losses.iter().map(|x| -x).collect();
    empirical_cvar(&outcomes, beta)
}

/// ΔCVaR_i = CVaR(eindvermogens + één eenheid van component i) − CVaR(basis).
///
/// Lengte N+1 (cash op index 0). Vervangt een exacte subgradiënt op t = T.
pub fn delta_cvar(memory: &TrainingMemory, beta: f64) -> Result<Vec<f64>> {
    let width = memory.width().ok_or(AdpError::EmptyMemory)?;
    let base = empirical_cvar(memory.terminal_outcomes(), beta)?;

    (0..width)
        .map(|i| Ok(empirical_cvar(&memory.perturbed_outcomes(i), beta)? - base))
        .collect()
}
