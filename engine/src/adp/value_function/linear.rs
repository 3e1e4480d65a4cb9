// src/adp/value_function/linear.rs

use serde::{Deserialize, Serialize};

use super::StageValue;
use crate::error::{ensure_finite, ensure_len, Result};

/// Lineaire value function: één marginale waarde per component (cash + N).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearValueFunction {
    pub u: Vec<f64>,
}

impl LinearValueFunction {
    pub fn new(u: Vec<f64>) -> Self {
        Self { u }
    }

    pub fn uniform(n_instruments: usize) -> Self {
        Self {
            u: vec![1.0; n_instruments + 1],
        }
    }
}

impl StageValue for LinearValueFunction {
    fn n_instruments(&self) -> usize {
        self.u.len().saturating_sub(1)
    }

    fn value(&self, h: &[f64]) -> f64 {
        self.u.iter().zip(h).map(|(u, h)| u * h).sum()
    }

    fn marginal_slopes(&self, _h: &[f64]) -> Vec<f64> {
        self.u.clone()
    }

    fn apply_target(&mut self, _position: &[f64], target: &[f64], alpha: f64) -> Result<()> {
        ensure_len("linear update target", self.u.len(), target.len())?;
        ensure_finite("linear update target", target)?;
        ensure_finite("step size", &[alpha])?;
        for (u, dv) in self.u.iter_mut().zip(target) {
            *u = (1.0 - alpha) * *u + alpha * dv;
        }
        Ok(())
    }
}
