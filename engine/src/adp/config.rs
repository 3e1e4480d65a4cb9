// src/adp/config.rs

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AdpError, Result};

/// Robbins–Monro stapgrootte voor de value-function update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepSizeSchedule {
    /// α_s = k / (k + s)
    Harmonic { k: f64 },
    /// α_s = 1 / sqrt(s + 1), oudere parameterset
    InverseSqrt,
}

impl StepSizeSchedule {
    pub fn alpha(&self, s: usize) -> f64 {
        let s = s as f64;
        match *self {
            StepSizeSchedule::Harmonic { k } => k / (k + s),
            StepSizeSchedule::InverseSqrt => 1.0 / (s + 1.0).sqrt(),
        }
    }
}

impl Default for StepSizeSchedule {
    fn default() -> Self {
        StepSizeSchedule::Harmonic { k: 500.0 }
    }
}

/// Hoe de value functions vóór training gevuld worden.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueInit {
    /// Alle slopes 1.0
    Uniform,
    /// Slopes uniform in [0, 1), met vaste seed
    Random { seed: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdpConfig {
    pub initial_capital: f64,     // startkapitaal (cash op t=0)
    pub theta: f64,               // proportionele transactiekosten
    pub beta: f64,                // CVaR-niveau, bijv. 0.95
    pub gamma: f64,               // 1.0 = puur verwachte waarde, 0.0 = puur CVaR
    pub horizon: usize,           // T, aantal rebalance-momenten
    pub scenarios: usize,         // S, trainingsbudget
    pub step_size: StepSizeSchedule,
    pub max_breakpoints: usize,   // m, per instrument
    pub position_rounding: f64,   // breakpoint-grid in dollars (0.0 = geen afronding)
    pub position_cap_frac: Option<f64>, // w, cap w0 = w * initial_capital
    pub funding_rate: f64,        // R[0] = 1 + funding_rate
    pub init: ValueInit,
    pub fallback_degraded_after: u32, // opeenvolgende scenario's met fallback → Degraded
}

impl AdpConfig {
    /// Cap per instrument in dollars, als het bounded-variant actief is.
    pub fn position_cap(&self) -> Option<f64> {
        self.position_cap_frac.map(|w| w * self.initial_capital)
    }

    /// Startstate h_0: alles in cash.
    pub fn initial_state(&self, n_instruments: usize) -> Vec<f64> {
        let mut h = vec![0.0; n_instruments + 1];
        h[0] = self.initial_capital;
        h
    }

    pub fn validate(&self) -> Result<()> {
        fn bad(msg: String) -> Result<()> {
            Err(AdpError::InvalidConfig(msg))
        }

        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return bad(format!("initial_capital must be > 0, got {}", self.initial_capital));
        }
        if !(0.0..1.0).contains(&self.theta) {
            return bad(format!("theta must be in [0, 1), got {}", self.theta));
        }
        if !(self.beta > 0.0 && self.beta < 1.0) {
            return bad(format!("beta must be in (0, 1), got {}", self.beta));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return bad(format!("gamma must be in [0, 1], got {}", self.gamma));
        }
        if self.horizon == 0 {
            return bad("horizon must be at least 1".to_string());
        }
        if self.max_breakpoints == 0 {
            return bad("max_breakpoints must be at least 1".to_string());
        }
        if !(self.position_rounding.is_finite() && self.position_rounding >= 0.0) {
            return bad(format!(
                "position_rounding must be >= 0, got {}",
                self.position_rounding
            ));
        }
        if let Some(w) = self.position_cap_frac {
            if !(w.is_finite() && w > 0.0) {
                return bad(format!("position_cap_frac must be > 0, got {}", w));
            }
        }
        if let StepSizeSchedule::Harmonic { k } = self.step_size {
            if !(k.is_finite() && k > 0.0) {
                return bad(format!("harmonic step size needs k > 0, got {}", k));
            }
        }
        if !self.funding_rate.is_finite() || self.funding_rate <= -1.0 {
            return bad(format!("funding_rate must be > -1, got {}", self.funding_rate));
        }

        Ok(())
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: AdpConfig = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Wekelijks rebalancen over een jaar, ~100k kapitaal.
pub fn default_adp_config_weekly() -> AdpConfig {
    AdpConfig {
        initial_capital: 1e5,
        theta: 0.002,
        beta: 0.95,
        gamma: 0.4,
        horizon: 52,
        scenarios: 4_000,
        step_size: StepSizeSchedule::Harmonic { k: 500.0 },
        max_breakpoints: 5,
        position_rounding: 1_000.0, // afronden op 1000 dollar
        position_cap_frac: Some(0.5),
        funding_rate: 0.000_14,
        init: ValueInit::Random { seed: 4 },
        fallback_degraded_after: 3,
    }
}

/// Kleine demo-run: korte horizon, weinig scenario's.
pub fn compact_adp_config_demo() -> AdpConfig {
    AdpConfig {
        initial_capital: 1e6,
        theta: 0.005,
        beta: 0.90,
        gamma: 0.4,
        horizon: 8,
        scenarios: 200,
        step_size: StepSizeSchedule::Harmonic { k: 50.0 },
        max_breakpoints: 5,
        position_rounding: 1_000.0,
        position_cap_frac: Some(0.5),
        funding_rate: 0.000_3,
        init: ValueInit::Random { seed: 4 },
        fallback_degraded_after: 3,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdpProfile {
    Weekly,
    Demo,
}

impl AdpProfile {
    /// Leest `ADP_PROFILE`; onbekend of afwezig → demo.
    pub fn from_env() -> Self {
        match env::var("ADP_PROFILE") {
            Ok(val) => Self::parse(&val),
            Err(_) => AdpProfile::Demo,
        }
    }

    pub fn parse(val: &str) -> Self {
        match val {
            "weekly" => AdpProfile::Weekly,
            _ => AdpProfile::Demo,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdpProfile::Weekly => "weekly",
            AdpProfile::Demo => "demo",
        }
    }

    pub fn config(&self) -> AdpConfig {
        match self {
            AdpProfile::Weekly => default_adp_config_weekly(),
            AdpProfile::Demo => compact_adp_config_demo(),
        }
    }
}
