// src/adp/value_function/mod.rs

pub mod linear;
pub mod piecewise;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::adp::config::{AdpConfig, ValueInit};
use crate::error::{AdpError, Result};

pub use linear::LinearValueFunction;
pub use piecewise::{PiecewiseValueFunction, PwlSlopes};

/// Value function van één beslismoment, gezien vanuit de post-decision state.
pub trait StageValue {
    fn n_instruments(&self) -> usize;

    /// V_t(h) voor een state van lengte N+1.
    fn value(&self, h: &[f64]) -> f64;

    /// Marginale waarde per component (u, lengte N+1) rond state h.
    fn marginal_slopes(&self, h: &[f64]) -> Vec<f64>;

    /// Stochastic-approximation stap richting `target` (lengte N+1), gemeten in `position`.
    fn apply_target(&mut self, position: &[f64], target: &[f64], alpha: f64) -> Result<()>;
}

/// Tijdgeïndexeerde value functions V[0..T-1], één per beslismoment.
///
/// De waarde op t = T is het CVaR-gemengde eindobject en wordt niet opgeslagen.
///
/// Deserialisatie loopt via `from_stages`: een lege of rafelige strategie laadt niet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "StrategyParts<V>",
    bound(deserialize = "V: StageValue + Deserialize<'de>")
)]
pub struct AdpStrategy<V> {
    stages: Vec<V>,
}

#[derive(Debug, Deserialize)]
struct StrategyParts<V> {
    stages: Vec<V>,
}

impl<V: StageValue> TryFrom<StrategyParts<V>> for AdpStrategy<V> {
    type Error = AdpError;

    fn try_from(p: StrategyParts<V>) -> Result<Self> {
        AdpStrategy::from_stages(p.stages)
    }
}

impl<V: StageValue> AdpStrategy<V> {
    pub fn from_stages(stages: Vec<V>) -> Result<Self> {
        let first = stages
            .first()
            .ok_or_else(|| AdpError::InvalidConfig("strategy needs at least one stage".into()))?;
        let n = first.n_instruments();
        if n == 0 {
            return Err(AdpError::InvalidConfig(
                "strategy needs at least one instrument".into(),
            ));
        }
        if let Some(bad) = stages.iter().find(|v| v.n_instruments() != n) {
            return Err(AdpError::DimensionMismatch {
                what: "stage value function",
                expected: n,
                got: bad.n_instruments(),
            });
        }
        Ok(Self { stages })
    }

    pub fn horizon(&self) -> usize {
        self.stages.len()
    }

    pub fn n_instruments(&self) -> usize {
        self.stages.first().map_or(0, V::n_instruments)
    }

    pub fn stage(&self, t: usize) -> &V {
        &self.stages[t]
    }

    pub fn stage_mut(&mut self, t: usize) -> &mut V {
        &mut self.stages[t]
    }

    pub fn stages(&self) -> &[V] {
        &self.stages
    }
}

impl<V: Clone> AdpStrategy<V> {
    /// Kopie voor lezers buiten de trainingslus (export, inference).
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}

impl AdpStrategy<LinearValueFunction> {
    pub fn linear_uniform(horizon: usize, n_instruments: usize) -> Self {
        Self {
            stages: (0..horizon)
                .map(|_| LinearValueFunction::uniform(n_instruments))
                .collect(),
        }
    }

    /// Willekeurige start, zodat de eerste stap één duidelijke best-buy heeft.
    pub fn linear_random(horizon: usize, n_instruments: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let stages = (0..horizon)
            .map(|_| {
                let u = (0..=n_instruments).map(|_| rng.gen_range(0.0..1.0)).collect();
                LinearValueFunction::new(u)
            })
            .collect();
        Self { stages }
    }

    pub fn linear_from_config(cfg: &AdpConfig, n_instruments: usize) -> Self {
        match cfg.init {
            ValueInit::Uniform => Self::linear_uniform(cfg.horizon, n_instruments),
            ValueInit::Random { seed } => Self::linear_random(cfg.horizon, n_instruments, seed),
        }
    }
}

impl AdpStrategy<PiecewiseValueFunction> {
    pub fn piecewise_uniform(
        horizon: usize,
        n_instruments: usize,
        max_breakpoints: usize,
        rounding: f64,
    ) -> Self {
        Self {
            stages: (0..horizon)
                .map(|_| PiecewiseValueFunction::uniform(n_instruments, max_breakpoints, rounding))
                .collect(),
        }
    }

    /// Random init: cash-slope 1.0, instrument-slopes per stage uniform in [0.5, 1.5).
    pub fn piecewise_random(
        horizon: usize,
        n_instruments: usize,
        max_breakpoints: usize,
        rounding: f64,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let stages = (0..horizon)
            .map(|_| {
                let instruments = (0..n_instruments)
                    .map(|_| PwlSlopes::flat(rng.gen_range(0.5..1.5), max_breakpoints, rounding))
                    .collect();
                PiecewiseValueFunction::new(1.0, instruments)
            })
            .collect();
        Self { stages }
    }

    pub fn piecewise_from_config(cfg: &AdpConfig, n_instruments: usize) -> Self {
        match cfg.init {
            ValueInit::Uniform => Self::piecewise_uniform(
                cfg.horizon,
                n_instruments,
                cfg.max_breakpoints,
                cfg.position_rounding,
            ),
            ValueInit::Random { seed } => Self::piecewise_random(
                cfg.horizon,
                n_instruments,
                cfg.max_breakpoints,
                cfg.position_rounding,
                seed,
            ),
        }
    }
}
