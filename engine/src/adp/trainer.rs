// src/adp/trainer.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adp::config::AdpConfig;
use crate::adp::cvar::{delta_cvar, empirical_cvar};
use crate::adp::generator::ScenarioGenerator;
use crate::adp::memory::TrainingMemory;
use crate::adp::solver::{AllocationSolver, Solver};
use crate::adp::transition::{pre_decision, total_wealth, transition};
use crate::adp::value_function::{AdpStrategy, StageValue};
use crate::error::{ensure_finite, ensure_len, AdpError, Result};
use crate::training_log::{
    encode_scenario_log_event_json, encode_supervisor_event_json, SupervisorLogEvent,
    TrainingHealth, TrainingLogSink, TrainingSupervisor,
};

/// Resultaat van één getraind scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: usize,
    pub alpha: f64,
    pub terminal_wealth: f64,
    pub cvar: f64,
    pub delta_cvar: Vec<f64>,
    pub solver_fallbacks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSummary {
    pub scenarios_run: usize,
    pub scenarios_total: usize,
    pub mean_terminal_wealth: f64,
    pub final_cvar: Option<f64>,
    pub solver_fallbacks: usize,
    pub health: TrainingHealth,
}

/// Forward-only replay van een getrainde strategie op één rendementspad.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreReport {
    pub terminal_wealth: f64,
    /// Totaal vermogen na elk beslismoment, plus het eindvermogen als laatste.
    pub wealth_path: Vec<f64>,
    pub final_state: Vec<f64>,
    pub solver_fallbacks: usize,
}

struct StageOutcome {
    h_plus: Vec<f64>,
    sensitivity: Vec<f64>,
}

/// Drijft de ADP-trainingslus: één scenario tegelijk, updates per scenario atomair.
pub struct Trainer<S = Solver> {
    config: AdpConfig,
    solver: S,
    memory: TrainingMemory,
    scenarios_done: usize,
    supervisor: TrainingSupervisor,
}

impl Trainer<Solver> {
    /// Solver-variant volgt uit `position_cap_frac`.
    pub fn from_config(config: AdpConfig) -> Result<Self> {
        let solver = Solver::from_config(&config);
        Self::new(config, solver)
    }
}

impl<S: AllocationSolver> Trainer<S> {
    pub fn new(config: AdpConfig, solver: S) -> Result<Self> {
        Self::resume(config, solver, TrainingMemory::new(), 0)
    }

    /// Verder trainen vanaf opgeslagen geheugen en scenarioteller.
    pub fn resume(
        config: AdpConfig,
        solver: S,
        memory: TrainingMemory,
        scenarios_done: usize,
    ) -> Result<Self> {
        config.validate()?;
        let supervisor = TrainingSupervisor::new(config.fallback_degraded_after);
        Ok(Self {
            config,
            solver,
            memory,
            scenarios_done,
            supervisor,
        })
    }

    pub fn config(&self) -> &AdpConfig {
        &self.config
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn memory(&self) -> &TrainingMemory {
        &self.memory
    }

    pub fn scenarios_done(&self) -> usize {
        self.scenarios_done
    }

    pub fn health(&self) -> TrainingHealth {
        self.supervisor.health()
    }

    pub fn into_memory(self) -> TrainingMemory {
        self.memory
    }

    /// Oplossen + transitie; bij een solver-fout blijft de positie staan (h ← R ⊙ h).
    fn step_or_hold(
        &self,
        r: &[f64],
        h_prev: &[f64],
        v: &dyn StageValue,
        t: usize,
    ) -> Result<(Vec<f64>, bool)> {
        match self.solver.solve(r, h_prev, v) {
            Ok(trades) => Ok((
                transition(h_prev, r, &trades.buys, &trades.sells, self.solver.theta())?,
                false,
            )),
            Err(e) if e.is_solver_failure() => {
                warn!(stage = t, error = %e, "solver failed, holding position");
                Ok((pre_decision(h_prev, r)?, true))
            }
            Err(e) => Err(e),
        }
    }

    /// Oplossen in h en in h + e_i; ΔV_i = V_t(ft(h + e_i)) − V_t(ft(h)).
    fn step_with_lookahead(
        &self,
        r: &[f64],
        h_prev: &[f64],
        v: &dyn StageValue,
    ) -> Result<StageOutcome> {
        let theta = self.solver.theta();

        let trades = self.solver.solve(r, h_prev, v)?;
        let h_plus = transition(h_prev, r, &trades.buys, &trades.sells, theta)?;
        let base = v.value(&h_plus);

        let mut sensitivity = vec![0.0; h_prev.len()];
        let mut bumped = h_prev.to_vec();
        for i in 0..h_prev.len() {
            bumped[i] += 1.0;
            let t_i = self.solver.solve(r, &bumped, v)?;
            let h_i = transition(&bumped, r, &t_i.buys, &t_i.sells, theta)?;
            sensitivity[i] = v.value(&h_i) - base;
            bumped[i] = h_prev[i];
        }

        Ok(StageOutcome {
            h_plus,
            sensitivity,
        })
    }

    /// Eén trainingsscenario (forward pass, terminal target, updates).
    ///
    /// Alle stage-updates worden gebufferd en pas aan het eind, in stage-volgorde,
    /// toegepast. Een fout halverwege laat de strategie dus ongemoeid.
    pub fn train_scenario<V>(
        &mut self,
        strategy: &mut AdpStrategy<V>,
        generator: &mut dyn ScenarioGenerator,
    ) -> Result<ScenarioReport>
    where
        V: StageValue,
    {
        let horizon = strategy.horizon();
        if horizon != self.config.horizon {
            return Err(AdpError::InvalidConfig(format!(
                "strategy has {} stages, config horizon is {}",
                horizon, self.config.horizon
            )));
        }
        let n = strategy.n_instruments();
        ensure_len("generator instruments", n, generator.n_instruments())?;

        let s = self.scenarios_done;
        let alpha = self.config.step_size.alpha(s);

        // (positie, target) per stage t = 0..T-1
        let mut pending: Vec<Option<(Vec<f64>, Vec<f64>)>> = vec![None; horizon];
        let mut fallbacks = 0usize;

        // t = 0: alleen cash, eenheidsrendement
        let unit = vec![1.0; n + 1];
        let h0 = self.config.initial_state(n);
        let (mut h, held) = self.step_or_hold(&unit, &h0, strategy.stage(0), 0)?;
        fallbacks += held as usize;

        for t in 1..horizon {
            let r = generator.draw()?;
            ensure_len("return vector", n + 1, r.len())?;

            match self.step_with_lookahead(&r, &h, strategy.stage(t)) {
                Ok(out) => {
                    pending[t - 1] = Some((h, out.sensitivity));
                    h = out.h_plus;
                }
                Err(e) if e.is_solver_failure() => {
                    warn!(scenario = s, stage = t, error = %e, "solver failed, holding position");
                    fallbacks += 1;
                    h = pre_decision(&h, &r)?;
                }
                Err(e) => return Err(e),
            }
        }

        // t = T: eindvermogen, CVaR over het hele geheugen
        let r_terminal = generator.draw()?;
        ensure_len("return vector", n + 1, r_terminal.len())?;

        let terminal_wealth = self.memory.record(&r_terminal, &h)?;
        let beta = self.config.beta;
        let cvar = empirical_cvar(self.memory.terminal_outcomes(), beta)?;
        let d_cvar = delta_cvar(&self.memory, beta)?;

        let gamma = self.config.gamma;
        let terminal_target: Vec<f64> = r_terminal
            .iter()
            .zip(&d_cvar)
            .map(|(r, d)| gamma * r - (1.0 - gamma) * d)
            .collect();
        pending[horizon - 1] = Some((h, terminal_target));

        // NaN/∞ ergens in de buffer: scenario valt weg, ook uit het geheugen
        let finite = pending.iter().flatten().try_for_each(|(position, target)| {
            ensure_finite("update position", position)?;
            ensure_finite("update target", target)
        });
        if let Err(e) = finite {
            self.memory.discard_last();
            return Err(e);
        }

        for (t, slot) in pending.into_iter().enumerate() {
            if let Some((position, target)) = slot {
                strategy.stage_mut(t).apply_target(&position, &target, alpha)?;
            }
        }

        self.scenarios_done += 1;
        self.supervisor.register_scenario(fallbacks);

        debug!(
            scenario = s,
            alpha,
            terminal_wealth,
            cvar,
            fallbacks,
            "scenario trained"
        );

        Ok(ScenarioReport {
            scenario: s,
            alpha,
            terminal_wealth,
            cvar,
            delta_cvar: d_cvar,
            solver_fallbacks: fallbacks,
        })
    }

    /// Traint `budget` scenario's en schrijft per scenario één JSON-regel naar `sink`.
    pub fn train<V>(
        &mut self,
        strategy: &mut AdpStrategy<V>,
        generator: &mut dyn ScenarioGenerator,
        budget: usize,
        sink: &mut dyn TrainingLogSink,
    ) -> Result<TrainingSummary>
    where
        V: StageValue,
    {
        let progress_every = (budget / 10).max(1);
        let mut wealth_sum = 0.0;
        let mut final_cvar = None;
        let mut total_fallbacks = 0usize;
        let mut last_health = self.supervisor.health();

        for k in 0..budget {
            let report = self.train_scenario(strategy, generator)?;
            let health = self.supervisor.health();
            let ts = Utc::now().timestamp();

            sink.log(&encode_scenario_log_event_json(ts, &report, health));

            if health != last_health {
                let ev = SupervisorLogEvent {
                    ts_utc: ts,
                    status: health,
                    msg: match health {
                        TrainingHealth::Healthy => "solver recovered",
                        TrainingHealth::Degraded => "repeated solver fallbacks",
                    },
                    consecutive_with_fallback: self.supervisor.consecutive_with_fallback(),
                };
                sink.log(&encode_supervisor_event_json(&ev));
                if health == TrainingHealth::Degraded {
                    warn!(scenario = report.scenario, "training degraded");
                }
                last_health = health;
            }

            wealth_sum += report.terminal_wealth;
            total_fallbacks += report.solver_fallbacks;
            final_cvar = Some(report.cvar);

            if (k + 1) % progress_every == 0 {
                info!(
                    done = k + 1,
                    budget,
                    alpha = report.alpha,
                    cvar = report.cvar,
                    terminal_wealth = report.terminal_wealth,
                    "training progress"
                );
            }
        }
        sink.flush();

        Ok(TrainingSummary {
            scenarios_run: budget,
            scenarios_total: self.scenarios_done,
            mean_terminal_wealth: if budget > 0 {
                wealth_sum / budget as f64
            } else {
                0.0
            },
            final_cvar,
            solver_fallbacks: total_fallbacks,
            health: self.supervisor.health(),
        })
    }

    /// Zie [`score`]; gebruikt de solver en het startkapitaal van deze trainer.
    pub fn score<V>(&self, strategy: &AdpStrategy<V>, returns: &[Vec<f64>]) -> Result<ScoreReport>
    where
        V: StageValue,
    {
        score(strategy, &self.solver, self.config.initial_capital, returns)
    }
}

/// Replay zonder updates. `returns` levert minstens T rijen: rij t−1 voor
/// beslismoment t = 1..T−1, rij T−1 voor het eindvermogen.
pub fn score<V, S>(
    strategy: &AdpStrategy<V>,
    solver: &S,
    initial_capital: f64,
    returns: &[Vec<f64>],
) -> Result<ScoreReport>
where
    V: StageValue,
    S: AllocationSolver + ?Sized,
{
    let horizon = strategy.horizon();
    if horizon == 0 {
        return Err(AdpError::InvalidConfig("strategy has no stages".into()));
    }
    if returns.len() < horizon {
        return Err(AdpError::InsufficientReturns {
            needed: horizon,
            got: returns.len(),
        });
    }
    let n = strategy.n_instruments();
    for r in &returns[..horizon] {
        ensure_len("return vector", n + 1, r.len())?;
    }

    let theta = solver.theta();
    let mut fallbacks = 0usize;
    let mut wealth_path = Vec::with_capacity(horizon + 1);

    let mut h = vec![0.0; n + 1];
    h[0] = initial_capital;
    let unit = vec![1.0; n + 1];

    for t in 0..horizon {
        let r = if t == 0 { &unit } else { &returns[t - 1] };
        h = match solver.solve(r, &h, strategy.stage(t)) {
            Ok(trades) => transition(&h, r, &trades.buys, &trades.sells, theta)?,
            Err(e) if e.is_solver_failure() => {
                warn!(stage = t, error = %e, "solver failed during scoring, holding position");
                fallbacks += 1;
                pre_decision(&h, r)?
            }
            Err(e) => return Err(e),
        };
        wealth_path.push(total_wealth(&h));
    }

    let terminal_wealth: f64 = returns[horizon - 1]
        .iter()
        .zip(&h)
        .map(|(r, x)| r * x)
        .sum();
    wealth_path.push(terminal_wealth);

    Ok(ScoreReport {
        terminal_wealth,
        wealth_path,
        final_state: h,
        solver_fallbacks: fallbacks,
    })
}
