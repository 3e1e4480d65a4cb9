// src/adp/solver.rs

use serde::{Deserialize, Serialize};

use crate::adp::config::AdpConfig;
use crate::adp::transition::pre_decision;
use crate::adp::value_function::StageValue;
use crate::error::{ensure_len, AdpError, Result};

/// Koop- en verkoopbedragen per instrument (lengte N, beide ≥ 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trades {
    pub buys: Vec<f64>,
    pub sells: Vec<f64>,
}

impl Trades {
    pub fn none(n_instruments: usize) -> Self {
        Self {
            buys: vec![0.0; n_instruments],
            sells: vec![0.0; n_instruments],
        }
    }

    pub fn turnover(&self) -> f64 {
        self.buys.iter().sum::<f64>() + self.sells.iter().sum::<f64>()
    }
}

/// Eén beslisstap: gegeven h⁺_{t-1}, R_t en V_t → (x, y).
pub trait AllocationSolver {
    fn theta(&self) -> f64;

    fn solve(&self, r: &[f64], h_prev: &[f64], v: &dyn StageValue) -> Result<Trades>;
}

/// Koop-slopes k_i = u_i − (1+θ)u_0 en verkoop-slopes l_i = −u_i + (1−θ)u_0.
/// `u` is niet leeg (gecontroleerd in `check_concavity`).
pub(crate) fn trade_slopes(u: &[f64], theta: f64) -> (Vec<f64>, Vec<f64>) {
    let u0 = u[0];
    let k = u[1..].iter().map(|ui| ui - (1.0 + theta) * u0).collect();
    let l = u[1..].iter().map(|ui| -ui + (1.0 - theta) * u0).collect();
    (k, l)
}

/// Geen instrument mag tegelijk koop- én verkoopwaardig zijn.
pub fn check_concavity(u: &[f64], theta: f64) -> Result<()> {
    if u.is_empty() {
        return Err(AdpError::DimensionMismatch {
            what: "value-function slopes",
            expected: 1,
            got: 0,
        });
    }
    let (k, l) = trade_slopes(u, theta);
    for (i, (&ki, &li)) in k.iter().zip(&l).enumerate() {
        if ki > 0.0 && li > 0.0 {
            return Err(AdpError::ConcavityViolation {
                instrument: i,
                buy_slope: ki,
                sell_slope: li,
            });
        }
    }
    Ok(())
}

/// Ongelimiteerde inspectie: verkopen, cash in de best-buy, sell-to-buy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InspectionSolver {
    pub theta: f64,
}

/// Zelfde regels, maar geen positie mag boven `cap` dollar uitkomen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedInspectionSolver {
    pub theta: f64,
    pub cap: f64,
}

impl AllocationSolver for InspectionSolver {
    fn theta(&self) -> f64 {
        self.theta
    }

    fn solve(&self, r: &[f64], h_prev: &[f64], v: &dyn StageValue) -> Result<Trades> {
        inspect(self.theta, None, r, h_prev, v)
    }
}

impl AllocationSolver for BoundedInspectionSolver {
    fn theta(&self) -> f64 {
        self.theta
    }

    fn solve(&self, r: &[f64], h_prev: &[f64], v: &dyn StageValue) -> Result<Trades> {
        inspect(self.theta, Some(self.cap), r, h_prev, v)
    }
}

/// Solver-variant, gekozen bij constructie.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Solver {
    Inspection(InspectionSolver),
    Bounded(BoundedInspectionSolver),
}

impl Solver {
    pub fn from_config(cfg: &AdpConfig) -> Self {
        match cfg.position_cap() {
            Some(cap) => Solver::Bounded(BoundedInspectionSolver {
                theta: cfg.theta,
                cap,
            }),
            None => Solver::Inspection(InspectionSolver { theta: cfg.theta }),
        }
    }
}

impl AllocationSolver for Solver {
    fn theta(&self) -> f64 {
        match self {
            Solver::Inspection(s) => s.theta(),
            Solver::Bounded(s) => s.theta(),
        }
    }

    fn solve(&self, r: &[f64], h_prev: &[f64], v: &dyn StageValue) -> Result<Trades> {
        match self {
            Solver::Inspection(s) => s.solve(r, h_prev, v),
            Solver::Bounded(s) => s.solve(r, h_prev, v),
        }
    }
}

/// Best-buy: hoogste k_i > 0 onder de cap; gelijke k → laagste index.
fn best_buy(k: &[f64], h: &[f64], cap: Option<f64>) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &ki) in k.iter().enumerate() {
        if ki <= 0.0 {
            continue;
        }
        if let Some(c) = cap {
            if !(h[i + 1] < c) {
                continue;
            }
        }
        match best {
            Some(b) if k[b] >= ki => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Sell-to-buy kandidaat voor best-buy j: l_i ≤ 0, h_i > 0 en
/// (1−θ)/(1+θ)·k_j + l_i > 0. De minst waardevolle positie (hoogste l) eerst.
fn sell_to_buy_source(j: usize, k: &[f64], l: &[f64], h: &[f64], ratio: f64) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &li) in l.iter().enumerate() {
        if i == j || li > 0.0 || !(h[i + 1] > 0.0) {
            continue;
        }
        if !(ratio * k[j] + li > 0.0) {
            continue;
        }
        match best {
            Some(b) if l[b] >= li => {}
            _ => best = Some(i),
        }
    }
    best
}

fn inspect(
    theta: f64,
    cap: Option<f64>,
    r: &[f64],
    h_prev: &[f64],
    v: &dyn StageValue,
) -> Result<Trades> {
    let n = v.n_instruments();
    ensure_len("state", n + 1, h_prev.len())?;

    // 1) pre-decision vermogen
    let mut h = pre_decision(h_prev, r)?;

    // 2) koop/verkoop-slopes uit de value function rond h
    let u = v.marginal_slopes(&h);
    ensure_len("value-function slopes", n + 1, u.len())?;
    check_concavity(&u, theta)?;
    let (k, l) = trade_slopes(&u, theta);

    let mut trades = Trades::none(n);

    // 3) sell-set I: volledig liquideren
    for i in 0..n {
        if l[i] > 0.0 && h[i + 1] > 0.0 {
            trades.sells[i] += h[i + 1];
            h[0] += (1.0 - theta) * h[i + 1];
            h[i + 1] = 0.0;
        }
    }

    // bounded: alles boven de cap afromen
    if let Some(c) = cap {
        for i in 0..n {
            if l[i] <= 0.0 && h[i + 1] > c {
                let excess = h[i + 1] - c;
                trades.sells[i] += excess;
                h[0] += (1.0 - theta) * excess;
                h[i + 1] = c;
            }
        }
    }

    // 4) cash naar de best-buy; met cap per instrument vullen en opnieuw kiezen
    while h[0] > 0.0 {
        let Some(j) = best_buy(&k, &h, cap) else {
            break;
        };
        let affordable = h[0] / (1.0 + theta);
        let room = cap.map_or(f64::INFINITY, |c| c - h[j + 1]);

        if room < affordable {
            trades.buys[j] += room;
            h[0] -= (1.0 + theta) * room;
            h[j + 1] = cap.unwrap_or(h[j + 1] + room);
        } else {
            trades.buys[j] += affordable;
            h[j + 1] += affordable;
            h[0] = 0.0;
        }
    }

    // 5) sell-to-buy: direct omzetten scheelt één kostenpoot t.o.v. via cash.
    //    Best-buy wordt na elke (deel)vulling opnieuw bepaald.
    let ratio = (1.0 - theta) / (1.0 + theta);
    let max_rounds = 2 * (n + 1) * (n + 1);
    let mut rounds = 0;
    while let Some(j) = best_buy(&k, &h, cap) {
        let Some(i) = sell_to_buy_source(j, &k, &l, &h, ratio) else {
            break;
        };

        rounds += 1;
        if rounds > max_rounds {
            debug_assert!(false, "sell-to-buy loop did not terminate");
            break;
        }

        let room = cap.map_or(f64::INFINITY, |c| c - h[j + 1]);
        let available = h[i + 1];

        if available * ratio <= room {
            trades.sells[i] += available;
            trades.buys[j] += ratio * available;
            h[j + 1] += ratio * available;
            h[i + 1] = 0.0;
        } else {
            let sell = room / ratio;
            trades.sells[i] += sell;
            trades.buys[j] += room;
            h[i + 1] -= sell;
            h[j + 1] = cap.unwrap_or(h[j + 1] + room);
        }
    }

    Ok(trades)
}
