// src/main.rs

use chrono::Utc;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use adp_engine::adp::{
    buy_and_hold_wealth, AdpProfile, AdpStrategy, BaselineSolver, EqualWeightBaseline,
    GaussianGenerator, PrefetchGenerator, ScenarioGenerator, StageValue, Trainer,
};
use adp_engine::training_log::NullTrainingLogger;

/// Wekelijkse log-rendementen van drie instrumenten (aandelen, obligaties, goud).
fn demo_market() -> (Vec<f64>, Vec<Vec<f64>>) {
    let mean = vec![0.0015, 0.0006, 0.0008];
    let cov = vec![
        vec![0.000_600, 0.000_030, 0.000_020],
        vec![0.000_030, 0.000_090, 0.000_015],
        vec![0.000_020, 0.000_015, 0.000_300],
    ];
    (mean, cov)
}

#[derive(Serialize)]
struct TrainingSnapshot {
    ts_utc: i64,
    profile: &'static str,

    scenarios_trained: usize,
    final_cvar: Option<f64>,
    mean_terminal_wealth: f64,
    solver_fallbacks: usize,
    health: String,

    oos_terminal_wealth: f64,
    baseline_terminal_wealth: f64,
    stage0_slopes: Vec<f64>,
}

fn run_once_demo(profile: AdpProfile) -> Result<(), Box<dyn std::error::Error>> {
    // 1) Config uit profiel
    let cfg = profile.config();
    cfg.validate()?;

    let (mean, cov) = demo_market();
    let n = mean.len();

    // 2) Scenario's vooruit trekken in een eigen thread
    let gaussian = GaussianGenerator::new(cfg.funding_rate, mean.clone(), cov.clone(), 7)?;
    let mut generator = PrefetchGenerator::spawn(gaussian, 64);

    // 3) Trainen
    let mut strategy = AdpStrategy::piecewise_from_config(&cfg, n);
    let mut trainer = Trainer::from_config(cfg.clone())?;
    let summary = trainer.train(
        &mut strategy,
        &mut generator,
        cfg.scenarios,
        &mut NullTrainingLogger,
    )?;

    // 4) Out-of-sample pad met andere seed
    let mut oos = GaussianGenerator::new(cfg.funding_rate, mean, cov, 1_234)?;
    let path = oos.generate(cfg.horizon)?;
    let frozen = strategy.snapshot();
    let score = trainer.score(&frozen, &path)?;

    // 5) Baseline: gelijk gewogen, geen herbalancering
    let probs = vec![1.0 / path.len() as f64; path.len()];
    let weights = EqualWeightBaseline.solve(&path, &probs)?;
    let baseline = buy_and_hold_wealth(&weights, cfg.initial_capital, &path)?;

    // 6) Snapshot → JSON, stage-0 slopes in de startstate (alleen cash)
    let start = cfg.initial_state(frozen.n_instruments());
    let snapshot = TrainingSnapshot {
        ts_utc: Utc::now().timestamp(),
        profile: profile.as_str(),
        scenarios_trained: summary.scenarios_total,
        final_cvar: summary.final_cvar,
        mean_terminal_wealth: summary.mean_terminal_wealth,
        solver_fallbacks: summary.solver_fallbacks,
        health: format!("{:?}", summary.health),
        oos_terminal_wealth: score.terminal_wealth,
        baseline_terminal_wealth: baseline.last().copied().unwrap_or(cfg.initial_capital),
        stage0_slopes: frozen.stage(0).marginal_slopes(&start),
    };

    let json = serde_json::to_string(&snapshot)?;
    println!("{json}");

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let profile = AdpProfile::from_env();

    if let Err(err) = run_once_demo(profile) {
        eprintln!("run_once_demo error: {err}");
        std::process::exit(1);
    }
}
