use std::env;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use adp_engine::adp::{
    resume_or_cold_start, AdpConfig, AdpProfile, AdpStrategy, PrefetchGenerator, ResumeOutcome,
    Solver, StudentTGenerator, Trainer, TrainingArtifacts,
};
use adp_engine::training_log::{BatchingTrainingLogger, FileTrainingLogger, TrainingLogSink};

const CHECKPOINT_EVERY: usize = 250;

fn load_config() -> Result<(AdpConfig, String), Box<dyn std::error::Error>> {
    // ADP_CONFIG (JSON-bestand) wint van het profiel
    if let Ok(path) = env::var("ADP_CONFIG") {
        let cfg = AdpConfig::from_json_file(&path)?;
        return Ok((cfg, path));
    }
    let profile = AdpProfile::from_env();
    Ok((profile.config(), profile.as_str().to_string()))
}

fn run_training() -> Result<(), Box<dyn std::error::Error>> {
    // ===== 1) Config + paden =====
    let (cfg, source) = load_config()?;
    cfg.validate()?;

    let artifact_dir =
        PathBuf::from(env::var("ADP_ARTIFACT_DIR").unwrap_or_else(|_| "artifacts/adp".to_string()));
    let log_dir = PathBuf::from(env::var("ADP_LOG_DIR").unwrap_or_else(|_| "logs".to_string()));

    // ===== 2) Markt: drie instrumenten, dikke staarten =====
    let mean = vec![0.0012, 0.0005, 0.0007];
    let cov = vec![
        vec![0.000_500, 0.000_025, 0.000_020],
        vec![0.000_025, 0.000_080, 0.000_010],
        vec![0.000_020, 0.000_010, 0.000_250],
    ];
    let n = mean.len();

    // ===== 3) Hervatten of koud starten =====
    let fresh = AdpStrategy::piecewise_from_config(&cfg, n);
    let (artifacts, outcome) = resume_or_cold_start(&artifact_dir, fresh);
    match &outcome {
        ResumeOutcome::Resumed { scenarios_done } => {
            info!(scenarios_done, source = %source, "resuming training")
        }
        ResumeOutcome::ColdStart { reason } => {
            info!(reason = %reason, source = %source, "starting training from scratch")
        }
    }

    let mut strategy = artifacts.strategy;
    let mut trainer = Trainer::resume(
        cfg.clone(),
        Solver::from_config(&cfg),
        artifacts.memory,
        artifacts.scenarios_done,
    )?;

    // andere seed per hervatting, anders dezelfde scenario's opnieuw
    let seed = 11 + trainer.scenarios_done() as u64;
    let student = StudentTGenerator::new(cfg.funding_rate, 5.0, mean, cov, seed)?;
    let mut generator = PrefetchGenerator::spawn(student, 128);

    let mut sink = BatchingTrainingLogger::new(Box::new(FileTrainingLogger::new(&log_dir)), 50);

    // ===== 4) Trainen in blokken, na elk blok een checkpoint =====
    let remaining = cfg.scenarios.saturating_sub(trainer.scenarios_done());
    let mut done = 0;
    while done < remaining {
        let chunk = CHECKPOINT_EVERY.min(remaining - done);
        let summary = trainer.train(&mut strategy, &mut generator, chunk, &mut sink)?;
        done += chunk;

        TrainingArtifacts {
            strategy: strategy.snapshot(),
            memory: trainer.memory().clone(),
            scenarios_done: trainer.scenarios_done(),
        }
        .save_to_dir(&artifact_dir)?;

        info!(
            scenarios_total = summary.scenarios_total,
            final_cvar = ?summary.final_cvar,
            health = ?summary.health,
            "checkpoint written"
        );
    }
    sink.flush();

    println!(
        "{}",
        serde_json::json!({
            "artifact_dir": artifact_dir.display().to_string(),
            "scenarios_done": trainer.scenarios_done(),
            "memory_len": trainer.memory().len(),
            "health": format!("{:?}", trainer.health()),
        })
    );

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run_training() {
        eprintln!("run_training error: {err}");
        std::process::exit(1);
    }
}
