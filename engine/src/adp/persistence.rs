// src/adp/persistence.rs

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::adp::memory::TrainingMemory;
use crate::adp::value_function::{AdpStrategy, StageValue};
use crate::error::{AdpError, Result};

pub const STRATEGY_FILE: &str = "strategy.json";
pub const MEMORY_FILE: &str = "memory.json";
pub const PROGRESS_FILE: &str = "progress.json";

/// Schrijft eerst naar `<naam>.tmp` en hernoemt daarna, zodat een half
/// geschreven bestand nooit als artefact wordt ingelezen.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, raw)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn save_strategy<V: Serialize, P: AsRef<Path>>(strategy: &AdpStrategy<V>, path: P) -> Result<()> {
    write_json(path.as_ref(), strategy)
}

pub fn load_strategy<V, P>(path: P) -> Result<AdpStrategy<V>>
where
    V: StageValue + DeserializeOwned,
    P: AsRef<Path>,
{
    read_json(path.as_ref())
}

pub fn save_memory<P: AsRef<Path>>(memory: &TrainingMemory, path: P) -> Result<()> {
    write_json(path.as_ref(), memory)
}

pub fn load_memory<P: AsRef<Path>>(path: P) -> Result<TrainingMemory> {
    read_json(path.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Progress {
    scenarios_done: usize,
}

/// Alles wat nodig is om een onderbroken training te hervatten.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingArtifacts<V> {
    pub strategy: AdpStrategy<V>,
    pub memory: TrainingMemory,
    pub scenarios_done: usize,
}

impl<V> TrainingArtifacts<V> {
    pub fn fresh(strategy: AdpStrategy<V>) -> Self {
        Self {
            strategy,
            memory: TrainingMemory::new(),
            scenarios_done: 0,
        }
    }
}

impl<V: Serialize> TrainingArtifacts<V> {
    pub fn save_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        save_strategy(&self.strategy, dir.join(STRATEGY_FILE))?;
        save_memory(&self.memory, dir.join(MEMORY_FILE))?;
        // progress als laatste: pas dan is de set compleet
        write_json(
            &dir.join(PROGRESS_FILE),
            &Progress {
                scenarios_done: self.scenarios_done,
            },
        )
    }
}

impl<V: StageValue + DeserializeOwned> TrainingArtifacts<V> {
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let progress: Progress = read_json(&dir.join(PROGRESS_FILE))?;
        Ok(Self {
            strategy: load_strategy(dir.join(STRATEGY_FILE))?,
            memory: load_memory(dir.join(MEMORY_FILE))?,
            scenarios_done: progress.scenarios_done,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    Resumed { scenarios_done: usize },
    ColdStart { reason: String },
}

fn check_compatible<V: StageValue>(
    loaded: &TrainingArtifacts<V>,
    fresh: &AdpStrategy<V>,
) -> Result<()> {
    if loaded.strategy.horizon() != fresh.horizon() {
        return Err(AdpError::DimensionMismatch {
            what: "stored strategy horizon",
            expected: fresh.horizon(),
            got: loaded.strategy.horizon(),
        });
    }
    if loaded.strategy.n_instruments() != fresh.n_instruments() {
        return Err(AdpError::DimensionMismatch {
            what: "stored strategy instruments",
            expected: fresh.n_instruments(),
            got: loaded.strategy.n_instruments(),
        });
    }
    if let Some(w) = loaded.memory.width() {
        if w != fresh.n_instruments() + 1 {
            return Err(AdpError::DimensionMismatch {
                what: "stored memory width",
                expected: fresh.n_instruments() + 1,
                got: w,
            });
        }
    }
    Ok(())
}

/// Laadt artefacten uit `dir`, of valt terug op `fresh` met de reden erbij.
///
/// Een mislukte load wordt gelogd en in de uitkomst teruggegeven, niet ingeslikt.
pub fn resume_or_cold_start<V, P>(
    dir: P,
    fresh: AdpStrategy<V>,
) -> (TrainingArtifacts<V>, ResumeOutcome)
where
    V: StageValue + DeserializeOwned,
    P: AsRef<Path>,
{
    let dir = dir.as_ref();

    if !dir.join(PROGRESS_FILE).exists() {
        let reason = format!("no training artifacts in {}", dir.display());
        info!(dir = %dir.display(), "cold start: no stored artifacts");
        return (
            TrainingArtifacts::fresh(fresh),
            ResumeOutcome::ColdStart { reason },
        );
    }

    let loaded = TrainingArtifacts::<V>::load_from_dir(dir)
        .and_then(|a| check_compatible(&a, &fresh).map(|_| a));

    match loaded {
        Ok(artifacts) => {
            let scenarios_done = artifacts.scenarios_done;
            info!(dir = %dir.display(), scenarios_done, "resumed training artifacts");
            (artifacts, ResumeOutcome::Resumed { scenarios_done })
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "failed to load training artifacts, cold start");
            (
                TrainingArtifacts::fresh(fresh),
                ResumeOutcome::ColdStart {
                    reason: e.to_string(),
                },
            )
        }
    }
}
