// src/training_log.rs

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::adp::trainer::ScenarioReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrainingHealth {
    Healthy,
    Degraded, // te veel opeenvolgende scenario's met solver-fallbacks
}

/// Houdt bij hoeveel scenario's op rij een solver-fallback hadden.
#[derive(Debug, Clone)]
pub struct TrainingSupervisor {
    consecutive_with_fallback: u32,
    degraded_after: u32,
    health: TrainingHealth,
}

impl TrainingSupervisor {
    pub fn new(degraded_after: u32) -> Self {
        Self {
            consecutive_with_fallback: 0,
            degraded_after: degraded_after.max(1),
            health: TrainingHealth::Healthy,
        }
    }

    pub fn register_scenario(&mut self, solver_fallbacks: usize) {
        if solver_fallbacks == 0 {
            // schoon scenario → herstel
            self.consecutive_with_fallback = 0;
            self.health = TrainingHealth::Healthy;
            return;
        }

        self.consecutive_with_fallback += 1;
        if self.consecutive_with_fallback >= self.degraded_after {
            self.health = TrainingHealth::Degraded;
        }
    }

    pub fn health(&self) -> TrainingHealth {
        self.health
    }

    pub fn consecutive_with_fallback(&self) -> u32 {
        self.consecutive_with_fallback
    }
}

/// Eén regel per afgerond trainingsscenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioLogEvent {
    pub ts_utc: i64,
    pub scenario: usize,
    pub alpha: f64,
    pub terminal_wealth: f64,
    pub cvar: f64,
    pub solver_fallbacks: usize,
    pub health: TrainingHealth,
}

impl ScenarioLogEvent {
    pub fn from_report(ts_utc: i64, report: &ScenarioReport, health: TrainingHealth) -> Self {
        Self {
            ts_utc,
            scenario: report.scenario,
            alpha: report.alpha,
            terminal_wealth: report.terminal_wealth,
            cvar: report.cvar,
            solver_fallbacks: report.solver_fallbacks,
            health,
        }
    }
}

/// Convenience: direct JSON-string van één scenario-event.
pub fn encode_scenario_log_event_json(
    ts_utc: i64,
    report: &ScenarioReport,
    health: TrainingHealth,
) -> String {
    let evt = ScenarioLogEvent::from_report(ts_utc, report, health);
    serde_json::to_string(&evt).unwrap_or_else(|_| "{}".to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct SupervisorLogEvent {
    pub ts_utc: i64,
    pub status: TrainingHealth,
    pub msg: &'static str,
    pub consecutive_with_fallback: u32,
}

pub fn encode_supervisor_event_json(ev: &SupervisorLogEvent) -> String {
    serde_json::to_string(ev).unwrap_or_else(|_| "{}".to_string())
}

/// Sink-interface voor trainingslogs (JSON-per-regel).
pub trait TrainingLogSink {
    fn log(&mut self, line: &str);

    /// Optionele flush (default no-op).
    fn flush(&mut self) {}
}

/// Gooit alles weg; handig als de aanroeper geen log wil.
#[derive(Debug, Default)]
pub struct NullTrainingLogger;

impl TrainingLogSink for NullTrainingLogger {
    fn log(&mut self, _line: &str) {}
}

/// Schrijft elke regel naar stdout, of naar een eigen writer (tests).
#[derive(Debug)]
pub struct StdoutTrainingLogger<W: Write = io::Stdout> {
    writer: W,
}

impl StdoutTrainingLogger {
    pub fn new() -> Self {
        Self {
            writer: io::stdout(),
        }
    }
}

impl Default for StdoutTrainingLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> StdoutTrainingLogger<W> {
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TrainingLogSink for StdoutTrainingLogger<W> {
    fn log(&mut self, line: &str) {
        if let Err(e) = writeln!(self.writer, "{}", line) {
            // logging mag de training nooit laten crashen
            tracing::warn!(error = %e, "failed to write training log line");
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!(error = %e, "failed to flush training log writer");
        }
    }
}

/// Buffert N regels en schrijft ze pas door bij vol of flush().
pub struct BatchingTrainingLogger {
    inner: Box<dyn TrainingLogSink>,
    buffer: Vec<String>,
    capacity: usize,
}

impl BatchingTrainingLogger {
    pub fn new(inner: Box<dyn TrainingLogSink>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner,
            buffer: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn flush_inner(&mut self) {
        for line in self.buffer.drain(..) {
            self.inner.log(&line);
        }
        self.inner.flush();
    }

    pub fn into_inner(mut self) -> Box<dyn TrainingLogSink> {
        self.flush_inner();
        self.inner
    }
}

impl TrainingLogSink for BatchingTrainingLogger {
    fn log(&mut self, line: &str) {
        self.buffer.push(line.to_string());
        if self.buffer.len() >= self.capacity {
            self.flush_inner();
        }
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            self.flush_inner();
        }
    }
}

/// Eén `training-YYYYMMDD.jsonl` per UTC-dag.
pub struct FileTrainingLogger {
    log_dir: PathBuf,
    current_date: Option<(i32, u32, u32)>,
    file: Option<File>,
}

impl FileTrainingLogger {
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Self {
        Self {
            log_dir: log_dir.as_ref().to_path_buf(),
            current_date: None,
            file: None,
        }
    }

    pub fn file_name_for(dt: DateTime<Utc>) -> String {
        format!(
            "training-{:04}{:02}{:02}.jsonl",
            dt.year(),
            dt.month(),
            dt.day()
        )
    }

    fn file_for(&mut self, dt: DateTime<Utc>) -> io::Result<&mut File> {
        let date = (dt.year(), dt.month(), dt.day());

        if self.current_date != Some(date) || self.file.is_none() {
            fs::create_dir_all(&self.log_dir)?;
            let path = self.log_dir.join(Self::file_name_for(dt));
            let f = OpenOptions::new().create(true).append(true).open(&path)?;
            self.current_date = Some(date);
            self.file = Some(f);
        }

        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("training log file not open"))
    }

    /// Loggen met een opgegeven tijdstip in plaats van Utc::now().
    pub fn log_with_datetime(&mut self, dt: DateTime<Utc>, line: &str) {
        let written = self
            .file_for(dt)
            .and_then(|file| writeln!(file, "{}", line));

        if let Err(e) = written {
            tracing::warn!(
                error = %e,
                dir = %self.log_dir.display(),
                "failed to write training log file"
            );
        }
    }
}

impl TrainingLogSink for FileTrainingLogger {
    fn log(&mut self, line: &str) {
        self.log_with_datetime(Utc::now(), line);
    }

    fn flush(&mut self) {
        if let Some(f) = &mut self.file {
            let _ = f.flush();
        }
    }
}
