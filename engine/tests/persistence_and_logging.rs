// tests/persistence_and_logging.rs

use std::cell::RefCell;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::rc::Rc;

use chrono::{Datelike, TimeZone, Utc};

use adp_engine::adp::persistence::{
    load_memory, load_strategy, save_memory, save_strategy, MEMORY_FILE, STRATEGY_FILE,
};
use adp_engine::adp::{
    compact_adp_config_demo, resume_or_cold_start, AdpConfig, AdpProfile, AdpStrategy,
    LinearValueFunction, PiecewiseValueFunction, ResumeOutcome, ScenarioReport, TrainingArtifacts,
    TrainingMemory,
};
use adp_engine::training_log::{
    encode_scenario_log_event_json, encode_supervisor_event_json, BatchingTrainingLogger,
    FileTrainingLogger, StdoutTrainingLogger, SupervisorLogEvent, TrainingHealth,
    TrainingLogSink, TrainingSupervisor,
};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    dir.push(format!("adp_engine_{}_{}_{}", tag, std::process::id(), nanos));
    dir
}

fn trained_piecewise() -> AdpStrategy<PiecewiseValueFunction> {
    let mut strategy = AdpStrategy::piecewise_random(3, 2, 4, 0.0, 9);
    strategy
        .stage_mut(1)
        .instruments[0]
        .update(1_234.567, 0.123_456_789, 0.3)
        .unwrap();
    strategy
}

fn sample_memory() -> TrainingMemory {
    let mut memory = TrainingMemory::new();
    memory.record(&[1.0001, 1.0321, 0.977], &[10.0, 250.5, 1_000.125]).unwrap();
    memory.record(&[1.0001, 0.9123, 1.0456], &[0.1, 333.333, 0.0]).unwrap();
    memory
}

#[test]
fn strategy_and_memory_round_trip_losslessly() {
    let dir = unique_temp_dir("roundtrip");
    fs::create_dir_all(&dir).expect("cannot create test dir");

    let strategy = trained_piecewise();
    save_strategy(&strategy, dir.join(STRATEGY_FILE)).unwrap();
    let loaded: AdpStrategy<PiecewiseValueFunction> = load_strategy(dir.join(STRATEGY_FILE)).unwrap();
    assert_eq!(loaded, strategy);

    let linear = AdpStrategy::linear_random(2, 3, 17);
    save_strategy(&linear, dir.join("linear.json")).unwrap();
    let loaded: AdpStrategy<LinearValueFunction> = load_strategy(dir.join("linear.json")).unwrap();
    assert_eq!(loaded, linear);

    let memory = sample_memory();
    save_memory(&memory, dir.join(MEMORY_FILE)).unwrap();
    assert_eq!(load_memory(dir.join(MEMORY_FILE)).unwrap(), memory);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn cold_start_when_no_artifacts_exist() {
    let dir = unique_temp_dir("cold");
    let fresh = AdpStrategy::piecewise_uniform(3, 2, 4, 0.0);

    let (artifacts, outcome) = resume_or_cold_start(&dir, fresh.clone());

    assert!(matches!(outcome, ResumeOutcome::ColdStart { .. }), "got {:?}", outcome);
    assert_eq!(artifacts.strategy, fresh);
    assert!(artifacts.memory.is_empty());
    assert_eq!(artifacts.scenarios_done, 0);
}

#[test]
fn resume_after_save_restores_everything() {
    let dir = unique_temp_dir("resume");
    let saved = TrainingArtifacts {
        strategy: trained_piecewise(),
        memory: sample_memory(),
        scenarios_done: 42,
    };
    saved.save_to_dir(&dir).unwrap();

    let fresh = AdpStrategy::piecewise_uniform(3, 2, 4, 0.0);
    let (artifacts, outcome) = resume_or_cold_start(&dir, fresh);

    assert_eq!(outcome, ResumeOutcome::Resumed { scenarios_done: 42 });
    assert_eq!(artifacts, saved);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn corrupt_or_incompatible_artifacts_fall_back_with_reason() {
    let dir = unique_temp_dir("corrupt");
    TrainingArtifacts::fresh(trained_piecewise())
        .save_to_dir(&dir)
        .unwrap();

    // andere horizon → niet bruikbaar
    let (_, outcome) = resume_or_cold_start(&dir, AdpStrategy::piecewise_uniform(5, 2, 4, 0.0));
    match outcome {
        ResumeOutcome::ColdStart { reason } => {
            assert!(reason.contains("horizon"), "reason was {}", reason)
        }
        other => panic!("expected cold start, got {:?}", other),
    }

    fs::write(dir.join(STRATEGY_FILE), "{ not json").unwrap();
    let fresh = AdpStrategy::piecewise_uniform(3, 2, 4, 0.0);
    let (artifacts, outcome) = resume_or_cold_start(&dir, fresh.clone());
    match outcome {
        ResumeOutcome::ColdStart { reason } => assert!(!reason.is_empty()),
        other => panic!("expected cold start, got {:?}", other),
    }
    assert_eq!(artifacts.strategy, fresh);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn inconsistent_stored_memory_or_strategy_falls_back_to_cold_start() {
    let dir = unique_temp_dir("inconsistent");
    let fresh = AdpStrategy::piecewise_uniform(3, 2, 4, 0.0);
    TrainingArtifacts {
        strategy: trained_piecewise(),
        memory: sample_memory(),
        scenarios_done: 1,
    }
    .save_to_dir(&dir)
    .unwrap();

    let broken_memories = [
        // rendementsrij smaller dan de state
        r#"{"terminal_returns":[[1.0]],"terminal_states":[[1.0,2.0,3.0]],"terminal_wealth":[1.0]}"#,
        // buffers niet even lang
        r#"{"terminal_returns":[[1.0,1.0,1.0],[1.0,1.0,1.0]],"terminal_states":[[1.0,2.0,3.0]],"terminal_wealth":[6.0]}"#,
        // eindvermogen past niet bij R_T en h
        r#"{"terminal_returns":[[1.0,1.0,1.0]],"terminal_states":[[1.0,2.0,3.0]],"terminal_wealth":[7.5]}"#,
    ];
    for raw in broken_memories {
        assert!(serde_json::from_str::<TrainingMemory>(raw).is_err(), "{} must not load", raw);

        fs::write(dir.join(MEMORY_FILE), raw).unwrap();
        let (artifacts, outcome) = resume_or_cold_start(&dir, fresh.clone());
        assert!(
            matches!(outcome, ResumeOutcome::ColdStart { .. }),
            "memory {} gave {:?}",
            raw,
            outcome
        );
        assert!(artifacts.memory.is_empty());
    }

    let consistent =
        r#"{"terminal_returns":[[1.0,1.0,1.0]],"terminal_states":[[1.0,2.0,3.0]],"terminal_wealth":[6.0]}"#;
    assert_eq!(serde_json::from_str::<TrainingMemory>(consistent).unwrap().len(), 1);

    fs::write(dir.join(MEMORY_FILE), serde_json::to_string(&sample_memory()).unwrap()).unwrap();
    fs::write(dir.join(STRATEGY_FILE), r#"{"stages":[]}"#).unwrap();
    let (artifacts, outcome) = resume_or_cold_start(&dir, fresh.clone());
    assert!(matches!(outcome, ResumeOutcome::ColdStart { .. }), "got {:?}", outcome);
    assert_eq!(artifacts.strategy, fresh);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn config_json_file_round_trip_and_validation() {
    let dir = unique_temp_dir("config");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("adp.json");

    let cfg = compact_adp_config_demo();
    fs::write(&path, serde_json::to_string_pretty(&cfg).unwrap()).unwrap();
    assert_eq!(AdpConfig::from_json_file(&path).unwrap(), cfg);

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"kind\": \"harmonic\""), "step size should be tagged: {}", raw);

    let mut bad = cfg.clone();
    bad.theta = 1.5;
    fs::write(&path, serde_json::to_string(&bad).unwrap()).unwrap();
    assert!(AdpConfig::from_json_file(&path).is_err());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn profiles_are_valid_and_selectable() {
    for profile in [AdpProfile::Weekly, AdpProfile::Demo] {
        let cfg = profile.config();
        assert!(cfg.validate().is_ok(), "profile {} must validate", profile.as_str());
        assert_eq!(AdpProfile::parse(profile.as_str()), profile);
    }
    assert_eq!(AdpProfile::parse("unknown"), AdpProfile::Demo);

    let weekly = AdpProfile::Weekly.config();
    assert_eq!(weekly.horizon, 52);
    assert_eq!(weekly.scenarios, 4_000);
    assert_eq!(weekly.position_cap(), Some(0.5 * weekly.initial_capital));
}

// ===== logging =====

fn sample_report() -> ScenarioReport {
    ScenarioReport {
        scenario: 7,
        alpha: 0.25,
        terminal_wealth: 101_000.0,
        cvar: -95_000.0,
        delta_cvar: vec![-1.0, -1.02],
        solver_fallbacks: 1,
    }
}

#[test]
fn encode_scenario_log_event_json_contains_core_fields() {
    let line = encode_scenario_log_event_json(1_700_000_000, &sample_report(), TrainingHealth::Degraded);
    let v: serde_json::Value = serde_json::from_str(&line).expect("valid json");

    assert_eq!(v["ts_utc"], 1_700_000_000i64);
    assert_eq!(v["scenario"], 7);
    assert_eq!(v["alpha"], 0.25);
    assert_eq!(v["terminal_wealth"], 101_000.0);
    assert_eq!(v["cvar"], -95_000.0);
    assert_eq!(v["solver_fallbacks"], 1);
    assert_eq!(v["health"], "Degraded");
}

#[test]
fn encode_supervisor_event_json_contains_core_fields() {
    let ev = SupervisorLogEvent {
        ts_utc: 123,
        status: TrainingHealth::Degraded,
        msg: "repeated solver fallbacks",
        consecutive_with_fallback: 3,
    };
    let v: serde_json::Value = serde_json::from_str(&encode_supervisor_event_json(&ev)).unwrap();
    assert_eq!(v["status"], "Degraded");
    assert_eq!(v["consecutive_with_fallback"], 3);
    assert_eq!(v["msg"], "repeated solver fallbacks");
}

#[test]
fn stdout_training_logger_writes_exact_line_plus_newline() {
    let mut logger = StdoutTrainingLogger::with_writer(Cursor::new(Vec::<u8>::new()));
    let json_line = r#"{"scenario":1,"cvar":-5.0}"#;

    logger.log(json_line);
    logger.flush();

    let written = String::from_utf8(logger.into_inner().into_inner()).expect("valid utf8");
    assert_eq!(written, format!("{}\n", json_line));
}

struct SpyWrapper(Rc<RefCell<Vec<String>>>);

impl TrainingLogSink for SpyWrapper {
    fn log(&mut self, line: &str) {
        self.0.borrow_mut().push(line.to_string());
    }
}

#[test]
fn batching_training_logger_buffers_until_capacity_or_flush() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut logger = BatchingTrainingLogger::new(Box::new(SpyWrapper(seen.clone())), 3);

    logger.log("{\"a\":1}");
    logger.log("{\"b\":2}");
    assert_eq!(logger.buffered_len(), 2);
    assert!(seen.borrow().is_empty(), "nothing forwarded before capacity");

    logger.log("{\"c\":3}");
    assert_eq!(logger.buffered_len(), 0);
    assert_eq!(seen.borrow().len(), 3);

    logger.log("{\"d\":4}");
    logger.flush();
    assert_eq!(seen.borrow().as_slice(), ["{\"a\":1}", "{\"b\":2}", "{\"c\":3}", "{\"d\":4}"]);
}

#[test]
fn file_training_logger_rotates_per_utc_day() {
    let dir = unique_temp_dir("logs");
    let mut logger = FileTrainingLogger::new(&dir);

    let d1 = Utc.with_ymd_and_hms(2025, 11, 17, 10, 0, 0).single().expect("valid test datetime");
    logger.log_with_datetime(d1, "{\"scenario\":0}");
    logger.log_with_datetime(d1, "{\"scenario\":1}");

    let d2 = Utc.with_ymd_and_hms(2025, 11, 18, 0, 0, 1).single().expect("valid test datetime");
    logger.log_with_datetime(d2, "{\"scenario\":2}");
    logger.flush();

    let f1 = dir.join(format!("training-{:04}{:02}{:02}.jsonl", d1.year(), d1.month(), d1.day()));
    let f2 = dir.join(FileTrainingLogger::file_name_for(d2));
    assert_eq!(f2.file_name().and_then(|n| n.to_str()), Some("training-20251118.jsonl"));

    let c1 = fs::read_to_string(&f1).unwrap();
    assert_eq!(c1.lines().collect::<Vec<_>>(), ["{\"scenario\":0}", "{\"scenario\":1}"]);
    let c2 = fs::read_to_string(&f2).unwrap();
    assert_eq!(c2.lines().collect::<Vec<_>>(), ["{\"scenario\":2}"]);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn supervisor_degrades_after_threshold_and_recovers() {
    let mut sup = TrainingSupervisor::new(2);
    assert_eq!(sup.health(), TrainingHealth::Healthy);

    sup.register_scenario(1);
    assert_eq!(sup.health(), TrainingHealth::Healthy, "one bad scenario is tolerated");

    sup.register_scenario(3);
    assert_eq!(sup.health(), TrainingHealth::Degraded);
    assert_eq!(sup.consecutive_with_fallback(), 2);

    sup.register_scenario(0);
    assert_eq!(sup.health(), TrainingHealth::Healthy);
    assert_eq!(sup.consecutive_with_fallback(), 0);
}
