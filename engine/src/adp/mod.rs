// src/adp/mod.rs

pub mod baseline;
pub mod config;
pub mod cvar;
pub mod generator;
pub mod memory;
pub mod persistence;
pub mod solver;
pub mod trainer;
pub mod transition;
pub mod value_function;

pub use baseline::{buy_and_hold_wealth, BaselineSolver, EqualWeightBaseline, MaxExpectedReturnBaseline};
pub use config::{
    compact_adp_config_demo, default_adp_config_weekly, AdpConfig, AdpProfile, StepSizeSchedule,
    ValueInit,
};
pub use cvar::{cvar_of_losses, delta_cvar, empirical_cvar, tail_count};
pub use generator::{
    GaussianGenerator, PrefetchGenerator, ReplayGenerator, ScenarioGenerator, StudentTGenerator,
};
pub use memory::TrainingMemory;
pub use persistence::{resume_or_cold_start, ResumeOutcome, TrainingArtifacts};
pub use solver::{
    check_concavity, AllocationSolver, BoundedInspectionSolver, InspectionSolver,
    Solver, Trades,
};
pub use trainer::{score, ScenarioReport, ScoreReport, Trainer, TrainingSummary};
pub use transition::{pre_decision, total_wealth, transition};
pub use value_function::{
    AdpStrategy, LinearValueFunction, PiecewiseValueFunction, PwlSlopes, StageValue,
};
