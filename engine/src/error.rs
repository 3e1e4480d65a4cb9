// src/error.rs

use thiserror::Error;

/// Result-alias voor de hele engine.
pub type Result<T> = std::result::Result<T, AdpError>;

#[derive(Error, Debug)]
pub enum AdpError {
    /// Vectorlengtes passen niet bij elkaar (N+1 vs N).
    #[error("dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Value function is niet concaaf: instrument is tegelijk koop- en verkoopwaardig.
    /// Contractbreuk van de aanroeper, de solver draait dan niet.
    #[error(
        "concavity violated at instrument {instrument}: buy slope {buy_slope} and sell slope {sell_slope} both positive"
    )]
    ConcavityViolation {
        instrument: usize,
        buy_slope: f64,
        sell_slope: f64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("training memory is empty")]
    EmptyMemory,

    #[error("not enough return vectors: needed {needed}, got {got}")]
    InsufficientReturns { needed: usize, got: usize },

    /// NaN of ±∞ in een update; de value function blijft dan ongewijzigd.
    #[error("non-finite {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("distribution error: {0}")]
    Distribution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AdpError {
    /// Fouten die lokaal opgevangen mogen worden door de positie vast te houden.
    pub fn is_solver_failure(&self) -> bool {
        matches!(self, AdpError::ConcavityViolation { .. })
    }
}

/// Lengtecheck-helper, gebruikt door alle modules.
pub(crate) fn ensure_len(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(AdpError::DimensionMismatch {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

/// Eindigheidscheck voor update-invoer.
pub(crate) fn ensure_finite(what: &'static str, values: &[f64]) -> Result<()> {
    match values.iter().find(|x| !x.is_finite()) {
        Some(&value) => Err(AdpError::NonFinite { what, value }),
        None => Ok(()),
    }
}
