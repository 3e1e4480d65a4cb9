// src/adp/memory.rs

use serde::{Deserialize, Serialize};

use crate::error::{ensure_finite, ensure_len, AdpError, Result};

/// Rollende, append-only historie van afgeronde scenario's.
///
/// Per scenario: laatste rendementsvector R_T, post-decision state h⁺_{T-1}
/// en het eindvermogen Σ R_T ⊙ h⁺_{T-1}. De CVaR wordt steeds over alles
/// tot nu toe berekend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MemoryParts")]
pub struct TrainingMemory {
    terminal_returns: Vec<Vec<f64>>,
    terminal_states: Vec<Vec<f64>>,
    terminal_wealth: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct MemoryParts {
    terminal_returns: Vec<Vec<f64>>,
    terminal_states: Vec<Vec<f64>>,
    terminal_wealth: Vec<f64>,
}

impl TryFrom<MemoryParts> for TrainingMemory {
    type Error = AdpError;

    fn try_from(p: MemoryParts) -> Result<Self> {
        TrainingMemory::from_parts(p.terminal_returns, p.terminal_states, p.terminal_wealth)
    }
}

fn terminal_value(r: &[f64], h: &[f64]) -> f64 {
    r.iter().zip(h).map(|(r, h)| r * h).sum()
}

impl TrainingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Herbouwt een geheugen uit opgeslagen buffers.
    ///
    /// Eisen: drie buffers even lang, alle rijen even breed, alles eindig en
    /// elk eindvermogen gelijk aan Σ R_T ⊙ h⁺ van zijn scenario.
    pub fn from_parts(
        terminal_returns: Vec<Vec<f64>>,
        terminal_states: Vec<Vec<f64>>,
        terminal_wealth: Vec<f64>,
    ) -> Result<Self> {
        let len = terminal_wealth.len();
        ensure_len("stored terminal returns", len, terminal_returns.len())?;
        ensure_len("stored terminal states", len, terminal_states.len())?;
        ensure_finite("stored terminal wealth", &terminal_wealth)?;

        if let Some(width) = terminal_states.first().map(Vec::len) {
            for (r, h) in terminal_returns.iter().zip(&terminal_states) {
                ensure_len("stored terminal return", width, r.len())?;
                ensure_len("stored terminal state", width, h.len())?;
                ensure_finite("stored terminal return", r)?;
                ensure_finite("stored terminal state", h)?;
            }
        }

        for (k, ((r, h), w)) in terminal_returns
            .iter()
            .zip(&terminal_states)
            .zip(&terminal_wealth)
            .enumerate()
        {
            let expected = terminal_value(r, h);
            if (expected - w).abs() > 1e-9 * expected.abs().max(1.0) {
                return Err(AdpError::InvalidConfig(format!(
                    "stored terminal wealth {} of scenario {} does not match returns and state ({})",
                    w, k, expected
                )));
            }
        }

        Ok(Self {
            terminal_returns,
            terminal_states,
            terminal_wealth,
        })
    }

    pub fn len(&self) -> usize {
        self.terminal_wealth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terminal_wealth.is_empty()
    }

    /// Breedte N+1 van de opgeslagen vectoren (None zolang leeg).
    pub fn width(&self) -> Option<usize> {
        self.terminal_states.first().map(Vec::len)
    }

    /// Voeg één scenario toe; geeft het eindvermogen terug.
    pub fn record(&mut self, r_terminal: &[f64], h_plus: &[f64]) -> Result<f64> {
        ensure_len("terminal return", h_plus.len(), r_terminal.len())?;
        if let Some(w) = self.width() {
            ensure_len("terminal state", w, h_plus.len())?;
        }

        let wealth = terminal_value(r_terminal, h_plus);

        self.terminal_returns.push(r_terminal.to_vec());
        self.terminal_states.push(h_plus.to_vec());
        self.terminal_wealth.push(wealth);

        Ok(wealth)
    }

    pub fn terminal_outcomes(&self) -> &[f64] {
        &self.terminal_wealth
    }

    /// Eindvermogens als elk scenario één extra eenheid van component i had gehad.
    pub fn perturbed_outcomes(&self, i: usize) -> Vec<f64> {
        self.terminal_wealth
            .iter()
            .zip(&self.terminal_returns)
            .map(|(w, r)| w + r[i])
            .collect()
    }

    /// Laatste `record` terugdraaien.
    pub(crate) fn discard_last(&mut self) {
        self.terminal_returns.pop();
        self.terminal_states.pop();
        self.terminal_wealth.pop();
    }

    pub fn clear(&mut self) {
        self.terminal_returns.clear();
        self.terminal_states.clear();
        self.terminal_wealth.clear();
    }
}
