// src/adp/value_function/piecewise.rs

use serde::{Deserialize, Serialize};

use super::StageValue;
use crate::error::{ensure_finite, ensure_len, AdpError, Result};

/// Breakpoints die dichter dan dit bij elkaar liggen gelden als dezelfde.
const BREAKPOINT_EPS: f64 = 1e-9;

/// Concave, stuksgewijs lineaire waarde van één instrumentpositie.
///
/// - `breakpoints` oplopend, `breakpoints[0] == 0.0`
/// - `slopes[j]` geldt op `[breakpoints[j], breakpoints[j+1])`, de laatste tot oneindig
/// - `slopes` niet-stijgend, aantal breakpoints ≤ `max_breakpoints`
///
/// Updates gebeuren online: een nieuwe breakpoint op de gemeten positie, daarna
/// segmenten samenvoegen tot de slopes weer concaaf zijn en de capaciteit klopt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PwlSlopesParts")]
pub struct PwlSlopes {
    breakpoints: Vec<f64>,
    slopes: Vec<f64>,
    max_breakpoints: usize,
    rounding: f64,
}

/// Ruwe vorm voor deserialisatie; invarianten worden daarna gecontroleerd.
#[derive(Debug, Clone, Deserialize)]
struct PwlSlopesParts {
    breakpoints: Vec<f64>,
    slopes: Vec<f64>,
    max_breakpoints: usize,
    rounding: f64,
}

impl TryFrom<PwlSlopesParts> for PwlSlopes {
    type Error = AdpError;

    fn try_from(p: PwlSlopesParts) -> Result<Self> {
        PwlSlopes::from_parts(p.breakpoints, p.slopes, p.max_breakpoints, p.rounding)
    }
}

impl PwlSlopes {
    /// Eén segment vanaf 0 met vaste slope.
    pub fn flat(slope: f64, max_breakpoints: usize, rounding: f64) -> Self {
        Self {
            breakpoints: vec![0.0],
            slopes: vec![slope],
            max_breakpoints: max_breakpoints.max(1),
            rounding: rounding.max(0.0),
        }
    }

    pub fn from_parts(
        breakpoints: Vec<f64>,
        slopes: Vec<f64>,
        max_breakpoints: usize,
        rounding: f64,
    ) -> Result<Self> {
        ensure_len("pwl slopes", breakpoints.len(), slopes.len())?;
        if breakpoints.is_empty() {
            return Err(AdpError::InvalidConfig("pwl needs at least one segment".into()));
        }
        if max_breakpoints == 0 || breakpoints.len() > max_breakpoints {
            return Err(AdpError::InvalidConfig(format!(
                "pwl has {} breakpoints, max is {}",
                breakpoints.len(),
                max_breakpoints
            )));
        }
        if breakpoints[0] != 0.0 {
            return Err(AdpError::InvalidConfig(format!(
                "first breakpoint must be 0, got {}",
                breakpoints[0]
            )));
        }
        if breakpoints.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(AdpError::InvalidConfig(
                "pwl breakpoints must be strictly ascending".into(),
            ));
        }

        let pwl = Self {
            breakpoints,
            slopes,
            max_breakpoints,
            rounding: rounding.max(0.0),
        };
        if !pwl.is_concave() {
            return Err(AdpError::InvalidConfig("pwl slopes must be non-increasing".into()));
        }
        Ok(pwl)
    }

    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }

    pub fn slopes(&self) -> &[f64] {
        &self.slopes
    }

    pub fn max_breakpoints(&self) -> usize {
        self.max_breakpoints
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    pub fn is_concave(&self) -> bool {
        self.slopes.windows(2).all(|w| w[0] >= w[1])
    }

    /// π: laatste breakpoint ≤ x (negatieve posities vallen in segment 0).
    pub fn segment_index(&self, x: f64) -> usize {
        self.breakpoints
            .partition_point(|&a| a <= x)
            .saturating_sub(1)
    }

    pub fn slope_at(&self, x: f64) -> f64 {
        self.slopes[self.segment_index(x)]
    }

    /// Oppervlakte onder de slope-curve van 0 tot x.
    pub fn value(&self, x: f64) -> f64 {
        let p = self.segment_index(x);
        let mut area = 0.0;
        for j in 0..p {
            area += self.slopes[j] * (self.breakpoints[j + 1] - self.breakpoints[j]);
        }
        area + self.slopes[p] * (x - self.breakpoints[p])
    }

    fn round_position(&self, x: f64) -> f64 {
        let x = x.max(0.0);
        if self.rounding > 0.0 {
            (x / self.rounding).round() * self.rounding
        } else {
            x
        }
    }

    /// Online update van de slope op `position` richting `target_slope`.
    ///
    /// NaN of ±∞ in de invoer geeft `NonFinite` en laat de slopes ongemoeid.
    pub fn update(&mut self, position: f64, target_slope: f64, alpha: f64) -> Result<()> {
        ensure_finite("pwl update input", &[position, target_slope, alpha])?;

        // 1) segment + blend
        let x = self.round_position(position);
        let p = self.segment_index(x);
        let new_slope = (1.0 - alpha) * self.slopes[p] + alpha * target_slope;

        // 2) bestaande breakpoint vervangen, anders segment splitsen
        let at = if (x - self.breakpoints[p]).abs() <= BREAKPOINT_EPS * x.abs().max(1.0) {
            self.slopes[p] = new_slope;
            p
        } else {
            self.breakpoints.insert(p + 1, x);
            self.slopes.insert(p + 1, new_slope);
            p + 1
        };

        // 3) concaviteit, 4) capaciteit
        self.restore_concavity(at);
        self.enforce_capacity();

        debug_assert!(self.is_concave(), "pwl lost concavity after update");
        Ok(())
    }

    /// Lengte van segment j; het laatste (onbegrensde) segment telt even zwaar als zijn linkerbuur.
    fn segment_len(&self, j: usize) -> f64 {
        if j + 1 < self.breakpoints.len() {
            self.breakpoints[j + 1] - self.breakpoints[j]
        } else if j > 0 {
            self.breakpoints[j] - self.breakpoints[j - 1]
        } else {
            1.0
        }
    }

    /// Voeg segment j en j+1 samen (lengte-gewogen), breakpoint j+1 verdwijnt.
    fn merge_with_next(&mut self, j: usize) {
        let (w_l, w_r) = (self.segment_len(j), self.segment_len(j + 1));
        let (s_l, s_r) = (self.slopes[j], self.slopes[j + 1]);

        let merged = (w_l * s_l + w_r * s_r) / (w_l + w_r);
        // afrondingsruis mag niet buiten [s_r, s_l] vallen
        self.slopes[j] = merged.clamp(s_l.min(s_r), s_l.max(s_r));

        self.breakpoints.remove(j + 1);
        self.slopes.remove(j + 1);
    }

    fn restore_concavity(&mut self, mut p: usize) {
        loop {
            if p > 0 && self.slopes[p] > self.slopes[p - 1] {
                self.merge_with_next(p - 1);
                p -= 1;
                continue;
            }
            if p + 1 < self.slopes.len() && self.slopes[p] < self.slopes[p + 1] {
                self.merge_with_next(p);
                continue;
            }
            break;
        }
    }

    /// Te veel breakpoints: buren met het kleinste slope-verschil samenvoegen.
    fn enforce_capacity(&mut self) {
        while self.slopes.len() > self.max_breakpoints {
            let mut best = 0;
            let mut best_gap = f64::INFINITY;
            for j in 0..self.slopes.len() - 1 {
                let gap = self.slopes[j] - self.slopes[j + 1];
                if gap < best_gap {
                    best_gap = gap;
                    best = j;
                }
            }
            self.merge_with_next(best);
        }
    }
}

/// Cash lineair, elk instrument een eigen concave PWL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseValueFunction {
    pub cash_slope: f64,
    pub instruments: Vec<PwlSlopes>,
}

impl PiecewiseValueFunction {
    pub fn new(cash_slope: f64, instruments: Vec<PwlSlopes>) -> Self {
        Self {
            cash_slope,
            instruments,
        }
    }

    pub fn uniform(n_instruments: usize, max_breakpoints: usize, rounding: f64) -> Self {
        Self {
            cash_slope: 1.0,
            instruments: (0..n_instruments)
                .map(|_| PwlSlopes::flat(1.0, max_breakpoints, rounding))
                .collect(),
        }
    }
}

impl StageValue for PiecewiseValueFunction {
    fn n_instruments(&self) -> usize {
        self.instruments.len()
    }

    fn value(&self, h: &[f64]) -> f64 {
        let cash = h.first().copied().unwrap_or(0.0);
        self.cash_slope * cash
            + self
                .instruments
                .iter()
                .zip(h.iter().skip(1))
                .map(|(pwl, &x)| pwl.value(x))
                .sum::<f64>()
    }

    fn marginal_slopes(&self, h: &[f64]) -> Vec<f64> {
        let mut u = Vec::with_capacity(self.instruments.len() + 1);
        u.push(self.cash_slope);
        for (pwl, &x) in self.instruments.iter().zip(h.iter().skip(1)) {
            u.push(pwl.slope_at(x));
        }
        u
    }

    fn apply_target(&mut self, position: &[f64], target: &[f64], alpha: f64) -> Result<()> {
        let n1 = self.instruments.len() + 1;
        ensure_len("pwl update position", n1, position.len())?;
        ensure_len("pwl update target", n1, target.len())?;
        // alles vooraf checken, een halve update laat geen gemengde stage achter
        ensure_finite("pwl update position", position)?;
        ensure_finite("pwl update target", target)?;
        ensure_finite("step size", &[alpha])?;

        self.cash_slope = (1.0 - alpha) * self.cash_slope + alpha * target[0];
        for (i, pwl) in self.instruments.iter_mut().enumerate() {
            pwl.update(position[i + 1], target[i + 1], alpha)?;
        }
        Ok(())
    }
}
