// src/adp/generator.rs

use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{ChiSquared, Distribution, StandardNormal};

use crate::error::{ensure_len, AdpError, Result};

/// Bron van rendementsvectoren (lengte N+1, index 0 = vaste funding-factor).
///
/// Het fitten van de verdeling op marktdata valt buiten de engine; generators
/// krijgen hun parameters van de aanroeper.
pub trait ScenarioGenerator {
    fn n_instruments(&self) -> usize;

    fn generate(&mut self, n: usize) -> Result<Vec<Vec<f64>>>;

    fn draw(&mut self) -> Result<Vec<f64>> {
        self.generate(1)?
            .pop()
            .ok_or_else(|| AdpError::Distribution("generator returned no scenario".into()))
    }
}

/// Onderdriehoekige Cholesky-factor L met L·Lᵀ = cov.
fn cholesky(cov: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let n = cov.len();
    for row in cov {
        ensure_len("covariance row", n, row.len())?;
    }

    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = cov[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if !(sum > 0.0) {
                    return Err(AdpError::Distribution(format!(
                        "covariance matrix is not positive definite (pivot {} = {})",
                        i, sum
                    )));
                }
                l[i][i] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Ok(l)
}

/// Gecorreleerde normale trekking: L·z met z ~ N(0, I).
fn correlated_normal(rng: &mut StdRng, chol: &[Vec<f64>]) -> Vec<f64> {
    let z: Vec<f64> = (0..chol.len()).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
    chol.iter()
        .map(|row| row.iter().zip(&z).map(|(a, b)| a * b).sum())
        .collect()
}

/// Multivariaat normale log-rendementen.
#[derive(Debug, Clone)]
pub struct GaussianGenerator {
    funding: f64,
    mean: Vec<f64>,
    chol: Vec<Vec<f64>>,
    rng: StdRng,
}

impl GaussianGenerator {
    pub fn new(funding_rate: f64, mean: Vec<f64>, cov: Vec<Vec<f64>>, seed: u64) -> Result<Self> {
        ensure_len("covariance", mean.len(), cov.len())?;
        let chol = cholesky(&cov)?;
        Ok(Self {
            funding: 1.0 + funding_rate,
            mean,
            chol,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl ScenarioGenerator for GaussianGenerator {
    fn n_instruments(&self) -> usize {
        self.mean.len()
    }

    fn generate(&mut self, n: usize) -> Result<Vec<Vec<f64>>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let shock = correlated_normal(&mut self.rng, &self.chol);
            let mut r = Vec::with_capacity(self.mean.len() + 1);
            r.push(self.funding);
            r.extend(self.mean.iter().zip(&shock).map(|(m, e)| (m + e).exp()));
            out.push(r);
        }
        Ok(out)
    }
}

/// Student-t (ν vrijheidsgraden) op enkelvoudige rendementen.
#[derive(Debug, Clone)]
pub struct StudentTGenerator {
    funding: f64,
    mean: Vec<f64>,
    chol: Vec<Vec<f64>>,
    nu: f64,
    chi2: ChiSquared<f64>,
    rng: StdRng,
}

impl StudentTGenerator {
    pub fn new(
        funding_rate: f64,
        nu: f64,
        mean: Vec<f64>,
        cov: Vec<Vec<f64>>,
        seed: u64,
    ) -> Result<Self> {
        ensure_len("covariance", mean.len(), cov.len())?;
        let chol = cholesky(&cov)?;
        let chi2 = ChiSquared::new(nu).map_err(|e| AdpError::Distribution(format!("{e}")))?;
        Ok(Self {
            funding: 1.0 + funding_rate,
            mean,
            chol,
            nu,
            chi2,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl ScenarioGenerator for StudentTGenerator {
    fn n_instruments(&self) -> usize {
        self.mean.len()
    }

    fn generate(&mut self, n: usize) -> Result<Vec<Vec<f64>>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let shock = correlated_normal(&mut self.rng, &self.chol);
            let chi2: f64 = self.chi2.sample(&mut self.rng);
            // t = z / sqrt(χ²/ν)
            let scale = (chi2 / self.nu).sqrt().max(f64::MIN_POSITIVE);

            let mut r = Vec::with_capacity(self.mean.len() + 1);
            r.push(self.funding);
            // bruto factor kan niet onder nul (totaalverlies)
            r.extend(
                self.mean
                    .iter()
                    .zip(&shock)
                    .map(|(m, e)| (1.0 + m + e / scale).max(0.0)),
            );
            out.push(r);
        }
        Ok(out)
    }
}

/// Speelt een vaste lijst rendementen af, cyclisch.
#[derive(Debug, Clone)]
pub struct ReplayGenerator {
    returns: Vec<Vec<f64>>,
    cursor: usize,
}

impl ReplayGenerator {
    pub fn new(returns: Vec<Vec<f64>>) -> Result<Self> {
        let width = returns
            .first()
            .map(Vec::len)
            .ok_or_else(|| AdpError::Distribution("replay needs at least one return vector".into()))?;
        if width < 2 {
            return Err(AdpError::DimensionMismatch {
                what: "replay return vector",
                expected: 2,
                got: width,
            });
        }
        for r in &returns {
            ensure_len("replay return vector", width, r.len())?;
        }
        Ok(Self { returns, cursor: 0 })
    }

    /// Elke trekking dezelfde vector.
    pub fn constant(r: Vec<f64>) -> Result<Self> {
        Self::new(vec![r])
    }
}

impl ScenarioGenerator for ReplayGenerator {
    fn n_instruments(&self) -> usize {
        self.returns[0].len() - 1
    }

    fn generate(&mut self, n: usize) -> Result<Vec<Vec<f64>>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.returns[self.cursor].clone());
            self.cursor = (self.cursor + 1) % self.returns.len();
        }
        Ok(out)
    }
}

/// Producer-thread die scenario's vooruit trekt in een begrensde buffer.
///
/// Volgorde blijft die van de onderliggende generator, dus de updates in de
/// trainer lopen nog steeds strikt op scenario-index.
pub struct PrefetchGenerator {
    n_instruments: usize,
    rx: Option<Receiver<Result<Vec<f64>>>>,
    handle: Option<JoinHandle<()>>,
}

impl PrefetchGenerator {
    pub fn spawn<G>(mut inner: G, capacity: usize) -> Self
    where
        G: ScenarioGenerator + Send + 'static,
    {
        let n_instruments = inner.n_instruments();
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));

        let handle = thread::spawn(move || {
            loop {
                let next = inner.draw();
                let stop = next.is_err();
                // consument weg → stoppen
                if tx.send(next).is_err() || stop {
                    break;
                }
            }
        });

        Self {
            n_instruments,
            rx: Some(rx),
            handle: Some(handle),
        }
    }
}

impl ScenarioGenerator for PrefetchGenerator {
    fn n_instruments(&self) -> usize {
        self.n_instruments
    }

    fn generate(&mut self, n: usize) -> Result<Vec<Vec<f64>>> {
        let rx = self
            .rx
            .as_ref()
            .ok_or_else(|| AdpError::Distribution("scenario producer stopped".into()))?;

        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let next = rx
                .recv()
                .map_err(|_| AdpError::Distribution("scenario producer stopped".into()))?;
            out.push(next?);
        }
        Ok(out)
    }
}

impl Drop for PrefetchGenerator {
    fn drop(&mut self) {
        // eerst de receiver sluiten, anders blijft de producer op send() hangen
        self.rx.take();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
