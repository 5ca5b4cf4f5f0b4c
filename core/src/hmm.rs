//! Sequence model: a two-state Hidden Markov Model over spending symbols.
//!
//! Hidden states: `NotFraud` (0) and `Fraud` (1).
//! Observations:  the three spending symbols of `encoder::SpendingSymbol`.
//!
//! Training is Baum-Welch with the scaled forward-backward recursion
//! (every alpha row is rescaled to sum to 1, the same factors are reused
//! for beta), so long windows never underflow. Decoding is Viterbi in the
//! log domain.
//!
//! One parameter set belongs to one account. It is created once with
//! random row-normalized values and afterwards only changed by `fit`,
//! which the pipeline calls once per overlapping window of the account's
//! history before decoding the live window.

use crate::{
    error::{ScoreError, ScoreResult},
    rng::ModelRng,
};
use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const NUM_STATES: usize = 2;
pub const NUM_SYMBOLS: usize = 3;
pub const DEFAULT_MAX_ITERS: usize = 100;

/// Smallest emission probability left after re-estimation.
const EMISSION_FLOOR: f64 = 1e-6;

// ── States ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HiddenState {
    NotFraud,
    Fraud,
}

impl HiddenState {
    pub const ALL: [HiddenState; NUM_STATES] = [Self::NotFraud, Self::Fraud];

    pub fn index(self) -> usize {
        match self {
            Self::NotFraud => 0,
            Self::Fraud => 1,
        }
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }
}

// ── Results ──────────────────────────────────────────────────────────────────

/// Scaled forward variables. `scale[t]` is `1 / Σ_i alpha_raw[t][i]`.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    pub alpha: Vec<[f64; NUM_STATES]>,
    pub scale: Vec<f64>,
}

impl ForwardPass {
    /// `log P(obs | model) = -Σ_t ln scale[t]`.
    pub fn log_prob(&self) -> f64 {
        -self.scale.iter().map(|c| c.ln()).sum::<f64>()
    }
}

/// Outcome of one `fit` call.
#[derive(Debug, Clone, Default)]
pub struct FitReport {
    /// Re-estimation steps applied.
    pub iterations: usize,
    /// Log-probability of the window under the parameters kept.
    pub log_prob: f64,
    /// Log-probability before each accepted step; strictly increasing.
    pub trace: Vec<f64>,
}

/// Most likely hidden path for a window.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub states: Vec<HiddenState>,
    /// `exp` of the best path's log score.
    pub probability: f64,
}

/// The model's verdict on one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FraudSignal {
    /// The last decoded state is `Fraud`.
    pub is_fraud: bool,
    /// Log-likelihood of the decoded path under the current parameters.
    pub max_prob: f64,
    /// Share of decoded states that are `Fraud`.
    pub avg_likelihood: f64,
}

// ── Parameters ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct HmmParams {
    pub pi: [f64; NUM_STATES],
    pub a: [[f64; NUM_STATES]; NUM_STATES],
    pub b: [[f64; NUM_SYMBOLS]; NUM_STATES],
    pub log_prob: f64,
    pub old_log_prob: f64,
}

impl HmmParams {
    /// Independent uniform draws, each distribution normalized to sum to 1.
    pub fn random(rng: &mut ModelRng) -> Self {
        let mut pi = [0.0; NUM_STATES];
        fill_normalized(&mut pi, rng);

        let mut a = [[0.0; NUM_STATES]; NUM_STATES];
        for row in a.iter_mut() {
            fill_normalized(row, rng);
        }

        let mut b = [[0.0; NUM_SYMBOLS]; NUM_STATES];
        for row in b.iter_mut() {
            fill_normalized(row, rng);
        }

        Self::from_parts(pi, a, b)
    }

    /// Wrap explicit matrices. Convergence trackers start at -inf.
    pub fn from_parts(
        pi: [f64; NUM_STATES],
        a: [[f64; NUM_STATES]; NUM_STATES],
        b: [[f64; NUM_SYMBOLS]; NUM_STATES],
    ) -> Self {
        Self {
            pi,
            a,
            b,
            log_prob: f64::NEG_INFINITY,
            old_log_prob: f64::NEG_INFINITY,
        }
    }

    /// Reject empty windows and symbols outside the alphabet.
    pub fn validate_observations(obs: &[usize]) -> ScoreResult<()> {
        if obs.is_empty() {
            return Err(ScoreError::EmptyObservation);
        }
        if let Some((position, &symbol)) = obs.iter().enumerate().find(|(_, s)| **s >= NUM_SYMBOLS) {
            return Err(ScoreError::SymbolOutOfRange { symbol, position });
        }
        Ok(())
    }

    /// Scaled forward pass. Records the window's log-probability in `log_prob`.
    pub fn forward(&mut self, obs: &[usize]) -> ScoreResult<ForwardPass> {
        Self::validate_observations(obs)?;
        let pass = self.scaled_forward(obs);
        self.log_prob = pass.log_prob();
        Ok(pass)
    }

    /// Scaled backward pass using the forward pass's scale factors.
    pub fn backward(&self, obs: &[usize], scale: &[f64]) -> ScoreResult<Vec<[f64; NUM_STATES]>> {
        Self::validate_observations(obs)?;
        if scale.len() != obs.len() {
            return Err(anyhow::anyhow!(
                "scale has {} factors for {} observations",
                scale.len(),
                obs.len()
            )
            .into());
        }
        Ok(self.scaled_backward(obs, scale))
    }

    /// Baum-Welch on one window.
    ///
    /// Runs forward -> backward -> expectations -> re-estimate while fewer
    /// than `max_iters` steps have run and each step strictly raises the
    /// log-probability. A step that does not is undone, so the parameters
    /// left behind are the best seen during this call.
    pub fn fit(&mut self, obs: &[usize], max_iters: usize) -> ScoreResult<FitReport> {
        Self::validate_observations(obs)?;

        self.old_log_prob = f64::NEG_INFINITY;
        let mut report = FitReport::default();

        let mut pass = self.scaled_forward(obs);
        self.log_prob = pass.log_prob();
        let mut best = (self.pi, self.a, self.b);

        while report.iterations < max_iters && self.log_prob > self.old_log_prob {
            self.old_log_prob = self.log_prob;
            report.trace.push(self.log_prob);
            best = (self.pi, self.a, self.b);

            let beta = self.scaled_backward(obs, &pass.scale);
            let (gamma, psi) = self.expectations(obs, &pass.alpha, &beta);
            self.reestimate(obs, &gamma, &psi);
            report.iterations += 1;

            pass = self.scaled_forward(obs);
            self.log_prob = pass.log_prob();
        }

        if report.iterations > 0 && !(self.log_prob > self.old_log_prob) {
            (self.pi, self.a, self.b) = best;
            self.log_prob = self.old_log_prob;
        }

        report.log_prob = self.log_prob;
        Ok(report)
    }

    /// Viterbi decoding in the log domain.
    pub fn decode(&self, obs: &[usize]) -> ScoreResult<Decoded> {
        Self::validate_observations(obs)?;
        let t_len = obs.len();

        let mut delta = vec![[f64::NEG_INFINITY; NUM_STATES]; t_len];
        let mut back = vec![[0usize; NUM_STATES]; t_len];

        for i in 0..NUM_STATES {
            delta[0][i] = self.pi[i].ln() + self.b[i][obs[0]].ln();
        }

        for t in 1..t_len {
            for j in 0..NUM_STATES {
                let (best_i, best) =
                    argmax((0..NUM_STATES).map(|i| delta[t - 1][i] + self.a[i][j].ln()));
                delta[t][j] = best + self.b[j][obs[t]].ln();
                back[t][j] = best_i;
            }
        }

        let (last, best) = argmax(delta[t_len - 1].iter().copied());

        let mut path = vec![0usize; t_len];
        path[t_len - 1] = last;
        for t in (0..t_len - 1).rev() {
            path[t] = back[t + 1][path[t + 1]];
        }

        let states = path
            .into_iter()
            .map(|i| HiddenState::from_index(i).unwrap_or(HiddenState::NotFraud))
            .collect();

        Ok(Decoded {
            states,
            probability: best.exp(),
        })
    }

    /// Log-likelihood of a symbol sequence via a scaled forward pass.
    /// Leaves the convergence trackers untouched.
    pub fn log_likelihood(&self, seq: &[usize]) -> ScoreResult<f64> {
        Self::validate_observations(seq)?;
        Ok(self.scaled_forward(seq).log_prob())
    }

    /// Decode a window and summarize it as a fraud signal.
    ///
    /// `max_prob` scores the decoded state path itself (state indices are
    /// valid symbols) with `log_likelihood`, not the Viterbi probability.
    pub fn detect_fraud(&self, obs: &[usize]) -> ScoreResult<FraudSignal> {
        let decoded = self.decode(obs)?;

        let fraud_steps = decoded
            .states
            .iter()
            .filter(|s| **s == HiddenState::Fraud)
            .count();
        let avg_likelihood = fraud_steps as f64 / decoded.states.len() as f64;
        let is_fraud = decoded.states.last() == Some(&HiddenState::Fraud);

        let path: Vec<usize> = decoded.states.iter().map(|s| s.index()).collect();
        let max_prob = self.log_likelihood(&path)?;

        log::debug!(
            "hmm: obs={obs:?} path={path:?} last_fraud={is_fraud} max_prob={max_prob:.4}"
        );

        Ok(FraudSignal {
            is_fraud,
            max_prob,
            avg_likelihood,
        })
    }

    // ── Recursions ───────────────────────────────────────────────────────────

    fn scaled_forward(&self, obs: &[usize]) -> ForwardPass {
        let t_len = obs.len();
        let mut alpha = vec![[0.0; NUM_STATES]; t_len];
        let mut scale = vec![0.0; t_len];

        let mut total = 0.0;
        for i in 0..NUM_STATES {
            alpha[0][i] = self.pi[i] * self.b[i][obs[0]];
            total += alpha[0][i];
        }
        scale[0] = 1.0 / total;
        for value in alpha[0].iter_mut() {
            *value *= scale[0];
        }

        for t in 1..t_len {
            let mut total = 0.0;
            for i in 0..NUM_STATES {
                let mut acc = 0.0;
                for j in 0..NUM_STATES {
                    acc += alpha[t - 1][j] * self.a[j][i];
                }
                alpha[t][i] = acc * self.b[i][obs[t]];
                total += alpha[t][i];
            }
            scale[t] = 1.0 / total;
            for value in alpha[t].iter_mut() {
                *value *= scale[t];
            }
        }

        ForwardPass { alpha, scale }
    }

    fn scaled_backward(&self, obs: &[usize], scale: &[f64]) -> Vec<[f64; NUM_STATES]> {
        let t_len = obs.len();
        let mut beta = vec![[0.0; NUM_STATES]; t_len];

        beta[t_len - 1] = [scale[t_len - 1]; NUM_STATES];

        for t in (0..t_len - 1).rev() {
            for i in 0..NUM_STATES {
                let mut acc = 0.0;
                for j in 0..NUM_STATES {
                    acc += self.a[i][j] * self.b[j][obs[t + 1]] * beta[t + 1][j];
                }
                beta[t][i] = acc * scale[t];
            }
        }

        beta
    }

    /// Di-gamma `gamma[t][i][j]` for t in 0..T-1 and occupancy `psi[t][i]`
    /// for every t; `psi[T-1]` is the last scaled alpha row.
    #[allow(clippy::type_complexity)]
    fn expectations(
        &self,
        obs: &[usize],
        alpha: &[[f64; NUM_STATES]],
        beta: &[[f64; NUM_STATES]],
    ) -> (Vec<[[f64; NUM_STATES]; NUM_STATES]>, Vec<[f64; NUM_STATES]>) {
        let t_len = obs.len();
        let mut gamma = vec![[[0.0; NUM_STATES]; NUM_STATES]; t_len];
        let mut psi = vec![[0.0; NUM_STATES]; t_len];

        for t in 0..t_len - 1 {
            for i in 0..NUM_STATES {
                let mut occupancy = 0.0;
                for j in 0..NUM_STATES {
                    gamma[t][i][j] =
                        alpha[t][i] * self.a[i][j] * self.b[j][obs[t + 1]] * beta[t + 1][j];
                    occupancy += gamma[t][i][j];
                }
                psi[t][i] = occupancy;
            }
        }
        psi[t_len - 1] = alpha[t_len - 1];

        (gamma, psi)
    }

    fn reestimate(
        &mut self,
        obs: &[usize],
        gamma: &[[[f64; NUM_STATES]; NUM_STATES]],
        psi: &[[f64; NUM_STATES]],
    ) {
        let t_len = obs.len();

        let mut pi = psi[0];
        if normalize(&mut pi) {
            self.pi = pi;
        }

        for i in 0..NUM_STATES {
            let denom: f64 = psi[..t_len - 1].iter().map(|p| p[i]).sum();
            if !(denom > 0.0 && denom.is_finite()) {
                continue;
            }
            let mut row = [0.0; NUM_STATES];
            for (j, slot) in row.iter_mut().enumerate() {
                let numer: f64 = gamma[..t_len - 1].iter().map(|g| g[i][j]).sum();
                *slot = numer / denom;
            }
            if normalize(&mut row) {
                self.a[i] = row;
            }
        }

        for i in 0..NUM_STATES {
            let denom: f64 = psi.iter().map(|p| p[i]).sum();
            if !(denom > 0.0 && denom.is_finite()) {
                continue;
            }
            let mut row = [0.0; NUM_SYMBOLS];
            for (j, slot) in row.iter_mut().enumerate() {
                let numer: f64 = psi
                    .iter()
                    .zip(obs)
                    .filter(|(_, o)| **o == j)
                    .map(|(p, _)| p[i])
                    .sum();
                *slot = (numer / denom).max(EMISSION_FLOOR);
            }
            if normalize(&mut row) {
                self.b[i] = row;
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn fill_normalized(row: &mut [f64], rng: &mut ModelRng) {
    for value in row.iter_mut() {
        // Keep every draw strictly positive so no row starts with a hard zero.
        *value = rng.next_f64().max(f64::MIN_POSITIVE);
    }
    normalize(row);
}

/// Scale a row to sum to 1. Leaves it untouched and returns false when the
/// row has no usable mass.
fn normalize(row: &mut [f64]) -> bool {
    let total: f64 = row.iter().sum();
    if !(total > 0.0 && total.is_finite()) || row.iter().any(|v| !v.is_finite()) {
        return false;
    }
    for value in row.iter_mut() {
        *value /= total;
    }
    true
}

/// Index and value of the largest element; ties keep the lowest index.
fn argmax(values: impl Iterator<Item = f64>) -> (usize, f64) {
    let mut best = (0, f64::NEG_INFINITY);
    for (idx, value) in values.enumerate() {
        if value > best.1 {
            best = (idx, value);
        }
    }
    best
}
