//! Viterbi chord-sequence decoding
//!
//! Log-domain max-product decoding over the beat sequence. The transition
//! model keeps `stay_prob` on the diagonal and spreads the remaining mass over
//! all other states, uniformly or with extra weight on diatonic targets.
//!
//! Labels come from the Viterbi path. Confidence comes from forward-backward
//! posteriors (sum-product in the log domain), so each beat's own evidence
//! shows up in its score: a beat held on the path against its local evidence
//! reports a smaller margin than its neighbours.
//!
//! Ties always resolve to the lowest state index, so decoding is
//! deterministic.

use serde::{Deserialize, Serialize};

use crate::analysis::result::{ChordPath, ChordStep};
use crate::error::AnalysisError;
use crate::schedule::{RunContext, Stage, CHECKPOINT_INTERVAL};

use super::emission::EmissionDistribution;

/// Floor for probabilities before taking logs
pub const PROB_FLOOR: f64 = 1e-12;

/// Relative weight of diatonic targets under [`TransitionWeighting::Diatonic`]
pub const DIATONIC_TRANSITION_WEIGHT: f64 = 2.0;

/// How off-diagonal transition mass is distributed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionWeighting {
    /// `(1 - stay) / (S - 1)` to every other state
    Uniform,
    /// Diatonic targets get twice the weight of non-diatonic ones
    ///
    /// Changes decoding materially: chromatic chords need stronger evidence.
    Diatonic,
}

/// S×S log transition matrix
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionModel {
    states: usize,
    log_probs: Vec<f64>,
}

impl TransitionModel {
    /// Stay on the diagonal, the rest spread uniformly
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `states` is 0 or `stay_prob` is outside (0, 1)
    pub fn uniform(states: usize, stay_prob: f32) -> Result<Self, AnalysisError> {
        Self::weighted(states, stay_prob, |_| 1.0)
    }

    /// Stay on the diagonal, the rest weighted toward diatonic targets
    ///
    /// `diatonic[s]` flags state `s` as diatonic to the active key.
    pub fn diatonic(stay_prob: f32, diatonic: &[bool]) -> Result<Self, AnalysisError> {
        Self::weighted(diatonic.len(), stay_prob, |target| {
            if diatonic[target] {
                DIATONIC_TRANSITION_WEIGHT
            } else {
                1.0
            }
        })
    }

    fn weighted(
        states: usize,
        stay_prob: f32,
        target_weight: impl Fn(usize) -> f64,
    ) -> Result<Self, AnalysisError> {
        if states == 0 {
            return Err(AnalysisError::InvalidInput(
                "Transition model needs at least one state".to_string(),
            ));
        }
        if !(stay_prob > 0.0 && stay_prob < 1.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "Stay probability must be in (0, 1), got {}",
                stay_prob
            )));
        }
        let stay = stay_prob as f64;
        let mut log_probs = vec![0.0f64; states * states];
        if states == 1 {
            return Ok(Self { states, log_probs });
        }
        for from in 0..states {
            let total: f64 = (0..states)
                .filter(|&to| to != from)
                .map(&target_weight)
                .sum();
            for to in 0..states {
                let p = if to == from {
                    stay
                } else {
                    (1.0 - stay) * target_weight(to) / total
                };
                log_probs[from * states + to] = p.max(PROB_FLOOR).ln();
            }
        }
        Ok(Self { states, log_probs })
    }

    /// Number of states
    pub fn states(&self) -> usize {
        self.states
    }

    /// Log probability of moving `from` → `to`
    #[inline]
    pub fn log_prob(&self, from: usize, to: usize) -> f64 {
        self.log_probs[from * self.states + to]
    }
}

/// Decode with a uniform transition model and no checkpoint
///
/// # Example
///
/// ```
/// use stratum_structure::features::chords::emission::EmissionDistribution;
/// use stratum_structure::features::chords::viterbi::decode;
///
/// let a = EmissionDistribution { probabilities: vec![0.9, 0.1] };
/// let b = EmissionDistribution { probabilities: vec![0.2, 0.8] };
/// let path = decode(&[a.clone(), a, b.clone(), b], 0.9)?;
/// assert_eq!(path.chord_ids(), vec![0, 0, 1, 1]);
/// assert!(path.steps[2].is_attack);
/// # Ok::<(), stratum_structure::AnalysisError>(())
/// ```
pub fn decode(emissions: &[EmissionDistribution], stay_prob: f32) -> Result<ChordPath, AnalysisError> {
    let states = emissions.first().map(|e| e.probabilities.len()).unwrap_or(0);
    if emissions.is_empty() {
        return Err(AnalysisError::InsufficientData("No beats to decode".to_string()));
    }
    let model = TransitionModel::uniform(states, stay_prob)?;
    decode_with(emissions, &model, &mut RunContext::new())
}

/// Decode with an explicit transition model, running checkpoints every 64 beats
///
/// # Errors
///
/// - `InsufficientData` if `emissions` is empty
/// - `InvalidInput` if a distribution's length differs from the model's state count
/// - `Cancelled` if the checkpoint cancels
pub fn decode_with(
    emissions: &[EmissionDistribution],
    model: &TransitionModel,
    ctx: &mut RunContext<'_>,
) -> Result<ChordPath, AnalysisError> {
    let t_len = emissions.len();
    let s = model.states();
    if t_len == 0 {
        return Err(AnalysisError::InsufficientData("No beats to decode".to_string()));
    }
    if let Some(i) = emissions.iter().position(|e| e.probabilities.len() != s) {
        return Err(AnalysisError::InvalidInput(format!(
            "Emission at beat {} has {} states, expected {}",
            i,
            emissions[i].probabilities.len(),
            s
        )));
    }

    log::debug!("Viterbi decoding: {} beats, {} states", t_len, s);

    let log_emit = log_emissions(emissions);
    let prior = -(s as f64).ln();

    // Forward pass: max-product delta for the path, sum-product alpha for posteriors
    let mut delta = vec![0.0f64; t_len * s];
    let mut alpha = vec![0.0f64; t_len * s];
    let mut back = vec![0usize; t_len * s];
    let mut terms = vec![0.0f64; s];
    for st in 0..s {
        delta[st] = prior + log_emit[st];
        alpha[st] = delta[st];
    }
    for t in 1..t_len {
        if t % CHECKPOINT_INTERVAL == 0 {
            ctx.checkpoint(Stage::Viterbi, 0.5 * t as f32 / t_len as f32)?;
        }
        for to in 0..s {
            let mut best = f64::NEG_INFINITY;
            let mut arg = 0usize;
            for from in 0..s {
                let lp = model.log_prob(from, to);
                let v = delta[(t - 1) * s + from] + lp;
                if v > best {
                    best = v;
                    arg = from;
                }
                terms[from] = alpha[(t - 1) * s + from] + lp;
            }
            delta[t * s + to] = best + log_emit[t * s + to];
            alpha[t * s + to] = log_sum_exp(&terms) + log_emit[t * s + to];
            back[t * s + to] = arg;
        }
    }

    // Backtrack
    let mut ids = vec![0usize; t_len];
    ids[t_len - 1] = argmax_f64(&delta[(t_len - 1) * s..]);
    for t in (1..t_len).rev() {
        ids[t - 1] = back[t * s + ids[t]];
    }

    // Backward sum-product pass
    let mut beta = vec![0.0f64; t_len * s];
    for t in (0..t_len - 1).rev() {
        if t % CHECKPOINT_INTERVAL == 0 {
            ctx.checkpoint(Stage::Viterbi, 0.5 + 0.5 * (t_len - t) as f32 / t_len as f32)?;
        }
        for from in 0..s {
            for to in 0..s {
                terms[to] = model.log_prob(from, to) + log_emit[(t + 1) * s + to] + beta[(t + 1) * s + to];
            }
            beta[t * s + from] = log_sum_exp(&terms);
        }
    }

    let steps: Vec<ChordStep> = (0..t_len)
        .map(|t| {
            let posterior: Vec<f64> = (0..s).map(|st| alpha[t * s + st] + beta[t * s + st]).collect();
            ChordStep {
                beat_index: t,
                chord_id: ids[t],
                confidence: margin_confidence(&posterior, ids[t]),
                is_attack: t == 0 || ids[t] != ids[t - 1],
            }
        })
        .collect();

    log::debug!(
        "Viterbi path: {} beats, {} chord changes",
        t_len,
        steps.iter().filter(|st| st.is_attack).count()
    );

    Ok(ChordPath { steps })
}

/// Floored log emissions, row-major T×S
fn log_emissions(emissions: &[EmissionDistribution]) -> Vec<f64> {
    let mut out = Vec::with_capacity(emissions.iter().map(|e| e.probabilities.len()).sum());
    for (t, e) in emissions.iter().enumerate() {
        let degenerate = e.probabilities.iter().all(|p| !(p.is_finite() && *p > 0.0));
        if degenerate {
            log::warn!(
                "Numeric degenerate: emission at beat {} is all zero/NaN, flooring to {:e}",
                t,
                PROB_FLOOR
            );
        }
        out.extend(e.probabilities.iter().map(|&p| {
            let p = p as f64;
            if p.is_finite() && p > PROB_FLOOR {
                p.ln()
            } else {
                PROB_FLOOR.ln()
            }
        }));
    }
    out
}

/// `ln(sum(exp(v)))` without overflow; empty or all `-inf` input gives `-inf`
fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|&v| (v - max).exp()).sum::<f64>().ln()
}

/// Lowest index of the maximum; NaN never wins
fn argmax_f64(values: &[f64]) -> usize {
    let mut best = f64::NEG_INFINITY;
    let mut arg = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v > best {
            best = v;
            arg = i;
        }
    }
    arg
}

/// Normalized posterior of `chosen` minus that of the best other state, in [0, 1]
fn margin_confidence(scores: &[f64], chosen: usize) -> f32 {
    if scores.len() < 2 {
        return 1.0;
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|&v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if !(sum.is_finite() && sum > 0.0) {
        return 0.0;
    }
    let runner_up = exps
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != chosen)
        .map(|(_, &e)| e)
        .fold(0.0f64, f64::max);
    ((exps[chosen] - runner_up) / sum).clamp(0.0, 1.0) as f32
}
