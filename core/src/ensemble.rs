//! Ensemble fusion of the sequence-model signal and the classifier.
//!
//! The classifier's fraud probability is always the numeric risk score.
//! The sequence model only contributes a boolean override and the
//! fraud-state share of the current window.

use crate::{
    config::EnsembleConfig, hmm::FraudSignal, ip_reputation::IpReputation, types::finite_or_zero,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPath {
    /// Too little history: the classifier decides alone.
    ColdStart,
    /// Sequence model trained and consulted.
    SequenceModel,
}

/// Sequence-model readings for the previous and current windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceSignal {
    pub previous: FraudSignal,
    pub current: FraudSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionDecision {
    pub path: ScoringPath,
    pub is_fraud: bool,
    pub risk_score: f64,
    pub is_hmm_fraud: bool,
    pub likelihood: f64,
    #[serde(default)]
    pub suspicious_ip: bool,
}

/// A log-likelihood shift between windows beyond `tolerance`, or one that
/// cannot be computed, counts as a sequence-model fraud signal.
pub fn hmm_shift_detected(previous_max_prob: f64, current_max_prob: f64, tolerance: f64) -> bool {
    let shift = previous_max_prob - current_max_prob;
    shift.is_nan() || shift.abs() > tolerance
}

/// Decision when the sequence model is bypassed.
pub fn cold_start(fraud_probability: f64, config: &EnsembleConfig) -> FusionDecision {
    let risk_score = finite_or_zero(fraud_probability);
    FusionDecision {
        path: ScoringPath::ColdStart,
        is_fraud: risk_score >= config.cold_start_threshold,
        risk_score,
        is_hmm_fraud: false,
        likelihood: 0.0,
        suspicious_ip: false,
    }
}

/// Combine the sequence-model flag, its likelihood and the classifier.
pub fn combine(
    is_hmm_fraud: bool,
    likelihood: f64,
    fraud_probability: f64,
    config: &EnsembleConfig,
) -> FusionDecision {
    let risk_score = finite_or_zero(fraud_probability);
    let likelihood = finite_or_zero(likelihood);
    FusionDecision {
        path: ScoringPath::SequenceModel,
        is_fraud: likelihood >= config.likelihood_threshold
            || risk_score >= config.classifier_threshold
            || is_hmm_fraud,
        risk_score,
        is_hmm_fraud,
        likelihood,
        suspicious_ip: false,
    }
}

/// Full-path fusion from the two window readings.
pub fn fuse(signal: &SequenceSignal, fraud_probability: f64, config: &EnsembleConfig) -> FusionDecision {
    let is_hmm_fraud = hmm_shift_detected(
        signal.previous.max_prob,
        signal.current.max_prob,
        config.hmm_shift_tolerance,
    );
    combine(is_hmm_fraud, signal.current.avg_likelihood, fraud_probability, config)
}

/// Fold the source address into a decision from either path.
///
/// A suspicious address is always reported. Only a blocked blacklist
/// entry forces a fraud flag, and only when the config says so; earlier
/// fraud from the address is left to the classifier's judgement.
pub fn apply_ip_reputation(
    mut decision: FusionDecision,
    reputation: &IpReputation,
    config: &EnsembleConfig,
) -> FusionDecision {
    decision.suspicious_ip = reputation.suspicious();
    if reputation.blacklisted && config.blacklisted_ip_is_fraud {
        decision.is_fraud = true;
    }
    decision
}
