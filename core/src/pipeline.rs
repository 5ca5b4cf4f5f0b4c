//! Typed per-call state threaded through the scoring stages.
//!
//! Each stage takes what the previous one produced from here rather than
//! from an untyped request bag, so stage contracts are checked statically.

use crate::{
    account::Account,
    classifier::{ClassifierFeatures, ClassifierPrediction},
    clustering::SpendingHabits,
    ensemble::{FusionDecision, ScoringPath},
    hmm::FitReport,
    ip_reputation::IpReputation,
    transaction::Transaction,
    types::{CardNumber, TransactionId},
};
use serde::{Deserialize, Serialize};

/// Everything known about one scoring call once the transaction is stored.
#[derive(Debug, Clone)]
pub struct ScoringContext {
    pub account: Account,
    pub account_opened: bool,
    pub transaction: Transaction,
    /// Every earlier transaction on the card, oldest first.
    pub history: Vec<Transaction>,
    /// Default when the submission carried no address.
    pub ip_reputation: IpReputation,
}

impl ScoringContext {
    /// Earlier transactions that were not flagged as fraud, oldest first.
    pub fn valid_history(&self) -> Vec<&Transaction> {
        self.history.iter().filter(|t| !t.is_fraud).collect()
    }

    pub fn valid_amounts(&self) -> Vec<f64> {
        self.valid_history().iter().map(|t| t.amount).collect()
    }
}

/// Classifier stage output.
#[derive(Debug, Clone)]
pub struct ClassifierStage {
    pub features: ClassifierFeatures,
    pub prediction: ClassifierPrediction,
    pub fraud_probability: f64,
}

/// Sequence-model stage output.
#[derive(Debug, Clone)]
pub struct SequenceStage {
    pub habits: SpendingHabits,
    pub previous_window: Vec<usize>,
    pub current_window: Vec<usize>,
    pub windows_trained: usize,
    pub last_fit: FitReport,
    pub total_iterations: usize,
}

/// What a scoring call returns to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringOutcome {
    pub transaction_id: TransactionId,
    pub card_number: CardNumber,
    pub path: ScoringPath,
    pub is_fraud: bool,
    pub risk_score: f64,
    pub is_hmm_fraud: bool,
    pub likelihood: f64,
    pub suspicious_ip: bool,
}

impl ScoringOutcome {
    pub fn new(ctx: &ScoringContext, decision: &FusionDecision) -> Self {
        Self {
            transaction_id: ctx.transaction.id,
            card_number: ctx.transaction.card_number.clone(),
            path: decision.path,
            is_fraud: decision.is_fraud,
            risk_score: decision.risk_score,
            is_hmm_fraud: decision.is_hmm_fraud,
            likelihood: decision.likelihood,
            suspicious_ip: decision.suspicious_ip,
        }
    }
}
