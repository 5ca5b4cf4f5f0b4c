//! The scoring event log.
//!
//! RULE: every pipeline milestone is appended to the event log.
//! Entries are never updated or deleted.

use crate::{
    classifier::ClassifierFeatures,
    ensemble::ScoringPath,
    types::{CardNumber, TransactionId},
};
use serde::{Deserialize, Serialize};

/// Every event the pipeline emits.
/// Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoringEvent {
    AccountOpened {
        card_number: CardNumber,
    },
    SpendingHabitsUpdated {
        card_number: CardNumber,
        low: f64,
        average: f64,
        high: f64,
    },
    ModelTrained {
        card_number: CardNumber,
        windows: usize,
        iterations: usize,
        log_prob: f64,
    },
    TransactionScored {
        card_number: CardNumber,
        transaction_id: TransactionId,
        path: ScoringPath,
        is_fraud: bool,
        risk_score: f64,
        is_hmm_fraud: bool,
        likelihood: f64,
        suspicious_ip: bool,
        /// What the classifier was sent and what it answered.
        features: ClassifierFeatures,
        classifier_prediction: i64,
        fraud_probability: f64,
    },
}

impl ScoringEvent {
    /// Stable name for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AccountOpened { .. } => "account_opened",
            Self::SpendingHabitsUpdated { .. } => "spending_habits_updated",
            Self::ModelTrained { .. } => "model_trained",
            Self::TransactionScored { .. } => "transaction_scored",
        }
    }

    pub fn card_number(&self) -> &str {
        match self {
            Self::AccountOpened { card_number }
            | Self::SpendingHabitsUpdated { card_number, .. }
            | Self::ModelTrained { card_number, .. }
            | Self::TransactionScored { card_number, .. } => card_number,
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub card_number: CardNumber,
    pub transaction_id: Option<TransactionId>,
    pub event_type: String,
    pub payload: String, // JSON-serialized ScoringEvent
}
