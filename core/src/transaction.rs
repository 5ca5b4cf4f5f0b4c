//! Card transactions as submitted and as persisted.

use crate::{
    error::{ScoreError, ScoreResult},
    types::{CardNumber, TransactionId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A transaction as it arrives, before it has an id or a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSubmission {
    pub card_number: CardNumber,
    #[serde(default)]
    pub card_holder: String,
    #[serde(default)]
    pub merchant: String,
    pub amount: f64,
    #[serde(default)]
    pub category_index: i64,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Defaults to the time of submission.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl TransactionSubmission {
    pub fn validate(&self) -> ScoreResult<()> {
        let reject = |reason: String| Err(ScoreError::InvalidSubmission { reason });
        if self.card_number.trim().is_empty() {
            return reject("card_number is empty".into());
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return reject(format!("amount {} is not a non-negative number", self.amount));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return reject(format!("latitude {} out of range", self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return reject(format!("longitude {} out of range", self.longitude));
        }
        Ok(())
    }
}

/// A persisted transaction. Everything except `risk_score`, `is_fraud`
/// and `suspicious_ip` is fixed at creation; those are written once by
/// the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub card_number: CardNumber,
    pub merchant: String,
    pub amount: f64,
    pub category_index: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub risk_score: f64,
    pub is_fraud: bool,
    /// The source address was blacklisted or had earlier fraud on it.
    #[serde(default)]
    pub suspicious_ip: bool,
}
