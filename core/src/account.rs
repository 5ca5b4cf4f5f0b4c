//! Card accounts and the behavioral model each one owns.

use crate::{
    clustering::SpendingHabits,
    hmm::HmmParams,
    rng::ModelRng,
    transaction::TransactionSubmission,
    types::CardNumber,
};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub card_number: CardNumber,
    pub card_holder: String,
    pub merchant: String,
    pub created_at: DateTime<Utc>,
    /// Absent until the account first has enough history to cluster.
    pub spending_habits: Option<SpendingHabits>,
    pub model: HmmParams,
}

impl Account {
    /// Open an account for the first transaction seen on a card.
    pub fn open(submission: &TransactionSubmission, created_at: DateTime<Utc>, rng: &mut ModelRng) -> Self {
        Self {
            card_number: submission.card_number.clone(),
            card_holder: submission.card_holder.clone(),
            merchant: submission.merchant.clone(),
            created_at,
            spending_habits: None,
            model: HmmParams::random(rng),
        }
    }
}
