use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Clustering error: {0}")]
    Clustering(#[from] linfa_clustering::KMeansError),

    #[error("Classifier transport error: {0}")]
    ClassifierTransport(#[from] reqwest::Error),

    #[error("Classifier returned an unusable response: {reason}")]
    ClassifierResponse { reason: String },

    #[error("Observation sequence is empty")]
    EmptyObservation,

    #[error("Observation symbol {symbol} at position {position} is outside the alphabet")]
    SymbolOutOfRange { symbol: usize, position: usize },

    #[error("Invalid transaction submission: {reason}")]
    InvalidSubmission { reason: String },

    #[error("Account '{card_number}' not found")]
    AccountNotFound { card_number: String },

    #[error("Transaction {transaction_id} already carries a scoring decision")]
    AlreadyScored { transaction_id: i64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ScoreResult<T> = Result<T, ScoreError>;
