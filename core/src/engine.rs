//! The scoring engine: runs the whole pipeline for one transaction.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Resolve or open the account
//!   2. Append the transaction, look up its address's reputation
//!   3. Load prior history (all, and valid = not fraud-flagged)
//!   4. Extract features and call the classifier
//!   5. Fewer than `min_history` valid priors: cold-start decision, skip to 9
//!   6. Cluster valid history into spending thresholds
//!   7. Encode history, train on every overlapping window
//!   8. Decode previous and current windows, fuse with the classifier,
//!      then apply the address reputation
//!   9. Record the decision, save the model, append events
//!
//! RULES:
//!   - One call runs inside one SQLite transaction: any error rolls it all
//!     back, so no transaction is left half-scored.
//!   - The account's lock is held for the whole call.
//!   - All randomness flows through the RngBank.
//!   - All milestones are recorded in the event log.

use crate::{
    account::Account,
    account_lock::AccountLocks,
    classifier::{FraudClassifier, HttpClassifier},
    clustering,
    config::ScoringConfig,
    encoder,
    ensemble::{self, FusionDecision, SequenceSignal},
    error::ScoreResult,
    event::{EventLogEntry, ScoringEvent},
    features,
    hmm::FitReport,
    ip_reputation::{normalize_ip, IpReputation},
    pipeline::{ClassifierStage, ScoringContext, ScoringOutcome, SequenceStage},
    rng::{RngBank, RngStream},
    store::FraudStore,
    transaction::TransactionSubmission,
    types::{finite_or_zero, TransactionId},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct ScoringEngine {
    pub config: ScoringConfig,
    pub store: FraudStore,
    pub rng_bank: RngBank,
    classifier: Box<dyn FraudClassifier>,
    locks: Arc<AccountLocks>,
}

impl ScoringEngine {
    /// Fails when the configuration does not validate.
    pub fn new(
        config: ScoringConfig,
        store: FraudStore,
        classifier: Box<dyn FraudClassifier>,
    ) -> ScoreResult<Self> {
        config.validate()?;
        Ok(Self {
            rng_bank: RngBank::new(config.master_seed),
            config,
            store,
            classifier,
            locks: Arc::new(AccountLocks::new()),
        })
    }

    /// Build an engine that talks to the classifier service over HTTP.
    pub fn build(config: ScoringConfig, store: FraudStore) -> ScoreResult<Self> {
        let classifier = HttpClassifier::new(&config.classifier)?;
        log::info!("engine: classifier endpoint {}", classifier.url());
        Self::new(config, store, Box::new(classifier))
    }

    /// Share a lock registry with engines on other connections.
    pub fn with_locks(mut self, locks: Arc<AccountLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> Arc<AccountLocks> {
        Arc::clone(&self.locks)
    }

    pub fn set_classifier(&mut self, classifier: Box<dyn FraudClassifier>) {
        self.classifier = classifier;
    }

    /// Add an address to the blacklist, or change whether it is blocked.
    pub fn blacklist_ip(&self, ip_address: &str, blocked: bool) -> ScoreResult<()> {
        let Some(ip_address) = normalize_ip(Some(ip_address)) else {
            return Err(anyhow::anyhow!("cannot blacklist a blank ip address").into());
        };
        self.store.upsert_blacklisted_ip(ip_address, blocked, Utc::now())?;
        log::info!("engine: ip {ip_address} blacklisted (blocked={blocked})");
        Ok(())
    }

    /// Score one submitted transaction.
    pub fn score(&mut self, submission: TransactionSubmission) -> ScoreResult<ScoringOutcome> {
        submission.validate()?;

        let locks = Arc::clone(&self.locks);
        locks.with_lock(&submission.card_number, || -> ScoreResult<ScoringOutcome> {
            // Rolls back on drop, including after a failed commit.
            let unit = self.store.unit_of_work()?;
            let outcome = self.run_pipeline(&submission).map_err(|e| {
                log::warn!("engine: scoring failed for card {}: {e}", submission.card_number);
                e
            })?;
            unit.commit()?;
            Ok(outcome)
        })
    }

    fn run_pipeline(&self, submission: &TransactionSubmission) -> ScoreResult<ScoringOutcome> {
        let created_at = submission.created_at.unwrap_or_else(Utc::now);
        let mut ctx = self.open_context(submission, created_at)?;
        let transaction_id = ctx.transaction.id;

        if ctx.account_opened {
            self.emit(
                ScoringEvent::AccountOpened {
                    card_number: ctx.account.card_number.clone(),
                },
                Some(transaction_id),
            )?;
        }

        let classified = self.classify(&ctx)?;

        let valid = ctx.valid_history().len();
        let sequence = if valid < self.config.model.min_history {
            log::debug!(
                "engine: card {} has {valid} valid priors, cold start",
                ctx.account.card_number
            );
            None
        } else {
            self.run_sequence_model(&mut ctx)?
        };

        let decision = match &sequence {
            Some((_, signal)) => ensemble::fuse(signal, classified.fraud_probability, &self.config.ensemble),
            None => ensemble::cold_start(classified.fraud_probability, &self.config.ensemble),
        };
        let decision =
            ensemble::apply_ip_reputation(decision, &ctx.ip_reputation, &self.config.ensemble);
        if decision.suspicious_ip {
            self.store.mark_suspicious_ip(transaction_id)?;
            ctx.transaction.suspicious_ip = true;
        }

        self.store
            .record_decision(transaction_id, decision.risk_score, decision.is_fraud)?;

        if let Some((stage, _)) = &sequence {
            self.store.save_account_model(&ctx.account)?;
            self.record_training(&ctx, stage, transaction_id)?;
        }

        self.emit(scored_event(&ctx, &classified, &decision), Some(transaction_id))?;

        log::info!(
            "engine: tx {} card {} path={:?} fraud={} risk={:.3} hmm_fraud={} likelihood={:.2} suspicious_ip={}",
            transaction_id,
            ctx.account.card_number,
            decision.path,
            decision.is_fraud,
            decision.risk_score,
            decision.is_hmm_fraud,
            decision.likelihood,
            decision.suspicious_ip
        );

        Ok(ScoringOutcome::new(&ctx, &decision))
    }

    /// Stages 1-3.
    fn open_context(
        &self,
        submission: &TransactionSubmission,
        created_at: DateTime<Utc>,
    ) -> ScoreResult<ScoringContext> {
        let (account, account_opened) = match self.store.get_account(&submission.card_number)? {
            Some(account) => (account, false),
            None => {
                let mut rng = self
                    .rng_bank
                    .for_account(&submission.card_number, RngStream::ModelInit);
                let account = Account::open(submission, created_at, &mut rng);
                self.store.insert_account(&account)?;
                log::info!("engine: opened account for card {}", account.card_number);
                (account, true)
            }
        };

        let transaction = self.store.insert_transaction(submission, created_at)?;
        let history = self
            .store
            .transactions_before(&transaction.card_number, transaction.id)?;
        let ip_reputation = match normalize_ip(transaction.ip_address.as_deref()) {
            Some(ip) => self.store.ip_reputation(ip, transaction.id)?,
            None => IpReputation::default(),
        };

        Ok(ScoringContext {
            account,
            account_opened,
            transaction,
            history,
            ip_reputation,
        })
    }

    /// Stage 4.
    fn classify(&self, ctx: &ScoringContext) -> ScoreResult<ClassifierStage> {
        let features = features::extract(&ctx.transaction, &ctx.history);
        let prediction = self.classifier.predict(&features)?;
        let fraud_probability = prediction.fraud_probability()?;
        Ok(ClassifierStage {
            features,
            prediction,
            fraud_probability,
        })
    }

    /// Stages 6-8. `None` when the history cannot be clustered yet.
    ///
    /// Training windows are every `window_size` run of the valid prior
    /// history; the current transaction never enters training. The
    /// previous window is the last training window, the current window is
    /// that window shifted by one with the current symbol appended.
    fn run_sequence_model(
        &self,
        ctx: &mut ScoringContext,
    ) -> ScoreResult<Option<(SequenceStage, SequenceSignal)>> {
        let model_cfg = &self.config.model;
        let window_size = model_cfg.window_size;
        let amounts = ctx.valid_amounts();

        let mut rng = self
            .rng_bank
            .for_account(&ctx.account.card_number, RngStream::Clustering);
        let Some(habits) =
            clustering::cluster_spending(&amounts, window_size, model_cfg.min_history, rng.fork())?
        else {
            return Ok(None);
        };
        if amounts.len() < window_size {
            return Ok(None);
        }
        ctx.account.spending_habits = Some(habits);

        let symbols = encoder::encode_all(&amounts, &habits);
        let current_symbol = encoder::encode(ctx.transaction.amount, &habits).index();

        let mut windows_trained = 0;
        let mut total_iterations = 0;
        let mut last_fit = FitReport::default();
        for window in symbols.windows(window_size) {
            last_fit = ctx.account.model.fit(window, model_cfg.max_iters)?;
            total_iterations += last_fit.iterations;
            windows_trained += 1;
        }

        let previous_window = symbols[symbols.len() - window_size..].to_vec();
        let mut current_window = previous_window[1..].to_vec();
        current_window.push(current_symbol);

        let signal = SequenceSignal {
            previous: ctx.account.model.detect_fraud(&previous_window)?,
            current: ctx.account.model.detect_fraud(&current_window)?,
        };

        log::debug!(
            "engine: card {} habits=({:.2}, {:.2}, {:.2}) windows={windows_trained} x={:.4} y={:.4}",
            ctx.account.card_number,
            habits.low,
            habits.average,
            habits.high,
            signal.previous.max_prob,
            signal.current.max_prob
        );

        let stage = SequenceStage {
            habits,
            previous_window,
            current_window,
            windows_trained,
            last_fit,
            total_iterations,
        };
        Ok(Some((stage, signal)))
    }

    fn record_training(
        &self,
        ctx: &ScoringContext,
        stage: &SequenceStage,
        transaction_id: TransactionId,
    ) -> ScoreResult<()> {
        let card_number = ctx.account.card_number.clone();
        self.emit(
            ScoringEvent::SpendingHabitsUpdated {
                card_number: card_number.clone(),
                low: stage.habits.low,
                average: stage.habits.average,
                high: stage.habits.high,
            },
            Some(transaction_id),
        )?;
        self.emit(
            ScoringEvent::ModelTrained {
                card_number,
                windows: stage.windows_trained,
                iterations: stage.total_iterations,
                log_prob: finite_or_zero(stage.last_fit.log_prob),
            },
            Some(transaction_id),
        )
    }

    fn emit(&self, event: ScoringEvent, transaction_id: Option<TransactionId>) -> ScoreResult<()> {
        let entry = EventLogEntry {
            id: None,
            card_number: event.card_number().to_string(),
            transaction_id,
            event_type: event.type_name().to_string(),
            payload: serde_json::to_string(&event)?,
        };
        self.store.append_event(&entry)
    }
}

fn scored_event(
    ctx: &ScoringContext,
    classified: &ClassifierStage,
    decision: &FusionDecision,
) -> ScoringEvent {
    ScoringEvent::TransactionScored {
        card_number: ctx.account.card_number.clone(),
        transaction_id: ctx.transaction.id,
        path: decision.path,
        is_fraud: decision.is_fraud,
        risk_score: decision.risk_score,
        is_hmm_fraud: decision.is_hmm_fraud,
        likelihood: decision.likelihood,
        suspicious_ip: decision.suspicious_ip,
        features: classified.features.clone(),
        classifier_prediction: classified.prediction.prediction,
        fraud_probability: classified.fraud_probability,
    }
}
