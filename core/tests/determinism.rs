//! Two engines, same seed, same submissions.
//! They must produce identical outcomes, models and event logs.

use chrono::{Duration, TimeZone, Utc};
use fraudscore_core::{
    classifier::{ClassifierFeatures, ClassifierPrediction, FraudClassifier},
    config::ScoringConfig,
    engine::ScoringEngine,
    error::ScoreResult,
    pipeline::ScoringOutcome,
    store::FraudStore,
    transaction::TransactionSubmission,
};

/// Probability derived from the features alone, so both engines agree.
struct FeatureClassifier;

impl FraudClassifier for FeatureClassifier {
    fn predict(&self, features: &ClassifierFeatures) -> ScoreResult<ClassifierPrediction> {
        let p = if features.amount > 1000.0 { 0.6 } else { 0.02 };
        Ok(ClassifierPrediction {
            prediction: i64::from(p >= 0.5),
            probability: vec![1.0 - p, p],
        })
    }
}

fn build_engine(seed: u64) -> ScoringEngine {
    let store = FraudStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    let config = ScoringConfig {
        master_seed: seed,
        ..ScoringConfig::default_test()
    };
    ScoringEngine::new(config, store, Box::new(FeatureClassifier)).expect("engine")
}

fn submissions() -> Vec<TransactionSubmission> {
    let t0 = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let amounts = [14.0, 60.0, 8.0, 230.0, 45.0, 12.5, 1500.0, 52.0, 9.0, 180.0];
    (0..45)
        .map(|i| TransactionSubmission {
            card_number: if i % 3 == 0 { "card-a" } else { "card-b" }.into(),
            card_holder: String::new(),
            merchant: "m".into(),
            amount: amounts[i % amounts.len()],
            category_index: (i % 5) as i64,
            latitude: 30.0 + (i % 4) as f64,
            longitude: -90.0,
            ip_address: None,
            created_at: Some(t0 + Duration::minutes(97 * i as i64)),
        })
        .collect()
}

fn run(engine: &mut ScoringEngine) -> Vec<ScoringOutcome> {
    submissions()
        .into_iter()
        .map(|s| engine.score(s).expect("score"))
        .collect()
}

fn payloads(engine: &ScoringEngine, card: &str) -> Vec<String> {
    engine
        .store
        .events_for_card(card)
        .expect("events")
        .into_iter()
        .map(|e| e.payload)
        .collect()
}

#[test]
fn same_seed_produces_identical_runs() {
    const SEED: u64 = 0xDEAD_BEEF_CAFE_1234;

    let mut engine_a = build_engine(SEED);
    let mut engine_b = build_engine(SEED);

    let outcomes_a = serde_json::to_string(&run(&mut engine_a)).expect("json");
    let outcomes_b = serde_json::to_string(&run(&mut engine_b)).expect("json");
    assert_eq!(outcomes_a, outcomes_b, "outcomes diverged");

    for card in ["card-a", "card-b"] {
        let log_a = payloads(&engine_a, card);
        let log_b = payloads(&engine_b, card);
        assert!(!log_a.is_empty());
        assert_eq!(log_a, log_b, "event log for {card} diverged");

        let model_a = engine_a.store.get_account(card).expect("get").expect("account");
        let model_b = engine_b.store.get_account(card).expect("get").expect("account");
        assert_eq!(model_a.spending_habits, model_b.spending_habits);
        assert_eq!(model_a.model.a, model_b.model.a);
    }
}

#[test]
fn different_seeds_initialize_different_models() {
    let mut engine_a = build_engine(1);
    let mut engine_b = build_engine(2);
    let first = submissions().remove(0);
    engine_a.score(first.clone()).expect("score");
    engine_b.score(first).expect("score");

    let a = engine_a.store.get_account("card-a").expect("get").expect("account");
    let b = engine_b.store.get_account("card-a").expect("get").expect("account");
    assert_ne!(a.model.pi, b.model.pi);
}
