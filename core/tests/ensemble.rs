//! Decision fusion between the sequence model and the classifier.

use fraudscore_core::{
    config::EnsembleConfig,
    ensemble::{
        apply_ip_reputation, cold_start, combine, fuse, hmm_shift_detected, ScoringPath,
        SequenceSignal,
    },
    hmm::FraudSignal,
    ip_reputation::IpReputation,
};

fn signal(max_prob: f64, avg_likelihood: f64) -> FraudSignal {
    FraudSignal {
        is_fraud: false,
        max_prob,
        avg_likelihood,
    }
}

#[test]
fn small_likelihood_shift_is_still_a_signal() {
    assert!(hmm_shift_detected(-12.3, -12.5, 0.02));
    assert!(hmm_shift_detected(-12.5, -12.3, 0.02));
    assert!(!hmm_shift_detected(-12.30, -12.31, 0.02));
    assert!(!hmm_shift_detected(-7.0, -7.0, 0.02));
}

#[test]
fn undefined_likelihood_counts_as_a_shift() {
    assert!(hmm_shift_detected(f64::NAN, -3.0, 0.02));
    assert!(hmm_shift_detected(f64::NEG_INFINITY, f64::NEG_INFINITY, 0.02));
}

#[test]
fn shifted_windows_flag_fraud_even_with_low_classifier_score() {
    let cfg = EnsembleConfig::default();
    let sig = SequenceSignal {
        previous: signal(-12.3, 0.0),
        current: signal(-12.5, 0.0),
    };
    let decision = fuse(&sig, 0.05, &cfg);
    assert_eq!(decision.path, ScoringPath::SequenceModel);
    assert!(decision.is_hmm_fraud);
    assert!(decision.is_fraud);
    assert_eq!(decision.risk_score, 0.05);
}

#[test]
fn high_fraud_state_share_flags_fraud() {
    let cfg = EnsembleConfig::default();
    let decision = combine(false, 0.8, 0.1, &cfg);
    assert!(decision.is_fraud);
    assert_eq!(decision.risk_score, 0.1);
    assert_eq!(decision.likelihood, 0.8);
}

#[test]
fn classifier_alone_can_flag_fraud_on_the_full_path() {
    let cfg = EnsembleConfig::default();
    assert!(combine(false, 0.1, 0.2, &cfg).is_fraud);
    assert!(!combine(false, 0.1, 0.19, &cfg).is_fraud);
}

#[test]
fn stable_windows_and_low_scores_pass() {
    let cfg = EnsembleConfig::default();
    let sig = SequenceSignal {
        previous: signal(-6.0, 0.1),
        current: signal(-6.01, 0.2),
    };
    let decision = fuse(&sig, 0.05, &cfg);
    assert!(!decision.is_hmm_fraud);
    assert!(!decision.is_fraud);
    assert_eq!(decision.likelihood, 0.2);
}

#[test]
fn cold_start_uses_classifier_threshold_only() {
    let cfg = EnsembleConfig::default();

    let flagged = cold_start(0.25, &cfg);
    assert_eq!(flagged.path, ScoringPath::ColdStart);
    assert!(flagged.is_fraud);
    assert_eq!(flagged.risk_score, 0.25);
    assert!(!flagged.is_hmm_fraud);
    assert_eq!(flagged.likelihood, 0.0);

    assert!(cold_start(0.2, &cfg).is_fraud);
    assert!(!cold_start(0.19, &cfg).is_fraud);
}

#[test]
fn ip_reputation_reports_but_only_a_blacklist_forces_fraud() {
    let cfg = EnsembleConfig::default();
    let quiet = cold_start(0.05, &cfg);
    assert!(!quiet.is_fraud && !quiet.suspicious_ip);

    let clean = apply_ip_reputation(quiet, &IpReputation::default(), &cfg);
    assert!(!clean.is_fraud && !clean.suspicious_ip);

    let repeat = IpReputation { blacklisted: false, prior_frauds: 3 };
    let seen_before = apply_ip_reputation(quiet, &repeat, &cfg);
    assert!(seen_before.suspicious_ip);
    assert!(!seen_before.is_fraud);

    let listed = IpReputation { blacklisted: true, prior_frauds: 0 };
    let blocked = apply_ip_reputation(quiet, &listed, &cfg);
    assert!(blocked.suspicious_ip && blocked.is_fraud);
    assert_eq!(blocked.risk_score, quiet.risk_score, "risk score is the classifier's");

    let lenient = EnsembleConfig {
        blacklisted_ip_is_fraud: false,
        ..EnsembleConfig::default()
    };
    let reported = apply_ip_reputation(quiet, &listed, &lenient);
    assert!(reported.suspicious_ip && !reported.is_fraud);
}
