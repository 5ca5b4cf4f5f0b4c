//! Engine configuration, loaded from a JSON file with per-field defaults.

use serde::{Deserialize, Serialize};

pub const CLASSIFIER_URL_ENV: &str = "FRAUDSCORE_CLASSIFIER_URL";
pub const SEED_ENV: &str = "FRAUDSCORE_SEED";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Length of every observation window fed to the sequence model.
    pub window_size: usize,
    /// Valid prior transactions required before the sequence model is used.
    pub min_history: usize,
    /// Baum-Welch iteration cap per window.
    pub max_iters: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            min_history: 20,
            max_iters: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Fraud-state share of the current window that forces a fraud flag.
    pub likelihood_threshold: f64,
    /// Classifier fraud probability that forces a fraud flag on the full path.
    pub classifier_threshold: f64,
    /// Classifier fraud probability that flags fraud on the cold-start path.
    pub cold_start_threshold: f64,
    /// Largest tolerated log-likelihood shift between previous and current window.
    pub hmm_shift_tolerance: f64,
    /// A blocked blacklisted source address flags the transaction as fraud.
    pub blacklisted_ip_is_fraud: bool,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            likelihood_threshold: 0.7,
            classifier_threshold: 0.2,
            cold_start_threshold: 0.2,
            hmm_shift_tolerance: 0.02,
            blacklisted_ip_is_fraud: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/".into(),
            endpoint: "predict/xgb".into(),
            timeout_secs: 10,
        }
    }
}

impl ClassifierConfig {
    pub fn endpoint_url(&self) -> String {
        if self.base_url.ends_with('/') {
            format!("{}{}", self.base_url, self.endpoint)
        } else {
            format!("{}/{}", self.base_url, self.endpoint)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub master_seed: u64,
    pub model: ModelConfig,
    pub ensemble: EnsembleConfig,
    pub classifier: ClassifierConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            master_seed: 42,
            model: ModelConfig::default(),
            ensemble: EnsembleConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl ScoringConfig {
    /// Load from a JSON file, then apply environment overrides.
    /// In tests, use ScoringConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let mut config: ScoringConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for runs without a config file.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        Self {
            master_seed: 0xF4A0_D5C0_4E00_0001,
            ..Self::default()
        }
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(url) = std::env::var(CLASSIFIER_URL_ENV) {
            log::info!("config: classifier url overridden from {CLASSIFIER_URL_ENV}");
            self.classifier.base_url = url;
        }
        if let Ok(seed) = std::env::var(SEED_ENV) {
            self.master_seed = seed
                .parse()
                .map_err(|e| anyhow::anyhow!("{SEED_ENV}={seed} is not a u64: {e}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let m = &self.model;
        if m.window_size < 2 {
            anyhow::bail!("model.window_size must be at least 2, got {}", m.window_size);
        }
        // Clustering needs at least k points once the current window is held back.
        if m.min_history < m.window_size + 3 {
            anyhow::bail!(
                "model.min_history ({}) must exceed window_size ({}) by at least 3",
                m.min_history,
                m.window_size
            );
        }
        if m.max_iters == 0 {
            anyhow::bail!("model.max_iters must be positive");
        }
        let e = &self.ensemble;
        for (name, value) in [
            ("likelihood_threshold", e.likelihood_threshold),
            ("classifier_threshold", e.classifier_threshold),
            ("cold_start_threshold", e.cold_start_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("ensemble.{name} must be within [0, 1], got {value}");
            }
        }
        if !(e.hmm_shift_tolerance >= 0.0) {
            anyhow::bail!("ensemble.hmm_shift_tolerance must be non-negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: ScoringConfig =
            serde_json::from_str(r#"{ "master_seed": 7, "model": { "max_iters": 25 } }"#).unwrap();
        assert_eq!(config.master_seed, 7);
        assert_eq!(config.model.max_iters, 25);
        assert_eq!(config.model.window_size, 10);
        assert_eq!(config.model.min_history, 20);
        assert!((config.ensemble.hmm_shift_tolerance - 0.02).abs() < 1e-12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_history_too_short_for_clustering() {
        let mut config = ScoringConfig::default_test();
        config.model.min_history = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn endpoint_url_joins_cleanly() {
        let mut c = ClassifierConfig::default();
        c.base_url = "http://ml.internal".into();
        assert_eq!(c.endpoint_url(), "http://ml.internal/predict/xgb");
        c.base_url = "http://ml.internal/".into();
        assert_eq!(c.endpoint_url(), "http://ml.internal/predict/xgb");
    }
}
