//! The external fraud classifier.
//!
//! The classifier is a black box: a feature record goes out, a
//! two-class probability vector comes back. `HttpClassifier` speaks the
//! JSON contract over blocking HTTP; tests substitute their own
//! `FraudClassifier`.

use crate::{
    config::ClassifierConfig,
    error::{ScoreError, ScoreResult},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Index of the fraud class in `ClassifierPrediction::probability`.
pub const FRAUD_CLASS: usize = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierFeatures {
    pub hour: u32,
    pub amount: f64,
    pub category_index: i64,
    pub travel_speed: f64,
    pub avg_spend_per_week: f64,
    pub last_24h_transaction_count: i64,
    pub last_24h_fraud_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierPrediction {
    pub prediction: i64,
    /// [not-fraud, fraud]
    pub probability: Vec<f64>,
}

impl ClassifierPrediction {
    /// Reject partial or malformed probability vectors.
    pub fn validate(&self) -> ScoreResult<()> {
        if self.probability.len() != 2 {
            return Err(ScoreError::ClassifierResponse {
                reason: format!("expected 2 class probabilities, got {}", self.probability.len()),
            });
        }
        if let Some(p) = self.probability.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(ScoreError::ClassifierResponse {
                reason: format!("class probability {p} is outside [0, 1]"),
            });
        }
        Ok(())
    }

    /// Decode and validate a response body. A body that is not the
    /// expected JSON is a response failure, not a transport one.
    pub fn from_json(body: &str) -> ScoreResult<Self> {
        let prediction: Self =
            serde_json::from_str(body).map_err(|e| ScoreError::ClassifierResponse {
                reason: format!("undecodable body: {e}"),
            })?;
        prediction.validate()?;
        Ok(prediction)
    }

    pub fn fraud_probability(&self) -> ScoreResult<f64> {
        self.validate()?;
        Ok(self.probability[FRAUD_CLASS])
    }
}

/// Anything that can score a feature record.
pub trait FraudClassifier: Send {
    fn predict(&self, features: &ClassifierFeatures) -> ScoreResult<ClassifierPrediction>;
}

/// Blocking JSON-over-HTTP client for the classifier service.
pub struct HttpClassifier {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpClassifier {
    pub fn new(config: &ClassifierConfig) -> ScoreResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.endpoint_url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FraudClassifier for HttpClassifier {
    fn predict(&self, features: &ClassifierFeatures) -> ScoreResult<ClassifierPrediction> {
        let response = self
            .client
            .post(&self.url)
            .json(features)
            .send()?
            .error_for_status()?;
        let body = response.text()?;
        let prediction = ClassifierPrediction::from_json(&body)?;
        log::debug!(
            "classifier: {} -> prediction={} probability={:?}",
            self.url,
            prediction.prediction,
            prediction.probability
        );
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(probability: Vec<f64>) -> ClassifierPrediction {
        ClassifierPrediction {
            prediction: 0,
            probability,
        }
    }

    #[test]
    fn features_serialize_with_the_service_field_names() {
        let features = ClassifierFeatures {
            hour: 14,
            amount: 80.5,
            category_index: 3,
            travel_speed: 12.0,
            avg_spend_per_week: 240.0,
            last_24h_transaction_count: 4,
            last_24h_fraud_count: 1,
        };
        let value = serde_json::to_value(&features).unwrap();
        let mut keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "amount",
                "avg_spend_per_week",
                "category_index",
                "hour",
                "last_24h_fraud_count",
                "last_24h_transaction_count",
                "travel_speed",
            ]
        );
        assert_eq!(value["hour"], 14);
        assert_eq!(value["last_24h_fraud_count"], 1);
    }

    #[test]
    fn well_formed_response_yields_the_fraud_class() {
        let p = ClassifierPrediction::from_json(r#"{"prediction": 1, "probability": [0.3, 0.7]}"#)
            .unwrap();
        assert_eq!(p.prediction, 1);
        assert_eq!(p.fraud_probability().unwrap(), 0.7);
    }

    #[test]
    fn malformed_vectors_are_rejected() {
        for bad in [
            vec![0.9],
            vec![0.2, 0.3, 0.5],
            vec![],
            vec![f64::NAN, 0.9],
            vec![0.1, f64::INFINITY],
            vec![-0.1, 1.1],
        ] {
            let err = prediction(bad.clone()).fraud_probability().unwrap_err();
            assert!(
                matches!(err, ScoreError::ClassifierResponse { .. }),
                "{bad:?} gave {err}"
            );
        }
    }

    #[test]
    fn undecodable_body_is_a_response_failure() {
        for body in ["<html>502</html>", r#"{"prediction": 1}"#, r#"{"probability": "high"}"#] {
            let err = ClassifierPrediction::from_json(body).unwrap_err();
            assert!(matches!(err, ScoreError::ClassifierResponse { .. }), "{body}: {err}");
        }
    }
}
