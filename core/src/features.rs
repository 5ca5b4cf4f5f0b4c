//! Feature extraction for the external classifier.
//!
//! Every function is pure over the current transaction and the card's
//! prior history (arrival order, current transaction excluded). None of
//! this feeds the sequence model.

use crate::{classifier::ClassifierFeatures, transaction::Transaction};
use chrono::{Duration, Timelike};

// ── Constants ────────────────────────────────────────────────────────────────

const EARTH_RADIUS_KM: f64 = 6371.0;
const SECONDS_PER_HOUR: f64 = 3600.0;
const SECONDS_PER_WEEK: f64 = 7.0 * 24.0 * SECONDS_PER_HOUR;

/// Elapsed-time floor for travel speed, in hours (one second).
const MIN_ELAPSED_HOURS: f64 = 1.0 / SECONDS_PER_HOUR;

/// Prior transactions in the trailing 24 hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowCounts {
    pub transactions: i64,
    pub frauds: i64,
}

/// Hour of day (UTC), 0-23.
pub fn hour_of_day(tx: &Transaction) -> u32 {
    tx.created_at.hour()
}

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let d_lat = lat2 - lat1;
    let d_lon = lon2 - lon1;

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Speed in km/h between the previous and current transaction locations.
///
/// No previous transaction: 0. Zero distance: 0. A positive distance
/// covered in zero or negative time is measured against a one-second
/// floor, so the result is large but finite.
pub fn travel_speed(current: &Transaction, previous: Option<&Transaction>) -> f64 {
    let Some(previous) = previous else {
        return 0.0;
    };

    let distance = haversine_km(
        previous.latitude,
        previous.longitude,
        current.latitude,
        current.longitude,
    );
    if distance <= 0.0 {
        return 0.0;
    }

    let elapsed_hours =
        (current.created_at - previous.created_at).num_milliseconds() as f64 / 1000.0 / SECONDS_PER_HOUR;
    distance / elapsed_hours.max(MIN_ELAPSED_HOURS)
}

/// Prior transactions at most 24 hours older than `current`, and how many
/// of them were flagged as fraud.
pub fn last_24h_counts(current: &Transaction, history: &[Transaction]) -> WindowCounts {
    let window = Duration::hours(24);
    history
        .iter()
        .filter(|t| t.id != current.id)
        .filter(|t| {
            let age = current.created_at - t.created_at;
            age >= Duration::zero() && age <= window
        })
        .fold(WindowCounts::default(), |mut counts, t| {
            counts.transactions += 1;
            if t.is_fraud {
                counts.frauds += 1;
            }
            counts
        })
}

/// Total spend (history plus current) over the number of weeks the
/// history spans, rounded up and never less than one.
pub fn avg_spend_per_week(current: &Transaction, history: &[Transaction]) -> f64 {
    let total: f64 = history.iter().map(|t| t.amount).sum::<f64>() + current.amount;
    let first = history
        .iter()
        .map(|t| t.created_at)
        .min()
        .unwrap_or(current.created_at)
        .min(current.created_at);
    let span_secs = (current.created_at - first).num_seconds().max(0) as f64;
    let weeks = (span_secs / SECONDS_PER_WEEK).ceil().max(1.0);
    total / weeks
}

/// Build the classifier's feature record for `current`.
pub fn extract(current: &Transaction, history: &[Transaction]) -> ClassifierFeatures {
    let counts = last_24h_counts(current, history);
    ClassifierFeatures {
        hour: hour_of_day(current),
        amount: current.amount,
        category_index: current.category_index,
        travel_speed: travel_speed(current, history.last()),
        avg_spend_per_week: avg_spend_per_week(current, history),
        last_24h_transaction_count: counts.transactions,
        last_24h_fraud_count: counts.frauds,
    }
}
