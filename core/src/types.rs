//! Shared primitive types used across the scoring engine.

/// The card number that keys an account and its transactions.
pub type CardNumber = String;

/// Row id of a persisted transaction. Ids grow with arrival order.
pub type TransactionId = i64;

/// Replace NaN and infinities with 0 before a number leaves the engine.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
