//! IP reputation: an explicit blacklist plus the fraud record of an address.
//!
//! An address is suspicious when it is blacklisted and blocked, or when an
//! earlier transaction from it (on any card) was flagged as fraud.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One blacklist row. `blocked = false` keeps the address on record
/// without acting on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlacklistedIp {
    pub ip_address: String,
    pub blocked: bool,
    pub added_at: DateTime<Utc>,
}

/// What the store knows about the address a transaction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IpReputation {
    pub blacklisted: bool,
    /// Fraud-flagged transactions from the address that arrived earlier.
    pub prior_frauds: i64,
}

impl IpReputation {
    pub fn suspicious(&self) -> bool {
        self.blacklisted || self.prior_frauds > 0
    }
}

/// Trimmed address, or `None` when the submission carried no usable one.
pub fn normalize_ip(ip: Option<&str>) -> Option<&str> {
    ip.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn either_signal_makes_an_address_suspicious() {
        assert!(!IpReputation::default().suspicious());
        assert!(IpReputation { blacklisted: true, prior_frauds: 0 }.suspicious());
        assert!(IpReputation { blacklisted: false, prior_frauds: 2 }.suspicious());
    }

    #[test]
    fn blank_addresses_are_ignored() {
        assert_eq!(normalize_ip(Some(" 10.0.0.1 ")), Some("10.0.0.1"));
        assert_eq!(normalize_ip(Some("   ")), None);
        assert_eq!(normalize_ip(None), None);
    }
}
