//! Observation encoder: amount -> spending symbol.

use crate::clustering::SpendingHabits;
use serde::{Deserialize, Serialize};

/// The three observable symbols of the sequence model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendingSymbol {
    Low,
    Average,
    High,
}

impl SpendingSymbol {
    pub const ALL: [SpendingSymbol; 3] = [Self::Low, Self::Average, Self::High];

    /// Column index into the emission matrix.
    pub fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::Average => 1,
            Self::High => 2,
        }
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }
}

/// Highest threshold the amount meets or exceeds.
pub fn encode(amount: f64, habits: &SpendingHabits) -> SpendingSymbol {
    if amount >= habits.high {
        SpendingSymbol::High
    } else if amount >= habits.average {
        SpendingSymbol::Average
    } else {
        SpendingSymbol::Low
    }
}

/// Encode a run of amounts with one fixed set of thresholds.
pub fn encode_all(amounts: &[f64], habits: &SpendingHabits) -> Vec<usize> {
    amounts.iter().map(|a| encode(*a, habits).index()).collect()
}
