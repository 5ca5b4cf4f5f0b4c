//! Spending-habit clustering.
//!
//! Partitions an account's past amounts into three clusters and
//! turns the sorted centroids into low/average/high thresholds.
//! Pure: the caller persists the result onto the account.

use crate::error::ScoreResult;
use linfa::{traits::Fit, DatasetBase};
use linfa_clustering::KMeans;
use ndarray::Array2;
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

pub const CLUSTER_COUNT: usize = 3;

const MAX_ITERATIONS: u64 = 300;
const TOLERANCE: f64 = 1e-6;
const RUNS: usize = 10;

/// Weight paired with every amount in the 2-D clustering space.
const AMOUNT_WEIGHT: f64 = 1.0;

/// Ascending centroid thresholds. Invariant: low <= average <= high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpendingHabits {
    pub low: f64,
    pub average: f64,
    pub high: f64,
}

impl SpendingHabits {
    /// Build from three centroids in any order.
    pub fn from_centroids(mut centroids: [f64; CLUSTER_COUNT]) -> Self {
        centroids.sort_by(|a, b| a.total_cmp(b));
        Self {
            low: centroids[0],
            average: centroids[1],
            high: centroids[2],
        }
    }

    pub fn as_array(&self) -> [f64; CLUSTER_COUNT] {
        [self.low, self.average, self.high]
    }
}

/// Cluster an account's valid history.
///
/// `amounts` is in arrival order. The last `reserved_tail` amounts form the
/// current window and are not clustered. Returns `Ok(None)` when fewer than
/// `min_points` amounts exist: the account is not yet modelable.
pub fn cluster_spending(
    amounts: &[f64],
    reserved_tail: usize,
    min_points: usize,
    rng: Pcg64Mcg,
) -> ScoreResult<Option<SpendingHabits>> {
    if amounts.len() < min_points {
        return Ok(None);
    }
    let points = &amounts[..amounts.len().saturating_sub(reserved_tail)];
    if points.is_empty() {
        return Ok(None);
    }
    let centroids = kmeans_centroids(points, rng)?;
    Ok(Some(SpendingHabits::from_centroids(centroids)))
}

/// Run k-means (k = 3) over `(amount, 1.0)` points and return the centroid
/// amounts, ascending.
pub fn kmeans_centroids(points: &[f64], rng: Pcg64Mcg) -> ScoreResult<[f64; CLUSTER_COUNT]> {
    let mut distinct: Vec<f64> = points.to_vec();
    distinct.sort_by(|a, b| a.total_cmp(b));
    distinct.dedup();

    // Fewer distinct amounts than clusters: the amounts are the centroids.
    if distinct.len() < CLUSTER_COUNT {
        let top = distinct.last().copied().unwrap_or(0.0);
        let mut centroids = [top; CLUSTER_COUNT];
        for (slot, value) in centroids.iter_mut().zip(distinct.iter()) {
            *slot = *value;
        }
        log::debug!("clustering: {} distinct amounts, k-means skipped", distinct.len());
        return Ok(centroids);
    }

    let records = Array2::from_shape_fn((points.len(), 2), |(row, col)| {
        if col == 0 {
            points[row]
        } else {
            AMOUNT_WEIGHT
        }
    });
    let dataset = DatasetBase::from(records);

    let model = KMeans::params_with_rng(CLUSTER_COUNT, rng)
        .n_runs(RUNS)
        .max_n_iterations(MAX_ITERATIONS)
        .tolerance(TOLERANCE)
        .fit(&dataset)?;

    let mut centroids = [0.0; CLUSTER_COUNT];
    for (slot, row) in centroids.iter_mut().zip(model.centroids().rows()) {
        *slot = row[0];
    }
    centroids.sort_by(|a, b| a.total_cmp(b));
    Ok(centroids)
}
