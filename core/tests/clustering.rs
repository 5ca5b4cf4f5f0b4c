//! Spending-habit clustering and symbol encoding over realistic histories.

use fraudscore_core::{
    clustering::{cluster_spending, kmeans_centroids, SpendingHabits},
    encoder::{encode, encode_all, SpendingSymbol},
    rng::{ModelRng, RngBank, RngStream},
};

/// Three well-separated spending bands, interleaved the way a real card
/// alternates between coffee, groceries and the occasional big purchase.
fn three_band_history(len: usize) -> Vec<f64> {
    let low = [9.5, 10.0, 10.5, 11.0, 9.0];
    let mid = [48.0, 50.0, 52.0, 49.0, 51.0];
    let high = [195.0, 200.0, 205.0, 198.0, 202.0];
    (0..len)
        .map(|i| match i % 3 {
            0 => low[(i / 3) % low.len()],
            1 => mid[(i / 3) % mid.len()],
            _ => high[(i / 3) % high.len()],
        })
        .collect()
}

#[test]
fn separated_bands_give_three_ascending_centroids() {
    let amounts = three_band_history(36);
    let rng = ModelRng::new(7).fork();

    let habits = cluster_spending(&amounts, 10, 20, rng)
        .expect("clustering")
        .expect("enough history");

    assert!(habits.low <= habits.average && habits.average <= habits.high);
    assert!((habits.low - 10.0).abs() < 2.0, "low = {}", habits.low);
    assert!((habits.average - 50.0).abs() < 3.0, "average = {}", habits.average);
    assert!((habits.high - 200.0).abs() < 6.0, "high = {}", habits.high);
}

#[test]
fn short_history_is_not_clustered() {
    let amounts = three_band_history(19);
    let habits = cluster_spending(&amounts, 10, 20, ModelRng::new(1).fork()).expect("clustering");
    assert!(habits.is_none());
}

#[test]
fn identical_amounts_collapse_to_one_value() {
    let amounts = vec![42.0; 25];
    let centroids = kmeans_centroids(&amounts, ModelRng::new(2).fork()).expect("centroids");
    assert_eq!(centroids, [42.0, 42.0, 42.0]);
}

#[test]
fn two_distinct_amounts_pad_with_the_larger() {
    let amounts: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 5.0 } else { 9.0 }).collect();
    let centroids = kmeans_centroids(&amounts, ModelRng::new(3).fork()).expect("centroids");
    assert_eq!(centroids, [5.0, 9.0, 9.0]);
}

#[test]
fn same_stream_gives_same_thresholds() {
    let amounts = three_band_history(40);
    let bank = RngBank::new(99);
    let run = || {
        let rng = bank.for_account("4000-0000-0000-0002", RngStream::Clustering).fork();
        cluster_spending(&amounts, 10, 20, rng)
            .expect("clustering")
            .expect("enough history")
    };
    assert_eq!(run(), run());
}

#[test]
fn encoded_history_follows_the_bands() {
    let habits = SpendingHabits {
        low: 10.0,
        average: 50.0,
        high: 200.0,
    };
    let amounts = [3.0, 10.0, 30.0, 50.0, 75.0, 199.0, 200.0, 5000.0];
    assert_eq!(encode_all(&amounts, &habits), vec![0, 0, 0, 1, 1, 1, 2, 2]);
    assert_eq!(encode(75.0, &habits), SpendingSymbol::Average);
}
