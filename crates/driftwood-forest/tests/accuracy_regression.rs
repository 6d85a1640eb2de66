//! Accuracy regression tests for driftwood-forest.
//!
//! These tests verify that the forest recovers from an abrupt concept change
//! and that regression members still fit a piecewise target.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use driftwood_forest::{
    AdaptiveRandomForestClassifier, AdaptiveRandomForestRegressor, Aggregation, ForestConfig,
    MaxFeatures,
};

// ---------------------------------------------------------------------------
// Helper: deterministic synthetic streams
// ---------------------------------------------------------------------------

/// Binary stream over 4 uniform features whose label depends on feature 0.
///
/// Before `drift_at` the label is `x0 > 0.5`; afterwards it is flipped.
fn make_drifting_stream(
    n_samples: usize,
    drift_at: usize,
    seed: u64,
) -> Vec<(Vec<Option<f64>>, usize)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n_samples)
        .map(|i| {
            let x: Vec<Option<f64>> = (0..4).map(|_| Some(rng.r#gen::<f64>())).collect();
            let above = x[0].unwrap_or(0.0) > 0.5;
            let label = if i < drift_at { above } else { !above };
            (x, usize::from(label))
        })
        .collect()
}

/// Prequential accuracy over `stream[from..]`, training on every example.
fn prequential_accuracy(
    forest: &mut AdaptiveRandomForestClassifier,
    stream: &[(Vec<Option<f64>>, usize)],
    from: usize,
) -> f64 {
    let mut correct = 0usize;
    for (i, (x, y)) in stream.iter().enumerate() {
        if i >= from && forest.predict(x).unwrap() == Some(*y) {
            correct += 1;
        }
        forest.learn(x, *y).unwrap();
    }
    correct as f64 / (stream.len() - from) as f64
}

// ---------------------------------------------------------------------------
// a) concept drift
// ---------------------------------------------------------------------------

/// The forest relearns a flipped concept.
#[test]
fn recovers_after_abrupt_drift() {
    let stream = make_drifting_stream(4000, 2000, 42);
    let config = ForestConfig::new(10)
        .unwrap()
        .with_seed(Some(42))
        .with_max_features(MaxFeatures::All);
    let mut forest = AdaptiveRandomForestClassifier::new(config).unwrap();

    let acc = prequential_accuracy(&mut forest, &stream, 3500);
    assert!(acc > 0.85, "post-drift accuracy {acc} <= 0.85");
    assert!(forest.n_drifts_detected() >= 1);
    assert!(
        forest.members().iter().any(|m| m.created_on() > 2000),
        "no member was replaced after the drift"
    );
}

/// Before any drift, the default forest learns the concept.
#[test]
fn learns_stationary_concept() {
    let stream = make_drifting_stream(2000, usize::MAX, 7);
    let config = ForestConfig::new(10).unwrap().with_seed(Some(7));
    let mut forest = AdaptiveRandomForestClassifier::new(config).unwrap();

    let acc = prequential_accuracy(&mut forest, &stream, 1000);
    assert!(acc > 0.85, "stationary accuracy {acc} <= 0.85");
    assert_eq!(forest.max_features(), Some(2));
}

// ---------------------------------------------------------------------------
// b) regression
// ---------------------------------------------------------------------------

/// Mean absolute error on a step target falls well below the target spread.
#[test]
fn regressor_mae_below_threshold() {
    for aggregation in [Aggregation::Median, Aggregation::Mean] {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let config = ForestConfig::new(5)
            .unwrap()
            .with_seed(Some(3))
            .with_max_features(MaxFeatures::All)
            .with_aggregation(aggregation);
        let mut forest = AdaptiveRandomForestRegressor::new(config).unwrap();

        let n = 4000;
        let mut abs_err = 0.0;
        for i in 0..n {
            let a: f64 = rng.r#gen();
            let y = (a * 4.0).floor() * 2.0 + rng.gen_range(-0.2..0.2);
            let x = [Some(a), Some(rng.r#gen::<f64>())];
            if i >= n / 2 {
                abs_err += (forest.predict(&x).unwrap() - y).abs();
            }
            forest.learn(&x, y).unwrap();
        }
        let mae = abs_err / f64::from(n / 2);
        assert!(mae < 1.0, "{aggregation}: second-half MAE {mae} >= 1.0");
    }
}
