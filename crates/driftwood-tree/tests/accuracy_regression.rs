//! Accuracy regression tests for driftwood-tree.
//!
//! These tests verify that changes to split search or leaf prediction do not
//! degrade prequential accuracy on deterministic synthetic streams.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use driftwood_tree::{
    HoeffdingTreeClassifier, HoeffdingTreeConfig, HoeffdingTreeRegressor, LeafPrediction,
    NaiveBayesLeaf, SplitCriterion, TargetMean, VarianceReduction,
};

// ---------------------------------------------------------------------------
// Helper: deterministic synthetic streams
// ---------------------------------------------------------------------------

/// Generate a 3-class stream with 10 features.
///
/// Features 0-2 are informative (class * 3.0 + noise in [0, 2.0]).
/// Features 3-9 are pure noise in [0, 2.0].
/// Samples are assigned round-robin across classes.
fn make_classification(n_samples: usize, seed: u64) -> Vec<(Vec<Option<f64>>, usize)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n_features = 10;
    let n_classes = 3;
    (0..n_samples)
        .map(|i| {
            let class = i % n_classes;
            let row = (0..n_features)
                .map(|f| {
                    let base = if f < 3 { class as f64 * 3.0 } else { 0.0 };
                    Some(base + rng.r#gen::<f64>() * 2.0)
                })
                .collect();
            (row, class)
        })
        .collect()
}

/// Test-then-train accuracy of a classifier over a stream.
fn prequential_accuracy(
    tree: &mut HoeffdingTreeClassifier,
    stream: &[(Vec<Option<f64>>, usize)],
) -> f64 {
    let mut correct = 0usize;
    for (x, y) in stream {
        if tree.predict(x) == Some(*y) {
            correct += 1;
        }
        tree.learn(x, *y, 1.0);
    }
    correct as f64 / stream.len() as f64
}

// ---------------------------------------------------------------------------
// a) classification criteria
// ---------------------------------------------------------------------------

/// Every criterion reaches high prequential accuracy on separable classes.
///
/// Reference: observed accuracy ≥ 0.97 with seed=42 for all three.
#[test]
fn prequential_accuracy_above_threshold() {
    let stream = make_classification(3000, 42);
    for criterion in [
        SplitCriterion::Gini,
        SplitCriterion::info_gain(),
        SplitCriterion::hellinger(),
    ] {
        let mut tree = HoeffdingTreeClassifier::new(
            HoeffdingTreeConfig::new().with_grace_period(50),
            criterion,
            NaiveBayesLeaf::default(),
        )
        .unwrap();
        let acc = prequential_accuracy(&mut tree, &stream);
        assert!(acc > 0.9, "{criterion:?}: prequential accuracy {acc} <= 0.9");
    }
}

// ---------------------------------------------------------------------------
// b) leaf prediction strategies
// ---------------------------------------------------------------------------

/// Naive Bayes leaves beat majority-class leaves before the tree has grown.
#[test]
fn naive_bayes_leaves_help_early() {
    let stream = make_classification(150, 7);
    let config = HoeffdingTreeConfig::new().with_grace_period(200);

    let mut mc = HoeffdingTreeClassifier::new(
        config.clone(),
        SplitCriterion::info_gain(),
        NaiveBayesLeaf::new(LeafPrediction::MajorityClass, 0.0),
    )
    .unwrap();
    let mut nb = HoeffdingTreeClassifier::new(
        config,
        SplitCriterion::info_gain(),
        NaiveBayesLeaf::new(LeafPrediction::NaiveBayes, 0.0),
    )
    .unwrap();

    let acc_mc = prequential_accuracy(&mut mc, &stream);
    let acc_nb = prequential_accuracy(&mut nb, &stream);
    assert_eq!(mc.n_nodes(), 1);
    assert!(acc_nb > acc_mc + 0.3, "nb {acc_nb} vs mc {acc_mc}");
}

// ---------------------------------------------------------------------------
// c) feature subsets
// ---------------------------------------------------------------------------

/// Leaves restricted to random feature subsets still learn the concept.
#[test]
fn random_subspace_tree_still_learns() {
    let stream = make_classification(4000, 3);
    let mut tree = HoeffdingTreeClassifier::new(
        HoeffdingTreeConfig::new()
            .with_grace_period(50)
            .with_max_features(Some(3))
            .with_seed(5),
        SplitCriterion::info_gain(),
        NaiveBayesLeaf::default(),
    )
    .unwrap();
    let acc = prequential_accuracy(&mut tree, &stream);
    assert!(acc > 0.85, "prequential accuracy {acc} <= 0.85");
}

// ---------------------------------------------------------------------------
// d) regression
// ---------------------------------------------------------------------------

/// Mean absolute error on a piecewise-constant target falls well below the target spread.
#[test]
fn regressor_mae_below_threshold() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut tree = HoeffdingTreeRegressor::new(
        HoeffdingTreeConfig::new().with_grace_period(50),
        VarianceReduction::default(),
        TargetMean,
    )
    .unwrap();

    let mut abs_err = 0.0;
    let n = 5000;
    for i in 0..n {
        let a: f64 = rng.r#gen::<f64>() * 4.0;
        let y = a.floor() * 5.0 + rng.gen_range(-0.5..0.5);
        let x = [Some(a), Some(rng.r#gen::<f64>())];
        if i >= n / 2 {
            abs_err += (tree.predict(&x) - y).abs();
        }
        tree.learn(&x, y, 1.0);
    }
    let mae = abs_err / f64::from(n / 2);
    assert!(mae < 2.0, "second-half MAE {mae} >= 2.0");
    assert!(tree.n_leaves() >= 4);
}
