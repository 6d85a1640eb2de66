//! Configuration builder for adaptive random forests.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use driftwood_drift::{Adwin, Detector};
use driftwood_tree::{
    DEFAULT_MIN_BRANCH_FRACTION, HoeffdingTreeConfig, LeafPrediction, SplitCriterion,
};

use crate::error::ForestError;
use crate::metric::RegressionMetric;

/// Strategy for the number of features each leaf samples as split candidates.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MaxFeatures {
    /// Rounded square root of the feature count.
    Sqrt,
    /// Rounded log base 2 of the feature count.
    Log2,
    /// A fixed count; negative values count back from the feature total.
    Fixed(i64),
    /// A fraction of the feature count, truncated toward zero.
    Fraction(f64),
    /// All features.
    All,
}

impl MaxFeatures {
    /// Resolve to a concrete count for `n_features` columns.
    ///
    /// Negative results are offset by `n_features`, then the count is
    /// clamped into `[1, n_features]`.
    #[must_use]
    pub fn resolve(self, n_features: usize) -> usize {
        let n = n_features as f64;
        let raw = match self {
            MaxFeatures::Sqrt => n.sqrt().round() as i64,
            MaxFeatures::Log2 => {
                if n_features == 0 {
                    0
                } else {
                    n.log2().round() as i64
                }
            }
            MaxFeatures::Fixed(k) => k,
            MaxFeatures::Fraction(f) => (f * n).trunc() as i64,
            MaxFeatures::All => n_features as i64,
        };
        let n_i = n_features as i64;
        let shifted = if raw < 0 { raw + n_i } else { raw };
        shifted.max(1).min(n_i.max(1)) as usize
    }

    fn validate(self) -> Result<(), ForestError> {
        match self {
            MaxFeatures::Fraction(f) if !f.is_finite() => {
                Err(ForestError::InvalidMaxFeatures { fraction: f })
            }
            _ => Ok(()),
        }
    }
}

impl FromStr for MaxFeatures {
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqrt" => return Ok(MaxFeatures::Sqrt),
            "log2" => return Ok(MaxFeatures::Log2),
            "all" | "none" => return Ok(MaxFeatures::All),
            _ => {}
        }
        if let Ok(k) = s.parse::<i64>() {
            return Ok(MaxFeatures::Fixed(k));
        }
        match s.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(MaxFeatures::Fraction(f)),
            _ => Err(ForestError::UnknownMaxFeatures {
                value: s.to_string(),
            }),
        }
    }
}

/// How a regression forest combines member predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Aggregation {
    /// Weighted mean; members with lower error get more weight.
    Mean,
    /// Unweighted median.
    Median,
}

impl FromStr for Aggregation {
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Aggregation::Mean),
            "median" => Ok(Aggregation::Median),
            other => Err(ForestError::UnknownAggregation {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Mean => write!(f, "mean"),
            Aggregation::Median => write!(f, "median"),
        }
    }
}

/// Configuration for an adaptive random forest.
///
/// Construct via [`ForestConfig::new`], then chain `with_*` methods. The
/// remaining parameters are checked when the forest is built.
///
/// # Defaults
///
/// | Parameter               | Default            |
/// |-------------------------|--------------------|
/// | `max_features`          | `Sqrt`             |
/// | `lambda`                | 6.0                |
/// | `disable_weighted_vote` | `false`            |
/// | `drift_detector`        | ADWIN, δ = 0.001   |
/// | `warning_detector`      | ADWIN, δ = 0.01    |
/// | `seed`                  | `None` (entropy)   |
/// | `parallel`              | `false`            |
/// | `grace_period`          | 50                 |
/// | `max_depth`             | `None`             |
/// | `split_confidence`      | 0.01               |
/// | `tie_threshold`         | 0.05               |
/// | `split_criterion`       | `InfoGain`         |
/// | `leaf_prediction`       | `NaiveBayesAdaptive` |
/// | `nb_threshold`          | 0.0                |
/// | `min_samples_split`     | 5.0 (regression)   |
/// | `aggregation`           | `Median` (regression) |
/// | `regression_metric`     | `Mse` (regression) |
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ForestConfig {
    pub(crate) n_models: usize,
    pub(crate) max_features: MaxFeatures,
    pub(crate) lambda: f64,
    pub(crate) disable_weighted_vote: bool,
    pub(crate) drift_detector: Option<Detector>,
    pub(crate) warning_detector: Option<Detector>,
    pub(crate) seed: Option<u64>,
    pub(crate) parallel: bool,
    pub(crate) grace_period: usize,
    pub(crate) max_depth: Option<usize>,
    pub(crate) split_confidence: f64,
    pub(crate) tie_threshold: f64,
    pub(crate) nominal_features: BTreeSet<usize>,
    pub(crate) split_criterion: SplitCriterion,
    pub(crate) leaf_prediction: LeafPrediction,
    pub(crate) nb_threshold: f64,
    pub(crate) min_samples_split: f64,
    pub(crate) aggregation: Aggregation,
    pub(crate) regression_metric: RegressionMetric,
}

impl ForestConfig {
    /// Create a new config with the given number of members.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidModelCount`] if `n_models` is zero.
    pub fn new(n_models: usize) -> Result<Self, ForestError> {
        if n_models == 0 {
            return Err(ForestError::InvalidModelCount { n_models });
        }
        Ok(Self {
            n_models,
            max_features: MaxFeatures::Sqrt,
            lambda: 6.0,
            disable_weighted_vote: false,
            drift_detector: Some(Detector::Adwin(Adwin::new(0.001)?)),
            warning_detector: Some(Detector::Adwin(Adwin::new(0.01)?)),
            seed: None,
            parallel: false,
            grace_period: 50,
            max_depth: None,
            split_confidence: 0.01,
            tie_threshold: 0.05,
            nominal_features: BTreeSet::new(),
            split_criterion: SplitCriterion::InfoGain {
                min_branch_fraction: DEFAULT_MIN_BRANCH_FRACTION,
            },
            leaf_prediction: LeafPrediction::NaiveBayesAdaptive,
            nb_threshold: 0.0,
            min_samples_split: 5.0,
            aggregation: Aggregation::Median,
            regression_metric: RegressionMetric::Mse,
        })
    }

    // --- Setters ---

    /// Set the per-leaf feature sampling strategy.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the Poisson rate used for online bagging.
    #[must_use]
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    /// Give every member the same vote instead of weighting by its metric.
    #[must_use]
    pub fn with_disable_weighted_vote(mut self, disable: bool) -> Self {
        self.disable_weighted_vote = disable;
        self
    }

    /// Set the drift detector prototype. `None` disables detection entirely.
    #[must_use]
    pub fn with_drift_detector(mut self, detector: Option<Detector>) -> Self {
        self.drift_detector = detector;
        self
    }

    /// Set the warning detector prototype. `None` disables background learners.
    #[must_use]
    pub fn with_warning_detector(mut self, detector: Option<Detector>) -> Self {
        self.warning_detector = detector;
        self
    }

    /// Set the ensemble seed. `None` seeds from OS entropy.
    #[must_use]
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Update members on the rayon pool.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the member trees' grace period.
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: usize) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Set the member trees' maximum depth. `None` means unlimited.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the member trees' split confidence.
    #[must_use]
    pub fn with_split_confidence(mut self, split_confidence: f64) -> Self {
        self.split_confidence = split_confidence;
        self
    }

    /// Set the member trees' tie threshold.
    #[must_use]
    pub fn with_tie_threshold(mut self, tie_threshold: f64) -> Self {
        self.tie_threshold = tie_threshold;
        self
    }

    /// Mark feature columns as nominal.
    #[must_use]
    pub fn with_nominal_features(mut self, features: impl IntoIterator<Item = usize>) -> Self {
        self.nominal_features = features.into_iter().collect();
        self
    }

    /// Set the classification split criterion.
    #[must_use]
    pub fn with_split_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.split_criterion = criterion;
        self
    }

    /// Set the classification leaf prediction strategy.
    #[must_use]
    pub fn with_leaf_prediction(mut self, leaf_prediction: LeafPrediction) -> Self {
        self.leaf_prediction = leaf_prediction;
        self
    }

    /// Set the leaf weight required before naive Bayes is consulted.
    #[must_use]
    pub fn with_nb_threshold(mut self, nb_threshold: f64) -> Self {
        self.nb_threshold = nb_threshold;
        self
    }

    /// Set the minimum branch weight for regression splits.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: f64) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set how regression predictions are combined.
    #[must_use]
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Set the error metric regression members are weighted by.
    #[must_use]
    pub fn with_regression_metric(mut self, metric: RegressionMetric) -> Self {
        self.regression_metric = metric;
        self
    }

    // --- Getters ---

    /// Return the number of members.
    #[must_use]
    pub fn n_models(&self) -> usize {
        self.n_models
    }

    /// Return the feature sampling strategy.
    #[must_use]
    pub fn max_features(&self) -> MaxFeatures {
        self.max_features
    }

    /// Return the Poisson rate.
    #[must_use]
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Return whether weighted voting is disabled.
    #[must_use]
    pub fn disable_weighted_vote(&self) -> bool {
        self.disable_weighted_vote
    }

    /// Return the drift detector prototype.
    #[must_use]
    pub fn drift_detector(&self) -> Option<&Detector> {
        self.drift_detector.as_ref()
    }

    /// Return the warning detector prototype.
    #[must_use]
    pub fn warning_detector(&self) -> Option<&Detector> {
        self.warning_detector.as_ref()
    }

    /// Return the ensemble seed.
    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Return whether members are updated in parallel.
    #[must_use]
    pub fn parallel(&self) -> bool {
        self.parallel
    }

    /// Return the regression aggregation method.
    #[must_use]
    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    /// Return the regression member metric.
    #[must_use]
    pub fn regression_metric(&self) -> RegressionMetric {
        self.regression_metric
    }

    /// Build the configuration of one member tree.
    pub(crate) fn tree_config(&self, max_features: usize, seed: u64) -> HoeffdingTreeConfig {
        HoeffdingTreeConfig::new()
            .with_grace_period(self.grace_period)
            .with_max_depth(self.max_depth)
            .with_split_confidence(self.split_confidence)
            .with_tie_threshold(self.tie_threshold)
            .with_max_features(Some(max_features))
            .with_nominal_features(self.nominal_features.iter().copied())
            .with_seed(seed)
    }

    /// Check the parameters that `with_*` setters accept unchecked.
    pub(crate) fn validate(&self) -> Result<(), ForestError> {
        if !(self.lambda.is_finite() && self.lambda > 0.0) {
            return Err(ForestError::InvalidLambda {
                lambda: self.lambda,
            });
        }
        self.max_features.validate()?;
        if let Some(d) = &self.drift_detector {
            d.validate()?;
        }
        if let Some(d) = &self.warning_detector {
            d.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- MaxFeatures ---

    #[test]
    fn max_features_resolution_examples() {
        assert_eq!(MaxFeatures::Sqrt.resolve(16), 4);
        assert_eq!(MaxFeatures::Fixed(-1).resolve(10), 9);
        assert_eq!(MaxFeatures::Fraction(0.5).resolve(10), 5);
        assert_eq!(MaxFeatures::All.resolve(7), 7);
        assert_eq!(MaxFeatures::Log2.resolve(8), 3);
    }

    #[test]
    fn max_features_clamps_into_range() {
        assert_eq!(MaxFeatures::Fixed(0).resolve(10), 1);
        assert_eq!(MaxFeatures::Fixed(50).resolve(10), 10);
        assert_eq!(MaxFeatures::Fixed(-20).resolve(10), 1);
        assert_eq!(MaxFeatures::Fraction(0.01).resolve(10), 1);
        assert_eq!(MaxFeatures::Fraction(3.0).resolve(10), 10);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
        assert_eq!(MaxFeatures::Log2.resolve(1), 1);
    }

    #[test]
    fn negative_fraction_counts_from_end() {
        assert_eq!(MaxFeatures::Fraction(-0.25).resolve(10), 8);
    }

    #[test]
    fn max_features_from_str() {
        assert_eq!("sqrt".parse::<MaxFeatures>().unwrap(), MaxFeatures::Sqrt);
        assert_eq!("log2".parse::<MaxFeatures>().unwrap(), MaxFeatures::Log2);
        assert_eq!("all".parse::<MaxFeatures>().unwrap(), MaxFeatures::All);
        assert_eq!("-2".parse::<MaxFeatures>().unwrap(), MaxFeatures::Fixed(-2));
        assert_eq!("0.25".parse::<MaxFeatures>().unwrap(), MaxFeatures::Fraction(0.25));
        assert!(matches!(
            "half".parse::<MaxFeatures>(),
            Err(ForestError::UnknownMaxFeatures { .. })
        ));
        assert!("inf".parse::<MaxFeatures>().is_err());
    }

    // --- Aggregation ---

    #[test]
    fn aggregation_from_str() {
        assert_eq!("mean".parse::<Aggregation>().unwrap(), Aggregation::Mean);
        assert_eq!("median".parse::<Aggregation>().unwrap(), Aggregation::Median);
        let err = "mode".parse::<Aggregation>().unwrap_err();
        assert!(matches!(err, ForestError::UnknownAggregation { ref name } if name == "mode"));
    }

    // --- ForestConfig ---

    #[test]
    fn zero_models_rejected() {
        assert!(matches!(
            ForestConfig::new(0),
            Err(ForestError::InvalidModelCount { n_models: 0 })
        ));
    }

    #[test]
    fn defaults() {
        let config = ForestConfig::new(10).unwrap();
        assert_eq!(config.n_models(), 10);
        assert_eq!(config.max_features(), MaxFeatures::Sqrt);
        assert_eq!(config.lambda(), 6.0);
        assert!(!config.disable_weighted_vote());
        assert!(config.drift_detector().is_some());
        assert!(config.warning_detector().is_some());
        assert_eq!(config.seed(), None);
        assert_eq!(config.aggregation(), Aggregation::Median);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_lambda_rejected() {
        for lambda in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = ForestConfig::new(1).unwrap().with_lambda(lambda);
            assert!(matches!(
                config.validate(),
                Err(ForestError::InvalidLambda { .. })
            ));
        }
    }

    #[test]
    fn tree_config_carries_member_settings() {
        let config = ForestConfig::new(3)
            .unwrap()
            .with_grace_period(25)
            .with_max_depth(Some(4))
            .with_nominal_features([1]);
        let tree = config.tree_config(2, 99);
        assert_eq!(tree.grace_period(), 25);
        assert_eq!(tree.max_depth(), Some(4));
        assert_eq!(tree.max_features(), Some(2));
        assert_eq!(tree.seed(), 99);
        assert!(tree.nominal_features().contains(&1));
    }
}
