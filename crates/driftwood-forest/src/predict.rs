//! Prediction and vote aggregation for adaptive random forests.

use driftwood_tree::{HoeffdingTreeClassifier, HoeffdingTreeRegressor};

use crate::config::Aggregation;
use crate::error::ForestError;
use crate::forest::AdaptiveRandomForest;
use crate::metric::Metric;

/// Class probability distribution from a prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDistribution {
    probs: Vec<f64>,
}

impl ClassDistribution {
    /// Create a new class distribution.
    pub(crate) fn new(probs: Vec<f64>) -> Self {
        Self { probs }
    }

    /// Return the most probable class, or `None` when no class has mass.
    ///
    /// Ties resolve to the lowest class id.
    #[must_use]
    pub fn predicted_class(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (class, &p) in self.probs.iter().enumerate() {
            if p > 0.0 && best.is_none_or(|(_, b)| p > b) {
                best = Some((class, p));
            }
        }
        best.map(|(class, _)| class)
    }

    /// Return the top-k classes sorted by descending probability.
    #[must_use]
    pub fn top_k(&self, k: usize) -> Vec<(usize, f64)> {
        let mut indexed: Vec<(usize, f64)> = self.probs.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
        indexed.truncate(k);
        indexed
    }

    /// Return the probability distribution as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.probs
    }

    /// Return `true` when no member contributed any mass.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probs.iter().all(|&p| p <= 0.0)
    }
}

/// Sum `(distribution, weight)` votes and normalise to 1.
///
/// An all-zero sum is returned unnormalised.
pub(crate) fn weighted_vote(votes: impl IntoIterator<Item = (Vec<f64>, f64)>) -> ClassDistribution {
    let mut acc: Vec<f64> = Vec::new();
    for (proba, weight) in votes {
        if acc.len() < proba.len() {
            acc.resize(proba.len(), 0.0);
        }
        for (a, p) in acc.iter_mut().zip(&proba) {
            *a += p * weight;
        }
    }
    let total: f64 = acc.iter().sum();
    if total > 0.0 {
        for a in &mut acc {
            *a /= total;
        }
    }
    ClassDistribution::new(acc)
}

/// Combine regression predictions.
///
/// `errors` holds each member's error metric, or `None` for an unweighted
/// combination. For the mean, member `i` gets weight `Σe - e_i`, so lower
/// error means more weight; degenerate weights fall back to the plain mean.
/// The median never uses weights.
pub(crate) fn aggregate_regression(
    predictions: &[f64],
    errors: Option<&[f64]>,
    aggregation: Aggregation,
) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    match aggregation {
        Aggregation::Median => median(predictions),
        Aggregation::Mean => errors
            .and_then(|e| weighted_mean(predictions, e))
            .unwrap_or_else(|| predictions.iter().sum::<f64>() / predictions.len() as f64),
    }
}

fn weighted_mean(predictions: &[f64], errors: &[f64]) -> Option<f64> {
    let sum: f64 = errors.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return None;
    }
    let weights: Vec<f64> = errors.iter().map(|e| sum - e).collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }
    Some(
        predictions
            .iter()
            .zip(&weights)
            .map(|(p, w)| p * w / total)
            .sum(),
    )
}

/// Median of a non-empty slice; the mean of the middle pair for even lengths.
fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

impl AdaptiveRandomForest<HoeffdingTreeClassifier> {
    /// Predict the class label for a single example.
    ///
    /// Returns `None` before the forest has learned anything.
    ///
    /// # Errors
    ///
    /// Same as [`predict_proba`](Self::predict_proba).
    pub fn predict(&self, x: &[Option<f64>]) -> Result<Option<usize>, ForestError> {
        Ok(self.predict_proba(x)?.predicted_class())
    }

    /// Return the combined class distribution for a single example.
    ///
    /// Each member's distribution is scaled by its accuracy when weighted
    /// voting is on and that accuracy is positive, otherwise by 1.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::ZeroFeatures`] | `x` is empty |
    /// | [`ForestError::FeatureCountMismatch`] | width differs from the training examples |
    /// | [`ForestError::NonFiniteValue`] | a present value is NaN or infinite |
    pub fn predict_proba(&self, x: &[Option<f64>]) -> Result<ClassDistribution, ForestError> {
        self.check_features(x)?;
        let weighted = !self.config.disable_weighted_vote;
        Ok(weighted_vote(self.members.iter().map(|member| {
            let score = member.metric().get();
            let weight = if weighted && score > 0.0 { score } else { 1.0 };
            (member.model().predict_proba(x), weight)
        })))
    }
}

impl AdaptiveRandomForest<HoeffdingTreeRegressor> {
    /// Predict the target for a single example.
    ///
    /// Returns `0.0` before the forest has learned anything.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::ZeroFeatures`] | `x` is empty |
    /// | [`ForestError::FeatureCountMismatch`] | width differs from the training examples |
    /// | [`ForestError::NonFiniteValue`] | a present value is NaN or infinite |
    pub fn predict(&self, x: &[Option<f64>]) -> Result<f64, ForestError> {
        self.check_features(x)?;
        let predictions: Vec<f64> = self.members.iter().map(|m| m.predict(x)).collect();
        let errors: Option<Vec<f64>> = (!self.config.disable_weighted_vote)
            .then(|| self.members.iter().map(|m| m.metric().get()).collect());
        Ok(aggregate_regression(
            &predictions,
            errors.as_deref(),
            self.config.aggregation,
        ))
    }
}
