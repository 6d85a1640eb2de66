use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::TreeError;
use crate::node::FeatureIndex;
use crate::observer::{BinaryTreeObserver, FeatureObserver, NominalObserver, SplitSuggestion};
use crate::stats::{ClassCounts, GaussianEstimator, SplitStats, TargetStats};
use crate::tree::TreeTask;

/// One weighted example as seen by a leaf.
#[derive(Debug, Clone, Copy)]
pub struct LeafInput<'a, Y> {
    /// Feature values; `None` is missing.
    pub x: &'a [Option<f64>],
    /// Label or target.
    pub target: Y,
    /// Positive example weight.
    pub weight: f64,
    /// Indices of nominal features.
    pub nominal: &'a BTreeSet<usize>,
    /// Features the leaf observes, in ascending order.
    pub features: &'a [usize],
}

/// Prediction model kept in each leaf beside its split statistics.
pub trait LeafLearner<S: SplitStats>:
    Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned
{
    /// Update the model with one example.
    ///
    /// `stats` are the leaf statistics *before* this example is recorded.
    fn learn(&mut self, input: &LeafInput<'_, S::Target>, stats: &S);

    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns a [`TreeError`] describing the first invalid parameter.
    fn validate(&self) -> Result<(), TreeError> {
        Ok(())
    }
}

/// How a classification leaf turns its statistics into a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LeafPrediction {
    /// Class frequencies observed at the leaf.
    MajorityClass,
    /// Naive Bayes over the features observed at the leaf.
    NaiveBayes,
    /// Whichever of the two has been more accurate on the leaf's training examples.
    NaiveBayesAdaptive,
}

impl FromStr for LeafPrediction {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mc" => Ok(LeafPrediction::MajorityClass),
            "nb" => Ok(LeafPrediction::NaiveBayes),
            "nba" => Ok(LeafPrediction::NaiveBayesAdaptive),
            other => Err(TreeError::UnknownLeafPrediction {
                name: other.to_string(),
            }),
        }
    }
}

/// Classification leaf model: majority class, naive Bayes, or adaptive choice.
///
/// Numeric features use a per-class [`GaussianEstimator`]; nominal features
/// use Laplace-smoothed per-value class counts.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NaiveBayesLeaf {
    mode: LeafPrediction,
    nb_threshold: f64,
    numeric: BTreeMap<usize, Vec<GaussianEstimator>>,
    nominal: BTreeMap<usize, NominalObserver<ClassCounts>>,
    mc_correct: f64,
    nb_correct: f64,
}

impl NaiveBayesLeaf {
    /// Create an untrained leaf model.
    ///
    /// Naive Bayes is only consulted once the leaf holds `nb_threshold` weight.
    #[must_use]
    pub fn new(mode: LeafPrediction, nb_threshold: f64) -> Self {
        Self {
            mode,
            nb_threshold,
            numeric: BTreeMap::new(),
            nominal: BTreeMap::new(),
            mc_correct: 0.0,
            nb_correct: 0.0,
        }
    }

    /// Return the prediction mode.
    #[must_use]
    pub fn mode(&self) -> LeafPrediction {
        self.mode
    }

    /// Class distribution for `x` given the leaf statistics.
    ///
    /// Returns an empty vector when the leaf has seen nothing.
    #[must_use]
    pub fn predict_proba(&self, stats: &ClassCounts, x: &[Option<f64>]) -> Vec<f64> {
        let use_nb = stats.total_weight() >= self.nb_threshold
            && match self.mode {
                LeafPrediction::MajorityClass => false,
                LeafPrediction::NaiveBayes => true,
                LeafPrediction::NaiveBayesAdaptive => self.nb_correct >= self.mc_correct,
            };
        if use_nb && let Some(proba) = self.naive_bayes(stats, x) {
            return proba;
        }
        stats.normalized()
    }

    /// Naive Bayes posterior, or `None` when every class has zero likelihood.
    fn naive_bayes(&self, stats: &ClassCounts, x: &[Option<f64>]) -> Option<Vec<f64>> {
        let total = stats.total_weight();
        if total <= 0.0 {
            return None;
        }
        let mut log_scores: Vec<f64> = stats
            .as_slice()
            .iter()
            .map(|&w| if w > 0.0 { (w / total).ln() } else { f64::NEG_INFINITY })
            .collect();

        for (class, score) in log_scores.iter_mut().enumerate() {
            if *score == f64::NEG_INFINITY {
                continue;
            }
            for (&feature, estimators) in &self.numeric {
                let Some(value) = x.get(feature).copied().flatten() else {
                    continue;
                };
                if let Some(est) = estimators.get(class)
                    && est.weight() > 0.0
                {
                    *score += est.density(value).ln();
                }
            }
            for (&feature, counts) in &self.nominal {
                let Some(value) = x.get(feature).copied().flatten() else {
                    continue;
                };
                let class_total = counts.total().get(class);
                let value_count = counts.stats_for(value).map_or(0.0, |c| c.get(class));
                *score += ((value_count + 1.0) / (class_total + counts.n_values() as f64)).ln();
            }
        }

        let max = log_scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return None;
        }
        let mut proba: Vec<f64> = log_scores.iter().map(|s| (s - max).exp()).collect();
        let sum: f64 = proba.iter().sum();
        proba.iter_mut().for_each(|p| *p /= sum);
        Some(proba)
    }
}

fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v > 0.0 && best.is_none_or(|(_, bv)| v > bv) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

impl LeafLearner<ClassCounts> for NaiveBayesLeaf {
    fn learn(&mut self, input: &LeafInput<'_, usize>, stats: &ClassCounts) {
        if self.mode == LeafPrediction::NaiveBayesAdaptive && stats.total_weight() > 0.0 {
            if stats.majority_class() == Some(input.target) {
                self.mc_correct += input.weight;
            }
            let nb_pred = self.naive_bayes(stats, input.x).and_then(|p| argmax(&p));
            if nb_pred == Some(input.target) {
                self.nb_correct += input.weight;
            }
        }
        if self.mode == LeafPrediction::MajorityClass {
            return;
        }

        for &feature in input.features {
            let Some(value) = input.x.get(feature).copied().flatten() else {
                continue;
            };
            if input.nominal.contains(&feature) {
                self.nominal
                    .entry(feature)
                    .or_default()
                    .update(Some(value), input.target, input.weight);
            } else {
                let per_class = self.numeric.entry(feature).or_default();
                if per_class.len() <= input.target {
                    per_class.resize(input.target + 1, GaussianEstimator::default());
                }
                per_class[input.target].update(value, input.weight);
            }
        }
    }

    fn validate(&self) -> Result<(), TreeError> {
        if self.nb_threshold.is_finite() && self.nb_threshold >= 0.0 {
            Ok(())
        } else {
            Err(TreeError::InvalidNbThreshold {
                nb_threshold: self.nb_threshold,
            })
        }
    }
}

impl Default for NaiveBayesLeaf {
    fn default() -> Self {
        Self::new(LeafPrediction::NaiveBayesAdaptive, 0.0)
    }
}

/// Regression leaf model: predicts the mean target held in the leaf statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TargetMean;

impl LeafLearner<TargetStats> for TargetMean {
    fn learn(&mut self, _input: &LeafInput<'_, f64>, _stats: &TargetStats) {}
}

/// Settings a leaf needs from its tree while learning.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LeafContext<'a> {
    pub(crate) max_features: Option<usize>,
    pub(crate) nominal: &'a BTreeSet<usize>,
}

/// A growing leaf: statistics, attribute observers and prediction model.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct LearningLeaf<T: TreeTask> {
    pub(crate) stats: T::Stats,
    pub(crate) learner: T::Learner,
    depth: usize,
    weight_at_last_attempt: f64,
    observers: Vec<Option<FeatureObserver<T::Stats>>>,
    feature_subset: Option<Vec<usize>>,
    seed: u64,
}

impl<T: TreeTask> LearningLeaf<T> {
    pub(crate) fn new(stats: T::Stats, learner: T::Learner, depth: usize, seed: u64) -> Self {
        let weight_at_last_attempt = stats.total_weight();
        Self {
            stats,
            learner,
            depth,
            weight_at_last_attempt,
            observers: Vec::new(),
            feature_subset: None,
            seed,
        }
    }

    /// Return the leaf statistics.
    #[must_use]
    pub fn stats(&self) -> &T::Stats {
        &self.stats
    }

    /// Return the leaf depth (root is 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Return the features this leaf observes, once sampled.
    #[must_use]
    pub fn feature_subset(&self) -> Option<&[usize]> {
        self.feature_subset.as_deref()
    }

    pub(crate) fn weight_since_last_attempt(&self) -> f64 {
        self.stats.total_weight() - self.weight_at_last_attempt
    }

    pub(crate) fn mark_attempt(&mut self) {
        self.weight_at_last_attempt = self.stats.total_weight();
    }

    /// Draw the leaf's feature subset by partial Fisher-Yates shuffle.
    fn sample_features(&self, n_features: usize, max_features: Option<usize>) -> Vec<usize> {
        let k = max_features.unwrap_or(n_features).min(n_features);
        if k >= n_features {
            return (0..n_features).collect();
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut indices: Vec<usize> = (0..n_features).collect();
        for i in 0..k {
            let j = rng.gen_range(i..n_features);
            indices.swap(i, j);
        }
        let mut subset = indices[..k].to_vec();
        subset.sort_unstable();
        subset
    }

    pub(crate) fn learn(
        &mut self,
        x: &[Option<f64>],
        target: <T::Stats as SplitStats>::Target,
        weight: f64,
        ctx: &LeafContext<'_>,
    ) {
        if self.feature_subset.is_none() {
            self.feature_subset = Some(self.sample_features(x.len(), ctx.max_features));
        }

        let input = LeafInput {
            x,
            target,
            weight,
            nominal: ctx.nominal,
            features: self.feature_subset.as_deref().unwrap_or_default(),
        };
        self.learner.learn(&input, &self.stats);
        self.stats.record(target, weight);

        if self.observers.len() < x.len() {
            self.observers.resize_with(x.len(), || None);
        }
        for &feature in self.feature_subset.iter().flatten() {
            let Some(&value) = x.get(feature) else {
                continue;
            };
            self.observers[feature]
                .get_or_insert_with(|| {
                    if ctx.nominal.contains(&feature) {
                        FeatureObserver::Nominal(NominalObserver::default())
                    } else {
                        FeatureObserver::Numeric(BinaryTreeObserver::new())
                    }
                })
                .update(value, target, weight);
        }
    }

    /// Best suggestion from each observed feature, in feature order.
    pub(crate) fn best_split_suggestions(
        &self,
        criterion: &T::Criterion,
    ) -> Vec<SplitSuggestion<T::Stats>> {
        self.observers
            .iter()
            .enumerate()
            .filter_map(|(feature, obs)| {
                obs.as_ref()?
                    .best_split(criterion, &self.stats, FeatureIndex::new(feature))
            })
            .collect()
    }
}
