//! Forest members: a tree, its metric, and the drift/warning lifecycle.

use std::fmt;

use driftwood_drift::{ChangeDetector, Detector};
use driftwood_tree::{
    GaussianEstimator, HoeffdingTreeClassifier, HoeffdingTreeRegressor, NaiveBayesLeaf,
    TargetMean, VarianceReduction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ForestConfig;
use crate::error::ForestError;
use crate::metric::{Accuracy, Metric, RunningError};

/// Turns a member's own prediction into the value its detectors watch.
pub trait DriftSignal<Y, P>:
    Clone + Default + fmt::Debug + Send + Sync + Serialize + DeserializeOwned
{
    /// Return the detector input for one scored example.
    fn input(&mut self, y_true: Y, y_pred: &P) -> f64;
}

/// `0.0` for a correct class prediction, `1.0` otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Misclassification;

impl DriftSignal<usize, Option<usize>> for Misclassification {
    fn input(&mut self, y_true: usize, y_pred: &Option<usize>) -> f64 {
        if *y_pred == Some(y_true) { 0.0 } else { 1.0 }
    }
}

/// Regression error rescaled by its running spread.
///
/// Maps `e = y - ŷ` to `(e + 3σ) / (6σ)`, which sits in `[0, 1]` for errors
/// within three standard deviations. The first error, and any error while
/// `σ = 0`, maps to `0.5`.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NormalizedError {
    errors: GaussianEstimator,
}

impl DriftSignal<f64, f64> for NormalizedError {
    fn input(&mut self, y_true: f64, y_pred: &f64) -> f64 {
        let e = y_true - *y_pred;
        self.errors.update(e, 1.0);
        if self.errors.weight() <= 1.0 {
            return 0.5;
        }
        let sd = self.errors.std_dev();
        if sd > 0.0 { (e + 3.0 * sd) / (6.0 * sd) } else { 0.5 }
    }
}

/// A base learner the forest can grow, reset and weight.
pub trait MemberModel:
    Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Ground-truth type.
    type Target: Copy + fmt::Debug + PartialEq + Send + Sync;
    /// Point prediction type.
    type Prediction: Clone + fmt::Debug + Send + Sync;
    /// Metric a member is weighted by.
    type Metric: Metric<Self::Target, Self::Prediction>;
    /// Detector input derived from the member's predictions.
    type Signal: DriftSignal<Self::Target, Self::Prediction>;

    /// Build an untrained model for one member.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::Tree`] when the tree settings are invalid.
    fn build(config: &ForestConfig, max_features: usize, seed: u64) -> Result<Self, ForestError>;

    /// Build the pristine metric each member starts with.
    fn metric(config: &ForestConfig) -> Self::Metric;

    /// Reject targets the model cannot learn from.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::NonFiniteTarget`] for unusable regression targets.
    fn check_target(_y: Self::Target) -> Result<(), ForestError> {
        Ok(())
    }

    /// Learn one weighted example.
    fn learn(&mut self, x: &[Option<f64>], y: Self::Target, weight: f64);

    /// Predict one example.
    fn predict(&self, x: &[Option<f64>]) -> Self::Prediction;

    /// Return an untrained copy with the same settings and seed.
    #[must_use]
    fn fresh(&self) -> Self;

    /// Return an untrained copy whose randomness continues this model's lineage.
    fn new_instance(&mut self) -> Self;
}

impl MemberModel for HoeffdingTreeClassifier {
    type Target = usize;
    type Prediction = Option<usize>;
    type Metric = Accuracy;
    type Signal = Misclassification;

    fn build(config: &ForestConfig, max_features: usize, seed: u64) -> Result<Self, ForestError> {
        Ok(HoeffdingTreeClassifier::new(
            config.tree_config(max_features, seed),
            config.split_criterion,
            NaiveBayesLeaf::new(config.leaf_prediction, config.nb_threshold),
        )?)
    }

    fn metric(_config: &ForestConfig) -> Accuracy {
        Accuracy::default()
    }

    fn learn(&mut self, x: &[Option<f64>], y: usize, weight: f64) {
        HoeffdingTreeClassifier::learn(self, x, y, weight);
    }

    fn predict(&self, x: &[Option<f64>]) -> Option<usize> {
        HoeffdingTreeClassifier::predict(self, x)
    }

    fn fresh(&self) -> Self {
        HoeffdingTreeClassifier::fresh(self)
    }

    fn new_instance(&mut self) -> Self {
        HoeffdingTreeClassifier::new_instance(self)
    }
}

impl MemberModel for HoeffdingTreeRegressor {
    type Target = f64;
    type Prediction = f64;
    type Metric = RunningError;
    type Signal = NormalizedError;

    fn build(config: &ForestConfig, max_features: usize, seed: u64) -> Result<Self, ForestError> {
        Ok(HoeffdingTreeRegressor::new(
            config.tree_config(max_features, seed),
            VarianceReduction::new(config.min_samples_split),
            TargetMean,
        )?)
    }

    fn metric(config: &ForestConfig) -> RunningError {
        RunningError::new(config.regression_metric)
    }

    fn check_target(y: f64) -> Result<(), ForestError> {
        if y.is_finite() {
            Ok(())
        } else {
            Err(ForestError::NonFiniteTarget { target: y })
        }
    }

    fn learn(&mut self, x: &[Option<f64>], y: f64, weight: f64) {
        HoeffdingTreeRegressor::learn(self, x, y, weight);
    }

    fn predict(&self, x: &[Option<f64>]) -> f64 {
        HoeffdingTreeRegressor::predict(self, x)
    }

    fn fresh(&self) -> Self {
        HoeffdingTreeRegressor::fresh(self)
    }

    fn new_instance(&mut self) -> Self {
        HoeffdingTreeRegressor::new_instance(self)
    }
}

/// A model trained in the shadow of a member after a warning.
///
/// It learns every example its member learns but never runs detection.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct BackgroundLearner<M: MemberModel> {
    model: M,
    metric: M::Metric,
    drift_detector: Option<Detector>,
    warning_detector: Option<Detector>,
    created_on: u64,
}

impl<M: MemberModel> BackgroundLearner<M> {
    /// Return the shadow model.
    #[must_use]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Return the example count at which this learner was spawned.
    #[must_use]
    pub fn created_on(&self) -> u64 {
        self.created_on
    }
}

/// One slot of the ensemble.
///
/// On a warning the member starts a [`BackgroundLearner`]; on drift it
/// promotes that learner, or restarts from an untrained copy of its model
/// when there is none.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct ForestMember<M: MemberModel> {
    index: usize,
    model: M,
    metric: M::Metric,
    pristine_metric: M::Metric,
    drift_detector: Option<Detector>,
    warning_detector: Option<Detector>,
    background: Option<BackgroundLearner<M>>,
    signal: M::Signal,
    created_on: u64,
    last_drift_on: u64,
    last_warning_on: u64,
    n_drifts_detected: u64,
    n_warnings_detected: u64,
}

impl<M: MemberModel> ForestMember<M> {
    /// Wrap an untrained model.
    ///
    /// The detectors are used as given; the metric is kept as the pristine
    /// copy restored on every reset.
    #[must_use]
    pub fn new(
        index: usize,
        model: M,
        metric: M::Metric,
        drift_detector: Option<Detector>,
        warning_detector: Option<Detector>,
        created_on: u64,
    ) -> Self {
        Self {
            index,
            model,
            pristine_metric: metric.clone(),
            metric,
            drift_detector,
            warning_detector,
            background: None,
            signal: M::Signal::default(),
            created_on,
            last_drift_on: 0,
            last_warning_on: 0,
            n_drifts_detected: 0,
            n_warnings_detected: 0,
        }
    }

    /// Test-then-train step driven by the forest: score, then learn `k` copies.
    pub(crate) fn step(&mut self, x: &[Option<f64>], y: M::Target, k: f64, n_samples_seen: u64) {
        let y_pred = self.model.predict(x);
        self.metric.update(y, &y_pred);
        if k > 0.0 {
            self.learn(x, y, k, n_samples_seen);
        }
    }

    /// Learn one weighted example and run the drift/warning lifecycle.
    ///
    /// `n_samples_seen` is the forest's example count, recorded as the
    /// timestamp of any warning, drift or reset this example triggers.
    pub fn learn(&mut self, x: &[Option<f64>], y: M::Target, weight: f64, n_samples_seen: u64) {
        self.model.learn(x, y, weight);
        if let Some(bg) = self.background.as_mut() {
            bg.model.learn(x, y, weight);
        }

        if self.drift_detector.is_none() {
            return;
        }
        let y_pred = self.model.predict(x);
        let input = self.signal.input(y, &y_pred);

        if let Some(warning) = self.warning_detector.as_mut()
            && warning.update(input)
        {
            self.last_warning_on = n_samples_seen;
            self.n_warnings_detected += 1;
            *warning = warning.fresh();
            self.background = Some(BackgroundLearner {
                model: self.model.new_instance(),
                metric: self.pristine_metric.clone(),
                drift_detector: self.drift_detector.as_ref().map(ChangeDetector::fresh),
                warning_detector: Some(warning.fresh()),
                created_on: n_samples_seen,
            });
            debug!(member = self.index, n_samples_seen, "warning detected, background learner started");
        }

        let drifted = self
            .drift_detector
            .as_mut()
            .is_some_and(|d| d.update(input));
        if drifted {
            self.last_drift_on = n_samples_seen;
            self.n_drifts_detected += 1;
            self.reset(n_samples_seen);
        }
    }

    fn reset(&mut self, n_samples_seen: u64) {
        if let Some(bg) = self.background.take() {
            debug!(
                member = self.index,
                n_samples_seen,
                background_created_on = bg.created_on,
                "drift detected, background learner promoted"
            );
            self.model = bg.model;
            self.metric = bg.metric;
            self.drift_detector = bg.drift_detector;
            self.warning_detector = bg.warning_detector;
            self.created_on = bg.created_on;
        } else {
            debug!(member = self.index, n_samples_seen, "drift detected, member restarted");
            self.model = self.model.fresh();
            self.metric = self.pristine_metric.clone();
            self.drift_detector = self.drift_detector.as_ref().map(ChangeDetector::fresh);
            self.created_on = n_samples_seen;
        }
        self.signal = M::Signal::default();
    }

    /// Predict with the member's current model.
    #[must_use]
    pub fn predict(&self, x: &[Option<f64>]) -> M::Prediction {
        self.model.predict(x)
    }

    // --- Getters ---

    /// Return this member's position in the ensemble.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Return the current model.
    #[must_use]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Return the member's metric.
    #[must_use]
    pub fn metric(&self) -> &M::Metric {
        &self.metric
    }

    /// Return the drift detector, if detection is enabled.
    #[must_use]
    pub fn drift_detector(&self) -> Option<&Detector> {
        self.drift_detector.as_ref()
    }

    /// Return the warning detector, if background learning is enabled.
    #[must_use]
    pub fn warning_detector(&self) -> Option<&Detector> {
        self.warning_detector.as_ref()
    }

    /// Return the background learner, if a warning is pending.
    #[must_use]
    pub fn background(&self) -> Option<&BackgroundLearner<M>> {
        self.background.as_ref()
    }

    /// Return `true` while a background learner is being trained.
    #[must_use]
    pub fn has_background_learner(&self) -> bool {
        self.background.is_some()
    }

    /// Return the example count at which the current model started.
    #[must_use]
    pub fn created_on(&self) -> u64 {
        self.created_on
    }

    /// Return the example count of the last drift, `0` if none.
    #[must_use]
    pub fn last_drift_on(&self) -> u64 {
        self.last_drift_on
    }

    /// Return the example count of the last warning, `0` if none.
    #[must_use]
    pub fn last_warning_on(&self) -> u64 {
        self.last_warning_on
    }

    /// Return the number of drifts detected.
    #[must_use]
    pub fn n_drifts_detected(&self) -> u64 {
        self.n_drifts_detected
    }

    /// Return the number of warnings detected.
    #[must_use]
    pub fn n_warnings_detected(&self) -> u64 {
        self.n_warnings_detected
    }
}

#[cfg(test)]
mod tests {
    use driftwood_drift::ScheduledDetector;
    use driftwood_tree::{HoeffdingTreeConfig, SplitCriterion};

    use super::*;

    fn classifier_member(
        drift: Option<&[u64]>,
        warning: Option<&[u64]>,
    ) -> ForestMember<HoeffdingTreeClassifier> {
        let model = HoeffdingTreeClassifier::new(
            HoeffdingTreeConfig::new().with_grace_period(10),
            SplitCriterion::info_gain(),
            NaiveBayesLeaf::default(),
        )
        .unwrap();
        let scheduled = |s: &[u64]| Detector::from(ScheduledDetector::new(s.iter().copied()));
        ForestMember::new(
            0,
            model,
            Accuracy::default(),
            drift.map(scheduled),
            warning.map(scheduled),
            1,
        )
    }

    fn example(i: u64) -> (Vec<Option<f64>>, usize) {
        let class = (i % 2) as usize;
        (vec![Some(class as f64 + 0.1 * (i % 5) as f64)], class)
    }

    // --- Drift signals ---

    #[test]
    fn misclassification_signal() {
        let mut s = Misclassification;
        assert_eq!(s.input(1, &Some(1)), 0.0);
        assert_eq!(s.input(1, &Some(0)), 1.0);
        assert_eq!(s.input(1, &None), 1.0);
    }

    #[test]
    fn normalized_error_signal() {
        let mut s = NormalizedError::default();
        assert_eq!(s.input(1.0, &0.0), 0.5);
        // Errors 1 and 3: mean 2, sample sd sqrt(2).
        let sd = 2.0_f64.sqrt();
        let got = s.input(3.0, &0.0);
        assert!((got - (3.0 + 3.0 * sd) / (6.0 * sd)).abs() < 1e-12);

        let mut flat = NormalizedError::default();
        flat.input(2.0, &1.0);
        assert_eq!(flat.input(2.0, &1.0), 0.5);
    }

    // --- Lifecycle ---

    #[test]
    fn drift_without_background_restarts_member() {
        let mut member = classifier_member(Some(&[3]), None);
        for n in 1..=5 {
            let (x, y) = example(n);
            member.learn(&x, y, 1.0, n);
            if n == 2 {
                assert_eq!(member.n_drifts_detected(), 0);
                assert_eq!(member.model().generation(), 0);
            }
        }
        assert_eq!(member.n_drifts_detected(), 1);
        assert_eq!(member.last_drift_on(), 3);
        assert_eq!(member.created_on(), 3);
        assert_eq!(member.model().generation(), 1);
        // Fresh tree learned examples 4 and 5 only.
        assert_eq!(member.model().weight_seen(), 2.0);
        assert_eq!(member.n_warnings_detected(), 0);
        assert!(!member.has_background_learner());
    }

    #[test]
    fn restarted_detector_fires_again() {
        let mut member = classifier_member(Some(&[3]), None);
        for n in 1..=6 {
            let (x, y) = example(n);
            member.learn(&x, y, 1.0, n);
        }
        assert_eq!(member.n_drifts_detected(), 2);
        assert_eq!(member.last_drift_on(), 6);
        assert_eq!(member.model().generation(), 2);
    }

    #[test]
    fn warning_then_drift_promotes_background() {
        let mut member = classifier_member(Some(&[4]), Some(&[2]));
        for n in 1..=2 {
            let (x, y) = example(n);
            member.learn(&x, y, 1.0, n);
        }
        assert_eq!(member.n_warnings_detected(), 1);
        assert_eq!(member.last_warning_on(), 2);
        let bg = member.background().unwrap();
        assert_eq!(bg.created_on(), 2);
        assert_eq!(bg.model().generation(), 1);
        assert_eq!(bg.model().weight_seen(), 0.0);
        assert_eq!(member.warning_detector().unwrap().n_seen(), 0);

        for n in 3..=4 {
            let (x, y) = example(n);
            member.learn(&x, y, 2.0, n);
        }
        assert_eq!(member.n_drifts_detected(), 1);
        assert_eq!(member.last_drift_on(), 4);
        assert!(!member.has_background_learner());
        assert_eq!(member.created_on(), 2);
        assert_eq!(member.model().generation(), 1);
        assert_eq!(member.model().weight_seen(), 4.0);
        // Promoted detectors come from the background learner, which never ran detection.
        assert_eq!(member.warning_detector().unwrap().n_seen(), 0);
        assert_eq!(member.drift_detector().unwrap().n_seen(), 0);
    }

    #[test]
    fn promoted_metric_is_pristine() {
        let mut member = classifier_member(Some(&[4]), Some(&[2]));
        for n in 1..=4 {
            let (x, y) = example(n);
            member.step(&x, y, 1.0, n);
        }
        assert_eq!(member.n_drifts_detected(), 1);
        assert_eq!(member.metric().n_seen(), 0);
        let (x, y) = example(5);
        member.step(&x, y, 1.0, 5);
        assert_eq!(member.metric().n_seen(), 1);
    }

    #[test]
    fn second_warning_replaces_background() {
        let mut member = classifier_member(Some(&[100]), Some(&[1, 2]));
        for n in 1..=3 {
            let (x, y) = example(n);
            member.learn(&x, y, 1.0, n);
        }
        // The warning detector restarts after each warning, so it fires on updates 1, 2, 3.
        assert_eq!(member.n_warnings_detected(), 3);
        assert_eq!(member.background().unwrap().created_on(), 3);
        assert_eq!(member.background().unwrap().model().generation(), 1);
    }

    #[test]
    fn no_drift_detector_disables_warnings() {
        let mut member = classifier_member(None, Some(&[1]));
        for n in 1..=5 {
            let (x, y) = example(n);
            member.learn(&x, y, 1.0, n);
        }
        assert_eq!(member.n_warnings_detected(), 0);
        assert_eq!(member.n_drifts_detected(), 0);
        assert!(!member.has_background_learner());
        assert_eq!(member.model().weight_seen(), 5.0);
    }

    #[test]
    fn zero_poisson_weight_scores_without_learning() {
        let mut member = classifier_member(Some(&[1]), None);
        let (x, y) = example(1);
        member.step(&x, y, 0.0, 1);
        assert_eq!(member.metric().n_seen(), 1);
        assert_eq!(member.model().weight_seen(), 0.0);
        assert_eq!(member.n_drifts_detected(), 0);
    }

    #[test]
    fn regression_member_resets_error_tracker() {
        let model = HoeffdingTreeRegressor::new(
            HoeffdingTreeConfig::new(),
            VarianceReduction::default(),
            TargetMean,
        )
        .unwrap();
        let mut member = ForestMember::new(
            0,
            model,
            RunningError::new(crate::metric::RegressionMetric::Mse),
            Some(Detector::from(ScheduledDetector::new([2]))),
            None,
            1,
        );
        member.learn(&[Some(1.0)], 1.0, 1.0, 1);
        member.learn(&[Some(2.0)], 5.0, 1.0, 2);
        assert_eq!(member.n_drifts_detected(), 1);
        assert_eq!(member.signal, NormalizedError::default());
    }
}
