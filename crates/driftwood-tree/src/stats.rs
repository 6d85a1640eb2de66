//! Streaming target statistics that split search accumulates and subtracts.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Additive statistics over a weighted target stream.
///
/// Split search never rescans observations: it moves whole statistic blocks
/// between the two sides of a candidate threshold with [`merge`](Self::merge)
/// and [`subtract`](Self::subtract).
pub trait SplitStats:
    Clone + Default + fmt::Debug + Send + Sync + Serialize + DeserializeOwned
{
    /// The label or target type being summarised.
    type Target: Copy + fmt::Debug + PartialEq + Send + Sync;

    /// Record one target observation with the given weight.
    fn record(&mut self, target: Self::Target, weight: f64);

    /// Add every observation summarised by `other`.
    fn merge(&mut self, other: &Self);

    /// Remove every observation summarised by `other`.
    ///
    /// `other` must describe a subset of `self`; residue from floating-point
    /// cancellation is clamped so weights never go negative.
    fn subtract(&mut self, other: &Self);

    /// Total weight recorded.
    fn total_weight(&self) -> f64;

    /// `true` when no split of these observations can improve purity.
    fn is_pure(&self) -> bool;
}

/// Per-class weights, indexed by zero-based class id.
///
/// The vector grows on demand as new classes appear in the stream.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClassCounts(Vec<f64>);

impl ClassCounts {
    /// Build counts from a dense weight vector.
    #[must_use]
    pub fn from_weights(weights: Vec<f64>) -> Self {
        Self(weights)
    }

    /// Return the weight recorded for `class` (zero if never seen).
    #[must_use]
    pub fn get(&self, class: usize) -> f64 {
        self.0.get(class).copied().unwrap_or(0.0)
    }

    /// Return the length of the dense class axis.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.0.len()
    }

    /// Return the number of classes with positive weight.
    #[must_use]
    pub fn n_observed_classes(&self) -> usize {
        self.0.iter().filter(|&&w| w > 0.0).count()
    }

    /// Return the weights as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Return the class with the largest weight, or `None` when empty.
    ///
    /// Ties resolve to the lowest class id.
    #[must_use]
    pub fn majority_class(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (class, &w) in self.0.iter().enumerate() {
            if w > 0.0 && best.is_none_or(|(_, bw)| w > bw) {
                best = Some((class, w));
            }
        }
        best.map(|(class, _)| class)
    }

    /// Return the weights normalised to sum to one.
    ///
    /// Returns an empty vector when no weight has been recorded.
    #[must_use]
    pub fn normalized(&self) -> Vec<f64> {
        let total = self.total_weight();
        if total <= 0.0 {
            return Vec::new();
        }
        self.0.iter().map(|w| w / total).collect()
    }
}

impl SplitStats for ClassCounts {
    type Target = usize;

    fn record(&mut self, class: usize, weight: f64) {
        if class >= self.0.len() {
            self.0.resize(class + 1, 0.0);
        }
        self.0[class] += weight;
    }

    fn merge(&mut self, other: &Self) {
        if other.0.len() > self.0.len() {
            self.0.resize(other.0.len(), 0.0);
        }
        for (w, o) in self.0.iter_mut().zip(&other.0) {
            *w += o;
        }
    }

    fn subtract(&mut self, other: &Self) {
        for (w, o) in self.0.iter_mut().zip(&other.0) {
            *w = (*w - o).max(0.0);
        }
    }

    fn total_weight(&self) -> f64 {
        self.0.iter().sum()
    }

    fn is_pure(&self) -> bool {
        self.n_observed_classes() < 2
    }
}

/// Weighted mean and variance of a numeric target.
///
/// Kept as weight, mean and sum of squared deviations (`m2`) so large target
/// offsets do not cancel out the spread. Blocks combine with Chan's parallel
/// formulas.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TargetStats {
    weight: f64,
    mean: f64,
    m2: f64,
}

impl TargetStats {
    /// Return the weighted mean, or `0.0` when empty.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.weight > 0.0 { self.mean } else { 0.0 }
    }

    /// Return the sample variance (`n - 1` denominator), or `0.0` below two units of weight.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.weight <= 1.0 {
            return 0.0;
        }
        (self.m2 / (self.weight - 1.0)).max(0.0)
    }

    /// Return the sample standard deviation.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

impl SplitStats for TargetStats {
    type Target = f64;

    fn record(&mut self, target: f64, weight: f64) {
        if weight <= 0.0 {
            return;
        }
        self.weight += weight;
        let delta = target - self.mean;
        self.mean += weight * delta / self.weight;
        self.m2 += weight * delta * (target - self.mean);
    }

    fn merge(&mut self, other: &Self) {
        if other.weight <= 0.0 {
            return;
        }
        if self.weight <= 0.0 {
            *self = *other;
            return;
        }
        let total = self.weight + other.weight;
        let delta = other.mean - self.mean;
        self.mean += delta * other.weight / total;
        self.m2 += other.m2 + delta * delta * self.weight * other.weight / total;
        self.weight = total;
    }

    fn subtract(&mut self, other: &Self) {
        if other.weight <= 0.0 {
            return;
        }
        let rest = self.weight - other.weight;
        if rest <= f64::EPSILON * self.weight.max(1.0) {
            *self = Self::default();
            return;
        }
        let mean = self.mean + (self.mean - other.mean) * other.weight / rest;
        let delta = other.mean - mean;
        self.m2 = (self.m2 - other.m2 - delta * delta * rest * other.weight / self.weight).max(0.0);
        self.mean = mean;
        self.weight = rest;
    }

    fn total_weight(&self) -> f64 {
        self.weight
    }

    fn is_pure(&self) -> bool {
        self.variance() <= 0.0
    }
}

/// Weighted running mean and variance of one numeric feature (Welford update).
///
/// Used by naive Bayes leaves as the class-conditional density of a feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GaussianEstimator {
    weight: f64,
    mean: f64,
    m2: f64,
}

impl GaussianEstimator {
    /// Fold in one weighted value.
    pub fn update(&mut self, value: f64, weight: f64) {
        if weight <= 0.0 {
            return;
        }
        self.weight += weight;
        let delta = value - self.mean;
        self.mean += weight * delta / self.weight;
        self.m2 += weight * delta * (value - self.mean);
    }

    /// Return the total weight folded in.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Return the running mean.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Return the sample standard deviation.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        if self.weight > 1.0 {
            (self.m2 / (self.weight - 1.0)).max(0.0).sqrt()
        } else {
            0.0
        }
    }

    /// Return the normal density at `value`.
    ///
    /// A degenerate estimator (zero spread) returns `1.0` exactly at its mean
    /// and `0.0` elsewhere; an empty estimator always returns `0.0`.
    #[must_use]
    pub fn density(&self, value: f64) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let sd = self.std_dev();
        if sd > 0.0 {
            let z = (value - self.mean) / sd;
            (-0.5 * z * z).exp() / (sd * (2.0 * std::f64::consts::PI).sqrt())
        } else if value == self.mean {
            1.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_counts_grow_on_demand() {
        let mut c = ClassCounts::default();
        c.record(3, 2.0);
        assert_eq!(c.n_classes(), 4);
        assert!((c.get(3) - 2.0).abs() < f64::EPSILON);
        assert!((c.get(9) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn class_counts_subtract_never_negative() {
        let mut a = ClassCounts::from_weights(vec![1.0, 0.1 + 0.2]);
        let b = ClassCounts::from_weights(vec![1.0, 0.3]);
        a.subtract(&b);
        assert!(a.as_slice().iter().all(|&w| w >= 0.0));
    }

    #[test]
    fn majority_class_prefers_lowest_id_on_ties() {
        let c = ClassCounts::from_weights(vec![0.0, 2.0, 2.0]);
        assert_eq!(c.majority_class(), Some(1));
        assert_eq!(ClassCounts::default().majority_class(), None);
    }

    #[test]
    fn normalized_sums_to_one() {
        let c = ClassCounts::from_weights(vec![1.0, 3.0]);
        let p = c.normalized();
        assert!((p[0] - 0.25).abs() < 1e-12);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(ClassCounts::default().normalized().is_empty());
    }

    #[test]
    fn purity_requires_two_classes() {
        let mut c = ClassCounts::default();
        c.record(0, 5.0);
        assert!(c.is_pure());
        c.record(2, 1.0);
        assert!(!c.is_pure());
    }

    #[test]
    fn target_stats_mean_and_variance() {
        let mut s = TargetStats::default();
        for y in [1.0, 2.0, 3.0, 4.0] {
            s.record(y, 1.0);
        }
        assert!((s.mean() - 2.5).abs() < 1e-12);
        // Sample variance of 1..4 is 5/3.
        assert!((s.variance() - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn target_stats_weight_is_repetition() {
        let mut weighted = TargetStats::default();
        weighted.record(2.0, 3.0);
        weighted.record(5.0, 1.0);
        let mut repeated = TargetStats::default();
        for y in [2.0, 2.0, 2.0, 5.0] {
            repeated.record(y, 1.0);
        }
        assert!((weighted.mean() - repeated.mean()).abs() < 1e-12);
        assert!((weighted.variance() - repeated.variance()).abs() < 1e-12);
    }

    #[test]
    fn target_stats_merge_then_subtract() {
        let mut a = TargetStats::default();
        a.record(1.0, 1.0);
        a.record(3.0, 1.0);
        let mut b = TargetStats::default();
        b.record(10.0, 2.0);
        let mut merged = a;
        merged.merge(&b);
        merged.subtract(&b);
        assert!((merged.mean() - a.mean()).abs() < 1e-12);
        assert!((merged.total_weight() - 2.0).abs() < 1e-12);
    }

    /// Alternating `offset - 1`, `offset + 1`: sample variance `n / (n - 1)`.
    fn plus_minus_one(offset: f64, n: usize) -> TargetStats {
        let mut s = TargetStats::default();
        for i in 0..n {
            let y = if i % 2 == 0 { offset - 1.0 } else { offset + 1.0 };
            s.record(y, 1.0);
        }
        s
    }

    #[test]
    fn target_stats_variance_survives_large_offset() {
        let s = plus_minus_one(1e9, 100);
        assert!((s.mean() - 1e9).abs() < 1e-4);
        assert!((s.variance() - 100.0 / 99.0).abs() < 1e-4, "{}", s.variance());
        assert!(!s.is_pure());
    }

    #[test]
    fn target_stats_subtract_at_large_offset() {
        let mut whole = plus_minus_one(1e9, 200);
        let part = plus_minus_one(1e9, 100);
        whole.subtract(&part);
        assert!((whole.total_weight() - 100.0).abs() < 1e-9);
        assert!((whole.mean() - 1e9).abs() < 1e-4);
        assert!((whole.variance() - 100.0 / 99.0).abs() < 1e-4, "{}", whole.variance());
    }

    #[test]
    fn target_stats_merge_matches_sequential() {
        let mut left = TargetStats::default();
        let mut right = TargetStats::default();
        let mut all = TargetStats::default();
        for (i, y) in [3.0, 7.0, 1.0, 9.0, 4.0, 4.5].into_iter().enumerate() {
            let w = 1.0 + i as f64 * 0.5;
            if i < 2 {
                left.record(y, w);
            } else {
                right.record(y, w);
            }
            all.record(y, w);
        }
        left.merge(&right);
        assert!((left.mean() - all.mean()).abs() < 1e-12);
        assert!((left.variance() - all.variance()).abs() < 1e-12);
    }

    #[test]
    fn target_stats_subtract_everything_empties() {
        let mut s = plus_minus_one(5.0, 10);
        let copy = s;
        s.subtract(&copy);
        assert_eq!(s, TargetStats::default());
    }

    #[test]
    fn gaussian_density_peaks_at_mean() {
        let mut g = GaussianEstimator::default();
        for x in [1.0, 2.0, 3.0] {
            g.update(x, 1.0);
        }
        assert!((g.mean() - 2.0).abs() < 1e-12);
        assert!(g.density(2.0) > g.density(3.0));
        assert!((g.density(2.0) - g.density(2.0 + 1e-9)).abs() < 1e-6);
    }

    #[test]
    fn gaussian_degenerate_density() {
        let mut g = GaussianEstimator::default();
        g.update(4.0, 2.0);
        assert!((g.density(4.0) - 1.0).abs() < f64::EPSILON);
        assert!((g.density(4.5) - 0.0).abs() < f64::EPSILON);
        assert!((GaussianEstimator::default().density(0.0) - 0.0).abs() < f64::EPSILON);
    }
}
