//! Per-feature attribute observers used by learning leaves.
//!
//! A numeric feature is summarised by an unbalanced binary search tree keyed
//! on the values seen so far (the E-BST). Each node keeps the target
//! statistics of every observation that passed through it, split by which
//! side of the node's cut point the value fell on. Split search walks the
//! tree once and reconstructs the exact left/right partition for every
//! distinct value without revisiting the raw observations.

use std::collections::BTreeMap;

use crate::criterion::MeritFunction;
use crate::node::{FeatureIndex, NodeIndex, SplitTest};
use crate::stats::SplitStats;

/// A candidate binary split with its child statistics and merit.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitSuggestion<S> {
    test: SplitTest,
    left: S,
    right: S,
    merit: f64,
}

impl<S> SplitSuggestion<S> {
    /// Return the routing test.
    #[must_use]
    pub fn test(&self) -> SplitTest {
        self.test
    }

    /// Return the statistics of observations passing the test.
    #[must_use]
    pub fn left(&self) -> &S {
        &self.left
    }

    /// Return the statistics of observations failing the test.
    #[must_use]
    pub fn right(&self) -> &S {
        &self.right
    }

    /// Return the criterion merit.
    #[must_use]
    pub fn merit(&self) -> f64 {
        self.merit
    }

    pub(crate) fn into_children(self) -> (S, S) {
        (self.left, self.right)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
struct CutNode<S: SplitStats> {
    cut_point: f64,
    left_stats: S,
    right_stats: S,
    left: Option<NodeIndex>,
    right: Option<NodeIndex>,
}

impl<S: SplitStats> CutNode<S> {
    fn new(cut_point: f64, target: S::Target, weight: f64) -> Self {
        let mut left_stats = S::default();
        left_stats.record(target, weight);
        Self {
            cut_point,
            left_stats,
            right_stats: S::default(),
            left: None,
            right: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Root,
    Left,
    Right,
}

/// Pending visit in the pre-order split search.
struct Frame<S> {
    node: NodeIndex,
    side: Side,
    parent_left: S,
    parent_right: S,
    actual_parent_left: S,
}

/// Incremental binary search tree over the values of one numeric feature.
///
/// The first value inserted becomes the root cut point; each later distinct
/// value becomes a cut point further down. Cut points never move.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct BinaryTreeObserver<S: SplitStats> {
    nodes: Vec<CutNode<S>>,
}

impl<S: SplitStats> Default for BinaryTreeObserver<S> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<S: SplitStats> BinaryTreeObserver<S> {
    /// Create an empty observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one weighted observation.
    ///
    /// Missing and NaN values are ignored. Values equal to a cut point stop
    /// at that node and count on its left side.
    pub fn update(&mut self, value: Option<f64>, target: S::Target, weight: f64) {
        let Some(value) = value.filter(|v| !v.is_nan()) else {
            return;
        };
        if self.nodes.is_empty() {
            self.nodes.push(CutNode::new(value, target, weight));
            return;
        }

        let mut idx = 0usize;
        loop {
            let node = &mut self.nodes[idx];
            if value == node.cut_point {
                node.left_stats.record(target, weight);
                return;
            }
            let goes_left = value < node.cut_point;
            let child = if goes_left {
                node.left_stats.record(target, weight);
                node.left
            } else {
                node.right_stats.record(target, weight);
                node.right
            };
            match child {
                Some(next) => idx = next.index(),
                None => {
                    let created = NodeIndex::new(self.nodes.len());
                    if goes_left {
                        self.nodes[idx].left = Some(created);
                    } else {
                        self.nodes[idx].right = Some(created);
                    }
                    self.nodes.push(CutNode::new(value, target, weight));
                    return;
                }
            }
        }
    }

    /// Return the number of distinct cut points stored.
    #[must_use]
    pub fn n_cut_points(&self) -> usize {
        self.nodes.len()
    }

    /// Return the total weight held across every node's left and right statistics.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.nodes
            .iter()
            .map(|n| n.left_stats.total_weight() + n.right_stats.total_weight())
            .sum()
    }

    /// Call `visit(cut_point, left, right)` for every cut point in pre-order.
    ///
    /// `left` holds every inserted observation with value `<= cut_point`,
    /// `right` every observation above it.
    pub fn for_each_candidate(&self, mut visit: impl FnMut(f64, &S, &S)) {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![Frame {
            node: NodeIndex::new(0),
            side: Side::Root,
            parent_left: S::default(),
            parent_right: S::default(),
            actual_parent_left: S::default(),
        }];

        while let Some(frame) = stack.pop() {
            let node = &self.nodes[frame.node.index()];
            let (left, right) = match frame.side {
                Side::Root => (node.left_stats.clone(), node.right_stats.clone()),
                Side::Left => {
                    // Weight of values equal to the parent's cut point.
                    let mut exact = frame.actual_parent_left;
                    exact.subtract(&node.left_stats);
                    exact.subtract(&node.right_stats);

                    let mut left = frame.parent_left;
                    left.subtract(&node.right_stats);
                    left.subtract(&exact);
                    let mut right = frame.parent_right;
                    right.merge(&node.right_stats);
                    right.merge(&exact);
                    (left, right)
                }
                Side::Right => {
                    let mut left = frame.parent_left;
                    left.merge(&node.left_stats);
                    let mut right = frame.parent_right;
                    right.subtract(&node.left_stats);
                    (left, right)
                }
            };

            visit(node.cut_point, &left, &right);

            if let Some(child) = node.right {
                stack.push(Frame {
                    node: child,
                    side: Side::Right,
                    parent_left: left.clone(),
                    parent_right: right.clone(),
                    actual_parent_left: node.left_stats.clone(),
                });
            }
            if let Some(child) = node.left {
                stack.push(Frame {
                    node: child,
                    side: Side::Left,
                    parent_left: left,
                    parent_right: right,
                    actual_parent_left: node.left_stats.clone(),
                });
            }
        }
    }

    /// Return the best `x <= cut` split on `feature`, or `None` when the
    /// observer is empty or every candidate scores `-∞`.
    ///
    /// Ties keep the first candidate in pre-order.
    pub fn best_split<C: MeritFunction<S>>(
        &self,
        criterion: &C,
        pre_split: &S,
        feature: FeatureIndex,
    ) -> Option<SplitSuggestion<S>> {
        let mut best: Option<SplitSuggestion<S>> = None;
        self.for_each_candidate(|cut_point, left, right| {
            let post = [left.clone(), right.clone()];
            let merit = criterion.merit_of_split(pre_split, &post);
            let best_merit = best.as_ref().map_or(f64::NEG_INFINITY, |b| b.merit);
            if merit > best_merit {
                let [left, right] = post;
                best = Some(SplitSuggestion {
                    test: SplitTest::Numeric {
                        feature,
                        threshold: cut_point,
                    },
                    left,
                    right,
                    merit,
                });
            }
        });
        best
    }
}

/// Per-value statistics of one nominal feature.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct NominalObserver<S: SplitStats> {
    values: BTreeMap<u64, S>,
    total: S,
}

impl<S: SplitStats> Default for NominalObserver<S> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
            total: S::default(),
        }
    }
}

/// Canonical map key for a nominal value; `-0.0` and `0.0` share a key.
fn value_key(value: f64) -> u64 {
    if value == 0.0 { 0.0f64.to_bits() } else { value.to_bits() }
}

impl<S: SplitStats> NominalObserver<S> {
    /// Insert one weighted observation. Missing and NaN values are ignored.
    pub fn update(&mut self, value: Option<f64>, target: S::Target, weight: f64) {
        let Some(value) = value.filter(|v| !v.is_nan()) else {
            return;
        };
        self.values
            .entry(value_key(value))
            .or_default()
            .record(target, weight);
        self.total.record(target, weight);
    }

    /// Return the number of distinct values seen.
    #[must_use]
    pub fn n_values(&self) -> usize {
        self.values.len()
    }

    /// Return the statistics summed over every value.
    #[must_use]
    pub fn total(&self) -> &S {
        &self.total
    }

    /// Return the statistics recorded for `value`, if any.
    #[must_use]
    pub fn stats_for(&self, value: f64) -> Option<&S> {
        self.values.get(&value_key(value))
    }

    /// Return the best `x == value` split on `feature`.
    pub fn best_split<C: MeritFunction<S>>(
        &self,
        criterion: &C,
        pre_split: &S,
        feature: FeatureIndex,
    ) -> Option<SplitSuggestion<S>> {
        let mut best: Option<SplitSuggestion<S>> = None;
        for (&bits, stats) in &self.values {
            let mut rest = self.total.clone();
            rest.subtract(stats);
            let post = [stats.clone(), rest];
            let merit = criterion.merit_of_split(pre_split, &post);
            if merit > best.as_ref().map_or(f64::NEG_INFINITY, |b| b.merit) {
                let [left, right] = post;
                best = Some(SplitSuggestion {
                    test: SplitTest::Nominal {
                        feature,
                        value: f64::from_bits(bits),
                    },
                    left,
                    right,
                    merit,
                });
            }
        }
        best
    }
}

/// Observer for one feature column of a leaf.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub enum FeatureObserver<S: SplitStats> {
    /// Numeric feature summarised by a binary search tree.
    Numeric(BinaryTreeObserver<S>),
    /// Nominal feature summarised per value.
    Nominal(NominalObserver<S>),
}

impl<S: SplitStats> FeatureObserver<S> {
    /// Insert one weighted observation.
    pub fn update(&mut self, value: Option<f64>, target: S::Target, weight: f64) {
        match self {
            FeatureObserver::Numeric(o) => o.update(value, target, weight),
            FeatureObserver::Nominal(o) => o.update(value, target, weight),
        }
    }

    /// Return the best split this observer can propose.
    pub fn best_split<C: MeritFunction<S>>(
        &self,
        criterion: &C,
        pre_split: &S,
        feature: FeatureIndex,
    ) -> Option<SplitSuggestion<S>> {
        match self {
            FeatureObserver::Numeric(o) => o.best_split(criterion, pre_split, feature),
            FeatureObserver::Nominal(o) => o.best_split(criterion, pre_split, feature),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::criterion::{SplitCriterion, VarianceReduction};
    use crate::stats::{ClassCounts, TargetStats};

    fn feature() -> FeatureIndex {
        FeatureIndex::new(0)
    }

    fn close(a: &[f64], b: &[f64]) -> bool {
        let n = a.len().max(b.len());
        (0..n).all(|i| {
            let x = a.get(i).copied().unwrap_or(0.0);
            let y = b.get(i).copied().unwrap_or(0.0);
            (x - y).abs() < 1e-9
        })
    }

    fn brute_force_counts(data: &[(f64, usize, f64)], cut: f64) -> (ClassCounts, ClassCounts) {
        let mut left = ClassCounts::default();
        let mut right = ClassCounts::default();
        for &(x, y, w) in data {
            if x <= cut {
                left.record(y, w);
            } else {
                right.record(y, w);
            }
        }
        (left, right)
    }

    // --- Insertion ---

    #[test]
    fn equal_value_goes_left_only() {
        let mut obs = BinaryTreeObserver::<ClassCounts>::new();
        obs.update(Some(1.0), 0, 1.0);
        obs.update(Some(1.0), 1, 2.0);
        assert_eq!(obs.n_cut_points(), 1);
        let mut seen = Vec::new();
        obs.for_each_candidate(|cut, l, r| seen.push((cut, l.clone(), r.clone())));
        assert_eq!(seen.len(), 1);
        assert!(close(seen[0].1.as_slice(), &[1.0, 2.0]));
        assert!((seen[0].2.total_weight() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_and_nan_are_ignored() {
        let mut obs = BinaryTreeObserver::<ClassCounts>::new();
        obs.update(None, 0, 1.0);
        obs.update(Some(f64::NAN), 0, 1.0);
        assert_eq!(obs.n_cut_points(), 0);
        let pre = ClassCounts::from_weights(vec![1.0]);
        assert!(obs.best_split(&SplitCriterion::Gini, &pre, feature()).is_none());
    }

    #[test]
    fn weight_is_conserved() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut obs = BinaryTreeObserver::<ClassCounts>::new();
        let mut total = 0.0;
        for _ in 0..500 {
            let x = f64::from(rng.gen_range(0..40u32)) / 4.0;
            let w = f64::from(rng.gen_range(1..4u32));
            obs.update(Some(x), rng.gen_range(0..3), w);
            total += w;
        }
        assert!((obs.total_weight() - total).abs() < 1e-9);
    }

    // --- Split search ---

    #[test]
    fn candidates_match_brute_force_partitions() {
        for seed in 0..20u64 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut obs = BinaryTreeObserver::<ClassCounts>::new();
            let mut data = Vec::new();
            for _ in 0..200 {
                // Coarse grid so repeated values exercise the equal-cut path.
                let x = f64::from(rng.gen_range(0..25u32)) * 0.5;
                let y = rng.gen_range(0..3usize);
                let w = f64::from(rng.gen_range(1..5u32));
                obs.update(Some(x), y, w);
                data.push((x, y, w));
            }
            let mut n_candidates = 0;
            obs.for_each_candidate(|cut, left, right| {
                let (bl, br) = brute_force_counts(&data, cut);
                assert!(close(left.as_slice(), bl.as_slice()), "seed {seed} cut {cut}");
                assert!(close(right.as_slice(), br.as_slice()), "seed {seed} cut {cut}");
                n_candidates += 1;
            });
            assert_eq!(n_candidates, obs.n_cut_points());
        }
    }

    #[test]
    fn best_split_matches_brute_force_merit() {
        let criterion = SplitCriterion::info_gain();
        for seed in 0..20u64 {
            let mut rng = ChaCha8Rng::seed_from_u64(100 + seed);
            let mut obs = BinaryTreeObserver::<ClassCounts>::new();
            let mut pre = ClassCounts::default();
            let mut data = Vec::new();
            for _ in 0..300 {
                let x: f64 = rng.r#gen::<f64>() * 10.0;
                let y = usize::from(x + rng.gen_range(-2.0..2.0) > 5.0);
                obs.update(Some(x), y, 1.0);
                pre.record(y, 1.0);
                data.push((x, y, 1.0));
            }
            let mut brute_best = f64::NEG_INFINITY;
            for &(cut, _, _) in &data {
                let (l, r) = brute_force_counts(&data, cut);
                brute_best = brute_best.max(criterion.merit_of_split(&pre, &[l, r]));
            }
            let best = obs
                .best_split(&criterion, &pre, feature())
                .expect("non-empty observer yields a split");
            assert!((best.merit() - brute_best).abs() < 1e-9, "seed {seed}");
            assert!(
                (best.left().total_weight() + best.right().total_weight() - 300.0).abs() < 1e-9
            );
        }
    }

    #[test]
    fn regression_candidates_match_brute_force() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut obs = BinaryTreeObserver::<TargetStats>::new();
        let mut data = Vec::new();
        for _ in 0..150 {
            let x = f64::from(rng.gen_range(0..30u32));
            let y: f64 = rng.r#gen::<f64>() * 5.0 + x;
            obs.update(Some(x), y, 1.0);
            data.push((x, y));
        }
        obs.for_each_candidate(|cut, left, right| {
            let mut bl = TargetStats::default();
            let mut br = TargetStats::default();
            for &(x, y) in &data {
                if x <= cut {
                    bl.record(y, 1.0);
                } else {
                    br.record(y, 1.0);
                }
            }
            assert!((left.total_weight() - bl.total_weight()).abs() < 1e-9);
            assert!((left.mean() - bl.mean()).abs() < 1e-6);
            assert!((right.mean() - br.mean()).abs() < 1e-6);
        });
        let mut pre = TargetStats::default();
        for &(_, y) in &data {
            pre.record(y, 1.0);
        }
        let best = obs.best_split(&VarianceReduction::default(), &pre, feature());
        assert!(best.is_some_and(|b| b.merit() > 0.0));
    }

    #[test]
    fn all_rejected_candidates_yield_none() {
        let mut obs = BinaryTreeObserver::<ClassCounts>::new();
        obs.update(Some(1.0), 0, 10.0);
        let pre = ClassCounts::from_weights(vec![10.0]);
        // Single cut point with an empty right side: info gain rejects it.
        assert!(
            obs.best_split(&SplitCriterion::info_gain(), &pre, feature())
                .is_none()
        );
    }

    // --- Nominal ---

    #[test]
    fn nominal_best_split_isolates_value() {
        let mut obs = NominalObserver::<ClassCounts>::default();
        let mut pre = ClassCounts::default();
        for (v, y) in [(0.0, 0), (1.0, 1), (2.0, 1), (0.0, 0), (1.0, 1), (2.0, 1)] {
            obs.update(Some(v), y, 1.0);
            pre.record(y, 1.0);
        }
        obs.update(Some(-0.0), 0, 1.0);
        pre.record(0, 1.0);
        assert_eq!(obs.n_values(), 3);
        let best = obs
            .best_split(&SplitCriterion::Gini, &pre, feature())
            .expect("split exists");
        assert_eq!(
            best.test(),
            SplitTest::Nominal {
                feature: feature(),
                value: 0.0
            }
        );
        assert!((best.left().get(0) - 3.0).abs() < f64::EPSILON);
    }
}
