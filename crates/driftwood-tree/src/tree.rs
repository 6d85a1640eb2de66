use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

use crate::criterion::{MeritFunction, SplitCriterion, VarianceReduction};
use crate::error::TreeError;
use crate::leaf::{LeafContext, LeafLearner, LearningLeaf, NaiveBayesLeaf, TargetMean};
use crate::node::{Node, NodeIndex};
use crate::stats::{ClassCounts, SplitStats, TargetStats};

/// Binds together the statistics, criterion and leaf model of one learning task.
pub trait TreeTask: Clone + fmt::Debug + Send + Sync + 'static {
    /// Target statistics kept at leaves and observer nodes.
    type Stats: SplitStats;
    /// Split merit used to rank candidates.
    type Criterion: MeritFunction<Self::Stats>;
    /// Prediction model kept in each leaf.
    type Learner: LeafLearner<Self::Stats>;
}

/// Classification over dense `usize` class ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification;

impl TreeTask for Classification {
    type Stats = ClassCounts;
    type Criterion = SplitCriterion;
    type Learner = NaiveBayesLeaf;
}

/// Regression over `f64` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regression;

impl TreeTask for Regression {
    type Stats = TargetStats;
    type Criterion = VarianceReduction;
    type Learner = TargetMean;
}

/// Hoeffding tree classifier.
pub type HoeffdingTreeClassifier = HoeffdingTree<Classification>;

/// Hoeffding tree regressor.
pub type HoeffdingTreeRegressor = HoeffdingTree<Regression>;

/// Hoeffding bound `sqrt(R² ln(1/δ) / (2n))`.
#[must_use]
pub fn hoeffding_bound(range: f64, confidence: f64, n: f64) -> f64 {
    (range * range * (1.0 / confidence).ln() / (2.0 * n)).sqrt()
}

/// Configuration for an incremental Hoeffding tree.
///
/// Construct via [`HoeffdingTreeConfig::new`], then chain `with_*` methods.
/// Values are checked when the tree is built.
///
/// # Defaults
///
/// | Parameter           | Default             |
/// |---------------------|---------------------|
/// | `grace_period`      | 200                 |
/// | `max_depth`         | `None` (unlimited)  |
/// | `split_confidence`  | 1e-7                |
/// | `tie_threshold`     | 0.05                |
/// | `max_features`      | `None` (all features) |
/// | `nominal_features`  | none                |
/// | `seed`              | 42                  |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HoeffdingTreeConfig {
    pub(crate) grace_period: usize,
    pub(crate) max_depth: Option<usize>,
    pub(crate) split_confidence: f64,
    pub(crate) tie_threshold: f64,
    pub(crate) max_features: Option<usize>,
    pub(crate) nominal_features: BTreeSet<usize>,
    pub(crate) seed: u64,
}

impl HoeffdingTreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            grace_period: 200,
            max_depth: None,
            split_confidence: 1e-7,
            tie_threshold: 0.05,
            max_features: None,
            nominal_features: BTreeSet::new(),
            seed: 42,
        }
    }

    /// Set the weight a leaf must accumulate between split attempts.
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: usize) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Set the maximum tree depth. Leaves at this depth stop splitting.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the allowed probability of choosing the wrong split (δ).
    #[must_use]
    pub fn with_split_confidence(mut self, split_confidence: f64) -> Self {
        self.split_confidence = split_confidence;
        self
    }

    /// Set the bound below which near-equal candidates are split anyway.
    #[must_use]
    pub fn with_tie_threshold(mut self, tie_threshold: f64) -> Self {
        self.tie_threshold = tie_threshold;
        self
    }

    /// Set how many randomly chosen features each leaf observes.
    ///
    /// `None` means every feature.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Mark feature columns as nominal.
    #[must_use]
    pub fn with_nominal_features(mut self, features: impl IntoIterator<Item = usize>) -> Self {
        self.nominal_features = features.into_iter().collect();
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the grace period.
    #[must_use]
    pub fn grace_period(&self) -> usize {
        self.grace_period
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the split confidence δ.
    #[must_use]
    pub fn split_confidence(&self) -> f64 {
        self.split_confidence
    }

    /// Return the tie threshold.
    #[must_use]
    pub fn tie_threshold(&self) -> f64 {
        self.tie_threshold
    }

    /// Return the per-leaf feature subset size, if any.
    #[must_use]
    pub fn max_features(&self) -> Option<usize> {
        self.max_features
    }

    /// Return the nominal feature indices.
    #[must_use]
    pub fn nominal_features(&self) -> &BTreeSet<usize> {
        &self.nominal_features
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn validate(&self) -> Result<(), TreeError> {
        if self.grace_period == 0 {
            return Err(TreeError::InvalidGracePeriod { grace_period: 0 });
        }
        if !(self.split_confidence > 0.0 && self.split_confidence < 1.0) {
            return Err(TreeError::InvalidSplitConfidence {
                split_confidence: self.split_confidence,
            });
        }
        if !self.tie_threshold.is_finite() || self.tie_threshold < 0.0 {
            return Err(TreeError::InvalidTieThreshold {
                tie_threshold: self.tie_threshold,
            });
        }
        if let Some(d) = self.max_depth
            && d == 0
        {
            return Err(TreeError::InvalidMaxDepth { max_depth: 0 });
        }
        if let Some(k) = self.max_features
            && k == 0
        {
            return Err(TreeError::InvalidMaxFeatures { max_features: 0 });
        }
        Ok(())
    }
}

impl Default for HoeffdingTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// An incrementally grown decision tree (VFDT).
///
/// Nodes live in a `Vec<Node>` arena with the root at index 0. Each leaf
/// accumulates statistics; every `grace_period` units of weight it compares
/// its two best split candidates and splits once the Hoeffding bound says
/// the leader is reliably better.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct HoeffdingTree<T: TreeTask> {
    config: HoeffdingTreeConfig,
    criterion: T::Criterion,
    learner: T::Learner,
    nodes: Vec<Node<T>>,
    rng: ChaCha8Rng,
    generation: u64,
    weight_seen: f64,
}

impl<T: TreeTask> HoeffdingTree<T> {
    /// Build an untrained tree.
    ///
    /// `learner` is the untrained leaf model cloned into every new leaf.
    ///
    /// # Errors
    ///
    /// | Variant                                 | When                                   |
    /// |-----------------------------------------|----------------------------------------|
    /// | [`TreeError::InvalidGracePeriod`]       | `grace_period` is 0                    |
    /// | [`TreeError::InvalidSplitConfidence`]   | `split_confidence` outside (0, 1)      |
    /// | [`TreeError::InvalidTieThreshold`]      | `tie_threshold` negative or not finite |
    /// | [`TreeError::InvalidMaxDepth`]          | `max_depth` is `Some(0)`               |
    /// | [`TreeError::InvalidMaxFeatures`]       | `max_features` is `Some(0)`            |
    /// | [`TreeError::InvalidBranchFraction`]    | criterion branch fraction out of range |
    /// | [`TreeError::InvalidNbThreshold`]       | leaf `nb_threshold` invalid            |
    pub fn new(
        config: HoeffdingTreeConfig,
        criterion: T::Criterion,
        learner: T::Learner,
    ) -> Result<Self, TreeError> {
        config.validate()?;
        criterion.validate()?;
        learner.validate()?;
        let seed = config.seed;
        Ok(Self::build(config, criterion, learner, seed, 0))
    }

    fn build(
        config: HoeffdingTreeConfig,
        criterion: T::Criterion,
        learner: T::Learner,
        seed: u64,
        generation: u64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let root = LearningLeaf::new(T::Stats::default(), learner.clone(), 0, rng.r#gen());
        Self {
            config,
            criterion,
            learner,
            nodes: vec![Node::Leaf(root)],
            rng,
            generation,
            weight_seen: 0.0,
        }
    }

    /// Return an untrained copy with the same configuration and seed.
    ///
    /// The copy is bit-identical to a tree built from the same configuration,
    /// apart from its [`generation`](Self::generation).
    #[must_use]
    pub fn fresh(&self) -> Self {
        Self::build(
            self.config.clone(),
            self.criterion.clone(),
            self.learner.clone(),
            self.config.seed,
            self.generation + 1,
        )
    }

    /// Return an untrained copy whose randomness continues this tree's lineage.
    ///
    /// Advances this tree's generator, so successive instances differ.
    pub fn new_instance(&mut self) -> Self {
        let seed = self.rng.r#gen();
        Self::build(
            self.config.clone(),
            self.criterion.clone(),
            self.learner.clone(),
            seed,
            self.generation + 1,
        )
    }

    /// Update the tree with one weighted example.
    ///
    /// Non-positive weights are ignored. Missing feature values are skipped
    /// by the observers and routed along the heavier branch.
    pub fn learn(
        &mut self,
        x: &[Option<f64>],
        target: <T::Stats as SplitStats>::Target,
        weight: f64,
    ) {
        if !(weight > 0.0) {
            return;
        }
        self.weight_seen += weight;

        let idx = self.leaf_index(x);
        let ctx = LeafContext {
            max_features: self.config.max_features,
            nominal: &self.config.nominal_features,
        };
        let Node::Leaf(leaf) = &mut self.nodes[idx.index()] else {
            return;
        };
        leaf.learn(x, target, weight, &ctx);

        let depth_allows = self.config.max_depth.is_none_or(|d| leaf.depth() < d);
        if depth_allows
            && !leaf.stats().is_pure()
            && leaf.weight_since_last_attempt() >= self.config.grace_period as f64
        {
            leaf.mark_attempt();
            self.attempt_to_split(idx);
        }
    }

    fn attempt_to_split(&mut self, idx: NodeIndex) {
        let Node::Leaf(leaf) = &self.nodes[idx.index()] else {
            return;
        };
        let pre = leaf.stats().clone();
        let depth = leaf.depth();
        let mut suggestions = leaf.best_split_suggestions(&self.criterion);

        let null_merit = self
            .criterion
            .merit_of_split(&pre, std::slice::from_ref(&pre));
        // Stable sort keeps the null split below real candidates of equal merit.
        let mut ranked: Vec<(f64, Option<usize>)> = std::iter::once((null_merit, None))
            .chain(suggestions.iter().enumerate().map(|(i, s)| (s.merit(), Some(i))))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        let [.., (second, _), (best, Some(choice))] = ranked.as_slice() else {
            return;
        };
        let (best, second, choice) = (*best, *second, *choice);
        let n = pre.total_weight();
        let bound = hoeffding_bound(
            self.criterion.range_of_merit(&pre),
            self.config.split_confidence,
            n,
        );
        trace!(best, second, bound, n, "split attempt");
        if best == f64::NEG_INFINITY
            || !(best - second > bound || bound < self.config.tie_threshold)
        {
            return;
        }

        let suggestion = suggestions.swap_remove(choice);
        let test = suggestion.test();
        let (left_stats, right_stats) = suggestion.into_children();
        let (left_weight, right_weight) = (left_stats.total_weight(), right_stats.total_weight());

        let left_leaf =
            LearningLeaf::new(left_stats, self.learner.clone(), depth + 1, self.rng.r#gen());
        let right_leaf =
            LearningLeaf::new(right_stats, self.learner.clone(), depth + 1, self.rng.r#gen());
        let left = NodeIndex::new(self.nodes.len());
        let right = NodeIndex::new(self.nodes.len() + 1);
        self.nodes.push(Node::Leaf(left_leaf));
        self.nodes.push(Node::Leaf(right_leaf));
        self.nodes[idx.index()] = Node::Split {
            test,
            left,
            right,
            left_weight,
            right_weight,
        };

        debug!(
            node = idx.index(),
            %test,
            merit = best,
            bound,
            depth,
            n_nodes = self.nodes.len(),
            "leaf split"
        );
    }

    /// Route `x` from the root to its leaf.
    fn leaf_index(&self, x: &[Option<f64>]) -> NodeIndex {
        let mut idx = NodeIndex::new(0);
        while let Some(next) = self.nodes[idx.index()].child_for(x) {
            idx = next;
        }
        idx
    }

    fn leaf_for(&self, x: &[Option<f64>]) -> Option<&LearningLeaf<T>> {
        match &self.nodes[self.leaf_index(x).index()] {
            Node::Leaf(leaf) => Some(leaf),
            Node::Split { .. } => None,
        }
    }

    /// Return the tree configuration.
    #[must_use]
    pub fn config(&self) -> &HoeffdingTreeConfig {
        &self.config
    }

    /// Return the node arena (root at index 0).
    #[must_use]
    pub fn nodes(&self) -> &[Node<T>] {
        &self.nodes
    }

    /// Return the total number of nodes in the tree (both splits and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree.
    ///
    /// A single-node tree (just a root leaf) has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0usize;
        let mut queue = VecDeque::new();
        queue.push_back((0usize, 0usize));

        while let Some((node_idx, d)) = queue.pop_front() {
            match &self.nodes[node_idx] {
                Node::Leaf(_) => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    queue.push_back((left.index(), d + 1));
                    queue.push_back((right.index(), d + 1));
                }
            }
        }
        max_depth
    }

    /// Return how many `fresh`/`new_instance` steps separate this tree from
    /// the one built by [`new`](Self::new).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Return the total weight learned.
    #[must_use]
    pub fn weight_seen(&self) -> f64 {
        self.weight_seen
    }
}

impl HoeffdingTree<Classification> {
    /// Class probability distribution for `x`.
    ///
    /// Returns an empty vector before any example has reached the leaf.
    #[must_use]
    pub fn predict_proba(&self, x: &[Option<f64>]) -> Vec<f64> {
        self.leaf_for(x)
            .map(|leaf| leaf.learner.predict_proba(&leaf.stats, x))
            .unwrap_or_default()
    }

    /// Most probable class for `x`, or `None` when nothing is known.
    ///
    /// Ties resolve to the lowest class id.
    #[must_use]
    pub fn predict(&self, x: &[Option<f64>]) -> Option<usize> {
        ClassCounts::from_weights(self.predict_proba(x)).majority_class()
    }
}

impl HoeffdingTree<Regression> {
    /// Predicted target for `x`; `0.0` before any example has reached the leaf.
    #[must_use]
    pub fn predict(&self, x: &[Option<f64>]) -> f64 {
        self.leaf_for(x).map_or(0.0, |leaf| leaf.stats.mean())
    }
}
