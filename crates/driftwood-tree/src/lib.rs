//! Incremental decision trees for data streams.
//!
//! Provides additive split statistics, classification and regression split
//! criteria, the binary-search-tree attribute observer used for exact
//! numeric split search, and Hoeffding trees (VFDT) built on them.

mod criterion;
mod error;
mod leaf;
mod node;
mod observer;
mod stats;
mod tree;

pub use criterion::{
    DEFAULT_MIN_BRANCH_FRACTION, MeritFunction, SplitCriterion, VarianceReduction, entropy, gini,
};
pub use error::TreeError;
pub use leaf::{LeafInput, LeafLearner, LeafPrediction, LearningLeaf, NaiveBayesLeaf, TargetMean};
pub use node::{Branch, FeatureIndex, Node, NodeIndex, SplitTest};
pub use observer::{BinaryTreeObserver, FeatureObserver, NominalObserver, SplitSuggestion};
pub use stats::{ClassCounts, GaussianEstimator, SplitStats, TargetStats};
pub use tree::{
    Classification, HoeffdingTree, HoeffdingTreeClassifier, HoeffdingTreeConfig,
    HoeffdingTreeRegressor, Regression, TreeTask, hoeffding_bound,
};
