use std::fmt;

use crate::leaf::LearningLeaf;
use crate::tree::TreeTask;

/// Zero-based feature column index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct FeatureIndex(usize);

impl FeatureIndex {
    /// Create a new feature index from a zero-based column position.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based feature column index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into an arena of nodes.
///
/// Shared by the tree arena and the observer arena; each index is only
/// meaningful for the arena that produced it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// Create a new node index from a zero-based arena position.
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Side of a binary split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Branch {
    /// The branch taken when the test passes.
    Left,
    /// The branch taken when the test fails.
    Right,
}

/// Binary test installed at a split node.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SplitTest {
    /// `x[feature] <= threshold` goes left.
    Numeric {
        /// Feature tested.
        feature: FeatureIndex,
        /// Cut point; equal values pass left.
        threshold: f64,
    },
    /// `x[feature] == value` goes left.
    Nominal {
        /// Feature tested.
        feature: FeatureIndex,
        /// Value routed left.
        value: f64,
    },
}

impl SplitTest {
    /// Return the feature this test reads.
    #[must_use]
    pub fn feature(&self) -> FeatureIndex {
        match *self {
            SplitTest::Numeric { feature, .. } | SplitTest::Nominal { feature, .. } => feature,
        }
    }

    /// Return the branch for `sample`, or `None` when the tested value is missing.
    #[must_use]
    pub fn branch(&self, sample: &[Option<f64>]) -> Option<Branch> {
        let value = sample.get(self.feature().index()).copied().flatten()?;
        let goes_left = match *self {
            SplitTest::Numeric { threshold, .. } => value <= threshold,
            SplitTest::Nominal { value: v, .. } => value == v,
        };
        Some(if goes_left { Branch::Left } else { Branch::Right })
    }
}

impl fmt::Display for SplitTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitTest::Numeric { feature, threshold } => write!(f, "x[{feature}] <= {threshold}"),
            SplitTest::Nominal { feature, value } => write!(f, "x[{feature}] == {value}"),
        }
    }
}

/// A node in a Hoeffding tree arena.
///
/// Leaves carry their learning state so that growth replaces a `Leaf` slot
/// in place with a `Split` whose children are appended to the arena.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub enum Node<T: TreeTask> {
    /// An interior split node.
    Split {
        /// Routing test.
        test: SplitTest,
        /// Index of the left child node.
        left: NodeIndex,
        /// Index of the right child node.
        right: NodeIndex,
        /// Weight sent left when the split was installed.
        left_weight: f64,
        /// Weight sent right when the split was installed.
        right_weight: f64,
    },
    /// A learning leaf.
    Leaf(LearningLeaf<T>),
}

impl<T: TreeTask> Node<T> {
    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Return the child a sample is routed to from a split node.
    ///
    /// Missing values follow the branch that held more weight at split time.
    pub(crate) fn child_for(&self, sample: &[Option<f64>]) -> Option<NodeIndex> {
        match self {
            Node::Leaf(_) => None,
            Node::Split {
                test,
                left,
                right,
                left_weight,
                right_weight,
            } => {
                let branch = test.branch(sample).unwrap_or(if left_weight >= right_weight {
                    Branch::Left
                } else {
                    Branch::Right
                });
                Some(match branch {
                    Branch::Left => *left,
                    Branch::Right => *right,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Indices ---

    #[test]
    fn feature_index_roundtrip() {
        let fi = FeatureIndex::new(7);
        assert_eq!(fi.index(), 7);
        assert_eq!(format!("{fi}"), "7");
    }

    #[test]
    fn node_index_ordering() {
        assert!(NodeIndex::new(10) < NodeIndex::new(20));
        assert_eq!(format!("{}", NodeIndex::new(0)), "0");
    }

    // --- SplitTest ---

    #[test]
    fn numeric_equal_goes_left() {
        let test = SplitTest::Numeric {
            feature: FeatureIndex::new(1),
            threshold: 2.5,
        };
        assert_eq!(test.branch(&[None, Some(2.5)]), Some(Branch::Left));
        assert_eq!(test.branch(&[None, Some(2.6)]), Some(Branch::Right));
        assert_eq!(test.branch(&[Some(0.0), None]), None);
    }

    #[test]
    fn nominal_matches_exact_value() {
        let test = SplitTest::Nominal {
            feature: FeatureIndex::new(0),
            value: 3.0,
        };
        assert_eq!(test.branch(&[Some(3.0)]), Some(Branch::Left));
        assert_eq!(test.branch(&[Some(1.0)]), Some(Branch::Right));
        assert_eq!(test.branch(&[]), None);
    }

    #[test]
    fn split_test_display() {
        let test = SplitTest::Numeric {
            feature: FeatureIndex::new(2),
            threshold: 0.5,
        };
        assert_eq!(test.to_string(), "x[2] <= 0.5");
    }
}
