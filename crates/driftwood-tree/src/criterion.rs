use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::TreeError;
use crate::stats::{ClassCounts, SplitStats, TargetStats};

/// Default minimum weight fraction a branch must hold for entropy-style criteria.
pub const DEFAULT_MIN_BRANCH_FRACTION: f64 = 0.01;

/// Scores a candidate partition of a node's statistics.
///
/// Higher merit is better. Only the ordering of merits matters to callers,
/// except for [`range_of_merit`](Self::range_of_merit) which scales the
/// Hoeffding bound.
pub trait MeritFunction<S>: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned {
    /// Merit of splitting `pre` into the `post` branches.
    ///
    /// A single-element `post` scores the "do not split" alternative.
    fn merit_of_split(&self, pre: &S, post: &[S]) -> f64;

    /// Width of the interval the merit can take for statistics `pre`.
    fn range_of_merit(&self, pre: &S) -> f64;

    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns a [`TreeError`] describing the first invalid parameter.
    fn validate(&self) -> Result<(), TreeError> {
        Ok(())
    }
}

/// Criterion for measuring the quality of a classification split.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SplitCriterion {
    /// Gini impurity decrease: `gini(pre) - Σ wᵢ/W · gini(postᵢ)`.
    Gini,
    /// Information gain in bits.
    ///
    /// Splits where fewer than two branches hold more than
    /// `min_branch_fraction` of the weight score `-∞`.
    InfoGain {
        /// Minimum share of weight a branch needs to count.
        min_branch_fraction: f64,
    },
    /// Hellinger distance between branch class distributions.
    ///
    /// Multi-class statistics use the largest one-vs-rest distance.
    Hellinger {
        /// Minimum share of weight a branch needs to count.
        min_branch_fraction: f64,
    },
}

impl SplitCriterion {
    /// Information gain with the default branch fraction.
    #[must_use]
    pub fn info_gain() -> Self {
        SplitCriterion::InfoGain {
            min_branch_fraction: DEFAULT_MIN_BRANCH_FRACTION,
        }
    }

    /// Hellinger distance with the default branch fraction.
    #[must_use]
    pub fn hellinger() -> Self {
        SplitCriterion::Hellinger {
            min_branch_fraction: DEFAULT_MIN_BRANCH_FRACTION,
        }
    }
}

impl FromStr for SplitCriterion {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gini" => Ok(SplitCriterion::Gini),
            "info_gain" | "entropy" => Ok(SplitCriterion::info_gain()),
            "hellinger" => Ok(SplitCriterion::hellinger()),
            other => Err(TreeError::UnknownSplitCriterion {
                name: other.to_string(),
            }),
        }
    }
}

/// Gini impurity: `1 - Σ(p_i²)`. Zero for an empty distribution.
#[must_use]
pub fn gini(counts: &ClassCounts) -> f64 {
    let total = counts.total_weight();
    if total <= 0.0 {
        return 0.0;
    }
    let sum_sq: f64 = counts
        .as_slice()
        .iter()
        .map(|&c| {
            let p = c / total;
            p * p
        })
        .sum();
    1.0 - sum_sq
}

/// Entropy in bits: `-Σ(p_i · log2(p_i))` over classes with `p_i > 0`.
#[must_use]
pub fn entropy(counts: &ClassCounts) -> f64 {
    let total = counts.total_weight();
    if total <= 0.0 {
        return 0.0;
    }
    -counts
        .as_slice()
        .iter()
        .filter(|&&c| c > 0.0)
        .map(|&c| {
            let p = c / total;
            p * p.log2()
        })
        .sum::<f64>()
}

/// Weighted average of a per-branch impurity.
fn weighted_impurity(post: &[ClassCounts], impurity: fn(&ClassCounts) -> f64) -> f64 {
    let total: f64 = post.iter().map(SplitStats::total_weight).sum();
    if total <= 0.0 {
        return 0.0;
    }
    post.iter()
        .map(|d| d.total_weight() / total * impurity(d))
        .sum()
}

/// Count branches holding strictly more than `fraction` of the total weight.
fn n_branches_above<S: SplitStats>(post: &[S], fraction: f64) -> usize {
    let total: f64 = post.iter().map(SplitStats::total_weight).sum();
    if total <= 0.0 {
        return 0;
    }
    post.iter()
        .filter(|d| d.total_weight() / total > fraction)
        .count()
}

fn hellinger_distance(post: &[ClassCounts]) -> f64 {
    let [left, right] = post else {
        return 0.0;
    };
    let n_classes = left.n_classes().max(right.n_classes());
    let total_left = left.total_weight();
    let total_right = right.total_weight();

    let mut best = 0.0f64;
    for class in 0..n_classes {
        // One-vs-rest: `pos` is this class, `neg` everything else.
        let pos_left = left.get(class);
        let pos_right = right.get(class);
        let neg_left = total_left - pos_left;
        let neg_right = total_right - pos_right;
        let total_pos = pos_left + pos_right;
        let total_neg = neg_left + neg_right;
        if total_pos <= 0.0 || total_neg <= 0.0 {
            continue;
        }
        let dl = (neg_left / total_neg).sqrt() - (pos_left / total_pos).sqrt();
        let dr = (neg_right / total_neg).sqrt() - (pos_right / total_pos).sqrt();
        best = best.max((dl * dl + dr * dr).sqrt());
        if n_classes == 2 {
            // Both one-vs-rest views of a binary problem are the same distance.
            break;
        }
    }
    best
}

impl MeritFunction<ClassCounts> for SplitCriterion {
    fn merit_of_split(&self, pre: &ClassCounts, post: &[ClassCounts]) -> f64 {
        match *self {
            SplitCriterion::Gini => gini(pre) - weighted_impurity(post, gini),
            SplitCriterion::InfoGain {
                min_branch_fraction,
            } => {
                if n_branches_above(post, min_branch_fraction) < 2 {
                    return f64::NEG_INFINITY;
                }
                entropy(pre) - weighted_impurity(post, entropy)
            }
            SplitCriterion::Hellinger {
                min_branch_fraction,
            } => {
                if n_branches_above(post, min_branch_fraction) < 2 {
                    return f64::NEG_INFINITY;
                }
                hellinger_distance(post)
            }
        }
    }

    fn range_of_merit(&self, pre: &ClassCounts) -> f64 {
        match self {
            SplitCriterion::Gini | SplitCriterion::Hellinger { .. } => 1.0,
            SplitCriterion::InfoGain { .. } => (pre.n_classes().max(2) as f64).log2(),
        }
    }

    fn validate(&self) -> Result<(), TreeError> {
        match *self {
            SplitCriterion::Gini => Ok(()),
            SplitCriterion::InfoGain {
                min_branch_fraction,
            }
            | SplitCriterion::Hellinger {
                min_branch_fraction,
            } => {
                if (0.0..0.5).contains(&min_branch_fraction) {
                    Ok(())
                } else {
                    Err(TreeError::InvalidBranchFraction {
                        fraction: min_branch_fraction,
                    })
                }
            }
        }
    }
}

/// Standard deviation reduction for regression targets.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VarianceReduction {
    min_samples_split: f64,
}

impl VarianceReduction {
    /// Create a criterion requiring `min_samples_split` weight in every branch.
    #[must_use]
    pub fn new(min_samples_split: f64) -> Self {
        Self { min_samples_split }
    }

    /// Return the minimum branch weight.
    #[must_use]
    pub fn min_samples_split(&self) -> f64 {
        self.min_samples_split
    }
}

impl Default for VarianceReduction {
    fn default() -> Self {
        Self::new(5.0)
    }
}

impl MeritFunction<TargetStats> for VarianceReduction {
    fn merit_of_split(&self, pre: &TargetStats, post: &[TargetStats]) -> f64 {
        if post
            .iter()
            .any(|d| d.total_weight() < self.min_samples_split)
        {
            return f64::NEG_INFINITY;
        }
        let n = pre.total_weight();
        if n <= 0.0 {
            return 0.0;
        }
        pre.std_dev()
            - post
                .iter()
                .map(|d| d.total_weight() / n * d.std_dev())
                .sum::<f64>()
    }

    fn range_of_merit(&self, _pre: &TargetStats) -> f64 {
        1.0
    }
}
