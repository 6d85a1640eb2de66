/// Errors from Hoeffding tree construction and configuration parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    /// Returned when grace_period is zero.
    #[error("grace_period must be at least 1, got {grace_period}")]
    InvalidGracePeriod {
        /// The invalid grace period provided.
        grace_period: usize,
    },

    /// Returned when split_confidence is not in (0.0, 1.0).
    #[error("split_confidence must be in (0.0, 1.0), got {split_confidence}")]
    InvalidSplitConfidence {
        /// The invalid confidence provided.
        split_confidence: f64,
    },

    /// Returned when tie_threshold is negative or not finite.
    #[error("tie_threshold must be finite and non-negative, got {tie_threshold}")]
    InvalidTieThreshold {
        /// The invalid tie threshold provided.
        tie_threshold: f64,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when the per-leaf feature subset size is zero.
    #[error("max_features must be at least 1, got {max_features}")]
    InvalidMaxFeatures {
        /// The invalid max_features value provided.
        max_features: usize,
    },

    /// Returned when a split criterion name is not recognised.
    #[error("unknown split criterion '{name}' (expected gini, info_gain or hellinger)")]
    UnknownSplitCriterion {
        /// The unrecognised name.
        name: String,
    },

    /// Returned when a leaf prediction name is not recognised.
    #[error("unknown leaf prediction '{name}' (expected mc, nb or nba)")]
    UnknownLeafPrediction {
        /// The unrecognised name.
        name: String,
    },

    /// Returned when a minimum branch fraction is outside [0.0, 0.5).
    #[error("min_branch_fraction must be in [0.0, 0.5), got {fraction}")]
    InvalidBranchFraction {
        /// The invalid fraction provided.
        fraction: f64,
    },

    /// Returned when nb_threshold is negative or not finite.
    #[error("nb_threshold must be finite and non-negative, got {nb_threshold}")]
    InvalidNbThreshold {
        /// The invalid threshold provided.
        nb_threshold: f64,
    },
}
