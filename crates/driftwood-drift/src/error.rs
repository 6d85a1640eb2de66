/// Errors from change detector configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriftError {
    /// Returned when delta is not in (0.0, 1.0).
    #[error("delta must be in (0.0, 1.0), got {delta}")]
    InvalidDelta {
        /// The invalid delta provided.
        delta: f64,
    },

    /// Returned when the check interval is zero.
    #[error("clock must be at least 1, got {clock}")]
    InvalidClock {
        /// The invalid clock provided.
        clock: u64,
    },

    /// Returned when fewer than two buckets per row are allowed.
    #[error("max_buckets must be at least 2, got {max_buckets}")]
    InvalidMaxBuckets {
        /// The invalid bucket count provided.
        max_buckets: usize,
    },

    /// Returned when the minimum sub-window length is zero.
    #[error("min_window_length must be at least 1, got {min_window_length}")]
    InvalidMinWindowLength {
        /// The invalid length provided.
        min_window_length: u64,
    },
}
