use std::path::PathBuf;

use driftwood_drift::DriftError;
use driftwood_tree::TreeError;

use crate::serialize::ModelKind;

/// Errors from adaptive random forest operations.
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    /// Returned when n_models is zero.
    #[error("n_models must be at least 1, got {n_models}")]
    InvalidModelCount {
        /// The invalid n_models value provided.
        n_models: usize,
    },

    /// Returned when the Poisson rate is not a positive finite number.
    #[error("lambda must be positive and finite, got {lambda}")]
    InvalidLambda {
        /// The invalid lambda value provided.
        lambda: f64,
    },

    /// Returned when a fractional max_features is not finite.
    #[error("max_features fraction must be finite, got {fraction}")]
    InvalidMaxFeatures {
        /// The invalid fraction provided.
        fraction: f64,
    },

    /// Returned when a max_features string cannot be parsed.
    #[error("unknown max_features '{value}', expected sqrt, log2, all, an integer or a fraction")]
    UnknownMaxFeatures {
        /// The unrecognised value.
        value: String,
    },

    /// Returned when an aggregation method string cannot be parsed.
    #[error("unknown aggregation method '{name}', expected mean or median")]
    UnknownAggregation {
        /// The unrecognised name.
        name: String,
    },

    /// Returned when a regression metric name cannot be parsed.
    #[error("unknown regression metric '{name}', expected mae, mse or rmse")]
    UnknownMetric {
        /// The unrecognised name.
        name: String,
    },

    /// Returned when an example has no features.
    #[error("examples must have at least one feature")]
    ZeroFeatures,

    /// Returned when an example's width differs from the first example seen.
    #[error("example has {got} features, forest was initialised with {expected}")]
    FeatureCountMismatch {
        /// The number of features of the first example.
        expected: usize,
        /// The number of features in the offending example.
        got: usize,
    },

    /// Returned when a present feature value is NaN or infinite.
    #[error("non-finite value at feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when a regression target is NaN or infinite.
    #[error("non-finite regression target {target}")]
    NonFiniteTarget {
        /// The offending target.
        target: f64,
    },

    /// Returned when the member tree configuration is invalid.
    #[error("invalid tree configuration")]
    Tree(#[from] TreeError),

    /// Returned when a drift or warning detector is misconfigured.
    #[error("invalid detector configuration")]
    Drift(#[from] DriftError),

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version in {path}: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The model format version this build expects.
        expected: u32,
        /// The model format version found in the file.
        found: u32,
        /// Path to the model file with the incompatible version.
        path: PathBuf,
    },

    /// Returned when a classifier file is loaded as a regressor or vice versa.
    #[error("model in {path} is a {found}, expected a {expected}")]
    WrongModelKind {
        /// The kind requested by the caller.
        expected: ModelKind,
        /// The kind recorded in the file.
        found: ModelKind,
        /// Path to the model file.
        path: PathBuf,
    },
}
