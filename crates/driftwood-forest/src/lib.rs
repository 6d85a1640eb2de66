//! Adaptive random forests for evolving data streams.
//!
//! Provides online-bagged ensembles of Hoeffding trees where every member
//! watches its own error with a drift detector, trains a background
//! replacement on warnings and swaps it in on drift. Classification votes
//! are weighted by member accuracy; regression predictions are combined by
//! error-weighted mean or median. Forests persist via bincode.

mod config;
mod error;
mod forest;
mod member;
mod metric;
mod predict;
mod serialize;

pub use config::{Aggregation, ForestConfig, MaxFeatures};
pub use error::ForestError;
pub use forest::{
    AdaptiveRandomForest, AdaptiveRandomForestClassifier, AdaptiveRandomForestRegressor,
};
pub use member::{
    BackgroundLearner, DriftSignal, ForestMember, MemberModel, Misclassification,
    NormalizedError,
};
pub use metric::{Accuracy, Metric, RegressionMetric, RunningError};
pub use predict::ClassDistribution;
pub use serialize::{ModelKind, PersistedModel};
