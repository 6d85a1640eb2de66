//! Concept drift detection for data streams.
//!
//! A detector consumes a real-valued signal (typically a 0/1 error indicator
//! or a normalised residual) one value at a time and reports when the
//! signal's distribution has changed.

mod adwin;
mod detector;
mod error;
mod scheduled;

pub use adwin::Adwin;
pub use detector::{ChangeDetector, Detector};
pub use error::DriftError;
pub use scheduled::ScheduledDetector;
