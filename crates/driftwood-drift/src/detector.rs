use std::fmt;

use crate::adwin::Adwin;
use crate::error::DriftError;
use crate::scheduled::ScheduledDetector;

/// A streaming change detector.
pub trait ChangeDetector: Clone + fmt::Debug + Send + Sync {
    /// Feed one value; returns `true` when a change is detected on this update.
    fn update(&mut self, value: f64) -> bool;

    /// Return whether the most recent update detected a change.
    fn change_detected(&self) -> bool;

    /// Return an untrained detector with the same parameters.
    #[must_use]
    fn fresh(&self) -> Self;

    /// Return the number of values fed since construction or the last `fresh`.
    fn n_seen(&self) -> u64;
}

/// The detectors a forest member can be configured with.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Detector {
    /// Adaptive windowing.
    Adwin(Adwin),
    /// Fires on a fixed list of update counts.
    Scheduled(ScheduledDetector),
}

impl Detector {
    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns the [`DriftError`] of the wrapped detector.
    pub fn validate(&self) -> Result<(), DriftError> {
        match self {
            Detector::Adwin(d) => d.validate(),
            Detector::Scheduled(_) => Ok(()),
        }
    }
}

impl ChangeDetector for Detector {
    fn update(&mut self, value: f64) -> bool {
        match self {
            Detector::Adwin(d) => d.update(value),
            Detector::Scheduled(d) => d.update(value),
        }
    }

    fn change_detected(&self) -> bool {
        match self {
            Detector::Adwin(d) => d.change_detected(),
            Detector::Scheduled(d) => d.change_detected(),
        }
    }

    fn fresh(&self) -> Self {
        match self {
            Detector::Adwin(d) => Detector::Adwin(d.fresh()),
            Detector::Scheduled(d) => Detector::Scheduled(d.fresh()),
        }
    }

    fn n_seen(&self) -> u64 {
        match self {
            Detector::Adwin(d) => d.n_seen(),
            Detector::Scheduled(d) => d.n_seen(),
        }
    }
}

impl From<Adwin> for Detector {
    fn from(d: Adwin) -> Self {
        Detector::Adwin(d)
    }
}

impl From<ScheduledDetector> for Detector {
    fn from(d: ScheduledDetector) -> Self {
        Detector::Scheduled(d)
    }
}
