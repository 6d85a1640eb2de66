use std::collections::BTreeSet;

use crate::detector::ChangeDetector;

/// Detector that fires exactly on the listed update counts (1-based).
///
/// Ignores the values it is fed. Useful for scripting drift scenarios.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScheduledDetector {
    schedule: BTreeSet<u64>,
    n_seen: u64,
    detected: bool,
}

impl ScheduledDetector {
    /// Create a detector firing on the given update counts.
    #[must_use]
    pub fn new(schedule: impl IntoIterator<Item = u64>) -> Self {
        Self {
            schedule: schedule.into_iter().collect(),
            n_seen: 0,
            detected: false,
        }
    }

    /// Return the update counts this detector fires on.
    #[must_use]
    pub fn schedule(&self) -> &BTreeSet<u64> {
        &self.schedule
    }
}

impl ChangeDetector for ScheduledDetector {
    fn update(&mut self, _value: f64) -> bool {
        self.n_seen += 1;
        self.detected = self.schedule.contains(&self.n_seen);
        self.detected
    }

    fn change_detected(&self) -> bool {
        self.detected
    }

    fn fresh(&self) -> Self {
        Self::new(self.schedule.iter().copied())
    }

    fn n_seen(&self) -> u64 {
        self.n_seen
    }
}
