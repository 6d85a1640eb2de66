//! ADWIN (ADaptive WINdowing) change detector.
//!
//! Keeps a window of recent values compressed into an exponential histogram:
//! row `i` holds buckets summarising `2^i` values each, at most
//! `max_buckets` per row. Every `clock` updates it scans every split of the
//! window into an older and a newer part, and drops old buckets while the two
//! parts' means differ by more than a variance-aware bound.
//!
//! Reference:
//! Bifet, A. and Gavalda, R., 2007. Learning from time-changing data with adaptive windowing.
//! In Proceedings of the 2007 SIAM international conference on data mining (pp. 443-448).

use std::collections::VecDeque;

use tracing::trace;

use crate::detector::ChangeDetector;
use crate::error::DriftError;

/// Sum and variance of a run of `2^row` values.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
struct Bucket {
    total: f64,
    variance: f64,
}

/// ADWIN drift detector.
///
/// # Defaults
///
/// | Parameter           | Default |
/// |---------------------|---------|
/// | `delta`             | 0.002   |
/// | `clock`             | 32      |
/// | `max_buckets`       | 5       |
/// | `min_window_length` | 5       |
/// | `grace_period`      | 10      |
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Adwin {
    delta: f64,
    clock: u64,
    max_buckets: usize,
    min_window_length: u64,
    grace_period: u64,
    /// Row 0 holds the newest, single-value buckets; each row is oldest-first.
    rows: Vec<VecDeque<Bucket>>,
    total: f64,
    variance: f64,
    width: u64,
    tick: u64,
    n_seen: u64,
    detected: bool,
}

impl Default for Adwin {
    fn default() -> Self {
        Self::with_delta(0.002)
    }
}

impl Adwin {
    /// Create a detector with confidence `delta`.
    ///
    /// Smaller values are less sensitive and raise fewer false alarms.
    ///
    /// # Errors
    ///
    /// Returns [`DriftError::InvalidDelta`] when `delta` is not in (0.0, 1.0).
    pub fn new(delta: f64) -> Result<Self, DriftError> {
        let adwin = Self::with_delta(delta);
        adwin.validate()?;
        Ok(adwin)
    }

    fn with_delta(delta: f64) -> Self {
        Self {
            delta,
            clock: 32,
            max_buckets: 5,
            min_window_length: 5,
            grace_period: 10,
            rows: Vec::new(),
            total: 0.0,
            variance: 0.0,
            width: 0,
            tick: 0,
            n_seen: 0,
            detected: false,
        }
    }

    /// Set how many updates pass between change checks.
    #[must_use]
    pub fn with_clock(mut self, clock: u64) -> Self {
        self.clock = clock;
        self
    }

    /// Set the number of buckets kept per histogram row.
    #[must_use]
    pub fn with_max_buckets(mut self, max_buckets: usize) -> Self {
        self.max_buckets = max_buckets;
        self
    }

    /// Set the minimum length of each sub-window compared at a cut.
    #[must_use]
    pub fn with_min_window_length(mut self, min_window_length: u64) -> Self {
        self.min_window_length = min_window_length;
        self
    }

    /// Set the window width required before any change check runs.
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: u64) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// | Variant                                  | When                      |
    /// |------------------------------------------|---------------------------|
    /// | [`DriftError::InvalidDelta`]             | `delta` not in (0.0, 1.0) |
    /// | [`DriftError::InvalidClock`]             | `clock` is 0              |
    /// | [`DriftError::InvalidMaxBuckets`]        | `max_buckets` < 2         |
    /// | [`DriftError::InvalidMinWindowLength`]   | `min_window_length` is 0  |
    pub fn validate(&self) -> Result<(), DriftError> {
        if !(self.delta > 0.0 && self.delta < 1.0) {
            return Err(DriftError::InvalidDelta { delta: self.delta });
        }
        if self.clock == 0 {
            return Err(DriftError::InvalidClock { clock: self.clock });
        }
        if self.max_buckets < 2 {
            return Err(DriftError::InvalidMaxBuckets {
                max_buckets: self.max_buckets,
            });
        }
        if self.min_window_length == 0 {
            return Err(DriftError::InvalidMinWindowLength {
                min_window_length: self.min_window_length,
            });
        }
        Ok(())
    }

    /// Return the confidence parameter.
    #[must_use]
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Return the number of values currently in the window.
    #[must_use]
    pub fn width(&self) -> u64 {
        self.width
    }

    /// Return the mean of the window, or `0.0` when empty.
    #[must_use]
    pub fn estimation(&self) -> f64 {
        if self.width > 0 {
            self.total / self.width as f64
        } else {
            0.0
        }
    }

    /// Return the population variance of the window.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.width > 0 {
            self.variance / self.width as f64
        } else {
            0.0
        }
    }

    /// Return the total number of buckets across all rows.
    #[must_use]
    pub fn n_buckets(&self) -> usize {
        self.rows.iter().map(VecDeque::len).sum()
    }

    fn bucket_size(row: usize) -> f64 {
        2f64.powi(row as i32)
    }

    fn insert(&mut self, value: f64) {
        if self.rows.is_empty() {
            self.rows.push(VecDeque::new());
        }
        self.rows[0].push_back(Bucket {
            total: value,
            variance: 0.0,
        });

        self.width += 1;
        if self.width > 1 {
            let n = self.width as f64;
            let prev_mean = self.total / (n - 1.0);
            self.variance += (n - 1.0) * (value - prev_mean).powi(2) / n;
        }
        self.total += value;
        self.compress();
    }

    /// Merge the two oldest buckets of any overfull row into the next row.
    fn compress(&mut self) {
        let mut row = 0;
        while row < self.rows.len() && self.rows[row].len() > self.max_buckets {
            if row + 1 == self.rows.len() {
                self.rows.push(VecDeque::new());
            }
            let n = Self::bucket_size(row);
            let (Some(a), Some(b)) = (self.rows[row].pop_front(), self.rows[row].pop_front())
            else {
                break;
            };
            let diff = a.total / n - b.total / n;
            let merged = Bucket {
                total: a.total + b.total,
                variance: a.variance + b.variance + n * n * diff * diff / (2.0 * n),
            };
            self.rows[row + 1].push_back(merged);
            row += 1;
        }
    }

    /// Drop the oldest bucket; returns the number of values removed.
    fn delete_oldest(&mut self) -> u64 {
        let Some(last) = self.rows.len().checked_sub(1) else {
            return 0;
        };
        let n = Self::bucket_size(last);
        let Some(bucket) = self.rows[last].pop_front() else {
            return 0;
        };
        if self.rows[last].is_empty() {
            self.rows.pop();
        }

        let removed = n as u64;
        self.width -= removed;
        self.total -= bucket.total;
        if self.width == 0 {
            self.total = 0.0;
            self.variance = 0.0;
        } else {
            let w = self.width as f64;
            let mu = bucket.total / n;
            let mu_window = self.total / w;
            self.variance -= bucket.variance + n * w * (mu - mu_window).powi(2) / (n + w);
            self.variance = self.variance.max(0.0);
        }
        removed
    }

    fn cut_detected(&self, n0: f64, n1: f64, abs_mean_diff: f64) -> bool {
        let m = self.min_window_length as f64;
        let delta_prime = (2.0 * (self.width as f64).ln() / self.delta).ln();
        let m_recip = 1.0 / (n0 - m + 1.0) + 1.0 / (n1 - m + 1.0);
        let epsilon = (2.0 * m_recip * self.variance() * delta_prime).sqrt()
            + 2.0 / 3.0 * delta_prime * m_recip;
        abs_mean_diff > epsilon
    }

    /// Scan every cut from the oldest bucket forward, shrinking on change.
    fn detect_change(&mut self) -> bool {
        if self.tick % self.clock != 0 || self.width <= self.grace_period {
            return false;
        }
        let mut change = false;

        let min_len = self.min_window_length as f64;
        let mut reduce = true;
        while reduce {
            reduce = false;
            let mut n0 = 0.0f64;
            let mut n1 = self.width as f64;
            let mut u0 = 0.0f64;
            let mut u1 = self.total;

            'scan: for row in (0..self.rows.len()).rev() {
                let size = Self::bucket_size(row);
                let len = self.rows[row].len();
                for k in 0..len {
                    let bucket_total = self.rows[row][k].total;
                    n0 += size;
                    n1 -= size;
                    u0 += bucket_total;
                    u1 -= bucket_total;

                    // Never cut after the newest bucket.
                    if row == 0 && k + 1 == len {
                        break 'scan;
                    }
                    if n0 >= min_len && n1 >= min_len {
                        let diff = (u0 / n0 - u1 / n1).abs();
                        if self.cut_detected(n0, n1, diff) {
                            change = true;
                            reduce = self.width > 0;
                            if reduce {
                                self.delete_oldest();
                            }
                            break 'scan;
                        }
                    }
                }
            }
        }
        if change {
            trace!(width = self.width, estimation = self.estimation(), "adwin shrank window");
        }
        change
    }
}

impl ChangeDetector for Adwin {
    fn update(&mut self, value: f64) -> bool {
        self.n_seen += 1;
        self.tick += 1;
        self.insert(value);
        self.detected = self.detect_change();
        self.detected
    }

    fn change_detected(&self) -> bool {
        self.detected
    }

    fn fresh(&self) -> Self {
        Self::with_delta(self.delta)
            .with_clock(self.clock)
            .with_max_buckets(self.max_buckets)
            .with_min_window_length(self.min_window_length)
            .with_grace_period(self.grace_period)
    }

    fn n_seen(&self) -> u64 {
        self.n_seen
    }
}
