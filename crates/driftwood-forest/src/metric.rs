//! Streaming performance metrics that weight forest members.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ForestError;

/// A performance estimate updated one prediction at a time.
pub trait Metric<Y, P>:
    Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned
{
    /// Score one prediction against its ground truth.
    fn update(&mut self, y_true: Y, y_pred: &P);

    /// Return the current value; `0.0` before any update.
    fn get(&self) -> f64;

    /// Return the number of updates folded in.
    fn n_seen(&self) -> u64;
}

/// Fraction of correct class predictions.
///
/// A missing prediction counts as wrong.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Accuracy {
    correct: u64,
    total: u64,
}

impl Metric<usize, Option<usize>> for Accuracy {
    fn update(&mut self, y_true: usize, y_pred: &Option<usize>) {
        self.total += 1;
        if *y_pred == Some(y_true) {
            self.correct += 1;
        }
    }

    fn get(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    fn n_seen(&self) -> u64 {
        self.total
    }
}

/// Which error a regression member is scored by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RegressionMetric {
    /// Mean absolute error.
    Mae,
    /// Mean squared error.
    Mse,
    /// Root mean squared error.
    Rmse,
}

impl FromStr for RegressionMetric {
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mae" => Ok(RegressionMetric::Mae),
            "mse" => Ok(RegressionMetric::Mse),
            "rmse" => Ok(RegressionMetric::Rmse),
            other => Err(ForestError::UnknownMetric {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RegressionMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegressionMetric::Mae => "mae",
            RegressionMetric::Mse => "mse",
            RegressionMetric::Rmse => "rmse",
        };
        write!(f, "{name}")
    }
}

/// Running value of a [`RegressionMetric`].
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunningError {
    kind: RegressionMetric,
    n: u64,
    sum_abs: f64,
    sum_sq: f64,
}

impl RunningError {
    /// Create an empty tracker for `kind`.
    #[must_use]
    pub fn new(kind: RegressionMetric) -> Self {
        Self {
            kind,
            n: 0,
            sum_abs: 0.0,
            sum_sq: 0.0,
        }
    }

    /// Return the metric being tracked.
    #[must_use]
    pub fn kind(&self) -> RegressionMetric {
        self.kind
    }
}

impl Metric<f64, f64> for RunningError {
    fn update(&mut self, y_true: f64, y_pred: &f64) {
        let e = y_true - *y_pred;
        self.n += 1;
        self.sum_abs += e.abs();
        self.sum_sq += e * e;
    }

    fn get(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let n = self.n as f64;
        match self.kind {
            RegressionMetric::Mae => self.sum_abs / n,
            RegressionMetric::Mse => self.sum_sq / n,
            RegressionMetric::Rmse => (self.sum_sq / n).sqrt(),
        }
    }

    fn n_seen(&self) -> u64 {
        self.n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_counts_missing_as_wrong() {
        let mut acc = Accuracy::default();
        assert_eq!(acc.get(), 0.0);
        acc.update(1, &Some(1));
        acc.update(0, &Some(1));
        acc.update(2, &None);
        acc.update(2, &Some(2));
        assert_eq!(acc.n_seen(), 4);
        assert!((acc.get() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn regression_errors() {
        let pairs = [(1.0, 0.0), (0.0, 2.0), (3.0, 3.0), (-1.0, 1.0)];
        let mut mae = RunningError::new(RegressionMetric::Mae);
        let mut mse = RunningError::new(RegressionMetric::Mse);
        let mut rmse = RunningError::new(RegressionMetric::Rmse);
        for (y, p) in pairs {
            mae.update(y, &p);
            mse.update(y, &p);
            rmse.update(y, &p);
        }
        assert!((mae.get() - 5.0 / 4.0).abs() < 1e-12);
        assert!((mse.get() - 9.0 / 4.0).abs() < 1e-12);
        assert!((rmse.get() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn regression_metric_from_str() {
        assert_eq!("rmse".parse::<RegressionMetric>().unwrap(), RegressionMetric::Rmse);
        assert!(matches!(
            "r2".parse::<RegressionMetric>(),
            Err(ForestError::UnknownMetric { .. })
        ));
        assert_eq!(RegressionMetric::Mae.to_string(), "mae");
    }
}
