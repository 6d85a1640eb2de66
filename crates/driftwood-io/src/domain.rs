//! Domain types for driftwood-io.

use std::collections::HashMap;
use std::fmt;

/// One example read from a CSV stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Zero-based row index (excluding header).
    pub row_index: usize,
    /// Feature values in header order, target column removed; `None` is missing.
    pub features: Vec<Option<f64>>,
    /// The raw, trimmed target cell.
    pub target: String,
}

impl Record {
    /// Parse the target as a finite number.
    #[must_use]
    pub fn numeric_target(&self) -> Option<f64> {
        self.target.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// Maps string class labels to dense ids in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LabelEncoder {
    ids: HashMap<String, usize>,
    labels: Vec<String>,
}

impl LabelEncoder {
    /// Create an empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of `label`, assigning the next free id if it is new.
    pub fn encode(&mut self, label: &str) -> usize {
        if let Some(&id) = self.ids.get(label) {
            return id;
        }
        let id = self.labels.len();
        self.ids.insert(label.to_string(), id);
        self.labels.push(label.to_string());
        id
    }

    /// Return the id of a known label.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<usize> {
        self.ids.get(label).copied()
    }

    /// Return the label behind an id.
    #[must_use]
    pub fn decode(&self, id: usize) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    /// Return the labels in id order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Return the number of distinct labels seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Return `true` before any label was encoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Learning task of an evaluation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    /// Class labels.
    Classification,
    /// Numeric targets.
    Regression,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Classification => f.write_str("classification"),
            Task::Regression => f.write_str("regression"),
        }
    }
}

/// Summary of a prequential (test-then-train) run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PrequentialReport {
    /// Classification or regression.
    pub task: Task,
    /// Input CSV path.
    pub data: String,
    /// Target column name.
    pub target: String,
    /// Number of examples evaluated and learned.
    pub n_samples: u64,
    /// Number of forest members.
    pub n_models: usize,
    /// Name of the prequential metric.
    pub metric: String,
    /// Prequential metric value.
    pub score: f64,
    /// Drifts detected across all members.
    pub n_drifts: u64,
    /// Warnings detected across all members.
    pub n_warnings: u64,
    /// Distinct class labels seen, for classification runs.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub labels: Option<Vec<String>>,
    /// Wall-clock duration of the run in seconds.
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_assigns_ids_in_first_seen_order() {
        let mut enc = LabelEncoder::new();
        assert!(enc.is_empty());
        assert_eq!(enc.encode("spam"), 0);
        assert_eq!(enc.encode("ham"), 1);
        assert_eq!(enc.encode("spam"), 0);
        assert_eq!(enc.len(), 2);
        assert_eq!(enc.get("ham"), Some(1));
        assert_eq!(enc.get("eggs"), None);
        assert_eq!(enc.decode(1), Some("ham"));
        assert_eq!(enc.decode(2), None);
        assert_eq!(enc.labels(), ["spam".to_string(), "ham".to_string()]);
    }

    #[test]
    fn numeric_target_rejects_text_and_non_finite() {
        let record = |t: &str| Record {
            row_index: 0,
            features: vec![],
            target: t.to_string(),
        };
        assert_eq!(record("2.5").numeric_target(), Some(2.5));
        assert_eq!(record("yes").numeric_target(), None);
        assert_eq!(record("NaN").numeric_target(), None);
    }

    #[test]
    fn task_serializes_lowercase() {
        assert_eq!(Task::Regression.to_string(), "regression");
        let json = serde_json::to_string(&Task::Classification).unwrap();
        assert_eq!(json, "\"classification\"");
    }
}
