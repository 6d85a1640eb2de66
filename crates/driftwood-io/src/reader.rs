//! Lazy CSV example stream.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::Record;

/// Cell values read as a missing feature.
const MISSING_MARKERS: [&str; 3] = ["", "?", "NA"];

/// Streams examples from a CSV file one row at a time.
///
/// Expected CSV format:
/// - Header row required; one column is the target, every other column a feature
/// - Feature cells are numbers; empty, `?` and `NA` cells are missing values
/// - All rows have the same number of columns as the header
///
/// Rows are parsed only as the iterator is advanced, so arbitrarily long
/// files can be evaluated in constant memory.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingTargetColumn`] | Target column not in header |
/// | [`IoError::NoFeatureColumns`] | Header holds only the target |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::InvalidValue`] | Feature cell is non-numeric or non-finite |
/// | [`IoError::MissingTarget`] | Target cell is empty or a missing marker |
pub struct CsvStream {
    path: PathBuf,
    records: csv::StringRecordsIntoIter<File>,
    header: Vec<String>,
    target_index: usize,
    row_index: usize,
}

impl CsvStream {
    /// Open `path` and locate `target_column` in its header.
    #[instrument(skip_all, fields(path = %path.display(), target = target_column))]
    pub fn open(path: &Path, target_column: &str) -> Result<Self, IoError> {
        let file = File::open(path).map_err(|e| IoError::FileNotFound {
            path: path.to_path_buf(),
            source: e,
        })?;

        // flexible(true) lets our own InconsistentRowLength check fire instead
        // of a low-level CsvParse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let header: Vec<String> = rdr
            .headers()
            .map_err(|e| IoError::CsvParse {
                path: path.to_path_buf(),
                offset: e.position().map_or(0, |p| p.byte()),
                source: e,
            })?
            .iter()
            .map(str::to_string)
            .collect();

        let target_index = header
            .iter()
            .position(|h| h == target_column)
            .ok_or_else(|| IoError::MissingTargetColumn {
                path: path.to_path_buf(),
                column: target_column.to_string(),
            })?;
        if header.len() < 2 {
            return Err(IoError::NoFeatureColumns {
                path: path.to_path_buf(),
            });
        }

        info!(n_features = header.len() - 1, target_index, "CSV stream opened");

        Ok(Self {
            path: path.to_path_buf(),
            records: rdr.into_records(),
            header,
            target_index,
            row_index: 0,
        })
    }

    /// Return the feature column names in record order.
    #[must_use]
    pub fn feature_names(&self) -> Vec<&str> {
        self.header
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != self.target_index)
            .map(|(_, h)| h.as_str())
            .collect()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.header.len() - 1
    }

    fn parse(&self, record: &csv::StringRecord, row_index: usize) -> Result<Record, IoError> {
        if record.len() != self.header.len() {
            return Err(IoError::InconsistentRowLength {
                path: self.path.clone(),
                row_index,
                expected: self.header.len(),
                got: record.len(),
            });
        }

        let mut features = Vec::with_capacity(self.n_features());
        let mut target = None;
        for (col, raw) in record.iter().enumerate() {
            if col == self.target_index {
                if !MISSING_MARKERS.contains(&raw) {
                    target = Some(raw.to_string());
                }
                continue;
            }
            if MISSING_MARKERS.contains(&raw) {
                features.push(None);
                continue;
            }
            match raw.parse::<f64>() {
                Ok(v) if v.is_finite() => features.push(Some(v)),
                _ => {
                    return Err(IoError::InvalidValue {
                        path: self.path.clone(),
                        row_index,
                        column: self.header[col].clone(),
                        raw: raw.to_string(),
                    });
                }
            }
        }

        let target = target.ok_or_else(|| IoError::MissingTarget {
            path: self.path.clone(),
            row_index,
        })?;
        Ok(Record {
            row_index,
            features,
            target,
        })
    }
}

impl Iterator for CsvStream {
    type Item = Result<Record, IoError>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.records.next()?;
        let row_index = self.row_index;
        self.row_index += 1;
        let parsed = result
            .map_err(|e| IoError::CsvParse {
                path: self.path.clone(),
                offset: e.position().map_or(0, |p| p.byte()),
                source: e,
            })
            .and_then(|record| self.parse(&record, row_index));
        if parsed.is_err() {
            debug!(row_index, "row rejected");
        }
        Some(parsed)
    }
}
