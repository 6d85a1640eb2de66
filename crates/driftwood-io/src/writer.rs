//! JSON report writer for evaluation runs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::PrequentialReport;

/// Writes evaluation reports as pretty-printed JSON.
///
/// Creates the parent directory on construction if it does not exist.
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    /// Create a writer targeting `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the parent directory cannot be created.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn new(path: &Path) -> Result<Self, IoError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| IoError::OutputDirCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
            debug!("output directory ready");
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Return the target path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a prequential evaluation report.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::SerializeReport`] | JSON encoding failed |
    /// | [`IoError::WriteFile`] | file write failed |
    #[instrument(skip_all)]
    pub fn write_prequential(&self, report: &PrequentialReport) -> Result<(), IoError> {
        self.write_json(report)?;
        info!(
            path = %self.path.display(),
            n_samples = report.n_samples,
            "prequential report written"
        );
        Ok(())
    }

    fn write_json<T: Serialize>(&self, artifact: &T) -> Result<(), IoError> {
        let json =
            serde_json::to_string_pretty(artifact).map_err(|e| IoError::SerializeReport {
                path: self.path.clone(),
                source: e,
            })?;
        fs::write(&self.path, json).map_err(|e| IoError::WriteFile {
            path: self.path.clone(),
            source: e,
        })
    }
}
