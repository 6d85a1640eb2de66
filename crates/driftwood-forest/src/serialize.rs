//! Model serialization and deserialization via bincode.

use std::fmt;
use std::path::Path;

use driftwood_tree::{HoeffdingTreeClassifier, HoeffdingTreeRegressor};
use tracing::{debug, info, instrument};

use crate::error::ForestError;
use crate::forest::AdaptiveRandomForest;
use crate::member::MemberModel;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Which task a saved forest was trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ModelKind {
    /// A classification forest.
    Classifier,
    /// A regression forest.
    Regressor,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Classifier => write!(f, "classifier"),
            ModelKind::Regressor => write!(f, "regressor"),
        }
    }
}

/// Members that know which [`ModelKind`] they produce.
pub trait PersistedModel: MemberModel {
    /// Kind recorded in the envelope.
    const KIND: ModelKind;
}

impl PersistedModel for HoeffdingTreeClassifier {
    const KIND: ModelKind = ModelKind::Classifier;
}

impl PersistedModel for HoeffdingTreeRegressor {
    const KIND: ModelKind = ModelKind::Regressor;
}

/// Leading fields of every envelope, decoded before the forest itself.
#[derive(serde::Deserialize)]
struct EnvelopeHeader {
    format_version: u32,
    kind: ModelKind,
}

/// Versioned envelope for the serialized model.
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
struct ModelEnvelope<M: MemberModel> {
    /// Format version for compatibility checking.
    format_version: u32,
    /// Classifier or regressor.
    kind: ModelKind,
    /// Number of members.
    n_models: usize,
    /// Number of examples learned.
    n_samples_seen: u64,
    /// The serialized forest.
    forest: AdaptiveRandomForest<M>,
}

impl<M: PersistedModel> AdaptiveRandomForest<M> {
    /// Save the model to a binary file.
    ///
    /// The ensemble generator is saved too, so a loaded forest continues
    /// exactly where the saved one stopped.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::SerializeModel`] | bincode encoding failed |
    /// | [`ForestError::WriteModel`] | file write failed |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ForestError> {
        let path = path.as_ref();

        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            kind: M::KIND,
            n_models: self.members.len(),
            n_samples_seen: self.n_samples_seen,
            forest: self.clone(),
        };

        let bytes = bincode::serialize(&envelope)
            .map_err(|e| ForestError::SerializeModel { source: e })?;

        std::fs::write(path, &bytes).map_err(|e| ForestError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(
            size_bytes = bytes.len(),
            kind = %M::KIND,
            n_samples_seen = self.n_samples_seen,
            "model saved"
        );

        Ok(())
    }

    /// Load a model from a binary file.
    ///
    /// Checks the format version and model kind before decoding the forest.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ForestError::ReadModel`] | file read failed |
    /// | [`ForestError::DeserializeModel`] | bincode decoding failed |
    /// | [`ForestError::IncompatibleModelVersion`] | format version mismatch |
    /// | [`ForestError::WrongModelKind`] | file holds the other kind of forest |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ForestError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| ForestError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        let decode_error = |e| ForestError::DeserializeModel {
            path: path.to_path_buf(),
            source: e,
        };

        let header: EnvelopeHeader = bincode::deserialize(&bytes).map_err(decode_error)?;
        if header.format_version != FORMAT_VERSION {
            return Err(ForestError::IncompatibleModelVersion {
                expected: FORMAT_VERSION,
                found: header.format_version,
                path: path.to_path_buf(),
            });
        }
        if header.kind != M::KIND {
            return Err(ForestError::WrongModelKind {
                expected: M::KIND,
                found: header.kind,
                path: path.to_path_buf(),
            });
        }

        let envelope: ModelEnvelope<M> = bincode::deserialize(&bytes).map_err(decode_error)?;

        debug!(
            n_models = envelope.n_models,
            n_samples_seen = envelope.n_samples_seen,
            "model loaded"
        );

        Ok(envelope.forest)
    }
}
