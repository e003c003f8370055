use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the shape classifiers and their collaborators.
#[derive(Debug, Error)]
pub enum ShapeRecError {
    /// Invalid or unreadable configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A stored model header disagrees with the live configuration.
    #[error("Model header field {key} is {stored:?} but the current configuration expects {expected:?}")]
    ModelMismatch {
        /// Header key that disagreed.
        key: String,
        /// Value found in the model file.
        stored: String,
        /// Value computed from the live configuration.
        expected: String,
    },
    /// Failed to open, read or write a model or training file.
    #[error("I/O failure on {path}: {source}")]
    ModelIo {
        /// File that failed.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// A model file is structurally damaged.
    #[error("Malformed model file {path}: {reason}")]
    ModelFormat {
        /// Offending file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
    /// Negative, out-of-order or unknown class id.
    #[error("Invalid shape id {id}: {reason}")]
    ShapeId {
        /// The id as read (may be negative when parsed from text).
        id: i64,
        /// Why the id was rejected.
        reason: &'static str,
    },
    /// Malformed feature data or a vector of the wrong length.
    #[error("Invalid input: {0}")]
    InputFormat(String),
    /// The stored model was produced by an incompatible algorithm version.
    #[error("Model version {stored} is not compatible with supported version {supported}")]
    Version {
        /// Version recorded in the model header.
        stored: String,
        /// Version implemented by this build.
        supported: String,
    },
    /// Nothing to work with.
    #[error("Empty input: {0}")]
    EmptyInput(String),
    /// A collaborator (preprocessor, feature extractor, ink loader) failed.
    #[error("Collaborator failure: {0}")]
    Resource(String),
    /// Class mutation requested on a project with a fixed number of shapes.
    #[error("Project is not dynamic; the class set cannot be changed")]
    ProjectNotDynamic,
    /// A caller-supplied argument is out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Recognition or mutation attempted before `load_model_data`.
    #[error("Model data is not loaded")]
    ModelNotLoaded,
    /// The classifier does not implement this lifecycle operation.
    #[error("Operation not supported by this classifier: {0}")]
    Unsupported(&'static str),
}

impl ShapeRecError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ModelIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ModelFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
