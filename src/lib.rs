//! Trainable handwritten-shape recognition.
//!
//! Strokes ([`ink::TraceGroup`]) run through a configured [`registry::Pipeline`]
//! into feature vectors, which a nearest-neighbor or MLP classifier from
//! [`classifier`] learns and recognizes. Models persist as checksummed files
//! inside a project profile directory.

/// Toolkit home and log directory resolution.
pub mod app_dirs;
/// Trainable classifiers and their shared lifecycle.
pub mod classifier;
/// Project and profile settings.
pub mod config;
/// Feature elements and extractors.
pub mod features;
/// Ink data model and loaders.
pub mod ink;
/// Tracing setup for the binaries.
pub mod logging;
/// Evaluation metrics.
pub mod ml;
/// Stroke preprocessing.
pub mod preprocess;
/// Named collaborator factories.
pub mod registry;

pub use classifier::{
    ClassifierControl, MlpClassifier, NnClassifier, RecognitionQuery, RecognitionResult,
    ShapeRecError, ShapeRecognizer, TrainRequest, TrainingInput,
};
