//! Trainable shape classifiers and the lifecycle they share.
//!
//! Both classifiers follow the same sequence: construct from a
//! [`ClassifierControl`], `train` into a model file, `load_model_data`,
//! then `recognize` and (for dynamic projects) mutate the class set.

pub mod cluster;
pub mod codec;
pub mod confidence;
pub mod distance;
mod errors;
pub mod header;
pub mod lvq;
pub mod mlp;
pub mod nn;
pub mod proximity;
pub mod training_data;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use semver::Version;

use crate::config::{self, ConfigError};
use crate::features::FeatureVector;
use crate::ink::{DeviceContext, TraceGroup};
use crate::registry::Pipeline;

pub use errors::ShapeRecError;
pub use mlp::MlpClassifier;
pub use nn::NnClassifier;

/// One labeled feature vector.
#[derive(Debug, Clone)]
pub struct ShapeSample {
    pub class_id: u32,
    pub features: FeatureVector,
}

impl ShapeSample {
    pub fn new(class_id: u32, features: FeatureVector) -> Self {
        Self { class_id, features }
    }
}

/// A ranked class with confidence in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecognitionResult {
    pub class_id: u32,
    pub confidence: f32,
}

/// Identity of the project and profile a classifier works for.
#[derive(Debug, Clone)]
pub struct ClassifierControl {
    pub project_name: String,
    pub profile_name: String,
    pub root_path: PathBuf,
    pub toolkit_version: String,
}

impl ClassifierControl {
    pub fn new(root: impl Into<PathBuf>, project: &str, profile: &str) -> Self {
        Self {
            project_name: project.to_string(),
            profile_name: profile.to_string(),
            root_path: root.into(),
            toolkit_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Check identity fields and parse the toolkit version.
    pub fn validate(&self) -> Result<Version, ConfigError> {
        if self.project_name.trim().is_empty() {
            return Err(ConfigError::Missing("project_name"));
        }
        if self.profile_name.trim().is_empty() {
            return Err(ConfigError::Missing("profile_name"));
        }
        if self.root_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing("root_path"));
        }
        Version::parse(self.toolkit_version.trim()).map_err(|err| {
            ConfigError::invalid("toolkit_version", format!("{:?}: {err}", self.toolkit_version))
        })
    }

    pub fn profile_dir(&self) -> PathBuf {
        config::profile_dir(&self.root_path, &self.project_name, &self.profile_name)
    }
}

/// Per-call recognition options.
#[derive(Debug, Clone, Default)]
pub struct RecognitionQuery {
    /// Only these classes are considered when set.
    pub class_subset: Option<Vec<u32>>,
    /// Results below this confidence are dropped; must lie in `[0, 1]`.
    pub conf_threshold: f32,
    /// Maximum number of results; `None` is unlimited.
    pub num_choices: Option<usize>,
}

/// Format of a training input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingInput {
    /// Lines of `<ink path> <class id>`.
    InkList,
    /// Lines of `<class id> <feature vector>`.
    FeatureFile,
}

/// Arguments of a training run.
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub input: PathBuf,
    pub kind: TrainingInput,
    /// Optional file of extra `KEY=VALUE` header fields.
    pub header_path: Option<PathBuf>,
    pub comment: String,
    pub dataset: String,
}

impl TrainRequest {
    pub fn new(input: impl Into<PathBuf>, kind: TrainingInput) -> Self {
        Self {
            input: input.into(),
            kind,
            header_path: None,
            comment: String::new(),
            dataset: String::new(),
        }
    }
}

/// Outcome of a training run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainSummary {
    /// Prototypes (NN) or training samples (MLP) per class in the written model.
    pub class_counts: BTreeMap<u32, usize>,
    /// LVQ or backpropagation iterations run; zero for pure clustering.
    pub iterations: usize,
}

/// Cooperative cancellation flag for `recognize`.
///
/// Clones share the flag, so a token handed to another thread can stop a
/// recognition in progress. The classifier clears it once honored.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Lifecycle shared by the nearest-neighbor and MLP classifiers.
pub trait ShapeRecognizer {
    fn pipeline(&self) -> &Pipeline;

    fn pipeline_mut(&mut self) -> &mut Pipeline;

    fn train(&mut self, request: &TrainRequest) -> Result<TrainSummary, ShapeRecError>;

    fn load_model_data(&mut self) -> Result<(), ShapeRecError>;

    fn unload_model_data(&mut self) -> Result<(), ShapeRecError>;

    fn recognize_features(
        &mut self,
        features: &FeatureVector,
        query: &RecognitionQuery,
    ) -> Result<Vec<RecognitionResult>, ShapeRecError>;

    /// Preprocess and extract `ink`, then recognize the features.
    fn recognize(
        &mut self,
        ink: &TraceGroup,
        query: &RecognitionQuery,
    ) -> Result<Vec<RecognitionResult>, ShapeRecError> {
        let features = self.pipeline().extract(ink)?;
        self.recognize_features(&features, query)
    }

    /// Add a class built from `samples`, returning its new id.
    fn add_class(&mut self, samples: &[TraceGroup]) -> Result<u32, ShapeRecError>;

    fn add_sample(&mut self, ink: &TraceGroup, class_id: u32) -> Result<(), ShapeRecError>;

    fn delete_class(&mut self, class_id: u32) -> Result<(), ShapeRecError>;

    /// Stored prototypes of `class_id` rendered back into strokes; `0` means all.
    fn get_trace_groups(&self, class_id: u32, count: usize) -> Result<Vec<TraceGroup>, ShapeRecError>;

    fn set_device_context(&mut self, context: &DeviceContext) {
        self.pipeline_mut().set_device_context(context);
    }

    /// Token whose `cancel` stops the next or current `recognize`.
    fn cancel_token(&self) -> CancelToken;
}

/// Validate the confidence threshold and resolve the result limit.
pub(crate) fn resolve_query_limits(
    query: &RecognitionQuery,
    num_classes: usize,
) -> Result<usize, ShapeRecError> {
    if !(0.0..=1.0).contains(&query.conf_threshold) {
        return Err(ShapeRecError::InvalidArgument(format!(
            "confidence threshold {} is outside [0, 1]",
            query.conf_threshold
        )));
    }
    Ok(match query.num_choices {
        None => usize::MAX,
        Some(n) => n.clamp(1, num_classes.max(1)),
    })
}

/// Apply the confidence threshold and result limit to sorted results.
pub(crate) fn finish_results(
    mut results: Vec<RecognitionResult>,
    conf_threshold: f32,
    limit: usize,
) -> Vec<RecognitionResult> {
    results.retain(|result| result.confidence >= conf_threshold);
    results.truncate(limit);
    results
}

/// Extra `KEY=VALUE` header fields from an optional header file.
pub(crate) fn read_header_extras(
    path: Option<&Path>,
) -> Result<Vec<(String, String)>, ShapeRecError> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let text = std::fs::read_to_string(path).map_err(|source| ShapeRecError::io(path, source))?;
    Ok(text
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_requires_identity_and_semver() {
        let control = ClassifierControl::new("/tmp/root", "demo", "default");
        assert!(control.validate().is_ok());
        let missing = ClassifierControl {
            project_name: " ".to_string(),
            ..control.clone()
        };
        assert!(matches!(missing.validate(), Err(ConfigError::Missing("project_name"))));
        let bad_version = ClassifierControl {
            toolkit_version: "four".to_string(),
            ..control
        };
        assert!(matches!(bad_version.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn query_limits_clamp_choices() {
        let query = RecognitionQuery {
            num_choices: Some(0),
            ..RecognitionQuery::default()
        };
        assert_eq!(resolve_query_limits(&query, 5).unwrap(), 1);
        let query = RecognitionQuery {
            num_choices: Some(50),
            ..RecognitionQuery::default()
        };
        assert_eq!(resolve_query_limits(&query, 5).unwrap(), 5);
        let query = RecognitionQuery {
            conf_threshold: 1.5,
            ..RecognitionQuery::default()
        };
        assert!(matches!(
            resolve_query_limits(&query, 5),
            Err(ShapeRecError::InvalidArgument(_))
        ));
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::default();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!other.is_cancelled());
    }
}
