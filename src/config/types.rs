use serde::{Deserialize, Serialize};

use super::ConfigError;
use super::defaults::*;

/// Project-wide settings shared by every profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Number of shape classes, or `"dynamic"` for an open class set.
    #[serde(default)]
    pub num_shapes: NumShapes,
    /// Project type recorded in model headers.
    #[serde(default = "default_project_type")]
    pub project_type: String,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            num_shapes: NumShapes::default(),
            project_type: default_project_type(),
        }
    }
}

impl ProjectSettings {
    /// Check that `num_shapes` is either a count or the `dynamic` keyword.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.num_shapes {
            NumShapes::Fixed(0) => Err(ConfigError::invalid(
                "num_shapes",
                "must be positive or \"dynamic\"",
            )),
            NumShapes::Fixed(_) => Ok(()),
            NumShapes::Keyword(word) if word.eq_ignore_ascii_case("dynamic") => Ok(()),
            NumShapes::Keyword(word) => Err(ConfigError::invalid(
                "num_shapes",
                format!("unknown keyword {word:?}"),
            )),
        }
    }

    /// Whether classes may be added and removed at runtime.
    pub fn is_dynamic(&self) -> bool {
        matches!(&self.num_shapes, NumShapes::Keyword(word) if word.eq_ignore_ascii_case("dynamic"))
    }

    /// Fixed class count, `None` for dynamic projects.
    pub fn fixed_shape_count(&self) -> Option<u32> {
        match self.num_shapes {
            NumShapes::Fixed(count) => Some(count),
            NumShapes::Keyword(_) => None,
        }
    }
}

/// Raw `num_shapes` value as written in `project.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumShapes {
    /// Closed class set of this size.
    Fixed(u32),
    /// Keyword form; only `dynamic` is accepted.
    Keyword(String),
}

impl Default for NumShapes {
    fn default() -> Self {
        Self::Keyword("dynamic".to_string())
    }
}

/// Preprocessing and feature extraction choices shared by both classifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Registry name of the preprocessor.
    #[serde(default = "default_preprocessor")]
    pub preprocessor: String,
    /// Registry name of the feature extractor.
    #[serde(default = "default_feature_extractor")]
    pub feature_extractor: String,
    /// Ordered preprocessing steps, optionally prefixed with `Module::`.
    #[serde(default = "default_preprocessing_sequence")]
    pub preprocessing_sequence: Vec<String>,
    /// Total number of resampled points per trace group.
    #[serde(default = "default_trace_dimension")]
    pub trace_dimension: usize,
    #[serde(default = "default_true")]
    pub preserve_aspect_ratio: bool,
    #[serde(default = "default_false")]
    pub preserve_relative_y_position: bool,
    #[serde(default = "default_aspect_ratio_threshold")]
    pub aspect_ratio_threshold: f32,
    #[serde(default = "default_size_threshold")]
    pub size_threshold: f32,
    #[serde(default = "default_dot_threshold")]
    pub dot_threshold: f32,
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,
    #[serde(default)]
    pub resampling_allocation: ResamplingAllocation,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            preprocessor: default_preprocessor(),
            feature_extractor: default_feature_extractor(),
            preprocessing_sequence: default_preprocessing_sequence(),
            trace_dimension: default_trace_dimension(),
            preserve_aspect_ratio: default_true(),
            preserve_relative_y_position: default_false(),
            aspect_ratio_threshold: default_aspect_ratio_threshold(),
            size_threshold: default_size_threshold(),
            dot_threshold: default_dot_threshold(),
            smoothing_window: default_smoothing_window(),
            resampling_allocation: ResamplingAllocation::default(),
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trace_dimension == 0 {
            return Err(ConfigError::invalid("trace_dimension", "must be positive"));
        }
        if self.smoothing_window == 0 {
            return Err(ConfigError::invalid("smoothing_window", "must be positive"));
        }
        if self.aspect_ratio_threshold <= 0.0 {
            return Err(ConfigError::invalid(
                "aspect_ratio_threshold",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// How resampled points are distributed over the strokes of a trace group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResamplingAllocation {
    /// Proportional to stroke arc length.
    #[default]
    LengthBased,
    /// Same number of points per stroke.
    PointBased,
}

impl ResamplingAllocation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LengthBased => "lengthbased",
            Self::PointBased => "pointbased",
        }
    }
}

/// How the nearest-neighbor classifier reduces training samples to prototypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrototypeSelection {
    #[default]
    HierClustering,
    Lvq,
}

/// Stopping criterion for automatic cluster-count selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterStop {
    #[default]
    LMethod,
    AverageSilhouette,
}

/// Inter-cluster distance used when merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Linkage {
    Single,
    #[default]
    Average,
    Complete,
}

/// Distance between two feature vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceMetric {
    Dtw,
    Euclidean,
}

impl DistanceMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dtw => "dtw",
            Self::Euclidean => "eu",
        }
    }
}

/// Encoding of the model file body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    #[default]
    Ascii,
    Binary,
}

impl FileMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Binary => "binary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ascii" => Some(Self::Ascii),
            "binary" => Some(Self::Binary),
            _ => None,
        }
    }
}

fn default_dtw() -> DistanceMetric {
    DistanceMetric::Dtw
}

fn default_euclidean() -> DistanceMetric {
    DistanceMetric::Euclidean
}

/// Settings for the nearest-neighbor / LVQ classifier (`nn.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NnSettings {
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub prototype_selection: PrototypeSelection,
    /// Percentage of samples removed per class; `-1` selects the cluster count automatically.
    #[serde(default = "default_prototype_reduction_factor")]
    pub prototype_reduction_factor: i32,
    /// Fixed prototype count per class; overrides the reduction factor.
    #[serde(default)]
    pub prototypes_per_class: Option<usize>,
    #[serde(default)]
    pub cluster_stop: ClusterStop,
    #[serde(default)]
    pub linkage: Linkage,
    #[serde(default = "default_dtw")]
    pub prototype_distance: DistanceMetric,
    #[serde(default = "default_dtw_banding")]
    pub dtw_banding: f32,
    /// Percentage of Euclidean-nearest candidates kept for the DTW pass.
    #[serde(default)]
    pub dtw_euclidean_filter: Option<u32>,
    #[serde(default = "default_nearest_neighbors")]
    pub nearest_neighbors: usize,
    #[serde(default = "default_false")]
    pub adaptive_knn: bool,
    #[serde(default = "default_reject_threshold")]
    pub reject_threshold: f32,
    #[serde(default = "default_lvq_iteration_scale")]
    pub lvq_iteration_scale: usize,
    #[serde(default = "default_lvq_initial_alpha")]
    pub lvq_initial_alpha: f32,
    #[serde(default = "default_euclidean")]
    pub lvq_distance: DistanceMetric,
    #[serde(default)]
    pub model_file_mode: FileMode,
    /// Mutations accumulated before the model file is rewritten.
    #[serde(default = "default_model_update_frequency")]
    pub model_update_frequency: usize,
    /// Class id assigned by `add_class` when the model is empty.
    #[serde(default)]
    pub dynamic_start_class_id: u32,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    #[serde(default = "default_adapt_min_samples_per_class")]
    pub adapt_min_samples_per_class: usize,
}

impl Default for NnSettings {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings::default(),
            prototype_selection: PrototypeSelection::default(),
            prototype_reduction_factor: default_prototype_reduction_factor(),
            prototypes_per_class: None,
            cluster_stop: ClusterStop::default(),
            linkage: Linkage::default(),
            prototype_distance: default_dtw(),
            dtw_banding: default_dtw_banding(),
            dtw_euclidean_filter: None,
            nearest_neighbors: default_nearest_neighbors(),
            adaptive_knn: default_false(),
            reject_threshold: default_reject_threshold(),
            lvq_iteration_scale: default_lvq_iteration_scale(),
            lvq_initial_alpha: default_lvq_initial_alpha(),
            lvq_distance: default_euclidean(),
            model_file_mode: FileMode::default(),
            model_update_frequency: default_model_update_frequency(),
            dynamic_start_class_id: 0,
            random_seed: default_random_seed(),
            adapt_min_samples_per_class: default_adapt_min_samples_per_class(),
        }
    }
}

impl NnSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        if self.prototype_reduction_factor < -1 || self.prototype_reduction_factor > 100 {
            return Err(ConfigError::invalid(
                "prototype_reduction_factor",
                format!("{} is outside -1..=100", self.prototype_reduction_factor),
            ));
        }
        if self.prototypes_per_class == Some(0) {
            return Err(ConfigError::invalid("prototypes_per_class", "must be positive"));
        }
        if !(self.dtw_banding > 0.0 && self.dtw_banding <= 1.0) {
            return Err(ConfigError::invalid(
                "dtw_banding",
                format!("{} is outside (0, 1]", self.dtw_banding),
            ));
        }
        if let Some(filter) = self.dtw_euclidean_filter
            && (filter == 0 || filter > 100)
        {
            return Err(ConfigError::invalid(
                "dtw_euclidean_filter",
                format!("{filter} is outside 1..=100"),
            ));
        }
        if self.nearest_neighbors == 0 {
            return Err(ConfigError::invalid("nearest_neighbors", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.reject_threshold) {
            return Err(ConfigError::invalid(
                "reject_threshold",
                format!("{} is outside [0, 1]", self.reject_threshold),
            ));
        }
        if self.lvq_iteration_scale == 0 {
            return Err(ConfigError::invalid("lvq_iteration_scale", "must be positive"));
        }
        if !(self.lvq_initial_alpha > 0.0 && self.lvq_initial_alpha < 1.0) {
            return Err(ConfigError::invalid(
                "lvq_initial_alpha",
                format!("{} is outside (0, 1)", self.lvq_initial_alpha),
            ));
        }
        if self.model_update_frequency == 0 {
            return Err(ConfigError::invalid(
                "model_update_frequency",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Settings for the multilayer perceptron classifier (`mlp.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpSettings {
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// Units per hidden layer, input side first.
    #[serde(default = "default_hidden_layer_units")]
    pub hidden_layer_units: Vec<usize>,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_momentum")]
    pub momentum: f64,
    /// Stop once the mean squared error drops below this.
    #[serde(default = "default_total_error")]
    pub total_error: f64,
    /// Stop once every output error of every sample drops below this.
    #[serde(default = "default_individual_error")]
    pub individual_error: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Initial weights are drawn from `(-1/f, 1/f)`.
    #[serde(default = "default_normalization_factor")]
    pub normalization_factor: f64,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    /// Oversample smaller classes so every class contributes equally.
    #[serde(default = "default_true")]
    pub balance_training_set: bool,
    /// Continue from the weights of an existing model file.
    #[serde(default = "default_false")]
    pub weight_reestimation: bool,
    #[serde(default = "default_reject_threshold")]
    pub reject_threshold: f32,
    #[serde(default)]
    pub model_file_mode: FileMode,
}

impl Default for MlpSettings {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings::default(),
            hidden_layer_units: default_hidden_layer_units(),
            learning_rate: default_learning_rate(),
            momentum: default_momentum(),
            total_error: default_total_error(),
            individual_error: default_individual_error(),
            max_iterations: default_max_iterations(),
            normalization_factor: default_normalization_factor(),
            random_seed: default_random_seed(),
            balance_training_set: default_true(),
            weight_reestimation: default_false(),
            reject_threshold: default_reject_threshold(),
            model_file_mode: FileMode::default(),
        }
    }
}

impl MlpSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        if self.hidden_layer_units.is_empty() || self.hidden_layer_units.contains(&0) {
            return Err(ConfigError::invalid(
                "hidden_layer_units",
                "needs at least one layer and every layer needs units",
            ));
        }
        if self.learning_rate <= 0.0 {
            return Err(ConfigError::invalid("learning_rate", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(ConfigError::invalid("momentum", "must be in [0, 1)"));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid("max_iterations", "must be positive"));
        }
        if self.normalization_factor <= 0.0 {
            return Err(ConfigError::invalid(
                "normalization_factor",
                "must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.reject_threshold) {
            return Err(ConfigError::invalid(
                "reject_threshold",
                format!("{} is outside [0, 1]", self.reject_threshold),
            ));
        }
        Ok(())
    }
}
