//! Default values used by the serde config layer.

pub(crate) const DEFAULT_PROJECT_TYPE: &str = "SHAPEREC";
pub(crate) const DEFAULT_PREPROCESSOR: &str = "CommonPreProc";
pub(crate) const DEFAULT_FEATURE_EXTRACTOR: &str = "PointFloatShapeFeatureExtractor";

pub(crate) fn default_project_type() -> String {
    DEFAULT_PROJECT_TYPE.to_string()
}

pub(crate) fn default_preprocessor() -> String {
    DEFAULT_PREPROCESSOR.to_string()
}

pub(crate) fn default_feature_extractor() -> String {
    DEFAULT_FEATURE_EXTRACTOR.to_string()
}

pub(crate) fn default_preprocessing_sequence() -> Vec<String> {
    vec![
        "CommonPreProc::normalizeSize".to_string(),
        "CommonPreProc::resampleTraceGroup".to_string(),
        "CommonPreProc::normalizeSize".to_string(),
    ]
}

pub(crate) fn default_trace_dimension() -> usize {
    60
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_false() -> bool {
    false
}

pub(crate) fn default_aspect_ratio_threshold() -> f32 {
    3.0
}

pub(crate) fn default_size_threshold() -> f32 {
    0.01
}

pub(crate) fn default_dot_threshold() -> f32 {
    0.01
}

pub(crate) fn default_smoothing_window() -> usize {
    3
}

pub(crate) fn default_prototype_reduction_factor() -> i32 {
    -1
}

pub(crate) fn default_dtw_banding() -> f32 {
    0.33
}

pub(crate) fn default_nearest_neighbors() -> usize {
    1
}

pub(crate) fn default_reject_threshold() -> f32 {
    0.001
}

pub(crate) fn default_lvq_iteration_scale() -> usize {
    40
}

pub(crate) fn default_lvq_initial_alpha() -> f32 {
    0.3
}

pub(crate) fn default_model_update_frequency() -> usize {
    5
}

pub(crate) fn default_random_seed() -> u64 {
    426
}

pub(crate) fn default_adapt_min_samples_per_class() -> usize {
    5
}

pub(crate) fn default_hidden_layer_units() -> Vec<usize> {
    vec![25]
}

pub(crate) fn default_learning_rate() -> f64 {
    0.5
}

pub(crate) fn default_momentum() -> f64 {
    0.25
}

pub(crate) fn default_total_error() -> f64 {
    0.00001
}

pub(crate) fn default_individual_error() -> f64 {
    0.00001
}

pub(crate) fn default_max_iterations() -> usize {
    100_000
}

pub(crate) fn default_normalization_factor() -> f64 {
    10.0
}
