//! Nearest-neighbor classifier with clustering or LVQ prototype selection.

mod adapt;
mod recognize;
mod train;


use std::collections::BTreeMap;
use std::path::PathBuf;

pub use adapt::Adapter;

use super::codec;
use super::distance::DistanceEngine;
use super::header::{self, ModelHeader};
use super::{
    CancelToken, ClassifierControl, RecognitionQuery, RecognitionResult, ShapeRecError,
    ShapeRecognizer, ShapeSample, TrainRequest, TrainSummary,
};
use crate::config::{self, ConfigReader, NnSettings, ProjectSettings};
use crate::features::FeatureVector;
use crate::ink::{InkLoader, JsonInkLoader, TraceGroup};
use crate::registry::Pipeline;

/// Algorithm name recorded in model headers.
pub const ALGORITHM_NAME: &str = "NN";
/// Model format version written and accepted by this classifier.
pub const ALGORITHM_VERSION: &str = "1.1.0";
/// Model file name inside the profile directory.
pub const MODEL_FILE_NAME: &str = "nn.mdt";

/// Nearest-neighbor shape classifier.
///
/// Prototypes are kept grouped by ascending class id so a class occupies one
/// contiguous run of the prototype set.
pub struct NnClassifier {
    project: ProjectSettings,
    settings: NnSettings,
    pipeline: Pipeline,
    loader: Box<dyn InkLoader>,
    model_path: PathBuf,
    prototypes: Vec<ShapeSample>,
    class_counts: BTreeMap<u32, usize>,
    loaded: bool,
    pending_mutations: usize,
    /// Descriptive header fields carried over when the model is rewritten.
    metadata: (String, String),
    engine: DistanceEngine,
    cancel: CancelToken,
    adapter: Adapter,
}

impl NnClassifier {
    /// Read `project.toml` and the profile's `nn.toml`, then build the pipeline.
    pub fn new(control: &ClassifierControl) -> Result<Self, ShapeRecError> {
        control.validate()?;
        let project = config::load_project_settings(&control.root_path, &control.project_name)?;
        let (reader, settings) = config::load_nn_settings(&control.profile_dir())?;
        Self::build(control, project, settings, &reader)
    }

    /// Construct from already-parsed settings.
    pub fn with_settings(
        control: &ClassifierControl,
        project: ProjectSettings,
        settings: NnSettings,
    ) -> Result<Self, ShapeRecError> {
        control.validate()?;
        project.validate()?;
        settings.validate()?;
        Self::build(control, project, settings, &ConfigReader::default())
    }

    fn build(
        control: &ClassifierControl,
        project: ProjectSettings,
        settings: NnSettings,
        reader: &ConfigReader,
    ) -> Result<Self, ShapeRecError> {
        let pipeline = Pipeline::from_settings(&settings.pipeline, reader)?;
        let adapter = Adapter::new(settings.adapt_min_samples_per_class);
        tracing::info!(
            "NN classifier ready for {}/{}",
            control.project_name,
            control.profile_name
        );
        Ok(Self {
            project,
            settings,
            pipeline,
            loader: Box::new(JsonInkLoader),
            model_path: control.profile_dir().join(MODEL_FILE_NAME),
            prototypes: Vec::new(),
            class_counts: BTreeMap::new(),
            loaded: false,
            pending_mutations: 0,
            metadata: (String::new(), String::new()),
            engine: DistanceEngine::new(),
            cancel: CancelToken::default(),
            adapter,
        })
    }

    /// Replace the loader used for ink-list training input.
    pub fn set_ink_loader(&mut self, loader: Box<dyn InkLoader>) {
        self.loader = loader;
    }

    pub fn settings(&self) -> &NnSettings {
        &self.settings
    }

    pub fn model_path(&self) -> &std::path::Path {
        &self.model_path
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Prototype count per class of the loaded model.
    pub fn class_counts(&self) -> &BTreeMap<u32, usize> {
        &self.class_counts
    }

    pub fn prototypes(&self) -> &[ShapeSample] {
        &self.prototypes
    }

    /// Mutations not yet written to the model file.
    pub fn pending_mutations(&self) -> usize {
        self.pending_mutations
    }

    fn ensure_loaded(&self) -> Result<(), ShapeRecError> {
        if self.loaded {
            Ok(())
        } else {
            Err(ShapeRecError::ModelNotLoaded)
        }
    }

    fn ensure_dynamic(&self) -> Result<(), ShapeRecError> {
        self.ensure_loaded()?;
        if self.project.is_dynamic() {
            Ok(())
        } else {
            Err(ShapeRecError::ProjectNotDynamic)
        }
    }

    fn expected_header(&self) -> ModelHeader {
        ModelHeader::for_pipeline(
            &self.pipeline,
            &self.project,
            ALGORITHM_NAME,
            ALGORITHM_VERSION,
            self.settings.model_file_mode,
        )
    }

    /// Start offset of `class_id`'s run, if the class is present.
    fn class_range(&self, class_id: u32) -> Option<std::ops::Range<usize>> {
        let count = *self.class_counts.get(&class_id)?;
        let start: usize = self.class_counts.range(..class_id).map(|(_, n)| n).sum();
        Some(start..start + count)
    }

    /// New prototypes must match the model's vector length and element
    /// dimension; an empty model takes the pipeline's trace dimension.
    fn check_features(&self, features: &FeatureVector) -> Result<(), ShapeRecError> {
        let expected_len = self
            .prototypes
            .first()
            .map_or_else(|| self.pipeline.trace_dimension(), |sample| sample.features.len());
        if features.len() != expected_len {
            return Err(ShapeRecError::InputFormat(format!(
                "feature vector has {} elements, the model uses {expected_len}",
                features.len()
            )));
        }
        let dimension = self.pipeline.extractor().feature_dimension();
        if let Some(feature) = features.iter().find(|feature| feature.dimension() != dimension) {
            return Err(ShapeRecError::InputFormat(format!(
                "feature element has dimension {}, expected {dimension}",
                feature.dimension()
            )));
        }
        Ok(())
    }

    /// Insert `features` at the end of `class_id`'s run, creating the run if needed.
    fn insert_prototype(&mut self, class_id: u32, features: FeatureVector) {
        let end: usize = self.class_counts.range(..=class_id).map(|(_, n)| n).sum();
        self.prototypes.insert(end, ShapeSample::new(class_id, features));
        *self.class_counts.entry(class_id).or_insert(0) += 1;
    }

    fn rebuild_counts(&mut self) {
        self.class_counts.clear();
        for sample in &self.prototypes {
            *self.class_counts.entry(sample.class_id).or_insert(0) += 1;
        }
    }

    /// Write prototypes and a fresh header to the model file.
    fn write_model_file(
        &self,
        prototypes: &[ShapeSample],
        num_classes: usize,
        extras: &[(String, String)],
    ) -> Result<(), ShapeRecError> {
        let mode = self.settings.model_file_mode;
        let mut header = self
            .expected_header()
            .with_metadata(&self.metadata.0, &self.metadata.1);
        for (key, value) in extras {
            header.set(key, value.clone());
        }
        let body = codec::encode_prototypes(prototypes, num_classes, mode)?;
        codec::write_model(&self.model_path, &header, &body)?;
        tracing::info!(
            "Wrote {} prototypes for {} classes to {}",
            prototypes.len(),
            num_classes,
            self.model_path.display()
        );
        Ok(())
    }

    /// Write pending mutations now.
    pub fn flush(&mut self) -> Result<(), ShapeRecError> {
        if self.pending_mutations == 0 {
            return Ok(());
        }
        self.write_model_file(&self.prototypes, self.class_counts.len(), &[])?;
        self.pending_mutations = 0;
        Ok(())
    }

    fn register_mutation(&mut self) -> Result<(), ShapeRecError> {
        self.pending_mutations += 1;
        if self.pending_mutations >= self.settings.model_update_frequency {
            self.flush()?;
        }
        Ok(())
    }

    /// Add a class from already extracted feature vectors.
    pub fn add_class_features(&mut self, samples: &[FeatureVector]) -> Result<u32, ShapeRecError> {
        self.ensure_dynamic()?;
        if samples.is_empty() {
            return Err(ShapeRecError::EmptyInput("a new class needs samples".to_string()));
        }
        let class_id = match self.class_counts.keys().next_back() {
            Some(max) => max.checked_add(1).ok_or(ShapeRecError::ShapeId {
                id: i64::from(*max),
                reason: "class id space exhausted",
            })?,
            None => self.settings.dynamic_start_class_id,
        };
        for features in samples {
            self.check_features(features)?;
        }
        for features in samples {
            self.insert_prototype(class_id, features.clone());
        }
        tracing::info!("Added class {class_id} with {} samples", samples.len());
        self.register_mutation()?;
        Ok(class_id)
    }

    /// Add one already extracted sample to `class_id`.
    pub fn add_sample_features(
        &mut self,
        features: FeatureVector,
        class_id: u32,
    ) -> Result<(), ShapeRecError> {
        self.ensure_dynamic()?;
        self.check_features(&features)?;
        self.insert_prototype(class_id, features);
        self.register_mutation()
    }
}

impl ShapeRecognizer for NnClassifier {
    fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    fn train(&mut self, request: &TrainRequest) -> Result<TrainSummary, ShapeRecError> {
        self.run_training(request)
    }

    fn load_model_data(&mut self) -> Result<(), ShapeRecError> {
        if !self.model_path.exists() && self.project.is_dynamic() {
            tracing::info!(
                "No model at {}; starting with an empty dynamic class set",
                self.model_path.display()
            );
            self.prototypes.clear();
            self.class_counts.clear();
            self.loaded = true;
            return Ok(());
        }
        let (stored, body) = codec::read_model(&self.model_path)?;
        stored.validate_against(&self.expected_header())?;
        let mode = stored.file_mode().ok_or_else(|| {
            ShapeRecError::format(&self.model_path, "unknown MDT_OPEN_MODE")
        })?;
        let (declared, mut prototypes) = codec::decode_prototypes(
            &body,
            mode,
            self.pipeline.extractor(),
            &self.model_path,
        )?;
        prototypes.sort_by_key(|sample| sample.class_id);
        self.prototypes = prototypes;
        self.rebuild_counts();
        if declared != self.class_counts.len() {
            tracing::warn!(
                "Model declares {declared} classes but holds {}",
                self.class_counts.len()
            );
        }
        self.metadata = (
            stored.get(header::COMMENT).unwrap_or_default().to_string(),
            stored.get(header::DATASET).unwrap_or_default().to_string(),
        );
        self.pending_mutations = 0;
        self.loaded = true;
        tracing::info!(
            "Loaded {} prototypes for {} classes from {}",
            self.prototypes.len(),
            self.class_counts.len(),
            self.model_path.display()
        );
        Ok(())
    }

    fn unload_model_data(&mut self) -> Result<(), ShapeRecError> {
        self.flush()?;
        self.prototypes.clear();
        self.class_counts.clear();
        self.adapter.clear();
        self.loaded = false;
        Ok(())
    }

    fn recognize_features(
        &mut self,
        features: &FeatureVector,
        query: &RecognitionQuery,
    ) -> Result<Vec<RecognitionResult>, ShapeRecError> {
        let results = self.rank(features, query)?;
        self.adapter.remember(features, &results);
        Ok(results)
    }

    fn add_class(&mut self, samples: &[TraceGroup]) -> Result<u32, ShapeRecError> {
        self.ensure_dynamic()?;
        let features = samples
            .iter()
            .map(|ink| self.pipeline.extract(ink))
            .collect::<Result<Vec<_>, _>>()?;
        self.add_class_features(&features)
    }

    fn add_sample(&mut self, ink: &TraceGroup, class_id: u32) -> Result<(), ShapeRecError> {
        self.ensure_dynamic()?;
        let features = self.pipeline.extract(ink)?;
        self.add_sample_features(features, class_id)
    }

    fn delete_class(&mut self, class_id: u32) -> Result<(), ShapeRecError> {
        self.ensure_dynamic()?;
        let range = self.class_range(class_id).ok_or(ShapeRecError::ShapeId {
            id: i64::from(class_id),
            reason: "class is not in the model",
        })?;
        let removed = self.prototypes.drain(range).count();
        self.class_counts.remove(&class_id);
        tracing::info!("Deleted class {class_id} ({removed} prototypes)");
        self.register_mutation()
    }

    fn get_trace_groups(
        &self,
        class_id: u32,
        count: usize,
    ) -> Result<Vec<TraceGroup>, ShapeRecError> {
        self.ensure_loaded()?;
        let range = self.class_range(class_id).ok_or(ShapeRecError::ShapeId {
            id: i64::from(class_id),
            reason: "class is not in the model",
        })?;
        let take = if count == 0 { range.len() } else { count };
        self.prototypes[range]
            .iter()
            .take(take)
            .map(|sample| {
                self.pipeline
                    .extractor()
                    .feature_vector_to_trace_group(&sample.features)
            })
            .collect()
    }

    fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

impl Drop for NnClassifier {
    fn drop(&mut self) {
        if self.pending_mutations > 0
            && let Err(err) = self.flush()
        {
            tracing::error!(
                "Failed to write pending model changes to {}: {err}",
                self.model_path.display()
            );
        }
    }
}

impl std::fmt::Debug for NnClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NnClassifier")
            .field("model_path", &self.model_path)
            .field("loaded", &self.loaded)
            .field("classes", &self.class_counts.len())
            .field("prototypes", &self.prototypes.len())
            .field("pending_mutations", &self.pending_mutations)
            .finish()
    }
}
