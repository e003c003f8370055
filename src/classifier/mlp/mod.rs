//! Feed-forward network classifier trained with backpropagation.

mod network;
mod train;

use std::collections::BTreeMap;
use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;

pub use network::Network;
pub use train::{Example, StopReason, TrainingOutcome, backpropagate, balance};

use super::codec;
use super::header::ModelHeader;
use super::training_data::read_training_samples;
use super::{
    CancelToken, ClassifierControl, RecognitionQuery, RecognitionResult, ShapeRecError,
    ShapeRecognizer, TrainRequest, TrainSummary, finish_results, read_header_extras,
    resolve_query_limits,
};
use crate::config::{self, ConfigReader, MlpSettings, ProjectSettings};
use crate::features::{FeatureVector, flatten};
use crate::ink::{InkLoader, JsonInkLoader, TraceGroup};
use crate::registry::Pipeline;

pub const ALGORITHM_NAME: &str = "MLP";
pub const ALGORITHM_VERSION: &str = "2.0.0";
pub const MODEL_FILE_NAME: &str = "mlp.mdt";

/// Multilayer perceptron classifier.
///
/// Output unit `i` scores `class_ids[i]`. Fixed projects use every id below
/// the shape count; dynamic projects use the ids seen in training.
pub struct MlpClassifier {
    project: ProjectSettings,
    settings: MlpSettings,
    pipeline: Pipeline,
    loader: Box<dyn InkLoader>,
    model_path: PathBuf,
    network: Option<Network>,
    class_ids: Vec<u32>,
    cancel: CancelToken,
}

impl MlpClassifier {
    pub fn new(control: &ClassifierControl) -> Result<Self, ShapeRecError> {
        control.validate()?;
        let project = config::load_project_settings(&control.root_path, &control.project_name)?;
        let (reader, settings) = config::load_mlp_settings(&control.profile_dir())?;
        Self::build(control, project, settings, &reader)
    }

    pub fn with_settings(
        control: &ClassifierControl,
        project: ProjectSettings,
        settings: MlpSettings,
    ) -> Result<Self, ShapeRecError> {
        control.validate()?;
        project.validate()?;
        settings.validate()?;
        Self::build(control, project, settings, &ConfigReader::default())
    }

    fn build(
        control: &ClassifierControl,
        project: ProjectSettings,
        settings: MlpSettings,
        reader: &ConfigReader,
    ) -> Result<Self, ShapeRecError> {
        let pipeline = Pipeline::from_settings(&settings.pipeline, reader)?;
        Ok(Self {
            project,
            settings,
            pipeline,
            loader: Box::new(JsonInkLoader),
            model_path: control.profile_dir().join(MODEL_FILE_NAME),
            network: None,
            class_ids: Vec::new(),
            cancel: CancelToken::default(),
        })
    }

    pub fn set_ink_loader(&mut self, loader: Box<dyn InkLoader>) {
        self.loader = loader;
    }

    pub fn model_path(&self) -> &std::path::Path {
        &self.model_path
    }

    pub fn network(&self) -> Option<&Network> {
        self.network.as_ref()
    }

    /// Class id of each output unit of the loaded network.
    pub fn class_ids(&self) -> &[u32] {
        &self.class_ids
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

    fn read_network(&self) -> Result<(Vec<u32>, Network), ShapeRecError> {
        let (stored, body) = codec::read_model(&self.model_path)?;
        stored.validate_against(&self.expected_header())?;
        let mode = stored
            .file_mode()
            .ok_or_else(|| ShapeRecError::format(&self.model_path, "unknown MDT_OPEN_MODE"))?;
        codec::decode_network(&body, mode, &self.model_path)
    }

    /// Starting network: stored weights when re-estimating, random otherwise.
    fn initial_network(
        &self,
        layers: Vec<usize>,
        class_ids: &[u32],
        rng: &mut StdRng,
    ) -> Result<Network, ShapeRecError> {
        if self.settings.weight_reestimation && self.model_path.exists() {
            let (stored_ids, stored) = self.read_network()?;
            if stored.layers() == layers.as_slice() && stored_ids == class_ids {
                tracing::info!("Re-estimating weights from {}", self.model_path.display());
                return Ok(stored);
            }
            tracing::warn!(
                "Stored network {:?} for classes {:?} does not match {:?} for {:?}; starting from random weights",
                stored.layers(),
                stored_ids,
                layers,
                class_ids
            );
        }
        Network::random(layers, self.settings.normalization_factor, rng)
    }

    fn run_training(&mut self, request: &TrainRequest) -> Result<TrainSummary, ShapeRecError> {
        tracing::info!("Training MLP model from {}", request.input.display());
        let extras = read_header_extras(request.header_path.as_deref())?;
        let samples =
            read_training_samples(&request.input, request.kind, &self.pipeline, self.loader.as_ref())?;
        let max_id = samples.iter().map(|s| s.class_id).max().unwrap_or(0);
        let class_ids: Vec<u32> = match self.project.fixed_shape_count() {
            Some(count) => {
                if max_id >= count {
                    return Err(ShapeRecError::ShapeId {
                        id: i64::from(max_id),
                        reason: "class id exceeds the project's shape count",
                    });
                }
                (0..count).collect()
            }
            None => {
                let mut ids: Vec<u32> = samples.iter().map(|s| s.class_id).collect();
                ids.sort_unstable();
                ids.dedup();
                ids
            }
        };
        let outputs = class_ids.len();

        let input_units = flatten(&samples[0].features).len();
        let mut class_counts = BTreeMap::new();
        let mut examples = Vec::with_capacity(samples.len());
        for sample in &samples {
            let input: Vec<f64> = flatten(&sample.features).into_iter().map(f64::from).collect();
            if input.len() != input_units {
                tracing::warn!(
                    "Skipping class {} sample with {} inputs, expected {input_units}",
                    sample.class_id,
                    input.len()
                );
                continue;
            }
            let Ok(target) = class_ids.binary_search(&sample.class_id) else {
                continue;
            };
            *class_counts.entry(sample.class_id).or_insert(0) += 1;
            examples.push(Example { input, target });
        }
        if self.settings.balance_training_set {
            examples = balance(examples, outputs);
        }

        let mut layers = vec![input_units];
        layers.extend(&self.settings.hidden_layer_units);
        layers.push(outputs);
        let mut rng = StdRng::seed_from_u64(self.settings.random_seed);
        let mut network = self.initial_network(layers, &class_ids, &mut rng)?;
        let outcome = backpropagate(&mut network, &examples, &self.settings, &mut rng);
        tracing::info!(
            "Backpropagation stopped after {} epochs ({:?}), mse {:.6}",
            outcome.epochs,
            outcome.stop,
            outcome.mean_squared_error
        );

        let mode = self.settings.model_file_mode;
        let mut header = self
            .expected_header()
            .with_metadata(&request.comment, &request.dataset);
        for (key, value) in &extras {
            header.set(key, value.clone());
        }
        let body = codec::encode_network(&network, &class_ids, mode)?;
        codec::write_model(&self.model_path, &header, &body)?;
        self.network = None;
        self.class_ids.clear();
        Ok(TrainSummary {
            class_counts,
            iterations: outcome.epochs,
        })
    }
}

impl ShapeRecognizer for MlpClassifier {
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
        let (class_ids, network) = self.read_network()?;
        tracing::info!(
            "Loaded MLP {:?} for {} classes from {}",
            network.layers(),
            class_ids.len(),
            self.model_path.display()
        );
        self.network = Some(network);
        self.class_ids = class_ids;
        Ok(())
    }

    fn unload_model_data(&mut self) -> Result<(), ShapeRecError> {
        self.network = None;
        self.class_ids.clear();
        Ok(())
    }

    fn recognize_features(
        &mut self,
        features: &FeatureVector,
        query: &RecognitionQuery,
    ) -> Result<Vec<RecognitionResult>, ShapeRecError> {
        let network = self.network.as_ref().ok_or(ShapeRecError::ModelNotLoaded)?;
        let limit = resolve_query_limits(query, self.class_ids.len())?;
        if self.cancel.is_cancelled() {
            self.cancel.reset();
            return Ok(Vec::new());
        }
        let input: Vec<f64> = flatten(features).into_iter().map(f64::from).collect();
        if input.len() != network.input_units() {
            return Err(ShapeRecError::InputFormat(format!(
                "network expects {} inputs, got {}",
                network.input_units(),
                input.len()
            )));
        }
        let outputs = network.outputs(&input);
        // (class id, output unit) pairs under consideration.
        let candidates: Vec<(u32, usize)> = match &query.class_subset {
            Some(subset) => subset
                .iter()
                .map(|&id| {
                    self.class_ids
                        .binary_search(&id)
                        .map(|unit| (id, unit))
                        .map_err(|_| ShapeRecError::ShapeId {
                            id: i64::from(id),
                            reason: "class subset names a class that is not in the model",
                        })
                })
                .collect::<Result<_, _>>()?,
            None => self.class_ids.iter().copied().zip(0..).collect(),
        };
        let best = candidates
            .iter()
            .map(|&(_, unit)| outputs[unit])
            .fold(0.0f64, f64::max);
        if best <= f64::from(self.settings.reject_threshold) {
            return Ok(Vec::new());
        }
        let total: f64 = candidates.iter().map(|&(_, unit)| outputs[unit]).sum();
        let mut results: Vec<RecognitionResult> = candidates
            .iter()
            .map(|&(class_id, unit)| RecognitionResult {
                class_id,
                confidence: (outputs[unit] / total) as f32,
            })
            .filter(|result| result.confidence > 0.0)
            .collect();
        results.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(finish_results(results, query.conf_threshold, limit))
    }

    fn add_class(&mut self, _samples: &[TraceGroup]) -> Result<u32, ShapeRecError> {
        Err(ShapeRecError::Unsupported("add_class"))
    }

    fn add_sample(&mut self, _ink: &TraceGroup, _class_id: u32) -> Result<(), ShapeRecError> {
        Err(ShapeRecError::Unsupported("add_sample"))
    }

    fn delete_class(&mut self, _class_id: u32) -> Result<(), ShapeRecError> {
        Err(ShapeRecError::Unsupported("delete_class"))
    }

    fn get_trace_groups(
        &self,
        _class_id: u32,
        _count: usize,
    ) -> Result<Vec<TraceGroup>, ShapeRecError> {
        Err(ShapeRecError::Unsupported("get_trace_groups"))
    }

    fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

impl std::fmt::Debug for MlpClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlpClassifier")
            .field("model_path", &self.model_path)
            .field("layers", &self.network.as_ref().map(Network::layers))
            .finish()
    }
}
