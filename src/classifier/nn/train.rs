use std::collections::BTreeMap;

use super::NnClassifier;
use crate::classifier::cluster::{ClusterCount, PrototypeReducer};
use crate::classifier::distance::{DISTANCE_SENTINEL, DistanceEngine, euclidean};
use crate::classifier::lvq::LvqTrainer;
use crate::classifier::training_data::{group_by_class, read_training_samples};
use crate::classifier::{ShapeRecError, ShapeSample, TrainRequest, TrainSummary, read_header_extras};
use crate::config::{DistanceMetric, PrototypeSelection};
use crate::features::FeatureVector;

impl NnClassifier {
    pub(super) fn run_training(
        &mut self,
        request: &TrainRequest,
    ) -> Result<TrainSummary, ShapeRecError> {
        tracing::info!(
            "Training NN model from {} ({:?}, {:?})",
            request.input.display(),
            request.kind,
            self.settings.prototype_selection
        );
        let extras = read_header_extras(request.header_path.as_deref())?;
        let samples =
            read_training_samples(&request.input, request.kind, &self.pipeline, self.loader.as_ref())?;
        if let Some(limit) = self.project.fixed_shape_count()
            && let Some(sample) = samples.iter().find(|s| s.class_id >= limit)
        {
            return Err(ShapeRecError::ShapeId {
                id: i64::from(sample.class_id),
                reason: "class id exceeds the project's shape count",
            });
        }

        let mut prototypes = Vec::new();
        let groups = group_by_class(samples.clone());
        for (class_id, members) in &groups {
            let count = self.cluster_count(members.len());
            let reduced = self.reduce_class(members, count)?;
            tracing::debug!(
                "Class {class_id}: {} samples reduced to {} prototypes",
                members.len(),
                reduced.len()
            );
            prototypes.extend(reduced);
        }

        let mut iterations = 0;
        if self.settings.prototype_selection == PrototypeSelection::Lvq {
            let mut trainer = LvqTrainer::new(
                self.settings.lvq_iteration_scale,
                self.settings.lvq_initial_alpha,
                self.settings.lvq_distance,
                self.settings.dtw_banding,
                self.settings.random_seed,
            );
            iterations = trainer
                .train(&mut prototypes, &samples, &mut self.engine)?
                .iterations;
        }

        let mut class_counts = BTreeMap::new();
        for sample in &prototypes {
            *class_counts.entry(sample.class_id).or_insert(0) += 1;
        }
        self.metadata = (request.comment.clone(), request.dataset.clone());
        self.write_model_file(&prototypes, class_counts.len(), &extras)?;

        // The freshly written file is the model of record until it is loaded.
        self.prototypes.clear();
        self.class_counts.clear();
        self.pending_mutations = 0;
        self.loaded = false;
        tracing::info!(
            "Training finished: {} prototypes across {} classes",
            prototypes.len(),
            class_counts.len()
        );
        Ok(TrainSummary {
            class_counts,
            iterations,
        })
    }

    /// Prototype count policy for a class of `n` samples.
    fn cluster_count(&self, n: usize) -> ClusterCount {
        if let Some(fixed) = self.settings.prototypes_per_class {
            return ClusterCount::Fixed(fixed.min(n));
        }
        match self.settings.prototype_reduction_factor {
            -1 => ClusterCount::Automatic(self.settings.cluster_stop),
            factor => {
                let keep = n * (100 - factor.clamp(0, 100) as usize) / 100;
                ClusterCount::Fixed(keep.max(1))
            }
        }
    }

    fn reduce_class(
        &mut self,
        members: &[ShapeSample],
        count: ClusterCount,
    ) -> Result<Vec<ShapeSample>, ShapeRecError> {
        let reducer = PrototypeReducer::new(self.settings.linkage);
        let metric = self.settings.prototype_distance;
        let banding = self.settings.dtw_banding;
        let engine = &mut self.engine;
        reducer.reduce(members, count, |a, b| {
            pair_distance(engine, metric, banding, a, b)
        })
    }
}

fn pair_distance(
    engine: &mut DistanceEngine,
    metric: DistanceMetric,
    banding: f32,
    a: &FeatureVector,
    b: &FeatureVector,
) -> Result<f32, ShapeRecError> {
    match metric {
        DistanceMetric::Euclidean => euclidean(a, b),
        DistanceMetric::Dtw => {
            let distance = engine.dtw(a, b, banding, f32::MAX, DISTANCE_SENTINEL);
            if distance >= DISTANCE_SENTINEL {
                return Err(ShapeRecError::InputFormat(
                    "DTW distance undefined for an empty feature vector".to_string(),
                ));
            }
            Ok(distance)
        }
    }
}
