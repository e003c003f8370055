use super::NnClassifier;
use crate::classifier::{RecognitionQuery, RecognitionResult, ShapeRecError, ShapeRecognizer};
use crate::features::{FeatureVector, flatten};
use crate::ink::TraceGroup;

/// Remembers the latest recognition so a later correction can adapt the model.
#[derive(Debug, Default)]
pub struct Adapter {
    min_samples_per_class: usize,
    last: Option<(Vec<f32>, Vec<RecognitionResult>)>,
}

impl Adapter {
    pub fn new(min_samples_per_class: usize) -> Self {
        Self {
            min_samples_per_class,
            last: None,
        }
    }

    pub fn remember(&mut self, features: &FeatureVector, results: &[RecognitionResult]) {
        self.last = Some((flatten(features), results.to_vec()));
    }

    pub fn clear(&mut self) {
        self.last = None;
    }

    /// Results of the last recognition if it was for `features`.
    pub fn results_for(&self, features: &FeatureVector) -> Option<&[RecognitionResult]> {
        let (values, results) = self.last.as_ref()?;
        (*values == flatten(features)).then_some(results.as_slice())
    }

    /// A sample is kept when it was misrecognized or its class is still small.
    pub fn should_add(
        &self,
        results: &[RecognitionResult],
        true_class: u32,
        class_size: usize,
    ) -> bool {
        let top = results.first().map(|result| result.class_id);
        top != Some(true_class) || class_size < self.min_samples_per_class
    }
}

impl NnClassifier {
    /// Adapt the model to `ink` labeled `true_class`; returns whether a prototype was added.
    pub fn adapt(&mut self, ink: &TraceGroup, true_class: u32) -> Result<bool, ShapeRecError> {
        let features = self.pipeline.extract(ink)?;
        self.adapt_features(&features, true_class)
    }

    /// Reuses the last recognition when it was for the same features.
    pub fn adapt_features(
        &mut self,
        features: &FeatureVector,
        true_class: u32,
    ) -> Result<bool, ShapeRecError> {
        self.ensure_loaded()?;
        self.check_features(features)?;
        let class_size = *self.class_counts.get(&true_class).ok_or(ShapeRecError::ShapeId {
            id: i64::from(true_class),
            reason: "adaptation target is not in the model",
        })?;
        let results = match self.adapter.results_for(features) {
            Some(results) => results.to_vec(),
            None => self.recognize_features(features, &RecognitionQuery::default())?,
        };
        if !self.adapter.should_add(&results, true_class, class_size) {
            return Ok(false);
        }
        self.insert_prototype(true_class, features.clone());
        self.adapter.clear();
        tracing::debug!("Adapted class {true_class} with a new prototype");
        self.register_mutation()?;
        Ok(true)
    }
}
