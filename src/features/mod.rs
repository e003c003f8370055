//! Shape features and the feature-extraction collaborator.
//!
//! A feature vector is an ordered sequence of feature elements whose concrete
//! type is chosen by the feature extractor. Elements are shared handles so a
//! prototype set and a transient training pool can refer to the same data.

mod point_float;

use std::fmt;
use std::rc::Rc;

use crate::classifier::ShapeRecError;
use crate::ink::TraceGroup;

pub use point_float::{POINT_FLOAT_DIMENSION, PointFloatExtractor, PointFloatFeature};

/// Separator between the elements of a feature vector in text form.
pub const FEATURE_DELIMITER: char = '|';

/// Shared handle to one feature element.
pub type SharedFeature = Rc<dyn ShapeFeature>;

/// Ordered sequence of feature elements for one shape sample.
pub type FeatureVector = Vec<SharedFeature>;

/// Capabilities every feature element type provides.
///
/// Arithmetic is expressed on the flat value slice; implementors only need to
/// expose their values and rebuild themselves from a new set of values.
pub trait ShapeFeature: fmt::Debug {
    fn values(&self) -> &[f32];

    /// Construct a feature of the same concrete type holding `values`.
    fn rebuild(&self, values: Vec<f32>) -> SharedFeature;

    /// Local distance used by Euclidean and DTW vector distances.
    fn local_distance(&self, other: &dyn ShapeFeature) -> f32 {
        self.values()
            .iter()
            .zip(other.values())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }

    fn dimension(&self) -> usize {
        self.values().len()
    }

    fn subtract(&self, other: &dyn ShapeFeature) -> SharedFeature {
        self.rebuild(
            self.values()
                .iter()
                .zip(other.values())
                .map(|(a, b)| a - b)
                .collect(),
        )
    }

    fn add(&self, other: &dyn ShapeFeature) -> SharedFeature {
        self.rebuild(
            self.values()
                .iter()
                .zip(other.values())
                .map(|(a, b)| a + b)
                .collect(),
        )
    }

    fn scale(&self, alpha: f32) -> SharedFeature {
        self.rebuild(self.values().iter().map(|v| v * alpha).collect())
    }

    fn to_text(&self) -> String {
        self.values()
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Turns preprocessed ink into feature vectors and back.
pub trait FeatureExtractor {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Number of `f32` values in each feature element.
    fn feature_dimension(&self) -> usize;

    /// Build a feature element from stored values.
    fn new_feature(&self, values: &[f32]) -> Result<SharedFeature, ShapeRecError>;

    fn extract_features(&self, ink: &TraceGroup) -> Result<FeatureVector, ShapeRecError>;

    /// Reconstruct strokes from a feature vector, for displaying prototypes.
    fn feature_vector_to_trace_group(
        &self,
        features: &FeatureVector,
    ) -> Result<TraceGroup, ShapeRecError>;
}

/// Render a feature vector as `e1|e2|...`, elements space-separated internally.
pub fn vector_to_text(features: &FeatureVector) -> String {
    features
        .iter()
        .map(|feature| feature.to_text())
        .collect::<Vec<_>>()
        .join(&FEATURE_DELIMITER.to_string())
}

/// Parse the text produced by [`vector_to_text`].
pub fn vector_from_text(
    text: &str,
    extractor: &dyn FeatureExtractor,
) -> Result<FeatureVector, ShapeRecError> {
    let mut out = Vec::new();
    for element in text
        .split(FEATURE_DELIMITER)
        .map(str::trim)
        .filter(|element| !element.is_empty())
    {
        let values = element
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<f32>()
                    .map_err(|_| ShapeRecError::InputFormat(format!("bad feature value {token:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        out.push(extractor.new_feature(&values)?);
    }
    if out.is_empty() {
        return Err(ShapeRecError::InputFormat("empty feature vector".to_string()));
    }
    Ok(out)
}

/// Flatten a feature vector into consecutive `f32` values.
pub fn flatten(features: &FeatureVector) -> Vec<f32> {
    features
        .iter()
        .flat_map(|feature| feature.values().iter().copied())
        .collect()
}

/// Move `code` relative to `sample`: `code + alpha * (code - sample)` per element.
///
/// A negative `alpha` pulls the code vector towards the sample.
pub fn morph(
    code: &FeatureVector,
    sample: &FeatureVector,
    alpha: f32,
) -> Result<FeatureVector, ShapeRecError> {
    if code.len() != sample.len() {
        return Err(ShapeRecError::InputFormat(format!(
            "cannot morph vectors of length {} and {}",
            code.len(),
            sample.len()
        )));
    }
    Ok(code
        .iter()
        .zip(sample)
        .map(|(c, s)| c.add(&*c.subtract(&**s).scale(alpha)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[[f32; 5]]) -> FeatureVector {
        values
            .iter()
            .map(|v| Rc::new(PointFloatFeature::from_values(v)) as SharedFeature)
            .collect()
    }

    #[test]
    fn text_form_round_trips() {
        let features = vector(&[[0.5, 1.0, 0.0, 1.0, 0.0], [1.5, -2.0, 1.0, 0.0, 1.0]]);
        let text = vector_to_text(&features);
        assert_eq!(text, "0.5 1 0 1 0|1.5 -2 1 0 1");
        let parsed = vector_from_text(&text, &PointFloatExtractor::default()).unwrap();
        assert_eq!(flatten(&parsed), flatten(&features));
    }

    #[test]
    fn malformed_text_is_an_input_error() {
        let err = vector_from_text("1 2 x 4 5", &PointFloatExtractor::default()).unwrap_err();
        assert!(matches!(err, ShapeRecError::InputFormat(_)));
        let err = vector_from_text("1 2 3", &PointFloatExtractor::default()).unwrap_err();
        assert!(matches!(err, ShapeRecError::InputFormat(_)));
    }

    #[test]
    fn morph_with_negative_alpha_moves_towards_sample() {
        let code = vector(&[[1.0, 1.0, 0.0, 0.0, 0.0]]);
        let sample = vector(&[[0.0, 0.0, 0.0, 0.0, 0.0]]);
        let moved = morph(&code, &sample, -0.5).unwrap();
        assert_eq!(&flatten(&moved)[..2], &[0.5, 0.5]);
        let pushed = morph(&code, &sample, 0.5).unwrap();
        assert_eq!(&flatten(&pushed)[..2], &[1.5, 1.5]);
    }
}
