use std::rc::Rc;

use super::{FeatureExtractor, FeatureVector, ShapeFeature, SharedFeature};
use crate::classifier::ShapeRecError;
use crate::ink::{Point, Trace, TraceGroup};

/// Values per point-float element: x, y, sin θ, cos θ, pen-up.
pub const POINT_FLOAT_DIMENSION: usize = 5;

const EXTRACTOR_NAME: &str = "PointFloatShapeFeatureExtractor";
const EXTRACTOR_VERSION: &str = "1.0.0";

/// One resampled point with its writing direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointFloatFeature {
    values: [f32; POINT_FLOAT_DIMENSION],
}

impl PointFloatFeature {
    pub fn new(x: f32, y: f32, sin_theta: f32, cos_theta: f32, pen_up: bool) -> Self {
        Self {
            values: [x, y, sin_theta, cos_theta, if pen_up { 1.0 } else { 0.0 }],
        }
    }

    /// Missing trailing values are zero, extra values are ignored.
    pub fn from_values(values: &[f32]) -> Self {
        let mut out = [0.0; POINT_FLOAT_DIMENSION];
        for (slot, value) in out.iter_mut().zip(values) {
            *slot = *value;
        }
        Self { values: out }
    }

    pub fn x(&self) -> f32 {
        self.values[0]
    }

    pub fn y(&self) -> f32 {
        self.values[1]
    }

    pub fn pen_up(&self) -> bool {
        self.values[4] > 0.5
    }
}

impl ShapeFeature for PointFloatFeature {
    fn values(&self) -> &[f32] {
        &self.values
    }

    fn rebuild(&self, values: Vec<f32>) -> SharedFeature {
        Rc::new(Self::from_values(&values))
    }

    // Pen-up is a stroke marker, not geometry.
    fn local_distance(&self, other: &dyn ShapeFeature) -> f32 {
        self.values[..4]
            .iter()
            .zip(other.values())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }
}

/// Extracts one [`PointFloatFeature`] per preprocessed point.
///
/// The writing direction at a point is measured towards the point
/// `direction_step` positions ahead, or the stroke's last point when closer.
#[derive(Debug, Clone)]
pub struct PointFloatExtractor {
    direction_step: usize,
}

impl PointFloatExtractor {
    pub fn new(direction_step: usize) -> Self {
        Self {
            direction_step: direction_step.max(1),
        }
    }

    pub fn direction_step(&self) -> usize {
        self.direction_step
    }
}

impl Default for PointFloatExtractor {
    fn default() -> Self {
        Self::new(1)
    }
}

impl FeatureExtractor for PointFloatExtractor {
    fn name(&self) -> &str {
        EXTRACTOR_NAME
    }

    fn version(&self) -> &str {
        EXTRACTOR_VERSION
    }

    fn feature_dimension(&self) -> usize {
        POINT_FLOAT_DIMENSION
    }

    fn new_feature(&self, values: &[f32]) -> Result<SharedFeature, ShapeRecError> {
        if values.len() != POINT_FLOAT_DIMENSION {
            return Err(ShapeRecError::InputFormat(format!(
                "point-float feature needs {POINT_FLOAT_DIMENSION} values, got {}",
                values.len()
            )));
        }
        Ok(Rc::new(PointFloatFeature::from_values(values)))
    }

    fn extract_features(&self, ink: &TraceGroup) -> Result<FeatureVector, ShapeRecError> {
        if ink.is_empty() {
            return Err(ShapeRecError::EmptyInput("trace group has no points".to_string()));
        }
        let mut out = Vec::with_capacity(ink.point_count());
        for trace in ink.traces.iter().filter(|trace| !trace.is_empty()) {
            let points = &trace.points;
            let mut direction = (0.0, 1.0);
            let last = points.len() - 1;
            for (idx, point) in points.iter().enumerate() {
                if idx < last {
                    let next = &points[(idx + self.direction_step).min(last)];
                    direction = unit_direction(point, next).unwrap_or(direction);
                }
                let pen_up = idx + 1 == points.len();
                out.push(Rc::new(PointFloatFeature::new(
                    point.x,
                    point.y,
                    direction.0,
                    direction.1,
                    pen_up,
                )) as SharedFeature);
            }
        }
        Ok(out)
    }

    fn feature_vector_to_trace_group(
        &self,
        features: &FeatureVector,
    ) -> Result<TraceGroup, ShapeRecError> {
        let mut traces = Vec::new();
        let mut current = Vec::new();
        for feature in features {
            let values = feature.values();
            if values.len() != POINT_FLOAT_DIMENSION {
                return Err(ShapeRecError::InputFormat(format!(
                    "expected point-float features, got dimension {}",
                    values.len()
                )));
            }
            current.push(Point::new(values[0], values[1]));
            if values[4] > 0.5 {
                traces.push(Trace::new(std::mem::take(&mut current)));
            }
        }
        if !current.is_empty() {
            traces.push(Trace::new(current));
        }
        Ok(TraceGroup::new(traces))
    }
}

/// `(sin θ, cos θ)` of the segment `from -> to`, `None` for a zero-length segment.
fn unit_direction(from: &Point, to: &Point) -> Option<(f32, f32)> {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len <= f32::EPSILON {
        None
    } else {
        Some((dy / len, dx / len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flatten;

    #[test]
    fn extraction_marks_stroke_ends_and_directions() {
        let ink = TraceGroup::new(vec![
            Trace::from_xy(&[(0.0, 0.0), (1.0, 0.0)]),
            Trace::from_xy(&[(0.0, 0.0), (0.0, 2.0)]),
        ]);
        let features = PointFloatExtractor::default().extract_features(&ink).unwrap();
        assert_eq!(features.len(), 4);
        let flat = flatten(&features);
        assert_eq!(&flat[0..5], &[0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(&flat[5..10], &[1.0, 0.0, 0.0, 1.0, 1.0]);
        assert_eq!(&flat[10..15], &[0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn reconstruction_splits_on_pen_up() {
        let ink = TraceGroup::new(vec![
            Trace::from_xy(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]),
            Trace::from_xy(&[(5.0, 5.0), (5.0, 6.0)]),
        ]);
        let features = PointFloatExtractor::default().extract_features(&ink).unwrap();
        let rebuilt = PointFloatExtractor::default()
            .feature_vector_to_trace_group(&features)
            .unwrap();
        assert_eq!(rebuilt, ink);
    }

    #[test]
    fn pen_up_is_ignored_by_local_distance() {
        let a = PointFloatFeature::new(0.0, 0.0, 0.0, 1.0, true);
        let b = PointFloatFeature::new(3.0, 4.0, 0.0, 1.0, false);
        assert_eq!(a.local_distance(&b), 25.0);
    }

    #[test]
    fn empty_ink_is_rejected() {
        let err = PointFloatExtractor::default()
            .extract_features(&TraceGroup::default())
            .unwrap_err();
        assert!(matches!(err, ShapeRecError::EmptyInput(_)));
    }

    #[test]
    fn direction_step_looks_further_ahead() {
        let ink = TraceGroup::new(vec![Trace::from_xy(&[
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (1.0, 2.0),
        ])]);
        let near = flatten(&PointFloatExtractor::default().extract_features(&ink).unwrap());
        assert_eq!(&near[2..4], &[0.0, 1.0]);
        let far = flatten(&PointFloatExtractor::new(2).extract_features(&ink).unwrap());
        let diagonal = 1.0 / 2f32.sqrt();
        assert!((far[2] - diagonal).abs() < 1e-6 && (far[3] - diagonal).abs() < 1e-6);
        // Clamped to the stroke's last point near the end.
        assert_eq!(&far[12..14], &[1.0, 0.0]);
        assert_eq!(PointFloatExtractor::new(0).direction_step(), 1);
    }
}
