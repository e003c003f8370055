use super::{PreprocThresholds, Preprocessor, step_name};
use crate::classifier::ShapeRecError;
use crate::config::{ConfigError, PipelineSettings, ResamplingAllocation};
use crate::ink::{DeviceContext, Point, Trace, TraceGroup};

/// Built-in preprocessing steps: size normalization, resampling, smoothing and
/// duplicate removal.
#[derive(Debug, Clone)]
pub struct BasicPreprocessor {
    trace_dimension: usize,
    preserve_aspect_ratio: bool,
    preserve_relative_y_position: bool,
    aspect_ratio_threshold: f32,
    size_threshold: f32,
    dot_threshold: f32,
    smoothing_window: usize,
    allocation: ResamplingAllocation,
    device: DeviceContext,
}

impl BasicPreprocessor {
    pub fn new(settings: &PipelineSettings) -> Self {
        Self {
            trace_dimension: settings.trace_dimension,
            preserve_aspect_ratio: settings.preserve_aspect_ratio,
            preserve_relative_y_position: settings.preserve_relative_y_position,
            aspect_ratio_threshold: settings.aspect_ratio_threshold,
            size_threshold: settings.size_threshold,
            dot_threshold: settings.dot_threshold,
            smoothing_window: settings.smoothing_window,
            allocation: settings.resampling_allocation,
            device: DeviceContext::default(),
        }
    }

    pub fn device_context(&self) -> &DeviceContext {
        &self.device
    }

    fn normalize_size(&self, ink: &TraceGroup) -> TraceGroup {
        let Some(bounds) = ink.bounding_box() else {
            return ink.clone();
        };
        let width = bounds.width();
        let height = bounds.height();
        if width < self.dot_threshold && height < self.dot_threshold {
            // Dots are only moved to the origin.
            return map_points(ink, |p| Point::new(p.x - bounds.min_x, p.y - bounds.min_y));
        }
        let larger = width.max(height);
        let smaller = width.min(height).max(self.size_threshold);
        let (sx, sy) = if self.preserve_aspect_ratio || larger / smaller > self.aspect_ratio_threshold
        {
            (larger, larger)
        } else {
            (width.max(self.size_threshold), height.max(self.size_threshold))
        };
        let y_origin = if self.preserve_relative_y_position {
            0.0
        } else {
            bounds.min_y
        };
        map_points(ink, |p| {
            Point::new((p.x - bounds.min_x) / sx, (p.y - y_origin) / sy)
        })
    }

    fn resample(&self, ink: &TraceGroup) -> TraceGroup {
        let traces: Vec<&Trace> = ink.traces.iter().filter(|t| !t.is_empty()).collect();
        if traces.is_empty() {
            return TraceGroup::default();
        }
        let counts = match self.allocation {
            ResamplingAllocation::LengthBased => {
                allocate_by_length(&traces, self.trace_dimension)
            }
            ResamplingAllocation::PointBased => allocate_evenly(traces.len(), self.trace_dimension),
        };
        TraceGroup::new(
            traces
                .iter()
                .zip(counts)
                .map(|(trace, count)| resample_trace(trace, count))
                .collect(),
        )
    }

    fn smoothen(&self, ink: &TraceGroup) -> TraceGroup {
        let half = self.smoothing_window / 2;
        TraceGroup::new(
            ink.traces
                .iter()
                .map(|trace| {
                    let points = &trace.points;
                    let smoothed = (0..points.len())
                        .map(|idx| {
                            let start = idx.saturating_sub(half);
                            let end = (idx + half + 1).min(points.len());
                            let window = &points[start..end];
                            let n = window.len() as f32;
                            Point::new(
                                window.iter().map(|p| p.x).sum::<f32>() / n,
                                window.iter().map(|p| p.y).sum::<f32>() / n,
                            )
                        })
                        .collect();
                    Trace::new(smoothed)
                })
                .collect(),
        )
    }

    fn remove_duplicate_points(&self, ink: &TraceGroup) -> TraceGroup {
        TraceGroup::new(
            ink.traces
                .iter()
                .map(|trace| {
                    let mut points = trace.points.clone();
                    points.dedup();
                    Trace::new(points)
                })
                .collect(),
        )
    }
}

impl Preprocessor for BasicPreprocessor {
    fn apply_named_step(&self, name: &str, ink: &TraceGroup) -> Result<TraceGroup, ShapeRecError> {
        match step_name(name) {
            "normalizeSize" => Ok(self.normalize_size(ink)),
            "resampleTraceGroup" => Ok(self.resample(ink)),
            "smoothenTraceGroup" => Ok(self.smoothen(ink)),
            "removeDuplicatePoints" => Ok(self.remove_duplicate_points(ink)),
            other => Err(ConfigError::invalid(
                "preprocessing_sequence",
                format!("unknown preprocessing step {other:?}"),
            )
            .into()),
        }
    }

    fn trace_dimension(&self) -> usize {
        self.trace_dimension
    }

    fn thresholds(&self) -> PreprocThresholds {
        PreprocThresholds {
            preserve_aspect_ratio: self.preserve_aspect_ratio,
            preserve_relative_y_position: self.preserve_relative_y_position,
            aspect_ratio_threshold: self.aspect_ratio_threshold,
            size_threshold: self.size_threshold,
            dot_threshold: self.dot_threshold,
            smoothing_window: self.smoothing_window,
            resampling_allocation: self.allocation.as_str().to_string(),
        }
    }

    fn set_device_context(&mut self, context: &DeviceContext) {
        self.device = *context;
    }
}

fn map_points(ink: &TraceGroup, f: impl Fn(&Point) -> Point) -> TraceGroup {
    TraceGroup::new(
        ink.traces
            .iter()
            .map(|trace| Trace::new(trace.points.iter().map(&f).collect()))
            .collect(),
    )
}

/// Every stroke gets at least one point; the total is exact whenever there
/// are no more strokes than points.
fn allocate_by_length(traces: &[&Trace], total: usize) -> Vec<usize> {
    let lengths: Vec<f32> = traces.iter().map(|trace| trace.length()).collect();
    let total_length: f32 = lengths.iter().sum();
    if total_length <= f32::EPSILON {
        return allocate_evenly(traces.len(), total);
    }
    let mut counts: Vec<usize> = lengths
        .iter()
        .map(|len| ((len / total_length) * total as f32).round().max(1.0) as usize)
        .collect();
    let longest = lengths
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    let mut assigned: usize = counts.iter().sum();
    while assigned < total {
        counts[longest] += 1;
        assigned += 1;
    }
    while assigned > total {
        // Take from the largest allocation that can spare a point.
        let Some((idx, _)) = counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 1)
            .max_by_key(|(_, count)| **count)
        else {
            break;
        };
        counts[idx] -= 1;
        assigned -= 1;
    }
    counts
}

fn allocate_evenly(traces: usize, total: usize) -> Vec<usize> {
    let base = total / traces;
    let remainder = total % traces;
    (0..traces)
        .map(|idx| (base + usize::from(idx < remainder)).max(1))
        .collect()
}

/// Equidistant resampling along the arc length.
fn resample_trace(trace: &Trace, count: usize) -> Trace {
    let points = &trace.points;
    let length = trace.length();
    if count <= 1 || points.len() == 1 || length <= f32::EPSILON {
        return Trace::new(vec![points[0]; count.max(1)]);
    }
    let step = length / (count - 1) as f32;
    let mut out = Vec::with_capacity(count);
    out.push(points[0]);
    let mut travelled = 0.0f32;
    let mut target = step;
    for pair in points.windows(2) {
        let segment = pair[0].distance(&pair[1]);
        while segment > 0.0 && travelled + segment >= target && out.len() < count - 1 {
            let t = (target - travelled) / segment;
            out.push(Point::new(
                pair[0].x + t * (pair[1].x - pair[0].x),
                pair[0].y + t * (pair[1].y - pair[0].y),
            ));
            target += step;
        }
        travelled += segment;
    }
    while out.len() < count {
        out.push(points[points.len() - 1]);
    }
    Trace::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preprocessor(trace_dimension: usize) -> BasicPreprocessor {
        BasicPreprocessor::new(&PipelineSettings {
            trace_dimension,
            ..PipelineSettings::default()
        })
    }

    #[test]
    fn resampling_hits_the_trace_dimension() {
        let ink = TraceGroup::new(vec![
            Trace::from_xy(&[(0.0, 0.0), (10.0, 0.0)]),
            Trace::from_xy(&[(0.0, 5.0), (0.0, 7.5)]),
        ]);
        let out = preprocessor(10)
            .apply_named_step("CommonPreProc::resampleTraceGroup", &ink)
            .unwrap();
        assert_eq!(out.point_count(), 10);
        assert_eq!(out.traces[0].len(), 8);
        assert_eq!(out.traces[0].points[7], Point::new(10.0, 0.0));
    }

    #[test]
    fn resampled_points_are_equidistant() {
        let ink = TraceGroup::new(vec![Trace::from_xy(&[(0.0, 0.0), (3.0, 0.0), (3.0, 3.0)])]);
        let out = preprocessor(7).apply_named_step("resampleTraceGroup", &ink).unwrap();
        let points = &out.traces[0].points;
        for pair in points.windows(2) {
            assert!((pair[0].distance(&pair[1]) - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn normalize_size_fits_unit_box() {
        let ink = TraceGroup::new(vec![Trace::from_xy(&[(10.0, 10.0), (30.0, 20.0)])]);
        let out = preprocessor(4).apply_named_step("normalizeSize", &ink).unwrap();
        let bounds = out.bounding_box().unwrap();
        assert!((bounds.width() - 1.0).abs() < 1e-6);
        assert!((bounds.height() - 0.5).abs() < 1e-6);
        assert_eq!(bounds.min_x, 0.0);
    }

    #[test]
    fn unknown_step_is_a_config_error() {
        let err = preprocessor(4)
            .apply_named_step("dehook", &TraceGroup::default())
            .unwrap_err();
        assert!(matches!(err, ShapeRecError::Config(_)));
    }

    #[test]
    fn smoothing_keeps_point_count() {
        let ink = TraceGroup::new(vec![Trace::from_xy(&[(0.0, 0.0), (1.0, 3.0), (2.0, 0.0)])]);
        let out = preprocessor(3).apply_named_step("smoothenTraceGroup", &ink).unwrap();
        assert_eq!(out.traces[0].len(), 3);
        assert!((out.traces[0].points[1].y - 1.0).abs() < 1e-6);
    }
}
