//! Ink containers and the ink-file collaborator.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classifier::ShapeRecError;

/// A single pen sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One pen-down to pen-up stroke.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub points: Vec<Point>,
}

impl Trace {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn from_xy(points: &[(f32, f32)]) -> Self {
        Self::new(points.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Arc length of the polyline.
    pub fn length(&self) -> f32 {
        self.points
            .windows(2)
            .map(|pair| pair[0].distance(&pair[1]))
            .sum()
    }
}

/// Axis-aligned bounds of some ink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}

/// The strokes that make up one shape sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceGroup {
    pub traces: Vec<Trace>,
}

impl TraceGroup {
    pub fn new(traces: Vec<Trace>) -> Self {
        Self { traces }
    }

    pub fn point_count(&self) -> usize {
        self.traces.iter().map(Trace::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.point_count() == 0
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let mut points = self.traces.iter().flat_map(|trace| trace.points.iter());
        let first = points.next()?;
        let mut bounds = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for point in points {
            bounds.min_x = bounds.min_x.min(point.x);
            bounds.min_y = bounds.min_y.min(point.y);
            bounds.max_x = bounds.max_x.max(point.x);
            bounds.max_y = bounds.max_y.max(point.y);
        }
        Some(bounds)
    }
}

/// Capture device properties forwarded to the preprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceContext {
    pub sampling_rate: f32,
    pub x_dpi: f32,
    pub y_dpi: f32,
    pub latency: f32,
    pub uniform_sampling: bool,
}

impl Default for DeviceContext {
    fn default() -> Self {
        Self {
            sampling_rate: 100.0,
            x_dpi: 2000.0,
            y_dpi: 2000.0,
            latency: 0.0,
            uniform_sampling: true,
        }
    }
}

/// Reads one shape sample from an ink file.
pub trait InkLoader {
    fn load(&self, path: &Path) -> Result<TraceGroup, ShapeRecError>;
}

/// Ink files stored as JSON-serialized [`TraceGroup`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonInkLoader;

impl InkLoader for JsonInkLoader {
    fn load(&self, path: &Path) -> Result<TraceGroup, ShapeRecError> {
        let bytes = std::fs::read(path).map_err(|source| ShapeRecError::io(path, source))?;
        serde_json::from_slice(&bytes).map_err(|err| {
            ShapeRecError::Resource(format!("Failed to decode ink {}: {err}", path.display()))
        })
    }
}

/// Write a trace group in the format [`JsonInkLoader`] reads.
pub fn save_json_ink(path: &Path, ink: &TraceGroup) -> Result<(), ShapeRecError> {
    let data = serde_json::to_vec(ink)
        .map_err(|err| ShapeRecError::Resource(format!("Failed to encode ink: {err}")))?;
    std::fs::write(path, data).map_err(|source| ShapeRecError::io(path, source))
}
