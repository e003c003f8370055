//! Stroke preprocessing collaborator.

mod basic;

use crate::classifier::ShapeRecError;
use crate::ink::{DeviceContext, TraceGroup};

pub use basic::BasicPreprocessor;

/// Preprocessor parameters recorded in model headers.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocThresholds {
    pub preserve_aspect_ratio: bool,
    pub preserve_relative_y_position: bool,
    pub aspect_ratio_threshold: f32,
    pub size_threshold: f32,
    pub dot_threshold: f32,
    pub smoothing_window: usize,
    pub resampling_allocation: String,
}

/// Applies named transform steps to ink.
pub trait Preprocessor {
    /// Apply one step of the preprocessing sequence.
    fn apply_named_step(&self, name: &str, ink: &TraceGroup) -> Result<TraceGroup, ShapeRecError>;

    /// Number of points produced by resampling.
    fn trace_dimension(&self) -> usize;

    fn thresholds(&self) -> PreprocThresholds;

    fn set_device_context(&mut self, _context: &DeviceContext) {}
}

/// Strip an optional `Module::` prefix from a step name.
pub fn step_name(qualified: &str) -> &str {
    qualified
        .rsplit_once("::")
        .map(|(_, name)| name)
        .unwrap_or(qualified)
        .trim()
}
