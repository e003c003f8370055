//! Learning vector quantization refinement of a prototype codebook.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::distance::{DISTANCE_SENTINEL, DistanceEngine, euclidean};
use super::{ShapeRecError, ShapeSample};
use crate::config::DistanceMetric;
use crate::features::morph;

/// Counts reported after an LVQ run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LvqSummary {
    pub iterations: usize,
    pub attractions: usize,
    pub repulsions: usize,
    /// Draws whose nearest codevector could not be morphed (length mismatch).
    pub skipped: usize,
}

/// Optimized-learning-rate LVQ (one learning rate per codevector).
#[derive(Debug)]
pub struct LvqTrainer {
    iteration_scale: usize,
    initial_alpha: f32,
    metric: DistanceMetric,
    banding: f32,
    rng: StdRng,
}

impl LvqTrainer {
    pub fn new(
        iteration_scale: usize,
        initial_alpha: f32,
        metric: DistanceMetric,
        banding: f32,
        seed: u64,
    ) -> Self {
        Self {
            iteration_scale,
            initial_alpha,
            metric,
            banding,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Refine `codebook` in place against randomly drawn members of `pool`.
    pub fn train(
        &mut self,
        codebook: &mut [ShapeSample],
        pool: &[ShapeSample],
        engine: &mut DistanceEngine,
    ) -> Result<LvqSummary, ShapeRecError> {
        if codebook.is_empty() {
            return Err(ShapeRecError::EmptyInput("LVQ needs an initial codebook".to_string()));
        }
        if pool.is_empty() {
            return Err(ShapeRecError::EmptyInput("LVQ needs training samples".to_string()));
        }
        let length = codebook.len() * self.iteration_scale;
        let mut alphas = vec![self.initial_alpha; codebook.len()];
        let mut summary = LvqSummary {
            iterations: length,
            ..LvqSummary::default()
        };
        for _ in 0..length {
            let sample = &pool[self.rng.random_range(0..pool.len())];
            let Some(winner) = self.nearest(codebook, sample, engine)? else {
                summary.skipped += 1;
                continue;
            };
            let agrees = codebook[winner].class_id == sample.class_id;
            let alpha = alphas[winner];
            // Negative factors pull the codevector towards the sample.
            let factor = if agrees { -alpha } else { alpha };
            match morph(&codebook[winner].features, &sample.features, factor) {
                Ok(moved) => codebook[winner].features = moved,
                Err(err) => {
                    tracing::debug!("Skipping LVQ update: {err}");
                    summary.skipped += 1;
                    continue;
                }
            }
            let s = if agrees { 1.0 } else { -1.0 };
            alphas[winner] = (alpha / (1.0 + s * alpha)).min(self.initial_alpha);
            if agrees {
                summary.attractions += 1;
            } else {
                summary.repulsions += 1;
            }
        }
        tracing::debug!(
            "LVQ ran {} iterations: {} attractions, {} repulsions, {} skipped",
            summary.iterations,
            summary.attractions,
            summary.repulsions,
            summary.skipped
        );
        Ok(summary)
    }

    fn nearest(
        &self,
        codebook: &[ShapeSample],
        sample: &ShapeSample,
        engine: &mut DistanceEngine,
    ) -> Result<Option<usize>, ShapeRecError> {
        let mut best: Option<(usize, f32)> = None;
        for (idx, code) in codebook.iter().enumerate() {
            let bound = best.map_or(f32::MAX, |(_, d)| d);
            let distance = match self.metric {
                DistanceMetric::Euclidean => {
                    if code.features.len() != sample.features.len() {
                        continue;
                    }
                    euclidean(&code.features, &sample.features)?
                }
                DistanceMetric::Dtw => engine.dtw(
                    &code.features,
                    &sample.features,
                    self.banding,
                    bound,
                    DISTANCE_SENTINEL,
                ),
            };
            if distance < DISTANCE_SENTINEL && distance < bound {
                best = Some((idx, distance));
            }
        }
        Ok(best.map(|(idx, _)| idx))
    }
}
