//! Distance-to-confidence conversion for nearest-neighbor results.

use std::collections::BTreeMap;

use super::RecognitionResult;

/// Offset keeping similarities finite for zero distances.
pub const SIMILARITY_EPSILON: f32 = 1e-5;

/// Lower bound on the per-class neighbor count in adaptive mode.
pub const MIN_NEAREST_NEIGHBORS: usize = 2;

pub fn similarity(distance: f32) -> f32 {
    1.0 / (distance + SIMILARITY_EPSILON)
}

/// Turns ascending `(class_id, distance)` neighbor lists into sorted confidences.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceScorer {
    nearest_neighbors: usize,
    adaptive: bool,
}

impl ConfidenceScorer {
    pub fn new(nearest_neighbors: usize, adaptive: bool) -> Self {
        Self {
            nearest_neighbors: nearest_neighbors.max(1),
            adaptive,
        }
    }

    /// Score `neighbors`, which must be sorted by ascending distance.
    ///
    /// `class_counts` supplies prototype counts for the adaptive neighbor
    /// count and is ignored otherwise.
    pub fn score(
        &self,
        neighbors: &[(u32, f32)],
        class_counts: &BTreeMap<u32, usize>,
    ) -> Vec<RecognitionResult> {
        if neighbors.is_empty() {
            return Vec::new();
        }
        let mut results = if self.nearest_neighbors == 1 && !self.adaptive {
            Self::nearest_only(neighbors)
        } else {
            self.k_nearest(neighbors, class_counts)
        };
        results.retain(|result| result.confidence > 0.0);
        results.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        results
    }

    fn nearest_only(neighbors: &[(u32, f32)]) -> Vec<RecognitionResult> {
        let mut firsts: Vec<(u32, f32)> = Vec::new();
        for &(class_id, distance) in neighbors {
            if !firsts.iter().any(|(seen, _)| *seen == class_id) {
                firsts.push((class_id, similarity(distance)));
            }
        }
        let total: f32 = firsts.iter().map(|(_, s)| s).sum();
        firsts
            .into_iter()
            .map(|(class_id, s)| RecognitionResult {
                class_id,
                confidence: s / total,
            })
            .collect()
    }

    fn k_nearest(
        &self,
        neighbors: &[(u32, f32)],
        class_counts: &BTreeMap<u32, usize>,
    ) -> Vec<RecognitionResult> {
        let k = self.nearest_neighbors.min(neighbors.len());
        let top = &neighbors[..k];
        let cumulative: Vec<f32> = top
            .iter()
            .scan(0.0f32, |acc, &(_, distance)| {
                *acc += similarity(distance);
                Some(*acc)
            })
            .collect();
        let max_count = class_counts.values().copied().max().unwrap_or(1).max(1);

        let mut classes: Vec<u32> = Vec::new();
        for &(class_id, _) in top {
            if !classes.contains(&class_id) {
                classes.push(class_id);
            }
        }
        classes
            .into_iter()
            .map(|class_id| {
                let effective = if self.adaptive {
                    let count = class_counts.get(&class_id).copied().unwrap_or(1);
                    let scaled = (k * count).div_ceil(max_count);
                    MIN_NEAREST_NEIGHBORS.max(scaled.min(count)).min(k)
                } else {
                    k
                };
                let own: f32 = top[..effective]
                    .iter()
                    .filter(|(id, _)| *id == class_id)
                    .map(|&(_, distance)| similarity(distance))
                    .sum();
                RecognitionResult {
                    class_id,
                    confidence: own / cumulative[effective - 1],
                }
            })
            .collect()
    }
}
