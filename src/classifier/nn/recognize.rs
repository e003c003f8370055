use std::collections::BTreeMap;

use super::NnClassifier;
use crate::classifier::confidence::{ConfidenceScorer, similarity};
use crate::classifier::distance::{DISTANCE_SENTINEL, euclidean};
use crate::classifier::{
    RecognitionQuery, RecognitionResult, ShapeRecError, finish_results, resolve_query_limits,
};
use crate::config::DistanceMetric;
use crate::features::FeatureVector;

impl NnClassifier {
    /// Rank classes for `features`; empty when rejected or cancelled.
    pub(super) fn rank(
        &mut self,
        features: &FeatureVector,
        query: &RecognitionQuery,
    ) -> Result<Vec<RecognitionResult>, ShapeRecError> {
        self.ensure_loaded()?;
        let limit = resolve_query_limits(query, self.class_counts.len())?;
        if self.prototypes.is_empty() {
            return Err(ShapeRecError::EmptyInput("the model has no prototypes".to_string()));
        }
        let mut candidates = self.candidates(query.class_subset.as_deref())?;
        let k = self.settings.nearest_neighbors;

        if self.settings.prototype_distance == DistanceMetric::Dtw
            && let Some(percent) = self.settings.dtw_euclidean_filter
        {
            let Some(filtered) = self.euclidean_filter(features, &candidates, percent, k)? else {
                return Ok(Vec::new());
            };
            candidates = filtered;
        }

        let Some(neighbors) = self.neighbor_distances(features, &candidates)? else {
            return Ok(Vec::new());
        };
        let Some(&(_, nearest)) = neighbors.first() else {
            return Ok(Vec::new());
        };
        if similarity(nearest) <= self.settings.reject_threshold {
            tracing::debug!(
                "Rejected sample: nearest distance {nearest} is below the reject threshold"
            );
            return Ok(Vec::new());
        }

        let counts: BTreeMap<u32, usize> = match &query.class_subset {
            Some(subset) => self
                .class_counts
                .iter()
                .filter(|(id, _)| subset.contains(id))
                .map(|(id, n)| (*id, *n))
                .collect(),
            None => self.class_counts.clone(),
        };
        let scored = ConfidenceScorer::new(k, self.settings.adaptive_knn).score(&neighbors, &counts);
        Ok(finish_results(scored, query.conf_threshold, limit))
    }

    /// Prototype indices of the requested classes, or all of them.
    fn candidates(&self, subset: Option<&[u32]>) -> Result<Vec<usize>, ShapeRecError> {
        let Some(subset) = subset else {
            return Ok((0..self.prototypes.len()).collect());
        };
        let mut out = Vec::new();
        for class_id in subset {
            let range = self.class_range(*class_id).ok_or(ShapeRecError::ShapeId {
                id: i64::from(*class_id),
                reason: "class subset names a class that is not in the model",
            })?;
            out.extend(range);
        }
        out.sort_unstable();
        out.dedup();
        Ok(out)
    }

    /// Take the cancellation request, clearing it.
    fn cancelled(&self) -> bool {
        if self.cancel.is_cancelled() {
            self.cancel.reset();
            tracing::debug!("Recognition cancelled");
            true
        } else {
            false
        }
    }

    /// Keep the `percent` Euclidean-closest candidates. `None` when cancelled.
    fn euclidean_filter(
        &self,
        features: &FeatureVector,
        candidates: &[usize],
        percent: u32,
        k: usize,
    ) -> Result<Option<Vec<usize>>, ShapeRecError> {
        let keep = (candidates.len() * percent as usize).div_ceil(100);
        if keep < k.min(candidates.len()) {
            return Err(ShapeRecError::InvalidArgument(format!(
                "Euclidean filter keeps {keep} of {} prototypes, fewer than the {k} neighbors requested",
                candidates.len()
            )));
        }
        let mut scored = Vec::with_capacity(candidates.len());
        for &idx in candidates {
            if self.cancelled() {
                return Ok(None);
            }
            scored.push((idx, euclidean(features, &self.prototypes[idx].features)?));
        }
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        let mut kept: Vec<usize> = scored.into_iter().take(keep).map(|(idx, _)| idx).collect();
        kept.sort_unstable();
        Ok(Some(kept))
    }

    /// Ascending `(class_id, distance)` pairs. `None` when cancelled.
    ///
    /// DTW computations are pruned against the distance that could still
    /// change the outcome: the class's own best in 1-NN mode, the k-th best
    /// overall otherwise.
    fn neighbor_distances(
        &mut self,
        features: &FeatureVector,
        candidates: &[usize],
    ) -> Result<Option<Vec<(u32, f32)>>, ShapeRecError> {
        let k = self.settings.nearest_neighbors;
        let per_class = k == 1 && !self.settings.adaptive_knn;
        let banding = self.settings.dtw_banding;
        let mut class_best: BTreeMap<u32, f32> = BTreeMap::new();
        let mut top_k: Vec<f32> = Vec::with_capacity(k + 1);
        let mut neighbors = Vec::with_capacity(candidates.len());
        for &idx in candidates {
            if self.cancelled() {
                return Ok(None);
            }
            let prototype = &self.prototypes[idx];
            let distance = match self.settings.prototype_distance {
                DistanceMetric::Euclidean => euclidean(features, &prototype.features)?,
                DistanceMetric::Dtw => {
                    let bound = if per_class {
                        class_best.get(&prototype.class_id).copied().unwrap_or(f32::MAX)
                    } else if top_k.len() >= k {
                        top_k[k - 1]
                    } else {
                        f32::MAX
                    };
                    self.engine
                        .dtw(features, &prototype.features, banding, bound, DISTANCE_SENTINEL)
                }
            };
            if distance >= DISTANCE_SENTINEL {
                continue;
            }
            let best = class_best.entry(prototype.class_id).or_insert(distance);
            *best = best.min(distance);
            let pos = top_k.partition_point(|d| *d <= distance);
            if pos < k {
                top_k.insert(pos, distance);
                top_k.truncate(k);
            }
            neighbors.push((prototype.class_id, distance));
        }
        neighbors.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(Some(neighbors))
    }
}
