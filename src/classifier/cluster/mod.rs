//! Agglomerative prototype reduction.
//!
//! Samples of one class are clustered bottom-up over a cached proximity
//! matrix; each cluster is then represented by its median member.

mod lmethod;
mod silhouette;

use super::proximity::ProximityStore;
use super::{ShapeRecError, ShapeSample};
use crate::config::{ClusterStop, Linkage};
use crate::features::FeatureVector;

pub use lmethod::select_knee;
pub use silhouette::average_silhouette;

/// Number of clusters to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterCount {
    /// Merge until exactly this many clusters remain (clamped to `1..=n`).
    Fixed(usize),
    /// Choose the count with a stopping criterion.
    Automatic(ClusterStop),
}

/// Fewest graph points the L-method can fit two segments to.
const L_METHOD_MIN_POINTS: usize = 4;

/// Bottom-up clustering state over a proximity matrix.
struct Agglomeration<'a> {
    proximity: &'a ProximityStore,
    linkage: Linkage,
    members: Vec<Vec<usize>>,
    active: Vec<bool>,
    /// Full inter-cluster distance matrix, updated with Lance-Williams.
    distances: Vec<f32>,
    remaining: usize,
}

impl<'a> Agglomeration<'a> {
    fn new(proximity: &'a ProximityStore, linkage: Linkage) -> Self {
        let n = proximity.len();
        let mut distances = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                distances[i * n + j] = proximity.distance(i, j);
            }
        }
        Self {
            proximity,
            linkage,
            members: (0..n).map(|i| vec![i]).collect(),
            active: vec![true; n],
            distances,
            remaining: n,
        }
    }

    fn cluster_count(&self) -> usize {
        self.remaining
    }

    /// Merge the two closest clusters and return their linkage distance.
    ///
    /// Ties go to the pair with the lowest indices so runs are reproducible.
    fn merge_closest(&mut self) -> Option<f32> {
        let n = self.proximity.len();
        let mut best: Option<(usize, usize, f32)> = None;
        for a in (0..n).filter(|&a| self.active[a]) {
            for b in ((a + 1)..n).filter(|&b| self.active[b]) {
                let d = self.distances[a * n + b];
                if best.is_none_or(|(_, _, current)| d < current) {
                    best = Some((a, b, d));
                }
            }
        }
        let (a, b, d) = best?;
        let size_a = self.members[a].len() as f32;
        let size_b = self.members[b].len() as f32;
        for k in (0..n).filter(|&k| self.active[k] && k != a && k != b) {
            let da = self.distances[a * n + k];
            let db = self.distances[b * n + k];
            let merged = match self.linkage {
                Linkage::Single => da.min(db),
                Linkage::Complete => da.max(db),
                Linkage::Average => (size_a * da + size_b * db) / (size_a + size_b),
            };
            self.distances[a * n + k] = merged;
            self.distances[k * n + a] = merged;
        }
        let moved = std::mem::take(&mut self.members[b]);
        self.members[a].extend(moved);
        self.members[a].sort_unstable();
        self.active[b] = false;
        self.remaining -= 1;
        Some(d)
    }

    /// Active clusters ordered by their smallest member.
    fn clusters(&self) -> Vec<Vec<usize>> {
        let mut out: Vec<Vec<usize>> = self
            .members
            .iter()
            .zip(&self.active)
            .filter(|(_, active)| **active)
            .map(|(members, _)| members.clone())
            .collect();
        out.sort_by_key(|members| members[0]);
        out
    }
}

/// Hierarchical clustering with cluster-count selection and median extraction.
#[derive(Debug, Clone, Copy)]
pub struct PrototypeReducer {
    linkage: Linkage,
}

impl PrototypeReducer {
    pub fn new(linkage: Linkage) -> Self {
        Self { linkage }
    }

    /// Partition the elements of `proximity` into clusters of element indices.
    pub fn cluster(&self, proximity: &ProximityStore, count: ClusterCount) -> Vec<Vec<usize>> {
        let n = proximity.len();
        if n == 0 {
            return Vec::new();
        }
        match count {
            ClusterCount::Fixed(k) => self.cluster_to(proximity, k.clamp(1, n)),
            ClusterCount::Automatic(ClusterStop::LMethod) => {
                let k = self.l_method_count(proximity);
                tracing::debug!("L-method selected {k} clusters for {n} samples");
                self.cluster_to(proximity, k)
            }
            ClusterCount::Automatic(ClusterStop::AverageSilhouette) => {
                self.best_silhouette(proximity)
            }
        }
    }

    fn cluster_to(&self, proximity: &ProximityStore, k: usize) -> Vec<Vec<usize>> {
        let mut state = Agglomeration::new(proximity, self.linkage);
        while state.cluster_count() > k {
            if state.merge_closest().is_none() {
                break;
            }
        }
        state.clusters()
    }

    /// Cluster count at the knee of the merge-distance curve.
    ///
    /// Too few samples to fit two segments keeps every sample.
    fn l_method_count(&self, proximity: &ProximityStore) -> usize {
        let n = proximity.len();
        let mut state = Agglomeration::new(proximity, self.linkage);
        // (clusters before the merge, merge distance), from n down to 2
        let mut graph = Vec::with_capacity(n);
        loop {
            let before = state.cluster_count() as f64;
            let Some(distance) = state.merge_closest() else {
                break;
            };
            graph.push((before, f64::from(distance)));
        }
        graph.reverse();
        if graph.len() < L_METHOD_MIN_POINTS {
            return n;
        }
        select_knee(&graph)
    }

    /// Clustering with the highest average silhouette among those with more
    /// than two clusters.
    fn best_silhouette(&self, proximity: &ProximityStore) -> Vec<Vec<usize>> {
        let mut state = Agglomeration::new(proximity, self.linkage);
        let mut best: Option<(f32, Vec<Vec<usize>>)> = None;
        while state.cluster_count() > 3 {
            if state.merge_closest().is_none() {
                break;
            }
            let clusters = state.clusters();
            let score = average_silhouette(proximity, &clusters);
            if best.as_ref().is_none_or(|(current, _)| score > *current) {
                best = Some((score, clusters));
            }
        }
        match best {
            Some((score, clusters)) => {
                tracing::debug!(
                    "Average silhouette {score:.4} selected {} clusters",
                    clusters.len()
                );
                clusters
            }
            None => state.clusters(),
        }
    }

    /// Index of the member with the smallest total distance to the rest of its cluster.
    pub fn median(proximity: &ProximityStore, members: &[usize]) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for &candidate in members {
            let total: f32 = members
                .iter()
                .map(|&other| proximity.distance(candidate, other))
                .sum();
            if best.is_none_or(|(_, current)| total < current) {
                best = Some((candidate, total));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Cluster `samples` under `distance` and keep only the cluster medians.
    pub fn reduce<F>(
        &self,
        samples: &[ShapeSample],
        count: ClusterCount,
        mut distance: F,
    ) -> Result<Vec<ShapeSample>, ShapeRecError>
    where
        F: FnMut(&FeatureVector, &FeatureVector) -> Result<f32, ShapeRecError>,
    {
        if samples.is_empty() {
            return Err(ShapeRecError::EmptyInput("no samples to cluster".to_string()));
        }
        if count == ClusterCount::Fixed(samples.len()) {
            return Ok(samples.to_vec());
        }
        let proximity = ProximityStore::build(samples.len(), |i, j| {
            distance(&samples[i].features, &samples[j].features)
        })?;
        Ok(self
            .cluster(&proximity, count)
            .iter()
            .filter_map(|members| Self::median(&proximity, members))
            .map(|idx| samples[idx].clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Points on a line; distance is the absolute difference.
    fn line(values: &[f32]) -> ProximityStore {
        ProximityStore::build(values.len(), |i, j| Ok((values[i] - values[j]).abs())).unwrap()
    }

    #[test]
    fn k_equals_n_gives_singletons() {
        let store = line(&[0.0, 1.0, 5.0, 9.0]);
        let clusters = PrototypeReducer::new(Linkage::Average).cluster(&store, ClusterCount::Fixed(4));
        assert_eq!(clusters, vec![vec![0], vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn k_equals_one_gives_everything() {
        let store = line(&[0.0, 1.0, 5.0, 9.0]);
        for linkage in [Linkage::Single, Linkage::Average, Linkage::Complete] {
            let clusters = PrototypeReducer::new(linkage).cluster(&store, ClusterCount::Fixed(1));
            assert_eq!(clusters, vec![vec![0, 1, 2, 3]]);
        }
    }

    #[test]
    fn clustering_is_idempotent() {
        let store = line(&[0.0, 0.2, 0.1, 5.0, 5.3, 9.0, 9.1]);
        let reducer = PrototypeReducer::new(Linkage::Average);
        let first = reducer.cluster(&store, ClusterCount::Fixed(3));
        let second = reducer.cluster(&store, ClusterCount::Fixed(3));
        assert_eq!(first, second);
        assert_eq!(first, vec![vec![0, 1, 2], vec![3, 4], vec![5, 6]]);
    }

    #[test]
    fn linkage_changes_merge_order() {
        // Chain 0-1-2 spaced 1.0 apart, and an isolated pair 10, 11.2.
        let store = line(&[0.0, 1.0, 2.0, 10.0, 11.2]);
        let single = PrototypeReducer::new(Linkage::Single).cluster(&store, ClusterCount::Fixed(2));
        assert_eq!(single, vec![vec![0, 1, 2], vec![3, 4]]);
        let complete =
            PrototypeReducer::new(Linkage::Complete).cluster(&store, ClusterCount::Fixed(3));
        assert_eq!(complete.len(), 3);
    }

    #[test]
    fn median_minimizes_total_distance() {
        let values = [0.0, 4.0, 1.0, 1.5, 10.0];
        let store = line(&values);
        for size in 1..=values.len() {
            let members: Vec<usize> = (0..size).collect();
            let median = PrototypeReducer::median(&store, &members).unwrap();
            let total = |c: usize| members.iter().map(|&o| store.distance(c, o)).sum::<f32>();
            for &other in &members {
                assert!(total(median) <= total(other));
            }
        }
    }

    #[test]
    fn l_method_finds_obvious_groups() {
        let mut values = Vec::new();
        for center in [0.0f32, 100.0, 200.0, 300.0] {
            for offset in 0..6 {
                values.push(center + offset as f32 * 0.1);
            }
        }
        let store = line(&values);
        let clusters = PrototypeReducer::new(Linkage::Average)
            .cluster(&store, ClusterCount::Automatic(ClusterStop::LMethod));
        assert_eq!(clusters.len(), 4);
    }

    #[test]
    fn silhouette_keeps_more_than_two_clusters() {
        let values = [0.0, 0.1, 0.2, 50.0, 50.1, 100.0, 100.2, 100.1];
        let store = line(&values);
        let clusters = PrototypeReducer::new(Linkage::Average)
            .cluster(&store, ClusterCount::Automatic(ClusterStop::AverageSilhouette));
        assert_eq!(clusters, vec![vec![0, 1, 2], vec![3, 4], vec![5, 6, 7]]);
    }

    #[test]
    fn tiny_inputs_keep_every_sample_under_l_method() {
        let store = line(&[0.0, 1.0, 2.0]);
        let clusters = PrototypeReducer::new(Linkage::Average)
            .cluster(&store, ClusterCount::Automatic(ClusterStop::LMethod));
        assert_eq!(clusters.len(), 3);
    }
}
