//! Euclidean and dynamic-time-warping distances between feature vectors.

use super::ShapeRecError;
use crate::features::FeatureVector;

/// Value returned when a DTW computation is abandoned or impossible.
pub const DISTANCE_SENTINEL: f32 = f32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Start,
    Diagonal,
    Up,
    Left,
}

/// Sum of per-position local distances.
pub fn euclidean(a: &FeatureVector, b: &FeatureVector) -> Result<f32, ShapeRecError> {
    if a.len() != b.len() {
        return Err(ShapeRecError::InputFormat(format!(
            "Euclidean distance needs equal lengths, got {} and {}",
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| x.local_distance(y.as_ref()))
        .sum())
}

/// Banded DTW with reusable cost and backpointer buffers.
///
/// Buffers only grow, so repeated nearest-neighbor searches over similarly
/// sized vectors allocate once.
#[derive(Debug, Default)]
pub struct DistanceEngine {
    cost: Vec<f32>,
    back: Vec<Step>,
    rows: usize,
    cols: usize,
    complete: bool,
}

impl DistanceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalized DTW distance: final cumulative cost over `|a| + |b|`.
    ///
    /// Cells further than `floor(min(|a|,|b|) * (1 - banding))` from the
    /// diagonal staircase are never evaluated. The computation is abandoned,
    /// returning `sentinel_max`, once the minimum of a finished row (in the
    /// same normalized units) exceeds `best_so_far`.
    pub fn dtw(
        &mut self,
        a: &FeatureVector,
        b: &FeatureVector,
        banding: f32,
        best_so_far: f32,
        sentinel_max: f32,
    ) -> f32 {
        self.complete = false;
        let rows = a.len();
        let cols = b.len();
        if rows == 0 || cols == 0 {
            return sentinel_max;
        }
        debug_assert!(banding > 0.0 && banding <= 1.0, "banding must be in (0, 1]");
        let cells = rows * cols;
        if self.cost.len() < cells {
            self.cost.resize(cells, sentinel_max);
            self.back.resize(cells, Step::Start);
        }
        self.rows = rows;
        self.cols = cols;
        let cost = &mut self.cost[..cells];
        let back = &mut self.back[..cells];
        cost.fill(sentinel_max);

        let corridor = (rows.min(cols) as f32 * (1.0 - banding)).floor() as usize;
        let ahead = cols.saturating_sub(rows) + corridor;
        let behind = rows.saturating_sub(cols) + corridor;
        let norm = (rows + cols) as f32;
        let local = |i: usize, j: usize| a[i].local_distance(b[j].as_ref());

        cost[0] = local(0, 0);
        back[0] = Step::Start;
        let first_row_end = (cols - 1).min(ahead);
        for j in 1..=first_row_end {
            cost[j] = cost[j - 1] + local(0, j);
            back[j] = Step::Left;
        }
        let first_col_end = (rows - 1).min(behind);
        for i in 1..=first_col_end {
            cost[i * cols] = cost[(i - 1) * cols] + local(i, 0);
            back[i * cols] = Step::Up;
        }
        if cost[..=first_row_end]
            .iter()
            .copied()
            .fold(f32::INFINITY, f32::min)
            / norm
            > best_so_far
        {
            return sentinel_max;
        }

        for i in 1..rows {
            let j_start = i.saturating_sub(behind).max(1);
            let j_end = (i + ahead).min(cols - 1);
            let mut row_min = cost[i * cols];
            for j in j_start..=j_end {
                let diag = cost[(i - 1) * cols + j - 1];
                let up = cost[(i - 1) * cols + j];
                let left = cost[i * cols + j - 1];
                let (mut best, mut step) = (diag, Step::Diagonal);
                if up < best {
                    best = up;
                    step = Step::Up;
                }
                if left < best {
                    best = left;
                    step = Step::Left;
                }
                if best >= sentinel_max {
                    continue;
                }
                let value = best + local(i, j);
                cost[i * cols + j] = value;
                back[i * cols + j] = step;
                row_min = row_min.min(value);
            }
            if row_min / norm > best_so_far {
                return sentinel_max;
            }
        }

        let total = cost[cells - 1];
        if total >= sentinel_max {
            return sentinel_max;
        }
        self.complete = true;
        total / norm
    }

    /// Alignment path of the last completed [`DistanceEngine::dtw`] call,
    /// from `(0, 0)` to `(|a|-1, |b|-1)`. Empty if that call was pruned.
    pub fn last_path(&self) -> Vec<(usize, usize)> {
        if !self.complete {
            return Vec::new();
        }
        let mut path = Vec::with_capacity(self.rows + self.cols);
        let (mut i, mut j) = (self.rows - 1, self.cols - 1);
        loop {
            path.push((i, j));
            match self.back[i * self.cols + j] {
                Step::Start => break,
                Step::Diagonal => {
                    i -= 1;
                    j -= 1;
                }
                Step::Up => i -= 1,
                Step::Left => j -= 1,
            }
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{PointFloatFeature, ShapeFeature, SharedFeature};
    use std::rc::Rc;

    fn trace(points: &[(f32, f32)]) -> FeatureVector {
        points
            .iter()
            .map(|&(x, y)| Rc::new(PointFloatFeature::new(x, y, 0.0, 0.0, false)) as SharedFeature)
            .collect()
    }

    /// Unbanded textbook DTW.
    fn brute_force(a: &FeatureVector, b: &FeatureVector) -> f32 {
        let (r, c) = (a.len(), b.len());
        let mut d = vec![vec![f32::INFINITY; c + 1]; r + 1];
        d[0][0] = 0.0;
        for i in 1..=r {
            for j in 1..=c {
                let local = a[i - 1].local_distance(b[j - 1].as_ref());
                d[i][j] = local + d[i - 1][j - 1].min(d[i - 1][j]).min(d[i][j - 1]);
            }
        }
        d[r][c] / (r + c) as f32
    }

    #[test]
    fn identical_sequences_have_zero_distance() {
        let a = trace(&[(0.0, 0.0), (1.0, 2.0), (3.0, 1.0)]);
        let mut engine = DistanceEngine::new();
        assert_eq!(engine.dtw(&a, &a, 0.33, f32::MAX, DISTANCE_SENTINEL), 0.0);
        assert_eq!(engine.last_path(), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn dtw_is_symmetric() {
        let a = trace(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.5), (3.0, 3.0), (4.0, 0.0)]);
        let b = trace(&[(0.0, 1.0), (2.0, 2.0), (2.5, 0.0)]);
        let mut engine = DistanceEngine::new();
        for banding in [0.1, 0.33, 0.5, 1.0] {
            let ab = engine.dtw(&a, &b, banding, f32::MAX, DISTANCE_SENTINEL);
            let ba = engine.dtw(&b, &a, banding, f32::MAX, DISTANCE_SENTINEL);
            assert!((ab - ba).abs() < 1e-5, "banding {banding}: {ab} vs {ba}");
        }
    }

    #[test]
    fn near_zero_banding_matches_brute_force() {
        let a = trace(&[(0.0, 0.0), (1.0, 0.0), (2.0, 1.0), (3.0, 1.0)]);
        let b = trace(&[(0.0, 0.5), (0.5, 0.0), (2.0, 2.0), (3.0, 0.0)]);
        let mut engine = DistanceEngine::new();
        let banded = engine.dtw(&a, &b, 1e-6, f32::MAX, DISTANCE_SENTINEL);
        assert!((banded - brute_force(&a, &b)).abs() < 1e-5);

        let c = trace(&[(0.0, 0.0), (3.0, 1.0)]);
        let banded = engine.dtw(&a, &c, 1e-6, f32::MAX, DISTANCE_SENTINEL);
        assert!((banded - brute_force(&a, &c)).abs() < 1e-5);
    }

    #[test]
    fn pruning_returns_sentinel() {
        let a = trace(&[(0.0, 0.0), (0.0, 0.0), (0.0, 0.0)]);
        let b = trace(&[(10.0, 10.0), (10.0, 10.0), (10.0, 10.0)]);
        let mut engine = DistanceEngine::new();
        assert_eq!(engine.dtw(&a, &b, 0.33, 1.0, DISTANCE_SENTINEL), DISTANCE_SENTINEL);
        assert!(engine.last_path().is_empty());
        let full = engine.dtw(&a, &b, 0.33, f32::MAX, DISTANCE_SENTINEL);
        assert!((full - 100.0).abs() < 1e-3);
    }

    /// Feature carrying its position, with a hand-written local cost table.
    #[derive(Debug)]
    struct Indexed(f32);

    impl ShapeFeature for Indexed {
        fn values(&self) -> &[f32] {
            std::slice::from_ref(&self.0)
        }

        fn rebuild(&self, values: Vec<f32>) -> SharedFeature {
            Rc::new(Indexed(values[0]))
        }

        // Only cell (1, 1) costs anything.
        fn local_distance(&self, other: &dyn ShapeFeature) -> f32 {
            if self.0 == 1.0 && other.values()[0] == 1.0 { 10.0 } else { 0.0 }
        }
    }

    fn indexed(n: usize) -> FeatureVector {
        (0..n).map(|i| Rc::new(Indexed(i as f32)) as SharedFeature).collect()
    }

    #[test]
    fn equal_costs_prefer_the_diagonal() {
        let mut engine = DistanceEngine::new();
        let two = trace(&[(1.0, 1.0); 2]);
        let three = trace(&[(1.0, 1.0); 3]);
        assert_eq!(engine.dtw(&two, &three, 1e-6, f32::MAX, DISTANCE_SENTINEL), 0.0);
        assert_eq!(engine.last_path(), vec![(0, 0), (0, 1), (1, 2)]);
        assert_eq!(engine.dtw(&three, &two, 1e-6, f32::MAX, DISTANCE_SENTINEL), 0.0);
        assert_eq!(engine.last_path(), vec![(0, 0), (1, 0), (2, 1)]);
    }

    #[test]
    fn up_wins_a_tie_with_left() {
        let mut engine = DistanceEngine::new();
        let a = indexed(3);
        let b = indexed(3);
        assert_eq!(engine.dtw(&a, &b, 1e-6, f32::MAX, DISTANCE_SENTINEL), 0.0);
        assert_eq!(engine.last_path(), vec![(0, 0), (0, 1), (1, 2), (2, 2)]);
    }

    #[test]
    fn buffers_grow_for_larger_pairs() {
        let small = trace(&[(0.0, 0.0), (1.0, 1.0)]);
        let large = trace(&[(0.0, 0.0); 8]);
        let mut engine = DistanceEngine::new();
        engine.dtw(&small, &small, 0.5, f32::MAX, DISTANCE_SENTINEL);
        let d = engine.dtw(&large, &small, 0.5, f32::MAX, DISTANCE_SENTINEL);
        assert!(d.is_finite());
        assert_eq!(engine.last_path().last(), Some(&(7, 1)));
    }

    #[test]
    fn euclidean_rejects_length_mismatch() {
        let a = trace(&[(0.0, 0.0), (1.0, 1.0)]);
        let b = trace(&[(0.0, 0.0)]);
        assert!(matches!(euclidean(&a, &b), Err(ShapeRecError::InputFormat(_))));
        let c = trace(&[(1.0, 0.0), (1.0, 2.0)]);
        assert_eq!(euclidean(&a, &c).unwrap(), 2.0);
    }
}
