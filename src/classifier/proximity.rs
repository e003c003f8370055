//! Packed symmetric pairwise-distance matrix.

use super::ShapeRecError;

/// Upper-triangular storage of `n * (n - 1) / 2` pairwise distances.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityStore {
    size: usize,
    packed: Vec<f32>,
}

impl ProximityStore {
    /// Evaluate `distance(i, j)` once for every unordered pair `i < j`.
    pub fn build<F>(size: usize, mut distance: F) -> Result<Self, ShapeRecError>
    where
        F: FnMut(usize, usize) -> Result<f32, ShapeRecError>,
    {
        let mut packed = Vec::with_capacity(size * size.saturating_sub(1) / 2);
        for i in 0..size {
            for j in (i + 1)..size {
                packed.push(distance(i, j)?);
            }
        }
        Ok(Self { size, packed })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Distance between elements `i` and `j`; zero on the diagonal.
    pub fn distance(&self, i: usize, j: usize) -> f32 {
        assert!(i < self.size && j < self.size, "proximity index out of range");
        if i == j {
            return 0.0;
        }
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        self.packed[self.offset(lo, hi)]
    }

    fn offset(&self, lo: usize, hi: usize) -> usize {
        lo * self.size - lo * (lo + 1) / 2 + (hi - lo - 1)
    }
}
