//! Knee detection on the merge-distance evaluation graph.

/// Smallest cutoff considered when the graph is refined.
const MIN_CUTOFF: usize = 20;

/// Root-mean-square error of the least-squares line through `points`.
fn line_fit_rmse(points: &[(f64, f64)]) -> f64 {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in points {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean_y);
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = mean_y - slope * mean_x;
    let sse: f64 = points
        .iter()
        .map(|(x, y)| {
            let residual = y - (slope * x + intercept);
            residual * residual
        })
        .sum();
    (sse / n).sqrt()
}

/// Best split of `points` into two line segments, each of at least two
/// points. Returns the x value of the last point of the left segment.
fn best_split(points: &[(f64, f64)]) -> usize {
    let total = points.len() as f64;
    let mut best: Option<(usize, f64)> = None;
    for split in 2..=points.len().saturating_sub(2) {
        let (left, right) = points.split_at(split);
        let error = left.len() as f64 / total * line_fit_rmse(left)
            + right.len() as f64 / total * line_fit_rmse(right);
        if best.is_none_or(|(_, current)| error < current) {
            best = Some((split, error));
        }
    }
    best.map_or(points[0].0 as usize, |(split, _)| points[split - 1].0 as usize)
}

/// Number of clusters at the knee of an evaluation graph sorted by ascending
/// cluster count.
///
/// The fit is repeated on the graph cut off at twice the previous knee until
/// the knee stops moving left.
pub fn select_knee(graph: &[(f64, f64)]) -> usize {
    let Some(&(max_x, _)) = graph.last() else {
        return 1;
    };
    let max_x = max_x as usize;
    let mut cutoff = max_x;
    let mut last_knee = usize::MAX;
    let mut knee = max_x;
    for _ in 0..graph.len() {
        let window: Vec<(f64, f64)> = graph
            .iter()
            .copied()
            .filter(|(x, _)| *x as usize <= cutoff)
            .collect();
        if window.len() < 4 {
            break;
        }
        knee = best_split(&window);
        if knee >= last_knee {
            break;
        }
        last_knee = knee;
        cutoff = (knee * 2).max(MIN_CUTOFF).min(max_x);
    }
    knee
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_line_has_zero_error() {
        let points = [(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)];
        assert!(line_fit_rmse(&points) < 1e-12);
    }

    #[test]
    fn knee_sits_where_the_slope_breaks() {
        // Steep drop until x = 5, then nearly flat.
        let mut graph = Vec::new();
        for x in 2..=5 {
            graph.push((x as f64, 100.0 - 20.0 * x as f64));
        }
        for x in 6..=30 {
            graph.push((x as f64, 1.0 - 0.01 * x as f64));
        }
        assert_eq!(select_knee(&graph), 5);
    }
}
