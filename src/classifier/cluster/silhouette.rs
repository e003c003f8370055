use super::ProximityStore;

/// Mean silhouette coefficient of a partition; singleton members score zero.
pub fn average_silhouette(proximity: &ProximityStore, clusters: &[Vec<usize>]) -> f32 {
    let total: usize = clusters.iter().map(Vec::len).sum();
    if total == 0 || clusters.len() < 2 {
        return 0.0;
    }
    let mean_distance = |point: usize, members: &[usize]| -> f32 {
        let others = members.iter().filter(|&&other| other != point);
        let count = others.clone().count();
        if count == 0 {
            return 0.0;
        }
        others.map(|&other| proximity.distance(point, other)).sum::<f32>() / count as f32
    };
    let mut sum = 0.0f32;
    for (idx, cluster) in clusters.iter().enumerate() {
        if cluster.len() < 2 {
            continue;
        }
        for &point in cluster {
            let a = mean_distance(point, cluster);
            let b = clusters
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != idx)
                .map(|(_, members)| mean_distance(point, members))
                .fold(f32::INFINITY, f32::min);
            let scale = a.max(b);
            if scale > 0.0 {
                sum += (b - a) / scale;
            }
        }
    }
    sum / total as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_separated_partition_scores_near_one() {
        let values = [0.0f32, 0.1, 10.0, 10.1];
        let store =
            ProximityStore::build(values.len(), |i, j| Ok((values[i] - values[j]).abs())).unwrap();
        let good = average_silhouette(&store, &[vec![0, 1], vec![2, 3]]);
        let bad = average_silhouette(&store, &[vec![0, 2], vec![1, 3]]);
        assert!(good > 0.95);
        assert!(bad < 0.0);
    }
}
