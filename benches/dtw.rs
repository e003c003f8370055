use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use shaperec::classifier::distance::{DISTANCE_SENTINEL, DistanceEngine, euclidean};
use shaperec::features::{FeatureVector, PointFloatFeature, SharedFeature};
use std::hint::black_box;
use std::rc::Rc;

fn curve(points: usize, phase: f32) -> FeatureVector {
    (0..points)
        .map(|i| {
            let t = i as f32 / points as f32;
            let angle = t * std::f32::consts::TAU + phase;
            Rc::new(PointFloatFeature::new(
                t,
                angle.sin() * 0.5 + 0.5,
                angle.cos(),
                angle.sin(),
                i + 1 == points,
            )) as SharedFeature
        })
        .collect()
}

fn bench_distances(c: &mut Criterion) {
    let a = curve(60, 0.0);
    let b = curve(60, 0.4);
    let mut engine = DistanceEngine::default();
    c.bench_function("dtw_60_points", |bencher| {
        bencher.iter(|| engine.dtw(black_box(&a), black_box(&b), 0.33, f32::MAX, DISTANCE_SENTINEL))
    });
    c.bench_function("dtw_60_points_pruned", |bencher| {
        bencher.iter(|| engine.dtw(black_box(&a), black_box(&b), 0.33, 0.01, DISTANCE_SENTINEL))
    });
    c.bench_function("dtw_cold_buffers", |bencher| {
        bencher.iter_batched(
            DistanceEngine::default,
            |mut fresh| fresh.dtw(&a, &b, 0.33, f32::MAX, DISTANCE_SENTINEL),
            BatchSize::SmallInput,
        )
    });
    c.bench_function("euclidean_60_points", |bencher| {
        bencher.iter(|| euclidean(black_box(&a), black_box(&b)))
    });
}

criterion_group!(benches, bench_distances);
criterion_main!(benches);
