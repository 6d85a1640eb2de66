//! Criterion benchmarks for driftwood-forest: sequential vs parallel learning and prediction.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use driftwood_forest::{AdaptiveRandomForestClassifier, ForestConfig};

fn make_stream(n_samples: usize, n_features: usize, seed: u64) -> Vec<(Vec<Option<f64>>, usize)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n_samples)
        .map(|i| {
            let class = i % 3;
            let row = (0..n_features)
                .map(|f| {
                    let base = if f < 3 { class as f64 * 3.0 } else { 0.0 };
                    Some(base + rng.r#gen::<f64>() * 2.0)
                })
                .collect();
            (row, class)
        })
        .collect()
}

fn bench_forest_learn(c: &mut Criterion) {
    let stream = make_stream(2_000, 10, 42);
    let mut group = c.benchmark_group("forest_learn_2000x10");
    for parallel in [false, true] {
        let config = ForestConfig::new(10)
            .unwrap()
            .with_seed(Some(42))
            .with_parallel(parallel);
        group.bench_with_input(
            BenchmarkId::from_parameter(if parallel { "parallel" } else { "sequential" }),
            &config,
            |b, config| {
                b.iter(|| {
                    let mut forest = AdaptiveRandomForestClassifier::new(config.clone()).unwrap();
                    for (x, y) in &stream {
                        forest.learn(x, *y).unwrap();
                    }
                    forest
                });
            },
        );
    }
    group.finish();
}

fn bench_forest_predict(c: &mut Criterion) {
    let stream = make_stream(2_000, 10, 7);
    let config = ForestConfig::new(10).unwrap().with_seed(Some(7));
    let mut forest = AdaptiveRandomForestClassifier::new(config).unwrap();
    for (x, y) in &stream {
        forest.learn(x, *y).unwrap();
    }
    c.bench_function("forest_predict_proba_2000", |b| {
        b.iter(|| {
            stream
                .iter()
                .filter_map(|(x, _)| forest.predict(x).unwrap())
                .count()
        });
    });
}

criterion_group!(benches, bench_forest_learn, bench_forest_predict);
criterion_main!(benches);
