use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use exoai::ensemble::{EnsembleParams, StackingClassifier};
use exoai::evaluation::tune_threshold;
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

const N_FEATURES: usize = 7;

fn create_classification_data(n_rows: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut x = Array2::zeros((n_rows, N_FEATURES));
    let mut y = Array1::zeros(n_rows);
    for i in 0..n_rows {
        let class = (i % 2) as f64;
        for j in 0..N_FEATURES {
            x[[i, j]] = class * 1.5 + rng.gen::<f64>() * 2.0 - 1.0;
        }
        y[i] = class;
    }
    (x, y)
}

fn bench_params() -> EnsembleParams {
    EnsembleParams {
        rf_n_estimators: 20,
        et_n_estimators: 20,
        gb_n_estimators: 20,
        ..EnsembleParams::lightweight()
    }
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("training");
    group.sample_size(10); // Fewer samples for training benchmarks

    for n_rows in [500, 2000].iter() {
        let (x, y) = create_classification_data(*n_rows);

        group.bench_with_input(BenchmarkId::new("stacking_fit", n_rows), &(x, y), |b, (x, y)| {
            b.iter(|| {
                let mut model = StackingClassifier::new(bench_params()).with_n_classes(2);
                model.fit(black_box(x), black_box(y)).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("prediction");

    // Train model once
    let (train_x, train_y) = create_classification_data(2000);
    let mut model = StackingClassifier::new(bench_params()).with_n_classes(2);
    model.fit(&train_x, &train_y).unwrap();

    for n_rows in [1, 100, 1000].iter() {
        let (x, _) = create_classification_data(*n_rows);
        group.bench_with_input(BenchmarkId::new("predict_proba", n_rows), &x, |b, x| {
            b.iter(|| model.predict_proba(black_box(x)).unwrap())
        });
    }

    let (x, y) = create_classification_data(1000);
    let positive = model.predict_proba(&x).unwrap().column(1).to_owned();
    group.bench_function("tune_threshold", |b| {
        b.iter(|| tune_threshold(black_box(&y), black_box(&positive)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_training, bench_prediction);
criterion_main!(benches);
