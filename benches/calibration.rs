use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use recon_anomaly::evaluation::{ErrorMetric, ReconstructionErrorEvaluator};
use recon_anomaly::threshold::{CalibrationConfig, CandidateStrategy, ThresholdCalibrator};

fn create_errors(rng: &mut ChaCha8Rng, n: usize, offset: f64) -> Vec<f64> {
    (0..n).map(|_| offset + rng.gen::<f64>()).collect()
}

fn bench_reconstruction_error(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconstruction_error");
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for n_rows in [1_000, 10_000, 50_000].iter() {
        let original = Array2::from_shape_fn((*n_rows, 64), |_| rng.gen::<f64>());
        let reconstructed = original.mapv(|v| v + 0.01);

        for parallel in [false, true] {
            let evaluator = ReconstructionErrorEvaluator::new(ErrorMetric::MeanSquared).with_parallel(parallel);
            let name = if parallel { "parallel" } else { "sequential" };
            group.bench_with_input(BenchmarkId::new(name, n_rows), n_rows, |b, _| {
                b.iter(|| evaluator.evaluate(black_box(original.view()), black_box(reconstructed.view())))
            });
        }
    }

    group.finish();
}

fn bench_calibrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("calibrate");
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    for n in [100, 1_000, 10_000].iter() {
        let nd = create_errors(&mut rng, *n, 0.0);
        let ad = create_errors(&mut rng, *n / 10, 0.8);

        let strategies = [
            ("midpoints", CandidateStrategy::Midpoints),
            ("linspace_1000", CandidateStrategy::Linspace { n_points: 1000 }),
        ];
        for (name, strategy) in strategies {
            let calibrator = ThresholdCalibrator::new(CalibrationConfig::default().with_strategy(strategy));
            group.bench_with_input(BenchmarkId::new(name, n), n, |b, _| {
                b.iter(|| calibrator.calibrate(black_box(&nd), black_box(&ad)))
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_reconstruction_error, bench_calibrate);
criterion_main!(benches);
