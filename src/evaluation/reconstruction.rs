//! Per-record reconstruction error

use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AnomalyError, Result};

/// Distance between an original and a reconstructed feature vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMetric {
    /// Mean of squared per-feature differences
    #[default]
    MeanSquared,
    /// Sum of squared per-feature differences
    SumSquared,
}

impl ErrorMetric {
    fn row_error(self, original: ArrayView1<'_, f64>, reconstructed: ArrayView1<'_, f64>) -> f64 {
        let sum: f64 = original
            .iter()
            .zip(reconstructed.iter())
            .map(|(&x, &y)| (x - y).powi(2))
            .sum();

        match self {
            ErrorMetric::SumSquared => sum,
            ErrorMetric::MeanSquared if original.is_empty() => 0.0,
            ErrorMetric::MeanSquared => sum / original.len() as f64,
        }
    }
}

/// Computes reconstruction errors row by row
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconstructionErrorEvaluator {
    metric: ErrorMetric,
    parallel: bool,
}

impl ReconstructionErrorEvaluator {
    pub fn new(metric: ErrorMetric) -> Self {
        Self {
            metric,
            parallel: false,
        }
    }

    /// Evaluate rows on the rayon pool
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn metric(&self) -> ErrorMetric {
        self.metric
    }

    /// One error per row, in input order.
    ///
    /// Fails with `ShapeMismatch` if the record or feature counts differ and
    /// with `DataError` if any error is NaN or infinite.
    pub fn evaluate(
        &self,
        original: ArrayView2<'_, f64>,
        reconstructed: ArrayView2<'_, f64>,
    ) -> Result<Array1<f64>> {
        if original.dim() != reconstructed.dim() {
            let (r0, c0) = original.dim();
            let (r1, c1) = reconstructed.dim();
            return Err(AnomalyError::shape(
                "reconstruction error",
                format!("{} records x {} features", r0, c0),
                format!("{} records x {} features", r1, c1),
            ));
        }

        let metric = self.metric;
        let errors: Vec<f64> = if self.parallel {
            (0..original.nrows())
                .into_par_iter()
                .map(|i| metric.row_error(original.row(i), reconstructed.row(i)))
                .collect()
        } else {
            original
                .rows()
                .into_iter()
                .zip(reconstructed.rows())
                .map(|(x, y)| metric.row_error(x, y))
                .collect()
        };

        if let Some(pos) = errors.iter().position(|e| !e.is_finite()) {
            return Err(AnomalyError::DataError(format!(
                "non-finite reconstruction error {} for record {}",
                errors[pos], pos
            )));
        }

        Ok(Array1::from_vec(errors))
    }
}

/// Mean squared reconstruction error per record
pub fn reconstruction_error(
    original: ArrayView2<'_, f64>,
    reconstructed: ArrayView2<'_, f64>,
) -> Result<Array1<f64>> {
    ReconstructionErrorEvaluator::default().evaluate(original, reconstructed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_identical_is_zero() {
        let x = array![[1.0, 2.0, 3.0], [-4.0, 0.5, 1e6]];
        let errors = reconstruction_error(x.view(), x.view()).unwrap();
        assert!(errors.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn test_single_feature_difference_is_positive() {
        let x = array![[1.0, 2.0, 3.0], [1.0, 2.0, 3.0]];
        let y = array![[1.0, 2.0, 3.0], [1.0, 2.5, 3.0]];
        let errors = reconstruction_error(x.view(), y.view()).unwrap();
        assert_eq!(errors[0], 0.0);
        assert!(errors[1] > 0.0);
    }

    #[test]
    fn test_metrics() {
        let x = array![[0.0, 0.0]];
        let y = array![[1.0, 3.0]];

        let mean = ReconstructionErrorEvaluator::new(ErrorMetric::MeanSquared)
            .evaluate(x.view(), y.view())
            .unwrap();
        let sum = ReconstructionErrorEvaluator::new(ErrorMetric::SumSquared)
            .evaluate(x.view(), y.view())
            .unwrap();

        assert!((mean[0] - 5.0).abs() < 1e-12);
        assert!((sum[0] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let x = ndarray::Array2::from_shape_fn((200, 5), |(r, c)| (r * c) as f64 * 0.1);
        let y = x.mapv(|v| v * 0.9 + 0.05);

        let seq = ReconstructionErrorEvaluator::default()
            .evaluate(x.view(), y.view())
            .unwrap();
        let par = ReconstructionErrorEvaluator::default()
            .with_parallel(true)
            .evaluate(x.view(), y.view())
            .unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn test_shape_mismatch() {
        let x = array![[1.0, 2.0]];
        let fewer_features = array![[1.0]];
        let more_rows = array![[1.0, 2.0], [3.0, 4.0]];

        assert!(matches!(
            reconstruction_error(x.view(), fewer_features.view()),
            Err(AnomalyError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            reconstruction_error(x.view(), more_rows.view()),
            Err(AnomalyError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_non_finite_reconstruction_rejected() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![[1.0, 2.0], [f64::NAN, 4.0]];
        for parallel in [false, true] {
            let result = ReconstructionErrorEvaluator::default()
                .with_parallel(parallel)
                .evaluate(x.view(), y.view());
            assert!(matches!(result, Err(AnomalyError::DataError(_))));
        }
    }
}
