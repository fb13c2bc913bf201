//! Test-set classification and scoring
//!
//! Every evaluated subset is class-homogeneous: ND test sets contain only
//! negatives, AD test sets only positives. Metrics always treat "anomalous" as
//! the positive label, so ND subsets never have true positives and their
//! precision / recall fall back to the zero-division value; `accuracy` is the
//! informative figure there (1 - false positive rate).

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::RecordSet;
use crate::error::{AnomalyError, Result};
use crate::evaluation::{BinaryMetrics, ConfusionCounts, ZeroDivision};
use crate::threshold::Threshold;

/// Ground truth shared by every record of an evaluated subset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsetClass {
    Normal,
    Anomalous,
}

impl SubsetClass {
    pub fn from_is_normal(is_nd_class: bool) -> Self {
        if is_nd_class {
            SubsetClass::Normal
        } else {
            SubsetClass::Anomalous
        }
    }

    pub fn is_anomalous(self) -> bool {
        self == SubsetClass::Anomalous
    }
}

/// Predictions and metrics for one subset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub class: SubsetClass,
    /// `true` = predicted anomalous, aligned with the input errors
    pub predictions: Vec<bool>,
    pub metrics: BinaryMetrics,
}

impl Evaluation {
    pub fn precision(&self) -> f64 {
        self.metrics.precision
    }

    pub fn recall(&self) -> f64 {
        self.metrics.recall
    }

    pub fn fscore(&self) -> f64 {
        self.metrics.fscore
    }

    pub fn n_predicted_anomalous(&self) -> usize {
        self.predictions.iter().filter(|&&p| p).count()
    }
}

/// Applies a calibrated threshold to reconstruction errors
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    threshold: Threshold,
    beta: f64,
    zero_division: ZeroDivision,
}

impl Classifier {
    pub fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            beta: 1.0,
            zero_division: ZeroDivision::default(),
        }
    }

    /// Use the same F-beta as calibration
    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_zero_division(mut self, zero_division: ZeroDivision) -> Self {
        self.zero_division = zero_division;
        self
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    /// `true` where the error exceeds the threshold
    pub fn predict(&self, errors: ArrayView1<'_, f64>) -> Vec<bool> {
        errors.iter().map(|&e| self.threshold.is_exceeded_by(e)).collect()
    }

    /// Score a subset whose true class is `class`
    pub fn evaluate(&self, class: SubsetClass, errors: ArrayView1<'_, f64>) -> Evaluation {
        let predictions = self.predict(errors);
        let actual = class.is_anomalous();
        let confusion = ConfusionCounts::from_pairs(predictions.iter().map(|&p| (p, actual)));
        let metrics = BinaryMetrics::from_counts(confusion, self.beta, self.zero_division);

        debug!(
            class = ?class,
            records = predictions.len(),
            false_positives = confusion.false_positives,
            false_negatives = confusion.false_negatives,
            "Evaluated subset"
        );

        Evaluation {
            class,
            predictions,
            metrics,
        }
    }

    /// Score a subset given per-record labels, which must all agree.
    ///
    /// Fails with `MixedLabels` for a mixed subset, `ShapeMismatch` when
    /// labels and errors differ in length and `DataError` for a NaN or
    /// infinite error. An empty subset needs `fallback`.
    pub fn evaluate_labeled(
        &self,
        labels: &[bool],
        errors: ArrayView1<'_, f64>,
        fallback: SubsetClass,
    ) -> Result<Evaluation> {
        if labels.len() != errors.len() {
            return Err(AnomalyError::shape(
                "subset evaluation",
                format!("{} labels", errors.len()),
                format!("{} labels", labels.len()),
            ));
        }

        if let Some(pos) = errors.iter().position(|e| !e.is_finite()) {
            return Err(AnomalyError::DataError(format!(
                "non-finite reconstruction error {} at position {}",
                errors[pos], pos
            )));
        }

        let class = match labels.first() {
            None => fallback,
            Some(&first) => {
                if let Some(pos) = labels.iter().position(|&l| l != first) {
                    return Err(AnomalyError::MixedLabels(format!(
                        "subset mixes normal and anomalous records (first disagreement at position {})",
                        pos
                    )));
                }
                if first {
                    SubsetClass::Anomalous
                } else {
                    SubsetClass::Normal
                }
            }
        };

        if class != fallback {
            return Err(AnomalyError::MixedLabels(format!(
                "expected a {:?} subset, records are {:?}",
                fallback, class
            )));
        }

        Ok(self.evaluate(class, errors))
    }

    /// [`Classifier::evaluate_labeled`] using the labels carried by `records`
    pub fn evaluate_records(
        &self,
        records: &RecordSet,
        errors: ArrayView1<'_, f64>,
        expected: SubsetClass,
    ) -> Result<Evaluation> {
        self.evaluate_labeled(records.labels(), errors, expected)
    }
}

/// Classify `errors` against `threshold`; `is_nd_class` selects the subset's true class.
///
/// Returns (predictions, precision, recall, fscore).
pub fn evaluate(
    is_nd_class: bool,
    errors: &[f64],
    threshold: Threshold,
) -> (Vec<bool>, f64, f64, f64) {
    let evaluation = Classifier::new(threshold).evaluate(
        SubsetClass::from_is_normal(is_nd_class),
        ArrayView1::from(errors),
    );
    let m = evaluation.metrics;
    (evaluation.predictions, m.precision, m.recall, m.fscore)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn threshold(v: f64) -> Threshold {
        Threshold::new(v).unwrap()
    }

    #[test]
    fn test_normal_subset_below_threshold() {
        let (predictions, precision, recall, fscore) = evaluate(true, &[0.1, 0.3], threshold(0.5));
        assert_eq!(predictions, vec![false, false]);
        assert_eq!((precision, recall, fscore), (0.0, 0.0, 0.0));

        let eval = Classifier::new(threshold(0.5)).evaluate(SubsetClass::Normal, array![0.1, 0.3].view());
        assert_eq!(eval.metrics.confusion.false_positives, 0);
        assert_eq!(eval.metrics.accuracy, 1.0);
    }

    #[test]
    fn test_normal_subset_false_positive() {
        let eval = Classifier::new(threshold(0.5)).evaluate(SubsetClass::Normal, array![0.1, 0.7].view());
        assert_eq!(eval.predictions, vec![false, true]);
        assert_eq!(eval.metrics.confusion.false_positives, 1);
        assert_eq!(eval.precision(), 0.0);
        assert_eq!(eval.metrics.accuracy, 0.5);
    }

    #[test]
    fn test_anomalous_subset() {
        let (predictions, precision, recall, fscore) = evaluate(false, &[0.85], threshold(0.5));
        assert_eq!(predictions, vec![true]);
        assert_eq!((precision, recall, fscore), (1.0, 1.0, 1.0));

        let (_, precision, recall, _) = evaluate(false, &[0.85, 0.2, 0.6, 0.1], threshold(0.5));
        assert_eq!(precision, 1.0);
        assert_eq!(recall, 0.5);
    }

    #[test]
    fn test_error_equal_to_threshold_is_normal() {
        let (predictions, ..) = evaluate(false, &[0.5], threshold(0.5));
        assert_eq!(predictions, vec![false]);
    }

    #[test]
    fn test_mixed_labels_rejected() {
        let classifier = Classifier::new(threshold(0.5));
        let result = classifier.evaluate_labeled(
            &[false, true],
            array![0.1, 0.9].view(),
            SubsetClass::Normal,
        );
        assert!(matches!(result, Err(AnomalyError::MixedLabels(_))));
    }

    #[test]
    fn test_wrong_class_rejected() {
        let classifier = Classifier::new(threshold(0.5));
        let result = classifier.evaluate_labeled(
            &[true, true],
            array![0.1, 0.9].view(),
            SubsetClass::Normal,
        );
        assert!(matches!(result, Err(AnomalyError::MixedLabels(_))));
    }

    #[test]
    fn test_label_length_mismatch() {
        let classifier = Classifier::new(threshold(0.5));
        let result = classifier.evaluate_labeled(&[true], array![0.1, 0.9].view(), SubsetClass::Anomalous);
        assert!(matches!(result, Err(AnomalyError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_nan_error_rejected() {
        let classifier = Classifier::new(threshold(0.5));
        let result = classifier.evaluate_labeled(
            &[false, false],
            array![0.1, f64::NAN].view(),
            SubsetClass::Normal,
        );
        assert!(matches!(result, Err(AnomalyError::DataError(_))));
    }

    #[test]
    fn test_empty_subset_uses_fallback() {
        let classifier = Classifier::new(threshold(0.5));
        let eval = classifier
            .evaluate_labeled(&[], ndarray::Array1::<f64>::zeros(0).view(), SubsetClass::Anomalous)
            .unwrap();
        assert_eq!(eval.class, SubsetClass::Anomalous);
        assert!(eval.predictions.is_empty());
        assert_eq!(eval.metrics.fscore, 0.0);
    }
}
