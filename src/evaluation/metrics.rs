//! Binary classification metrics with "anomalous" as the positive label

use serde::{Deserialize, Serialize};

/// Value reported when a metric's denominator is zero
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroDivision {
    #[default]
    Zero,
    One,
}

impl ZeroDivision {
    pub fn value(self) -> f64 {
        match self {
            ZeroDivision::Zero => 0.0,
            ZeroDivision::One => 1.0,
        }
    }
}

/// Confusion matrix counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionCounts {
    /// Count from (predicted anomalous, actually anomalous) pairs
    pub fn from_pairs(pairs: impl IntoIterator<Item = (bool, bool)>) -> Self {
        let mut counts = Self::default();
        for (predicted, actual) in pairs {
            counts.update(predicted, actual);
        }
        counts
    }

    pub fn update(&mut self, predicted: bool, actual: bool) {
        match (predicted, actual) {
            (true, true) => self.true_positives += 1,
            (true, false) => self.false_positives += 1,
            (false, false) => self.true_negatives += 1,
            (false, true) => self.false_negatives += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn precision(&self, zero_division: ZeroDivision) -> f64 {
        ratio(
            self.true_positives,
            self.true_positives + self.false_positives,
            zero_division,
        )
    }

    pub fn recall(&self, zero_division: ZeroDivision) -> f64 {
        ratio(
            self.true_positives,
            self.true_positives + self.false_negatives,
            zero_division,
        )
    }

    pub fn accuracy(&self, zero_division: ZeroDivision) -> f64 {
        ratio(
            self.true_positives + self.true_negatives,
            self.total(),
            zero_division,
        )
    }
}

fn ratio(num: usize, denom: usize, zero_division: ZeroDivision) -> f64 {
    if denom == 0 {
        zero_division.value()
    } else {
        num as f64 / denom as f64
    }
}

/// F-beta from precision and recall
///
/// F = (1 + b²) · P · R / (b² · P + R)
pub fn fbeta_score(precision: f64, recall: f64, beta: f64, zero_division: ZeroDivision) -> f64 {
    let b2 = beta * beta;
    let denom = b2 * precision + recall;
    if denom <= 0.0 {
        zero_division.value()
    } else {
        (1.0 + b2) * precision * recall / denom
    }
}

/// Precision / recall / F-score summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinaryMetrics {
    pub precision: f64,
    pub recall: f64,
    pub fscore: f64,
    pub accuracy: f64,
    pub confusion: ConfusionCounts,
}

impl BinaryMetrics {
    pub fn from_counts(confusion: ConfusionCounts, beta: f64, zero_division: ZeroDivision) -> Self {
        let precision = confusion.precision(zero_division);
        let recall = confusion.recall(zero_division);
        Self {
            precision,
            recall,
            fscore: fbeta_score(precision, recall, beta, zero_division),
            accuracy: confusion.accuracy(zero_division),
            confusion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_metrics() {
        // 8 TP, 2 FP, 5 TN, 2 FN
        let pairs = std::iter::repeat((true, true))
            .take(8)
            .chain(std::iter::repeat((true, false)).take(2))
            .chain(std::iter::repeat((false, false)).take(5))
            .chain(std::iter::repeat((false, true)).take(2));
        let counts = ConfusionCounts::from_pairs(pairs);
        assert_eq!(counts.total(), 17);

        let m = BinaryMetrics::from_counts(counts, 1.0, ZeroDivision::Zero);
        assert!((m.precision - 0.8).abs() < 1e-12);
        assert!((m.recall - 0.8).abs() < 1e-12);
        assert!((m.fscore - 0.8).abs() < 1e-12);
        assert!((m.accuracy - 13.0 / 17.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_division_convention() {
        let counts = ConfusionCounts {
            true_negatives: 3,
            ..Default::default()
        };
        let zero = BinaryMetrics::from_counts(counts, 1.0, ZeroDivision::Zero);
        assert_eq!((zero.precision, zero.recall, zero.fscore), (0.0, 0.0, 0.0));
        assert_eq!(zero.accuracy, 1.0);

        let one = BinaryMetrics::from_counts(counts, 1.0, ZeroDivision::One);
        assert_eq!((one.precision, one.recall, one.fscore), (1.0, 1.0, 1.0));
    }

    #[test]
    fn test_fbeta_weights_recall() {
        let f2 = fbeta_score(0.5, 1.0, 2.0, ZeroDivision::Zero);
        let f_half = fbeta_score(0.5, 1.0, 0.5, ZeroDivision::Zero);
        assert!(f2 > f_half);
        assert!((fbeta_score(1.0, 1.0, 2.0, ZeroDivision::Zero) - 1.0).abs() < 1e-12);
    }
}
