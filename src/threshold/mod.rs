//! Decision threshold calibration
//!
//! Scans candidate thresholds over the validation error distributions and keeps
//! the one that best separates normal (negative) from anomalous (positive)
//! records. A record is predicted anomalous when its error is strictly greater
//! than the threshold. Ties on the objective resolve to the smallest threshold.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AnomalyError, Result};
use crate::evaluation::{BinaryMetrics, ConfusionCounts, ZeroDivision};

/// Scalar decision boundary on reconstruction error
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(AnomalyError::InvalidParameter {
                name: "threshold".to_string(),
                value: value.to_string(),
                reason: "must be finite".to_string(),
            });
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// `error > threshold`
    pub fn is_exceeded_by(&self, error: f64) -> bool {
        error > self.0
    }
}

/// How candidate thresholds are generated
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStrategy {
    /// Midpoints between consecutive distinct observed errors, plus one
    /// candidate below the minimum and one at the maximum
    Midpoints,
    /// Evenly spaced candidates spanning the observed error range
    Linspace { n_points: usize },
}

impl Default for CandidateStrategy {
    fn default() -> Self {
        CandidateStrategy::Midpoints
    }
}

/// Score maximised during calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    F1,
    /// beta > 1 favours recall, beta < 1 favours precision
    FBeta { beta: f64 },
}

impl Default for Objective {
    fn default() -> Self {
        Objective::F1
    }
}

impl Objective {
    pub fn beta(&self) -> f64 {
        match self {
            Objective::F1 => 1.0,
            Objective::FBeta { beta } => *beta,
        }
    }
}

/// Calibration settings
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub strategy: CandidateStrategy,
    pub objective: Objective,
    /// Keep the score of every candidate in the diagnostics
    pub keep_curve: bool,
}

impl CalibrationConfig {
    pub fn with_strategy(mut self, strategy: CandidateStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_curve(mut self, keep: bool) -> Self {
        self.keep_curve = keep;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let CandidateStrategy::Linspace { n_points } = self.strategy {
            if n_points < 2 {
                return Err(AnomalyError::InvalidParameter {
                    name: "n_points".to_string(),
                    value: n_points.to_string(),
                    reason: "linspace needs at least 2 candidates".to_string(),
                });
            }
        }
        let beta = self.objective.beta();
        if !(beta.is_finite() && beta > 0.0) {
            return Err(AnomalyError::InvalidParameter {
                name: "beta".to_string(),
                value: beta.to_string(),
                reason: "must be a positive finite number".to_string(),
            });
        }
        Ok(())
    }
}

/// Score of one candidate threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdScore {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub fscore: f64,
}

/// Operating point reached by the chosen threshold. Reporting only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDiagnostics {
    pub metrics: BinaryMetrics,
    pub candidates_evaluated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curve: Option<Vec<ThresholdScore>>,
}

/// Selects a threshold from ND / AD validation errors
#[derive(Debug, Clone, Default)]
pub struct ThresholdCalibrator {
    config: CalibrationConfig,
    zero_division: ZeroDivision,
}

impl ThresholdCalibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            zero_division: ZeroDivision::default(),
        }
    }

    pub fn with_zero_division(mut self, zero_division: ZeroDivision) -> Self {
        self.zero_division = zero_division;
        self
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Pick the threshold maximising the objective on the validation errors.
    ///
    /// Both sets must be non-empty and finite, otherwise
    /// `InsufficientCalibrationData` is returned.
    pub fn calibrate(
        &self,
        nd_errors: &[f64],
        ad_errors: &[f64],
    ) -> Result<(Threshold, CalibrationDiagnostics)> {
        self.config.validate()?;
        let nd = sorted_errors(nd_errors, "ND-validation")?;
        let ad = sorted_errors(ad_errors, "AD-validation")?;

        let candidates = self.candidates(&nd, &ad);
        let beta = self.config.objective.beta();
        let mut curve = self.config.keep_curve.then(|| Vec::with_capacity(candidates.len()));
        let mut best: Option<(f64, BinaryMetrics)> = None;

        for &t in &candidates {
            let metrics = self.score(&nd, &ad, t, beta);

            if let Some(curve) = curve.as_mut() {
                curve.push(ThresholdScore {
                    threshold: t,
                    precision: metrics.precision,
                    recall: metrics.recall,
                    fscore: metrics.fscore,
                });
            }

            // Candidates are ascending: strict improvement keeps the smallest maximiser
            let improves = best
                .as_ref()
                .map_or(true, |(_, current)| metrics.fscore > current.fscore);
            if improves {
                best = Some((t, metrics));
            }
        }

        let (value, metrics) = best.ok_or_else(|| {
            AnomalyError::InsufficientCalibrationData("no candidate thresholds".to_string())
        })?;

        debug!(candidates = candidates.len(), "Scanned threshold candidates");
        info!(
            threshold = value,
            precision = metrics.precision,
            recall = metrics.recall,
            fscore = metrics.fscore,
            "Calibrated threshold"
        );

        Ok((
            Threshold::new(value)?,
            CalibrationDiagnostics {
                metrics,
                candidates_evaluated: candidates.len(),
                curve,
            },
        ))
    }

    fn score(&self, nd: &[f64], ad: &[f64], t: f64, beta: f64) -> BinaryMetrics {
        let false_positives = nd.len() - nd.partition_point(|&e| e <= t);
        let true_positives = ad.len() - ad.partition_point(|&e| e <= t);
        let confusion = ConfusionCounts {
            true_positives,
            false_positives,
            true_negatives: nd.len() - false_positives,
            false_negatives: ad.len() - true_positives,
        };
        BinaryMetrics::from_counts(confusion, beta, self.zero_division)
    }

    /// Ascending candidate thresholds
    fn candidates(&self, nd: &[f64], ad: &[f64]) -> Vec<f64> {
        let lo = nd[0].min(ad[0]);
        let hi = nd[nd.len() - 1].max(ad[ad.len() - 1]);

        match self.config.strategy {
            CandidateStrategy::Linspace { n_points } => {
                if hi <= lo {
                    return vec![lo];
                }
                let step = (hi - lo) / (n_points - 1) as f64;
                (0..n_points)
                    .map(|i| if i == n_points - 1 { hi } else { lo + step * i as f64 })
                    .collect()
            }
            CandidateStrategy::Midpoints => {
                let mut distinct: Vec<f64> = nd.iter().chain(ad.iter()).copied().collect();
                distinct.sort_by(f64::total_cmp);
                distinct.dedup();

                let lead = match distinct.get(1) {
                    Some(&second) => (second - distinct[0]) / 2.0,
                    None => 0.5 * distinct[0].abs().max(1.0),
                };

                let mut candidates = Vec::with_capacity(distinct.len() + 1);
                let below = distinct[0] - lead;
                candidates.push(if below < distinct[0] { below } else { next_below(distinct[0]) });
                // A rounded midpoint may land on w[1]; w[0] still separates the pair
                candidates.extend(distinct.windows(2).map(|w| {
                    let mid = w[0] + (w[1] - w[0]) / 2.0;
                    if mid < w[1] {
                        mid
                    } else {
                        w[0]
                    }
                }));
                candidates.push(distinct[distinct.len() - 1]);
                candidates
            }
        }
    }
}

/// Calibrate with the default midpoint scan and F1
pub fn calibrate(nd_errors: &[f64], ad_errors: &[f64]) -> Result<(Threshold, CalibrationDiagnostics)> {
    ThresholdCalibrator::default().calibrate(nd_errors, ad_errors)
}

/// Largest float strictly below a finite `x`
fn next_below(x: f64) -> f64 {
    if x == 0.0 {
        -f64::from_bits(1)
    } else if x > 0.0 {
        f64::from_bits(x.to_bits() - 1)
    } else {
        f64::from_bits(x.to_bits() + 1)
    }
}

fn sorted_errors(errors: &[f64], what: &str) -> Result<Vec<f64>> {
    if errors.is_empty() {
        return Err(AnomalyError::InsufficientCalibrationData(format!(
            "{} errors are empty, both classes are required",
            what
        )));
    }
    if let Some(bad) = errors.iter().find(|e| !e.is_finite()) {
        return Err(AnomalyError::InsufficientCalibrationData(format!(
            "{} errors contain non-finite value {}",
            what, bad
        )));
    }
    let mut sorted = errors.to_vec();
    sorted.sort_by(f64::total_cmp);
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separable_validation_sets() {
        let (threshold, diag) = calibrate(&[0.1, 0.2, 0.15], &[0.9, 0.8, 0.95]).unwrap();
        assert!(threshold.value() > 0.2 && threshold.value() < 0.8);
        assert_eq!(diag.metrics.fscore, 1.0);
        assert_eq!(diag.metrics.confusion.false_positives, 0);
        assert_eq!(diag.metrics.confusion.false_negatives, 0);
    }

    #[test]
    fn test_overlapping_sets() {
        // Best operating point flags all AD and the 0.5 ND record
        let nd = [0.1, 0.2, 0.3, 0.5];
        let ad = [0.5, 0.7, 0.8, 0.9];
        let (threshold, diag) = calibrate(&nd, &ad).unwrap();

        assert!(threshold.value() > 0.3 && threshold.value() < 0.5);
        assert_eq!(diag.metrics.confusion.true_positives, 4);
        assert_eq!(diag.metrics.confusion.false_positives, 1);
        assert!((diag.metrics.fscore - 8.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_below_minimum_candidate() {
        // Flagging everything (threshold below 2.0) beats any other cut
        let nd = [3.0];
        let ad = [2.0, 4.0];
        let (threshold, diag) = calibrate(&nd, &ad).unwrap();
        assert!((diag.metrics.fscore - 0.8).abs() < 1e-12);
        assert!(threshold.value() < 2.0);
    }

    #[test]
    fn test_equal_scores_pick_lowest() {
        // Every grid point in [0.2, 0.8) reaches F=1
        let calibrator = ThresholdCalibrator::new(
            CalibrationConfig::default()
                .with_strategy(CandidateStrategy::Linspace { n_points: 1000 })
                .with_curve(true),
        );
        let (threshold, diag) = calibrator.calibrate(&[0.1, 0.2, 0.15], &[0.9, 0.8, 0.95]).unwrap();
        let curve = diag.curve.unwrap();
        let first_best = curve.iter().find(|s| s.fscore == 1.0).unwrap();

        assert!(curve.iter().filter(|s| s.fscore == 1.0).count() > 1);
        assert_eq!(threshold.value(), first_best.threshold);
        assert!(threshold.value() < 0.21);
    }

    #[test]
    fn test_linspace_strategy() {
        let calibrator = ThresholdCalibrator::new(
            CalibrationConfig::default().with_strategy(CandidateStrategy::Linspace { n_points: 1000 }),
        );
        let (threshold, diag) = calibrator.calibrate(&[0.1, 0.2, 0.15], &[0.9, 0.8, 0.95]).unwrap();
        assert_eq!(diag.candidates_evaluated, 1000);
        assert_eq!(diag.metrics.fscore, 1.0);
        assert!(threshold.value() >= 0.2 && threshold.value() < 0.8);
    }

    #[test]
    fn test_fbeta_objective_prefers_recall() {
        let nd = [0.1, 0.2, 0.6, 0.65];
        let ad = [0.3, 0.7, 0.8];
        let f1 = calibrate(&nd, &ad).unwrap().1.metrics;
        let f2 = ThresholdCalibrator::new(
            CalibrationConfig::default().with_objective(Objective::FBeta { beta: 3.0 }),
        )
        .calibrate(&nd, &ad)
        .unwrap()
        .1
        .metrics;
        assert!(f2.recall >= f1.recall);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(matches!(
            calibrate(&[], &[0.5]),
            Err(AnomalyError::InsufficientCalibrationData(_))
        ));
        assert!(matches!(
            calibrate(&[0.5], &[]),
            Err(AnomalyError::InsufficientCalibrationData(_))
        ));
        assert!(matches!(
            calibrate(&[f64::NAN], &[0.5]),
            Err(AnomalyError::InsufficientCalibrationData(_))
        ));
    }

    #[test]
    fn test_invalid_linspace() {
        let calibrator = ThresholdCalibrator::new(
            CalibrationConfig::default().with_strategy(CandidateStrategy::Linspace { n_points: 1 }),
        );
        assert!(matches!(
            calibrator.calibrate(&[0.1], &[0.9]),
            Err(AnomalyError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_adjacent_floats_still_separate() {
        let a = f64::from_bits(1.0f64.to_bits() + 1);
        let b = f64::from_bits(1.0f64.to_bits() + 2);

        let (threshold, diag) = calibrate(&[a], &[b]).unwrap();
        assert_eq!(diag.metrics.fscore, 1.0);
        assert!(threshold.value() >= a && threshold.value() < b);

        let config = CalibrationConfig::default().with_curve(true);
        let (_, diag) = ThresholdCalibrator::new(config).calibrate(&[b], &[a]).unwrap();
        let curve = diag.curve.unwrap();
        assert!(curve[0].threshold < a);
        assert_eq!(curve[0].recall, 1.0);
    }

    #[test]
    fn test_next_below() {
        assert!(next_below(0.0) < 0.0);
        assert!(next_below(1.0) < 1.0);
        assert!(next_below(-1.0) < -1.0);
        assert_eq!(f64::from_bits(next_below(2.0).to_bits() + 1), 2.0);
    }

    #[test]
    fn test_threshold_semantics() {
        let t = Threshold::new(0.5).unwrap();
        assert!(t.is_exceeded_by(0.51));
        assert!(!t.is_exceeded_by(0.5));
        assert!(Threshold::new(f64::INFINITY).is_err());
    }
}
