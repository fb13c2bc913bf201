//! End-to-end detection run
//!
//! Partition, train on normal data, reconstruct, calibrate and score. Each
//! stage consumes the full output of the previous one and any failure aborts
//! the run with the stage attached to the error.

use std::path::Path;

use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::dataset::RecordSet;
use crate::error::{AnomalyError, Result, Stage, StageExt};
use crate::evaluation::{BinaryMetrics, ReconstructionErrorEvaluator};
use crate::model::{ModelTrainer, ReconstructionModel, TrainingHistory};
use crate::partition::{partition_by_class, split_with, Split, SplitSizes};
use crate::scoring::{Classifier, Evaluation, SubsetClass};
use crate::threshold::{CalibrationDiagnostics, Threshold, ThresholdCalibrator};
use crate::utils::Timer;

/// One test record with its ground truth and prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Row index in the loaded table
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub actual_anomalous: bool,
    pub predicted_anomalous: bool,
}

/// Metrics of one scored test subset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetReport {
    pub class: SubsetClass,
    pub records: usize,
    pub predicted_anomalous: usize,
    pub metrics: BinaryMetrics,
}

impl From<&Evaluation> for SubsetReport {
    fn from(evaluation: &Evaluation) -> Self {
        Self {
            class: evaluation.class,
            records: evaluation.predictions.len(),
            predicted_anomalous: evaluation.n_predicted_anomalous(),
            metrics: evaluation.metrics,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSummary {
    pub normal: SplitSizes,
    pub anomalous: SplitSizes,
}

/// Mean reconstruction error per subset; `None` for an empty subset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanErrors {
    pub nd_train: Option<f64>,
    pub nd_validation: Option<f64>,
    pub nd_test: Option<f64>,
    pub ad_validation: Option<f64>,
    pub ad_test: Option<f64>,
}

/// Everything a run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub threshold: Threshold,
    pub calibration: CalibrationDiagnostics,
    pub nd_test: SubsetReport,
    pub ad_test: SubsetReport,
    pub splits: SplitSummary,
    pub training: TrainingHistory,
    pub mean_errors: MeanErrors,
    /// All test records ordered by timestamp, then row index
    pub timeline: Vec<TimelineEntry>,
    pub seed: u64,
    pub elapsed_secs: f64,
}

impl PipelineReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        info!(path = %path.display(), "Wrote report");
        Ok(())
    }
}

/// Reconstruction errors of every subset that feeds calibration or scoring
struct SubsetErrors {
    nd_train: Array1<f64>,
    nd_validation: Array1<f64>,
    nd_test: Array1<f64>,
    ad_validation: Array1<f64>,
    ad_test: Array1<f64>,
}

impl SubsetErrors {
    fn means(&self) -> MeanErrors {
        MeanErrors {
            nd_train: self.nd_train.mean(),
            nd_validation: self.nd_validation.mean(),
            nd_test: self.nd_test.mean(),
            ad_validation: self.ad_validation.mean(),
            ad_test: self.ad_test.mean(),
        }
    }
}

/// Detection pipeline driving a pluggable [`ModelTrainer`]
pub struct DetectionPipeline<T: ModelTrainer> {
    config: PipelineConfig,
    trainer: T,
}

impl<T: ModelTrainer> DetectionPipeline<T> {
    pub fn new(config: PipelineConfig, trainer: T) -> Self {
        Self { config, trainer }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run on a labeled record set and return the report
    pub fn run(&mut self, records: &RecordSet) -> Result<PipelineReport> {
        self.run_with_model(records).map(|(report, _)| report)
    }

    /// Like [`DetectionPipeline::run`], also returning the fitted model
    pub fn run_with_model(&mut self, records: &RecordSet) -> Result<(PipelineReport, T::Model)> {
        let mut timer = Timer::start("Detection pipeline");
        info!(
            records = records.len(),
            features = records.n_features(),
            anomalous = records.n_anomalous(),
            seed = self.config.seed,
            "Starting detection run"
        );

        let (nd, ad) = self.partition(records).stage(Stage::Partition)?;
        timer.checkpoint("partition");

        let training = &self.config.training;
        let (history, model) = self
            .trainer
            .train(
                &nd.train.features().to_owned(),
                &nd.validation.features().to_owned(),
                training.epochs,
                training.batch_size,
            )
            .stage(Stage::Training)?;
        info!(
            epochs = history.epochs(),
            final_loss = ?history.final_loss(),
            final_val_loss = ?history.final_val_loss(),
            "Model trained on ND train"
        );
        timer.checkpoint("training");

        let errors = self.reconstruct(&model, &nd, &ad).stage(Stage::Reconstruction)?;
        timer.checkpoint("reconstruction");

        let (threshold, calibration) = ThresholdCalibrator::new(self.config.calibration)
            .with_zero_division(self.config.zero_division)
            .calibrate(&errors.nd_validation.to_vec(), &errors.ad_validation.to_vec())
            .stage(Stage::Calibration)?;
        timer.checkpoint("calibration");

        let (nd_eval, ad_eval) = self
            .score(threshold, &nd.test, &ad.test, &errors)
            .stage(Stage::Evaluation)?;
        timer.checkpoint("evaluation");

        let timeline = build_timeline(&[(&nd.test, &nd_eval), (&ad.test, &ad_eval)]);

        let report = PipelineReport {
            threshold,
            calibration,
            nd_test: SubsetReport::from(&nd_eval),
            ad_test: SubsetReport::from(&ad_eval),
            splits: SplitSummary {
                normal: nd.sizes(),
                anomalous: ad.sizes(),
            },
            training: history,
            mean_errors: errors.means(),
            timeline,
            seed: self.config.seed,
            elapsed_secs: timer.elapsed_secs(),
        };
        timer.stop();

        Ok((report, model))
    }

    fn partition(&self, records: &RecordSet) -> Result<(Split, Split)> {
        if records.is_empty() {
            return Err(AnomalyError::EmptyInput("record set has no rows".to_string()));
        }

        let (normal, anomalous) = partition_by_class(records)?;
        if self.config.ad_split.train_pct > 0 {
            warn!(
                train_pct = self.config.ad_split.train_pct,
                "AD train percentage is non-zero; those records are never used"
            );
        }

        let nd = split_with(&normal, &self.config.nd_split, self.config.seed)?;
        let ad = split_with(&anomalous, &self.config.ad_split, self.config.seed)?;

        let (nd_sizes, ad_sizes) = (nd.sizes(), ad.sizes());
        info!(
            nd_train = nd_sizes.train,
            nd_validation = nd_sizes.validation,
            nd_test = nd_sizes.test,
            ad_validation = ad_sizes.validation,
            ad_test = ad_sizes.test,
            "Partitioned records"
        );
        Ok((nd, ad))
    }

    fn reconstruct(&self, model: &T::Model, nd: &Split, ad: &Split) -> Result<SubsetErrors> {
        let evaluator = ReconstructionErrorEvaluator::new(self.config.error_metric)
            .with_parallel(self.config.parallel_errors);

        let errors_of = |set: &RecordSet| -> Result<Array1<f64>> {
            if set.is_empty() {
                return Ok(Array1::zeros(0));
            }
            let original = set.features().to_owned();
            let reconstructed = model.predict(&original)?;
            evaluator.evaluate(original.view(), reconstructed.view())
        };

        Ok(SubsetErrors {
            nd_train: errors_of(&nd.train)?,
            nd_validation: errors_of(&nd.validation)?,
            nd_test: errors_of(&nd.test)?,
            ad_validation: errors_of(&ad.validation)?,
            ad_test: errors_of(&ad.test)?,
        })
    }

    fn score(
        &self,
        threshold: Threshold,
        nd_test: &RecordSet,
        ad_test: &RecordSet,
        errors: &SubsetErrors,
    ) -> Result<(Evaluation, Evaluation)> {
        let classifier = Classifier::new(threshold)
            .with_beta(self.config.calibration.objective.beta())
            .with_zero_division(self.config.zero_division);

        for (name, set) in [("ND test", nd_test), ("AD test", ad_test)] {
            if set.is_empty() {
                warn!(subset = name, "Test subset is empty, its metrics are degenerate");
            }
        }

        let nd_eval = classifier.evaluate_records(nd_test, errors.nd_test.view(), SubsetClass::Normal)?;
        let ad_eval =
            classifier.evaluate_records(ad_test, errors.ad_test.view(), SubsetClass::Anomalous)?;

        info!(
            false_positives = nd_eval.metrics.confusion.false_positives,
            accuracy = nd_eval.metrics.accuracy,
            "ND test scored"
        );
        info!(
            precision = ad_eval.precision(),
            recall = ad_eval.recall(),
            fscore = ad_eval.fscore(),
            "AD test scored"
        );
        Ok((nd_eval, ad_eval))
    }
}

fn build_timeline(subsets: &[(&RecordSet, &Evaluation)]) -> Vec<TimelineEntry> {
    let mut timeline: Vec<TimelineEntry> = subsets
        .iter()
        .flat_map(|&(set, eval)| {
            set.indices()
                .iter()
                .zip(set.timestamps())
                .zip(set.labels())
                .zip(&eval.predictions)
                .map(|(((&index, &timestamp), &actual), &predicted)| TimelineEntry {
                    index,
                    timestamp,
                    actual_anomalous: actual,
                    predicted_anomalous: predicted,
                })
        })
        .collect();

    timeline.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.index.cmp(&b.index)));
    timeline
}
