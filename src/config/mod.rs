//! Pipeline configuration
//!
//! One explicit object carrying every tunable of a detection run. Each stage
//! receives the part it needs; nothing is read from ambient state.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetConfig;
use crate::error::{AnomalyError, Result};
use crate::evaluation::{ErrorMetric, ZeroDivision};
use crate::partition::SplitConfig;
use crate::threshold::CalibrationConfig;

/// Training loop settings passed to the model trainer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 128,
            batch_size: 128,
        }
    }
}

/// Full configuration of a detection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset: DatasetConfig,
    /// Split of normal records
    pub nd_split: SplitConfig,
    /// Split of anomalous records; the train block is never used
    pub ad_split: SplitConfig,
    /// Seed for both class splits
    pub seed: u64,
    pub training: TrainingConfig,
    pub error_metric: ErrorMetric,
    /// Compute reconstruction errors on the rayon pool
    pub parallel_errors: bool,
    pub calibration: CalibrationConfig,
    /// Metric value for zero denominators, in calibration and scoring alike
    pub zero_division: ZeroDivision,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            nd_split: SplitConfig::normal_default(),
            ad_split: SplitConfig::anomalous_default(),
            seed: 42,
            training: TrainingConfig::default(),
            error_metric: ErrorMetric::default(),
            parallel_errors: false,
            calibration: CalibrationConfig::default(),
            zero_division: ZeroDivision::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, dataset: DatasetConfig) -> Self {
        self.dataset = dataset;
        self
    }

    pub fn with_nd_split(mut self, split: SplitConfig) -> Self {
        self.nd_split = split;
        self
    }

    pub fn with_ad_split(mut self, split: SplitConfig) -> Self {
        self.ad_split = split;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.training.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.training.batch_size = batch_size;
        self
    }

    pub fn with_error_metric(mut self, metric: ErrorMetric) -> Self {
        self.error_metric = metric;
        self
    }

    pub fn with_parallel_errors(mut self, parallel: bool) -> Self {
        self.parallel_errors = parallel;
        self
    }

    pub fn with_calibration(mut self, calibration: CalibrationConfig) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_zero_division(mut self, zero_division: ZeroDivision) -> Self {
        self.zero_division = zero_division;
        self
    }

    /// Check every section; split errors keep their `InvalidSplitConfig` kind
    pub fn validate(&self) -> Result<()> {
        self.nd_split
            .validate()
            .map_err(|e| prefix_split_error("ND split", e))?;
        self.ad_split
            .validate()
            .map_err(|e| prefix_split_error("AD split", e))?;

        if self.training.epochs == 0 {
            return Err(AnomalyError::ConfigError("training.epochs must be at least 1".to_string()));
        }
        if self.training.batch_size == 0 {
            return Err(AnomalyError::ConfigError(
                "training.batch_size must be at least 1".to_string(),
            ));
        }
        if self.dataset.label_column == self.dataset.timestamp_column {
            return Err(AnomalyError::ConfigError(format!(
                "label and timestamp column are both '{}'",
                self.dataset.label_column
            )));
        }

        self.calibration.validate()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn prefix_split_error(which: &str, err: AnomalyError) -> AnomalyError {
    match err {
        AnomalyError::InvalidSplitConfig(msg) => {
            AnomalyError::InvalidSplitConfig(format!("{}: {}", which, msg))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::CandidateStrategy;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.nd_split, SplitConfig::new(60, 10, 30));
        assert_eq!(config.ad_split, SplitConfig::new(0, 30, 70));
        assert_eq!(config.seed, 42);
        assert_eq!(config.training.epochs, 128);
        assert_eq!(config.training.batch_size, 128);
        assert_eq!(config.dataset.label_column, "nagiosdrained");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = PipelineConfig::default()
            .with_seed(7)
            .with_calibration(
                CalibrationConfig::default().with_strategy(CandidateStrategy::Linspace { n_points: 200 }),
            );
        let json = config.to_json().unwrap();
        assert_eq!(PipelineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json(r#"{"seed": 3, "training": {"epochs": 10}}"#).unwrap();
        assert_eq!(config.seed, 3);
        assert_eq!(config.training.epochs, 10);
        assert_eq!(config.training.batch_size, 128);
        assert_eq!(config.nd_split, SplitConfig::normal_default());
    }

    #[test]
    fn test_invalid_split_rejected() {
        let config = PipelineConfig::default().with_ad_split(SplitConfig::new(10, 50, 50));
        match config.validate() {
            Err(AnomalyError::InvalidSplitConfig(msg)) => assert!(msg.starts_with("AD split")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_zero_epochs_rejected() {
        let config = PipelineConfig::default().with_epochs(0);
        assert!(matches!(config.validate(), Err(AnomalyError::ConfigError(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"nd_split": {"train_pct": 70, "val_pct": 10, "test_pct": 20}}"#).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.nd_split, SplitConfig::new(70, 10, 20));
    }
}
