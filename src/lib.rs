//! recon-anomaly - reconstruction-error anomaly detection
//!
//! Semi-supervised detection over periodic monitoring telemetry: a
//! reconstruction model is fitted on normal records only, and a record is
//! flagged anomalous when its reconstruction error exceeds a threshold
//! calibrated on labeled validation data.
//!
//! # Modules
//!
//! ## Core
//! - [`dataset`] - Records, record sets and the tabular loader
//! - [`partition`] - Class separation and seeded train / validation / test splits
//! - [`model`] - Reconstruction model traits and the reference autoencoder
//! - [`evaluation`] - Reconstruction error and binary classification metrics
//! - [`threshold`] - Decision threshold calibration
//! - [`scoring`] - Test-set classification and scoring
//! - [`pipeline`] - End-to-end run and report
//!
//! ## Infrastructure
//! - [`config`] - Pipeline configuration
//! - [`error`] - Error taxonomy
//! - [`utils`] - Stage timing
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use recon_anomaly::prelude::*;
//!
//! # fn main() -> recon_anomaly::Result<()> {
//! let config = PipelineConfig::default();
//! let records = DataLoader::new(config.dataset.clone()).load("telemetry.csv".as_ref())?;
//!
//! let trainer = AutoencoderTrainer::new(AutoencoderConfig::default());
//! let report = DetectionPipeline::new(config, trainer).run(&records)?;
//! println!("threshold = {}", report.threshold.value());
//! # Ok(())
//! # }
//! ```

pub mod error;

pub mod dataset;
pub mod evaluation;
pub mod model;
pub mod partition;
pub mod pipeline;
pub mod scoring;
pub mod threshold;

pub mod cli;
pub mod config;
pub mod utils;

pub use error::{AnomalyError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{PipelineConfig, TrainingConfig};
    pub use crate::dataset::{DataLoader, DatasetConfig, Record, RecordSet};
    pub use crate::error::{AnomalyError, Result, Stage};
    pub use crate::evaluation::{
        reconstruction_error, BinaryMetrics, ErrorMetric, ReconstructionErrorEvaluator, ZeroDivision,
    };
    pub use crate::model::{
        AutoencoderConfig, AutoencoderTrainer, ModelTrainer, ReconstructionModel, TrainingHistory,
    };
    pub use crate::partition::{partition_by_class, split, Split, SplitConfig};
    pub use crate::pipeline::{DetectionPipeline, PipelineReport, TimelineEntry};
    pub use crate::scoring::{evaluate, Classifier, Evaluation, SubsetClass};
    pub use crate::threshold::{calibrate, CalibrationConfig, Threshold, ThresholdCalibrator};
}
