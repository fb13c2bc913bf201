//! Reconstruction error and binary metrics
//!
//! - [`reconstruction`] turns (original, reconstructed) rows into one scalar per record
//! - [`metrics`] holds the shared precision / recall / F-score definitions used by
//!   both threshold calibration and test scoring

pub mod metrics;
pub mod reconstruction;

pub use metrics::{fbeta_score, BinaryMetrics, ConfusionCounts, ZeroDivision};
pub use reconstruction::{reconstruction_error, ErrorMetric, ReconstructionErrorEvaluator};
