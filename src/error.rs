//! Error types for the reconstruction-error anomaly detection pipeline

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, AnomalyError>;

/// Pipeline stage that raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Partition,
    Training,
    Reconstruction,
    Calibration,
    Evaluation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Partition => "partition",
            Stage::Training => "training",
            Stage::Reconstruction => "reconstruction",
            Stage::Calibration => "calibration",
            Stage::Evaluation => "evaluation",
        };
        f.write_str(name)
    }
}

/// Main error type
#[derive(Error, Debug)]
pub enum AnomalyError {
    #[error("Invalid split configuration: {0}")]
    InvalidSplitConfig(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("Insufficient calibration data: {0}")]
    InsufficientCalibrationData(String),

    #[error("Mixed labels: {0}")]
    MixedLabels(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<AnomalyError>,
    },
}

impl AnomalyError {
    /// Shorthand for a shape mismatch
    pub fn shape(
        context: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        AnomalyError::ShapeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Attach the pipeline stage to an error. Already-tagged errors are kept as is.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            tagged @ AnomalyError::Stage { .. } => tagged,
            other => AnomalyError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage that raised the error, if known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            AnomalyError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying error with any stage tag removed
    pub fn root_cause(&self) -> &AnomalyError {
        match self {
            AnomalyError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<polars::prelude::PolarsError> for AnomalyError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        AnomalyError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for AnomalyError {
    fn from(err: serde_json::Error) -> Self {
        AnomalyError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for AnomalyError {
    fn from(err: ndarray::ShapeError) -> Self {
        AnomalyError::ShapeMismatch {
            context: "array construction".to_string(),
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

/// Tag the error of a fallible stage with its [`Stage`]
pub(crate) trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.in_stage(stage))
    }
}
