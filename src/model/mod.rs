//! Reconstruction models
//!
//! The pipeline only depends on [`ModelTrainer`] and [`ReconstructionModel`].
//! [`AutoencoderTrainer`] is the bundled dense autoencoder; any other
//! implementation (an external framework, a mock in tests) can be plugged in.

mod autoencoder;
mod scaler;

pub use autoencoder::{Activation, AutoencoderConfig, AutoencoderTrainer, DenseAutoencoder};
pub use scaler::MinMaxScaler;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Per-epoch loss sequences, consumed for reporting only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub loss: Vec<f64>,
    pub val_loss: Vec<f64>,
}

impl TrainingHistory {
    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.loss.last().copied()
    }

    pub fn final_val_loss(&self) -> Option<f64> {
        self.val_loss.last().copied()
    }
}

/// A fitted model mapping feature rows to their reconstruction
pub trait ReconstructionModel: Send + Sync {
    /// Reconstruct `x`; the output has the same shape
    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Width of the feature vectors the model was fitted on
    fn n_features(&self) -> usize;
}

/// Trains a reconstruction model on normal data only
pub trait ModelTrainer {
    type Model: ReconstructionModel;

    /// Fit on `train`; `validation` is used for the validation loss only
    fn train(
        &mut self,
        train: &Array2<f64>,
        validation: &Array2<f64>,
        epochs: usize,
        batch_size: usize,
    ) -> Result<(TrainingHistory, Self::Model)>;
}
