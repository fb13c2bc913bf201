//! Dense autoencoder trained with mini-batch SGD
//!
//! A symmetric feedforward network whose target is its own input. Hidden layers
//! use the configured activation, the output layer is linear, the loss is the
//! mean squared reconstruction error.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{MinMaxScaler, ModelTrainer, ReconstructionModel, TrainingHistory};
use crate::error::{AnomalyError, Result};

/// Activation function for hidden layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    ReLU,
    Sigmoid,
    Tanh,
    Linear,
}

impl Default for Activation {
    fn default() -> Self {
        Self::ReLU
    }
}

impl Activation {
    fn apply(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => z.mapv(|v| v.tanh()),
            Activation::Linear => z.clone(),
        }
    }

    fn derivative(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Sigmoid => {
                let sig = self.apply(z);
                &sig * &(1.0 - &sig)
            }
            Activation::Tanh => {
                let t = z.mapv(|v| v.tanh());
                1.0 - &t * &t
            }
            Activation::Linear => Array2::ones(z.raw_dim()),
        }
    }
}

/// Autoencoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoencoderConfig {
    /// Hidden layer sizes; empty derives `[n/2, n/4, n/2]` from the input width
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    pub learning_rate: f64,
    pub momentum: f64,
    /// L2 regularization
    pub alpha: f64,
    pub random_state: Option<u64>,
    /// Stop after this many epochs without validation improvement
    pub early_stopping_patience: Option<usize>,
    /// Minimum validation loss decrease that counts as an improvement
    pub early_stopping_min_delta: f64,
    /// Min-max scale inputs with a scaler fitted on the training rows
    pub scale_inputs: bool,
}

impl Default for AutoencoderConfig {
    fn default() -> Self {
        Self {
            hidden_layers: Vec::new(),
            activation: Activation::ReLU,
            learning_rate: 0.01,
            momentum: 0.9,
            alpha: 0.0001,
            random_state: Some(42),
            early_stopping_patience: None,
            early_stopping_min_delta: 0.0,
            scale_inputs: true,
        }
    }
}

impl AutoencoderConfig {
    pub fn with_hidden_layers(mut self, layers: Vec<usize>) -> Self {
        self.hidden_layers = layers;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_early_stopping(mut self, patience: usize) -> Self {
        self.early_stopping_patience = Some(patience);
        self
    }

    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.early_stopping_min_delta = min_delta;
        self
    }

    fn layer_sizes(&self, n_features: usize) -> Vec<usize> {
        let hidden = if self.hidden_layers.is_empty() {
            let wide = (n_features / 2).max(1);
            let code = (n_features / 4).max(1);
            vec![wide, code, wide]
        } else {
            self.hidden_layers.clone()
        };

        let mut sizes = Vec::with_capacity(hidden.len() + 2);
        sizes.push(n_features);
        sizes.extend(hidden);
        sizes.push(n_features);
        sizes
    }

    fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(AnomalyError::InvalidParameter {
                name: "learning_rate".to_string(),
                value: self.learning_rate.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(AnomalyError::InvalidParameter {
                name: "momentum".to_string(),
                value: self.momentum.to_string(),
                reason: "must be in [0, 1)".to_string(),
            });
        }
        if !(self.early_stopping_min_delta.is_finite() && self.early_stopping_min_delta >= 0.0) {
            return Err(AnomalyError::InvalidParameter {
                name: "early_stopping_min_delta".to_string(),
                value: self.early_stopping_min_delta.to_string(),
                reason: "must be finite and non-negative".to_string(),
            });
        }
        if self.hidden_layers.contains(&0) {
            return Err(AnomalyError::InvalidParameter {
                name: "hidden_layers".to_string(),
                value: format!("{:?}", self.hidden_layers),
                reason: "layer sizes must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Fitted dense autoencoder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseAutoencoder {
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    activation: Activation,
    scaler: Option<MinMaxScaler>,
    n_features: usize,
}

impl DenseAutoencoder {
    /// Layer widths including input and output
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![self.n_features];
        sizes.extend(self.biases.iter().map(|b| b.len()));
        sizes
    }

    fn forward(&self, x: &Array2<f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let n_layers = self.weights.len();
        let mut activations = Vec::with_capacity(n_layers + 1);
        let mut z_values = Vec::with_capacity(n_layers);
        activations.push(x.clone());

        for (i, (w, b)) in self.weights.iter().zip(self.biases.iter()).enumerate() {
            let z = activations[i].dot(w) + b;
            let a = if i < n_layers - 1 {
                self.activation.apply(&z)
            } else {
                z.clone() // linear output
            };
            z_values.push(z);
            activations.push(a);
        }

        (activations, z_values)
    }

    /// Gradients of half the squared error, averaged over the batch rows
    fn backward(
        &self,
        target: &Array2<f64>,
        activations: &[Array2<f64>],
        z_values: &[Array2<f64>],
    ) -> Vec<(Array2<f64>, Array1<f64>)> {
        let n = target.nrows().max(1) as f64;
        let output = &activations[activations.len() - 1];
        let mut delta = (output - target) / n;
        let mut gradients = Vec::with_capacity(self.weights.len());

        for i in (0..self.weights.len()).rev() {
            let grad_w = activations[i].t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));
            gradients.push((grad_w, grad_b));

            if i > 0 {
                delta = delta.dot(&self.weights[i].t()) * self.activation.derivative(&z_values[i - 1]);
            }
        }

        gradients.reverse();
        gradients
    }

    /// Forward pass in scaled space
    fn reconstruct_scaled(&self, x: &Array2<f64>) -> Array2<f64> {
        let (mut activations, _) = self.forward(x);
        activations.pop().unwrap_or_else(|| x.clone())
    }

    fn mse(&self, x: &Array2<f64>) -> f64 {
        if x.is_empty() {
            return f64::NAN;
        }
        let recon = self.reconstruct_scaled(x);
        (&recon - x).mapv(|v| v * v).mean().unwrap_or(f64::NAN)
    }
}

impl ReconstructionModel for DenseAutoencoder {
    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features {
            return Err(AnomalyError::shape(
                "autoencoder input",
                format!("{} features", self.n_features),
                format!("{} features", x.ncols()),
            ));
        }

        match &self.scaler {
            Some(scaler) => {
                let scaled = scaler.transform(x)?;
                scaler.inverse_transform(&self.reconstruct_scaled(&scaled))
            }
            None => Ok(self.reconstruct_scaled(x)),
        }
    }

    fn n_features(&self) -> usize {
        self.n_features
    }
}

/// Trains [`DenseAutoencoder`] models
#[derive(Debug, Clone, Default)]
pub struct AutoencoderTrainer {
    config: AutoencoderConfig,
}

impl AutoencoderTrainer {
    pub fn new(config: AutoencoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AutoencoderConfig {
        &self.config
    }

    fn initialize(&self, n_features: usize, rng: &mut Xoshiro256PlusPlus) -> (Vec<Array2<f64>>, Vec<Array1<f64>>) {
        let sizes = self.config.layer_sizes(n_features);
        let mut weights = Vec::with_capacity(sizes.len() - 1);
        let mut biases = Vec::with_capacity(sizes.len() - 1);

        for pair in sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            // Xavier/Glorot initialization
            let scale = (2.0 / (n_in + n_out) as f64).sqrt();
            weights.push(Array2::from_shape_fn((n_in, n_out), |_| {
                rng.gen::<f64>() * 2.0 * scale - scale
            }));
            biases.push(Array1::zeros(n_out));
        }

        (weights, biases)
    }
}

impl ModelTrainer for AutoencoderTrainer {
    type Model = DenseAutoencoder;

    fn train(
        &mut self,
        train: &Array2<f64>,
        validation: &Array2<f64>,
        epochs: usize,
        batch_size: usize,
    ) -> Result<(TrainingHistory, DenseAutoencoder)> {
        self.config.validate()?;
        if train.nrows() == 0 {
            return Err(AnomalyError::EmptyInput("autoencoder training set".to_string()));
        }
        if epochs == 0 || batch_size == 0 {
            return Err(AnomalyError::InvalidParameter {
                name: "epochs/batch_size".to_string(),
                value: format!("{}/{}", epochs, batch_size),
                reason: "must both be at least 1".to_string(),
            });
        }
        let n_features = train.ncols();
        if validation.ncols() != n_features {
            return Err(AnomalyError::shape(
                "autoencoder validation set",
                format!("{} features", n_features),
                format!("{} features", validation.ncols()),
            ));
        }

        let scaler = if self.config.scale_inputs {
            Some(MinMaxScaler::fit(train)?)
        } else {
            None
        };
        let (x_train, x_val) = match &scaler {
            Some(s) => (s.transform(train)?, s.transform(validation)?),
            None => (train.clone(), validation.clone()),
        };

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        let (weights, biases) = self.initialize(n_features, &mut rng);
        let mut model = DenseAutoencoder {
            weights,
            biases,
            activation: self.config.activation,
            scaler,
            n_features,
        };

        let mut velocities_w: Vec<Array2<f64>> =
            model.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect();
        let mut velocities_b: Vec<Array1<f64>> =
            model.biases.iter().map(|b| Array1::zeros(b.len())).collect();

        let lr = self.config.learning_rate;
        let momentum = self.config.momentum;
        let decay = 1.0 - self.config.alpha * lr;

        let mut history = TrainingHistory::default();
        let mut best: Option<(f64, Vec<Array2<f64>>, Vec<Array1<f64>>)> = None;
        let mut patience_counter = 0;
        let n_train = x_train.nrows();

        for epoch in 0..epochs {
            let mut indices: Vec<usize> = (0..n_train).collect();
            indices.shuffle(&mut rng);

            for batch in indices.chunks(batch_size) {
                let x_batch = x_train.select(Axis(0), batch);
                let (activations, z_values) = model.forward(&x_batch);
                let gradients = model.backward(&x_batch, &activations, &z_values);

                for (i, (grad_w, grad_b)) in gradients.into_iter().enumerate() {
                    velocities_w[i] = &velocities_w[i] * momentum - &grad_w * lr;
                    velocities_b[i] = &velocities_b[i] * momentum - &grad_b * lr;

                    model.weights[i] = (&model.weights[i] + &velocities_w[i]) * decay;
                    model.biases[i] = &model.biases[i] + &velocities_b[i];
                }
            }

            let loss = model.mse(&x_train);
            if !loss.is_finite() {
                return Err(AnomalyError::TrainingError(format!(
                    "training loss diverged at epoch {}",
                    epoch + 1
                )));
            }
            history.loss.push(loss);

            if x_val.nrows() > 0 {
                let val_loss = model.mse(&x_val);
                history.val_loss.push(val_loss);
                debug!(epoch = epoch + 1, loss, val_loss, "Autoencoder epoch");

                if let Some(patience) = self.config.early_stopping_patience {
                    let min_delta = self.config.early_stopping_min_delta;
                    let improved = best
                        .as_ref()
                        .map_or(true, |(b, _, _)| val_loss < *b - min_delta);
                    if improved {
                        best = Some((val_loss, model.weights.clone(), model.biases.clone()));
                        patience_counter = 0;
                    } else {
                        patience_counter += 1;
                        if patience_counter >= patience {
                            debug!(epoch = epoch + 1, "Early stopping");
                            break;
                        }
                    }
                }
            } else {
                debug!(epoch = epoch + 1, loss, "Autoencoder epoch");
            }
        }

        if let Some((_, weights, biases)) = best {
            model.weights = weights;
            model.biases = biases;
        }

        info!(
            epochs = history.epochs(),
            layers = ?model.layer_sizes(),
            final_loss = ?history.final_loss(),
            final_val_loss = ?history.final_val_loss(),
            "Trained autoencoder"
        );

        Ok((history, model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal_data(n: usize) -> Array2<f64> {
        // Two latent factors spread over four correlated metrics
        Array2::from_shape_fn((n, 4), |(r, c)| {
            let a = (r as f64 * 0.37).sin();
            let b = (r as f64 * 0.11).cos();
            match c {
                0 => 10.0 + a,
                1 => 20.0 + 2.0 * a,
                2 => 5.0 + b,
                _ => 1.0 + a + b,
            }
        })
    }

    #[test]
    fn test_training_reduces_loss() {
        let x = normal_data(64);
        let val = normal_data(16);
        let mut trainer = AutoencoderTrainer::new(AutoencoderConfig::default());
        let (history, model) = trainer.train(&x, &val, 50, 16).unwrap();

        assert_eq!(history.epochs(), 50);
        assert_eq!(history.val_loss.len(), 50);
        assert!(history.loss.last().unwrap() < history.loss.first().unwrap());
        assert_eq!(model.layer_sizes(), vec![4, 2, 1, 2, 4]);
    }

    #[test]
    fn test_predict_shape_and_units() {
        let x = normal_data(32);
        let mut trainer = AutoencoderTrainer::default();
        let (_, model) = trainer.train(&x, &Array2::zeros((0, 4)), 5, 8).unwrap();

        let recon = model.predict(&x).unwrap();
        assert_eq!(recon.dim(), x.dim());
        assert!(recon.iter().all(|v| v.is_finite()));
        assert!(model.predict(&Array2::zeros((3, 2))).is_err());
    }

    #[test]
    fn test_deterministic_with_seed() {
        let x = normal_data(40);
        let config = AutoencoderConfig::default().with_random_state(7);
        let (h1, m1) = AutoencoderTrainer::new(config.clone()).train(&x, &x, 10, 8).unwrap();
        let (h2, m2) = AutoencoderTrainer::new(config).train(&x, &x, 10, 8).unwrap();

        assert_eq!(h1, h2);
        assert_eq!(m1.predict(&x).unwrap(), m2.predict(&x).unwrap());
    }

    /// Validation loss of `model` in its scaled space
    fn scaled_val_loss(model: &DenseAutoencoder, val: &Array2<f64>) -> f64 {
        let scaled = model.scaler.as_ref().unwrap().transform(val).unwrap();
        model.mse(&scaled)
    }

    #[test]
    fn test_early_stopping_stops_and_restores_first_epoch() {
        let x = normal_data(40);
        // No later epoch can beat the first one by this margin
        let config = AutoencoderConfig::default()
            .with_early_stopping(2)
            .with_min_delta(1e6);
        let (history, model) = AutoencoderTrainer::new(config).train(&x, &x, 100, 8).unwrap();

        assert_eq!(history.epochs(), 3);
        assert_eq!(history.val_loss.len(), 3);
        assert_eq!(scaled_val_loss(&model, &x), history.val_loss[0]);
    }

    #[test]
    fn test_early_stopping_restores_best_weights() {
        let x = normal_data(40);
        // Validation rows far outside the training range
        let val = normal_data(20).mapv(|v| -3.0 * v + 50.0);
        let config = AutoencoderConfig::default().with_early_stopping(5);
        let (history, model) = AutoencoderTrainer::new(config).train(&x, &val, 60, 8).unwrap();

        let best = history.val_loss.iter().copied().fold(f64::INFINITY, f64::min);
        assert!(history.epochs() <= 60);
        assert_eq!(scaled_val_loss(&model, &val), best);
    }

    #[test]
    fn test_negative_min_delta_rejected() {
        let x = normal_data(8);
        let config = AutoencoderConfig::default().with_min_delta(-1.0);
        assert!(matches!(
            AutoencoderTrainer::new(config).train(&x, &x, 5, 4),
            Err(AnomalyError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_invalid_training_inputs() {
        let mut trainer = AutoencoderTrainer::default();
        let empty = Array2::zeros((0, 3));
        assert!(matches!(
            trainer.train(&empty, &empty, 5, 4),
            Err(AnomalyError::EmptyInput(_))
        ));

        let x = normal_data(8);
        assert!(matches!(
            trainer.train(&x, &Array2::zeros((2, 3)), 5, 4),
            Err(AnomalyError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            trainer.train(&x, &x, 0, 4),
            Err(AnomalyError::InvalidParameter { .. })
        ));
    }
}
