//! Min-max feature scaling fitted on training rows only

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{AnomalyError, Result};

/// Scales each column to [0, 1] using the training range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Array1<f64>,
    range: Array1<f64>,
}

impl MinMaxScaler {
    /// Fit on `x`; constant columns get a unit range so they map to 0
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(AnomalyError::EmptyInput(
                "cannot fit a scaler on zero rows".to_string(),
            ));
        }

        let min = x.fold_axis(Axis(0), f64::INFINITY, |&acc, &v| acc.min(v));
        let max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |&acc, &v| acc.max(v));
        let range = (&max - &min).mapv(|r| if r.abs() < 1e-12 { 1.0 } else { r });

        Ok(Self { min, range })
    }

    pub fn n_features(&self) -> usize {
        self.min.len()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x)?;
        Ok((x - &self.min) / &self.range)
    }

    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x)?;
        Ok(x * &self.range + &self.min)
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.n_features() {
            return Err(AnomalyError::shape(
                "min-max scaler",
                format!("{} features", self.n_features()),
                format!("{} features", x.ncols()),
            ));
        }
        Ok(())
    }
}
