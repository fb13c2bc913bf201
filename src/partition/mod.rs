//! Class-stratified, seeded dataset partitioning
//!
//! Records are first separated by class ([`partition_by_class`]); each class is
//! then cut into train / validation / test blocks with [`split`]. The same
//! [`SplitIndices`] can be applied to any row-aligned matrix, so original and
//! reconstructed features are always split identically.

use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::RecordSet;
use crate::error::{AnomalyError, Result};

/// Train / validation / test percentages for one class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub train_pct: i32,
    pub val_pct: i32,
    pub test_pct: i32,
}

impl SplitConfig {
    pub fn new(train_pct: i32, val_pct: i32, test_pct: i32) -> Self {
        Self {
            train_pct,
            val_pct,
            test_pct,
        }
    }

    /// Default split for normal data: 60 / 10 / 30
    pub fn normal_default() -> Self {
        Self::new(60, 10, 30)
    }

    /// Default split for anomalous data: no training subset, 30 / 70
    pub fn anomalous_default() -> Self {
        Self::new(0, 30, 70)
    }

    /// Each percentage must be within [0, 100] and their sum at most 100
    pub fn validate(&self) -> Result<()> {
        for (name, pct) in [
            ("train", self.train_pct),
            ("validation", self.val_pct),
            ("test", self.test_pct),
        ] {
            if !(0..=100).contains(&pct) {
                return Err(AnomalyError::InvalidSplitConfig(format!(
                    "{} percentage {} is outside [0, 100]",
                    name, pct
                )));
            }
        }

        let total = self.train_pct + self.val_pct + self.test_pct;
        if total > 100 {
            return Err(AnomalyError::InvalidSplitConfig(format!(
                "percentages sum to {} (train {} + validation {} + test {}), must be at most 100",
                total, self.train_pct, self.val_pct, self.test_pct
            )));
        }
        Ok(())
    }

    fn total(&self) -> i32 {
        self.train_pct + self.val_pct + self.test_pct
    }
}

/// Positions (into the source record set) selected for each split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitIndices {
    /// Total number of selected positions
    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split a row-aligned matrix the same way as the records
    pub fn apply_rows(&self, matrix: &Array2<f64>, n_rows: usize) -> Result<(Array2<f64>, Array2<f64>, Array2<f64>)> {
        if matrix.nrows() != n_rows {
            return Err(AnomalyError::shape(
                "split matrix",
                format!("{} rows", n_rows),
                format!("{} rows", matrix.nrows()),
            ));
        }
        Ok((
            matrix.select(Axis(0), &self.train),
            matrix.select(Axis(0), &self.validation),
            matrix.select(Axis(0), &self.test),
        ))
    }

    /// Materialise the three record subsets
    pub fn apply(&self, records: &RecordSet) -> Result<Split> {
        Ok(Split {
            train: records.select(&self.train)?,
            validation: records.select(&self.validation)?,
            test: records.select(&self.test)?,
            indices: self.clone(),
        })
    }
}

/// Three disjoint record sets derived from one source set
#[derive(Debug, Clone)]
pub struct Split {
    pub train: RecordSet,
    pub validation: RecordSet,
    pub test: RecordSet,
    /// Source positions used to build the subsets
    pub indices: SplitIndices,
}

impl Split {
    pub fn sizes(&self) -> SplitSizes {
        SplitSizes {
            train: self.train.len(),
            validation: self.validation.len(),
            test: self.test.len(),
        }
    }
}

/// Record counts per split, for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

/// Separate a mixed record set into (normal, anomalous), keeping original order
pub fn partition_by_class(records: &RecordSet) -> Result<(RecordSet, RecordSet)> {
    let (normal, anomalous) = records.class_positions();
    debug!(normal = normal.len(), anomalous = anomalous.len(), "Partitioned records by class");
    Ok((records.select(&normal)?, records.select(&anomalous)?))
}

/// Shuffle `0..n_records` with `seed` and cut it into three blocks.
///
/// Block ends are cumulative rounded percentages of `n_records`, so no
/// position is dropped or duplicated between blocks.
pub fn split_indices(n_records: usize, config: &SplitConfig, seed: u64) -> Result<SplitIndices> {
    config.validate()?;

    if n_records == 0 && config.total() > 0 {
        return Err(AnomalyError::EmptyInput(
            "cannot split an empty record set with non-zero percentages".to_string(),
        ));
    }

    let mut positions: Vec<usize> = (0..n_records).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    positions.shuffle(&mut rng);

    let train_end = cumulative_bound(n_records, config.train_pct);
    let val_end = cumulative_bound(n_records, config.train_pct + config.val_pct);
    let test_end = cumulative_bound(n_records, config.total());

    Ok(SplitIndices {
        train: positions[..train_end].to_vec(),
        validation: positions[train_end..val_end].to_vec(),
        test: positions[val_end..test_end].to_vec(),
    })
}

/// Split one homogeneous-class record set into train / validation / test
pub fn split(
    records: &RecordSet,
    train_pct: i32,
    val_pct: i32,
    test_pct: i32,
    seed: u64,
) -> Result<Split> {
    split_with(records, &SplitConfig::new(train_pct, val_pct, test_pct), seed)
}

/// [`split`] taking a [`SplitConfig`]
pub fn split_with(records: &RecordSet, config: &SplitConfig, seed: u64) -> Result<Split> {
    let indices = split_indices(records.len(), config, seed)?;
    let split = indices.apply(records)?;
    debug!(
        train = split.train.len(),
        validation = split.validation.len(),
        test = split.test.len(),
        seed,
        "Split record set"
    );
    Ok(split)
}

/// round_half_up(pct * n / 100), never above n
fn cumulative_bound(n: usize, pct: i32) -> usize {
    let pct = pct.clamp(0, 100) as usize;
    ((pct * n + 50) / 100).min(n)
}
