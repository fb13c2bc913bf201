//! Telemetry records and record sets
//!
//! A [`RecordSet`] holds one feature matrix (rows = records) together with the
//! original row index, timestamp and label of every record. Subsets keep the
//! original index so results can be re-joined with the full dataset later.

mod loader;

pub use loader::{DataLoader, FileFormat};

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{AnomalyError, Result};

/// Column layout of a tabular telemetry dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Timestamp column (integer epoch seconds or a datetime column)
    pub timestamp_column: String,
    /// Binary ground-truth column, non-zero = anomalous
    pub label_column: String,
    /// Also feed the label column to the model as a feature
    pub include_label_as_feature: bool,
    /// Further columns that are neither features nor metadata
    pub exclude_columns: Vec<String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            timestamp_column: "timestamp".to_string(),
            label_column: "nagiosdrained".to_string(),
            include_label_as_feature: false,
            exclude_columns: Vec::new(),
        }
    }
}

impl DatasetConfig {
    pub fn with_label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = column.into();
        self
    }

    pub fn with_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.timestamp_column = column.into();
        self
    }

    pub fn with_label_as_feature(mut self, include: bool) -> Self {
        self.include_label_as_feature = include;
        self
    }

    pub fn with_excluded(mut self, columns: Vec<String>) -> Self {
        self.exclude_columns = columns;
        self
    }
}

/// A single observation, materialised from a [`RecordSet`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Row index in the source dataset
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    /// Feature values in schema order
    pub features: Vec<f64>,
    pub is_anomalous: bool,
}

/// Ordered records sharing one feature schema
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    feature_names: Vec<String>,
    features: Array2<f64>,
    indices: Vec<usize>,
    timestamps: Vec<DateTime<Utc>>,
    labels: Vec<bool>,
}

impl RecordSet {
    /// Build a record set from parallel columns.
    ///
    /// Fails with `ShapeMismatch` when the matrix width differs from the schema
    /// or any metadata vector differs from the row count.
    pub fn new(
        feature_names: Vec<String>,
        features: Array2<f64>,
        indices: Vec<usize>,
        timestamps: Vec<DateTime<Utc>>,
        labels: Vec<bool>,
    ) -> Result<Self> {
        let n_rows = features.nrows();

        if features.ncols() != feature_names.len() {
            return Err(AnomalyError::shape(
                "record set schema",
                format!("{} feature columns", feature_names.len()),
                format!("{} columns", features.ncols()),
            ));
        }
        for (what, len) in [
            ("indices", indices.len()),
            ("timestamps", timestamps.len()),
            ("labels", labels.len()),
        ] {
            if len != n_rows {
                return Err(AnomalyError::shape(
                    format!("record set {}", what),
                    format!("{} rows", n_rows),
                    format!("{} entries", len),
                ));
            }
        }

        let mut seen = HashSet::with_capacity(feature_names.len());
        for name in &feature_names {
            if !seen.insert(name.as_str()) {
                return Err(AnomalyError::DataError(format!(
                    "duplicate feature name '{}'",
                    name
                )));
            }
        }

        Ok(Self {
            feature_names,
            features,
            indices,
            timestamps,
            labels,
        })
    }

    /// Build from records that all follow `feature_names`
    pub fn from_records(feature_names: Vec<String>, records: &[Record]) -> Result<Self> {
        let n_features = feature_names.len();
        let mut values = Vec::with_capacity(records.len() * n_features);
        for record in records {
            if record.features.len() != n_features {
                return Err(AnomalyError::shape(
                    format!("record {}", record.index),
                    format!("{} features", n_features),
                    record.features.len(),
                ));
            }
            values.extend_from_slice(&record.features);
        }

        let features = Array2::from_shape_vec((records.len(), n_features), values)?;
        Self::new(
            feature_names,
            features,
            records.iter().map(|r| r.index).collect(),
            records.iter().map(|r| r.timestamp).collect(),
            records.iter().map(|r| r.is_anomalous).collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Feature matrix, one row per record
    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn row(&self, position: usize) -> ArrayView1<'_, f64> {
        self.features.row(position)
    }

    /// Original dataset indices, aligned with rows
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn labels(&self) -> &[bool] {
        &self.labels
    }

    pub fn n_anomalous(&self) -> usize {
        self.labels.iter().filter(|&&l| l).count()
    }

    /// Materialise the record at `position`
    pub fn record(&self, position: usize) -> Option<Record> {
        if position >= self.len() {
            return None;
        }
        Some(Record {
            index: self.indices[position],
            timestamp: self.timestamps[position],
            features: self.features.row(position).to_vec(),
            is_anomalous: self.labels[position],
        })
    }

    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        (0..self.len()).filter_map(move |p| self.record(p))
    }

    /// Rows at the given positions, in the given order
    pub fn select(&self, positions: &[usize]) -> Result<Self> {
        if let Some(&bad) = positions.iter().find(|&&p| p >= self.len()) {
            return Err(AnomalyError::shape(
                "record selection",
                format!("positions < {}", self.len()),
                bad,
            ));
        }

        Ok(Self {
            feature_names: self.feature_names.clone(),
            features: self.features.select(Axis(0), positions),
            indices: positions.iter().map(|&p| self.indices[p]).collect(),
            timestamps: positions.iter().map(|&p| self.timestamps[p]).collect(),
            labels: positions.iter().map(|&p| self.labels[p]).collect(),
        })
    }

    /// Positions of normal and anomalous records, in original order
    pub fn class_positions(&self) -> (Vec<usize>, Vec<usize>) {
        (0..self.len()).partition(|&p| !self.labels[p])
    }

    /// `Some(is_anomalous)` when every record has the same label
    pub fn uniform_label(&self) -> Option<bool> {
        let first = *self.labels.first()?;
        self.labels.iter().all(|&l| l == first).then_some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn sample() -> RecordSet {
        RecordSet::new(
            vec!["cpu".to_string(), "mem".to_string()],
            array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
            vec![10, 11, 12],
            vec![ts(100), ts(200), ts(300)],
            vec![false, true, false],
        )
        .unwrap()
    }

    #[test]
    fn test_select_keeps_metadata() {
        let set = sample();
        let subset = set.select(&[2, 0]).unwrap();

        assert_eq!(subset.len(), 2);
        assert_eq!(subset.indices(), &[12, 10]);
        assert_eq!(subset.timestamps(), &[ts(300), ts(100)]);
        assert_eq!(subset.row(0).to_vec(), vec![5.0, 6.0]);
    }

    #[test]
    fn test_select_out_of_range() {
        let set = sample();
        assert!(matches!(
            set.select(&[3]),
            Err(AnomalyError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_class_positions() {
        let set = sample();
        let (normal, anomalous) = set.class_positions();
        assert_eq!(normal, vec![0, 2]);
        assert_eq!(anomalous, vec![1]);
        assert_eq!(set.uniform_label(), None);
        assert_eq!(set.select(&normal).unwrap().uniform_label(), Some(false));
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let result = RecordSet::new(
            vec!["cpu".to_string()],
            array![[1.0, 2.0]],
            vec![0],
            vec![ts(0)],
            vec![false],
        );
        assert!(matches!(result, Err(AnomalyError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_duplicate_feature_rejected() {
        let result = RecordSet::new(
            vec!["cpu".to_string(), "cpu".to_string()],
            array![[1.0, 2.0]],
            vec![0],
            vec![ts(0)],
            vec![false],
        );
        assert!(matches!(result, Err(AnomalyError::DataError(_))));
    }

    #[test]
    fn test_from_records_roundtrip() {
        let set = sample();
        let records: Vec<Record> = set.records().collect();
        let rebuilt = RecordSet::from_records(set.feature_names().to_vec(), &records).unwrap();
        assert_eq!(rebuilt, set);
    }
}
