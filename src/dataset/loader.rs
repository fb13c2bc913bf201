//! Tabular dataset loading
//!
//! Reads a pre-built telemetry table (one row per timestamp, one column per
//! metric) and converts it into a [`RecordSet`]. Rebuilding that table from raw
//! monitoring plugin exports and filtering sparse columns happens upstream.

use std::fs::File;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use polars::prelude::*;
use tracing::{debug, info};

use super::{DatasetConfig, RecordSet};
use crate::error::{AnomalyError, Result};

/// Supported table formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Tsv,
    Json,
    Parquet,
}

impl FileFormat {
    /// Detect the format from a file extension, defaulting to CSV
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "tsv" => FileFormat::Tsv,
            "json" | "jsonl" => FileFormat::Json,
            "parquet" | "pq" => FileFormat::Parquet,
            _ => FileFormat::Csv,
        }
    }
}

/// Data loader for telemetry tables
#[derive(Debug, Clone, Default)]
pub struct DataLoader {
    config: DatasetConfig,
}

impl DataLoader {
    pub fn new(config: DatasetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Load a table into a polars DataFrame
    pub fn load_frame(&self, path: &Path) -> Result<DataFrame> {
        let start = Instant::now();
        let format = FileFormat::from_path(path);

        let df = match format {
            FileFormat::Csv | FileFormat::Tsv => {
                let separator = if format == FileFormat::Tsv { b'\t' } else { b',' };
                let parse_opts = CsvParseOptions::default().with_separator(separator);
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_infer_schema_length(Some(1000))
                    .with_parse_options(parse_opts)
                    .try_into_reader_with_file_path(Some(path.to_path_buf()))?
                    .finish()?
            }
            FileFormat::Json => JsonReader::new(File::open(path)?).finish()?,
            FileFormat::Parquet => ParquetReader::new(File::open(path)?).finish()?,
        };

        info!(
            path = %path.display(),
            rows = df.height(),
            cols = df.width(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded telemetry table"
        );
        Ok(df)
    }

    /// Load a table and convert it into a record set
    pub fn load(&self, path: &Path) -> Result<RecordSet> {
        let df = self.load_frame(path)?;
        RecordSet::from_dataframe(&df, &self.config)
    }
}

impl RecordSet {
    /// Convert a DataFrame into a record set.
    ///
    /// Every column other than the timestamp, the label (unless
    /// `include_label_as_feature`) and `exclude_columns` becomes a feature, in
    /// table order. Null cells are rejected.
    pub fn from_dataframe(df: &DataFrame, config: &DatasetConfig) -> Result<Self> {
        let feature_cols: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .filter(|name| {
                name != &config.timestamp_column
                    && (config.include_label_as_feature || name != &config.label_column)
                    && !config.exclude_columns.contains(name)
            })
            .collect();

        if feature_cols.is_empty() {
            return Err(AnomalyError::DataError(
                "table has no feature columns".to_string(),
            ));
        }

        let timestamps = timestamp_column(df, &config.timestamp_column)?;
        let labels: Vec<bool> = float_column(df, &config.label_column)?
            .into_iter()
            .map(|v| v != 0.0)
            .collect();

        let col_data: Vec<Vec<f64>> = feature_cols
            .iter()
            .map(|name| float_column(df, name))
            .collect::<Result<Vec<_>>>()?;

        let n_rows = df.height();
        let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
        let features = Array2::from_shape_fn((n_rows, feature_cols.len()), |(r, c)| col_refs[c][r]);

        debug!(
            features = feature_cols.len(),
            anomalous = labels.iter().filter(|&&l| l).count(),
            "Converted table to record set"
        );

        RecordSet::new(feature_cols, features, (0..n_rows).collect(), timestamps, labels)
    }
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df
        .column(name)
        .map_err(|_| AnomalyError::FeatureNotFound(name.to_string()))?;
    let series_f64 = series.cast(&DataType::Float64)?;

    series_f64
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| {
                AnomalyError::DataError(format!("null value in column '{}' at row {}", name, row))
            })
        })
        .collect()
}

fn timestamp_column(df: &DataFrame, name: &str) -> Result<Vec<DateTime<Utc>>> {
    let series = df
        .column(name)
        .map_err(|_| AnomalyError::FeatureNotFound(name.to_string()))?;

    let to_datetime: fn(i64) -> Option<DateTime<Utc>> = match series.dtype() {
        DataType::Datetime(TimeUnit::Milliseconds, _) => DateTime::from_timestamp_millis,
        DataType::Datetime(TimeUnit::Microseconds, _) => DateTime::from_timestamp_micros,
        DataType::Datetime(TimeUnit::Nanoseconds, _) => |v| Some(DateTime::from_timestamp_nanos(v)),
        _ => |v| DateTime::from_timestamp(v, 0),
    };

    let raw = series.cast(&DataType::Int64)?;
    raw.i64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.and_then(to_datetime).ok_or_else(|| {
                AnomalyError::DataError(format!(
                    "invalid timestamp in column '{}' at row {}",
                    name, row
                ))
            })
        })
        .collect()
}
