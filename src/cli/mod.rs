//! Command-line interface for running detection and inspecting data

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use colored::*;

use crate::config::PipelineConfig;
use crate::dataset::{DataLoader, RecordSet};
use crate::model::{AutoencoderConfig, AutoencoderTrainer};
use crate::pipeline::{DetectionPipeline, PipelineReport, SubsetReport};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<22} {}", muted(key), val.white());
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn opt(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{:.6}", v))
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "recon-anomaly")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reconstruction-error anomaly detection for monitoring telemetry")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train on normal data, calibrate a threshold and score the test sets
    Run {
        /// Labeled input table (CSV, TSV, JSON, or Parquet)
        #[arg(short, long)]
        data: PathBuf,

        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the partition seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the number of training epochs
        #[arg(long)]
        epochs: Option<usize>,

        /// Override the training batch size
        #[arg(long)]
        batch_size: Option<usize>,

        /// Autoencoder hidden layer sizes, e.g. 32,8,32
        #[arg(long, value_delimiter = ',')]
        hidden: Vec<usize>,
    },

    /// Show data information
    Info {
        /// Input data file
        #[arg(short, long)]
        data: PathBuf,

        /// Pipeline configuration (JSON), for column names
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the default configuration as JSON
    Config,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(path) => Ok(PipelineConfig::from_file(path)?),
        None => Ok(PipelineConfig::default()),
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn cmd_run(
    data_path: &Path,
    config_path: Option<&Path>,
    output: Option<&Path>,
    seed: Option<u64>,
    epochs: Option<usize>,
    batch_size: Option<usize>,
    hidden: &[usize],
) -> anyhow::Result<()> {
    section("Run");

    let mut config = load_config(config_path)?;
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    if let Some(epochs) = epochs {
        config = config.with_epochs(epochs);
    }
    if let Some(batch_size) = batch_size {
        config = config.with_batch_size(batch_size);
    }
    config.validate()?;

    step_run("Loading data");
    let start = Instant::now();
    let records = DataLoader::new(config.dataset.clone()).load(data_path)?;
    step_done(&format!(
        "{} records × {} features in {:?}",
        records.len(),
        records.n_features(),
        start.elapsed()
    ));

    let trainer = AutoencoderTrainer::new(
        AutoencoderConfig::default()
            .with_hidden_layers(hidden.to_vec())
            .with_random_state(config.seed),
    );

    step_run(&format!("Training autoencoder for {} epochs", config.training.epochs.to_string().cyan()));
    let start = Instant::now();
    let mut pipeline = DetectionPipeline::new(config, trainer);
    let report = pipeline.run(&records)?;
    step_done(&format!("{:?}", start.elapsed()));

    print_report(&report);

    if let Some(path) = output {
        report.write_json(path)?;
        step_ok(&format!("Report saved → {}", path.display()));
    }
    println!();

    Ok(())
}

fn print_report(report: &PipelineReport) {
    section("Splits");
    let (nd, ad) = (report.splits.normal, report.splits.anomalous);
    kv("ND train/val/test", &format!("{} / {} / {}", nd.train, nd.validation, nd.test));
    kv("AD val/test", &format!("{} / {}", ad.validation, ad.test));

    section("Threshold");
    kv("Value", &format!("{:.6}", report.threshold.value()));
    kv("Validation F-score", &format!("{:.4}", report.calibration.metrics.fscore));
    kv("Candidates", &report.calibration.candidates_evaluated.to_string());

    section("Reconstruction error (mean)");
    let m = report.mean_errors;
    kv("ND train", &opt(m.nd_train));
    kv("ND validation", &opt(m.nd_validation));
    kv("ND test", &opt(m.nd_test));
    kv("AD validation", &opt(m.ad_validation));
    kv("AD test", &opt(m.ad_test));

    print_subset("ND test", &report.nd_test);
    print_subset("AD test", &report.ad_test);
}

fn print_subset(title: &str, subset: &SubsetReport) {
    section(title);
    let metrics = &subset.metrics;
    kv("Records", &subset.records.to_string());
    kv("Flagged anomalous", &subset.predicted_anomalous.to_string());
    kv("Precision", &format!("{:.4}", metrics.precision));
    kv("Recall", &format!("{:.4}", metrics.recall));
    println!("  {:<22} {}", muted("F-score"), format!("{:.4}", metrics.fscore).white().bold());
    kv("Accuracy", &format!("{:.4}", metrics.accuracy));
}

pub fn cmd_info(data_path: &Path, config_path: Option<&Path>) -> anyhow::Result<()> {
    section("Data Info");

    let config = load_config(config_path)?;
    let loader = DataLoader::new(config.dataset);
    let frame = loader.load_frame(data_path)?;
    let records = RecordSet::from_dataframe(&frame, loader.config())?;

    kv("File", &data_path.display().to_string());
    kv("Columns", &frame.width().to_string());
    kv("Records", &records.len().to_string());
    kv("Features", &records.n_features().to_string());

    let anomalous = records.n_anomalous();
    let share = if records.is_empty() {
        0.0
    } else {
        100.0 * anomalous as f64 / records.len() as f64
    };
    kv("Normal", &(records.len() - anomalous).to_string());
    kv("Anomalous", &format!("{} ({:.2}%)", anomalous, share));

    if let (Some(first), Some(last)) = (records.timestamps().iter().min(), records.timestamps().iter().max()) {
        kv("From", &first.to_rfc3339());
        kv("To", &last.to_rfc3339());
    }

    section("Features");
    for name in records.feature_names() {
        println!("  {} {}", dim("·"), name);
    }
    println!();

    Ok(())
}

pub fn cmd_config() -> anyhow::Result<()> {
    println!("{}", PipelineConfig::default().to_json()?);
    Ok(())
}
