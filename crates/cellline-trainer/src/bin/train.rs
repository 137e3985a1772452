//! Trains the candidate portfolio on a cell-line CSV and saves the best model.

use std::path::PathBuf;

use anyhow::{Context, Result};
use cellline_core::FeatureSchema;
use cellline_trainer::config::{DEFAULT_CSV_NAME, DEFAULT_MODEL_NAME};
use cellline_trainer::{TrainingConfig, default_data_dir, load_hyperparameters, run_training};
use clap::Parser;

#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train and select a cancer-type classifier from a cell-line CSV")]
#[command(version)]
struct Cli {
    /// Input CSV with a header row
    #[arg(short, long, env = "CELLLINE_CSV")]
    csv: Option<PathBuf>,

    /// Where to write the selected model
    #[arg(short, long, env = "CELLLINE_MODEL")]
    model: Option<PathBuf>,

    /// JSON file with hyperparameter overrides
    #[arg(long, env = "CELLLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Fraction of rows used for training
    #[arg(short, long, default_value_t = cellline_trainer::DEFAULT_TRAIN_RATIO)]
    ratio: f64,

    /// Seed of the train/holdout shuffle
    #[arg(short, long, default_value_t = cellline_core::model::DEFAULT_SEED)]
    seed: u64,

    /// Print the training report as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = default_data_dir();

    let mut config = TrainingConfig::new(
        cli.csv.unwrap_or_else(|| data_dir.join(DEFAULT_CSV_NAME)),
        cli.model.unwrap_or_else(|| data_dir.join(DEFAULT_MODEL_NAME)),
    )
    .with_schema(FeatureSchema::cell_lines())
    .with_train_ratio(cli.ratio)
    .with_split_seed(cli.seed);

    if let Some(path) = &cli.config {
        config = config.with_hyperparameters(load_hyperparameters(path)?);
    }

    let report = run_training(&config).context("training failed")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for candidate in &report.candidates {
            println!("{:<24} {:>6.2}%", candidate.name, candidate.accuracy);
        }
        println!(
            "Selected {} ({:.2}%), saved to {}",
            report.selected,
            report.accuracy,
            report.model_path.display()
        );
    }
    Ok(())
}
