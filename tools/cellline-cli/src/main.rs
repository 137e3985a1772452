//! Cellline command-line front end.
//!
//! Serves the trained model over stdin/stdout: one JSON object per input
//! line, one JSON reply per output line. Logs go to stderr.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use cellline_core::{FeatureMap, PredictionResponse, Predictor, health};
use cellline_treatment::{ApiConfig, GeminiClient, TreatmentSource};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cellline")
}

#[derive(Parser)]
#[command(name = "cellline")]
#[command(about = "Predict cancer types for cell lines from a trained model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Trained model artifact
    #[arg(short, long, env = "CELLLINE_MODEL")]
    model: Option<PathBuf>,

    /// Dataset CSV, used to check the model's vocabulary for drift
    #[arg(short, long, env = "CELLLINE_CSV")]
    csv: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read JSON feature maps from stdin, one per line, and print predictions
    Predict,
    /// Print the known values of every column
    Categories,
    /// Print model file status
    Health,
    /// Print a treatment summary for a cancer type
    Treatment {
        /// Cancer type label, e.g. BRCA
        cancer_type: String,

        /// Properties file holding gemini.api.key
        #[arg(short, long, env = "CELLLINE_API_CONFIG")]
        properties: Option<PathBuf>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TreatmentReply {
    success: bool,
    cancer_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    treatment_info: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// JSON object → feature map. `null` values are treated as absent.
fn feature_map(line: &str) -> Result<FeatureMap> {
    let object: serde_json::Map<String, Value> =
        serde_json::from_str(line).context("input line is not a JSON object")?;
    Ok(object
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn predict(predictor: &Predictor) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut served = 0usize;

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match feature_map(line) {
            Ok(features) => predictor.respond(&features),
            Err(err) => {
                warn!(error = %err, "skipping malformed input");
                PredictionResponse {
                    success: false,
                    prediction: None,
                    confidence: None,
                    error: Some(format!("{err:#}")),
                }
            }
        };
        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        served += 1;
    }
    stdout.flush()?;
    info!(requests = served, "done");
    Ok(())
}

fn treatment(cancer_type: String, properties: Option<PathBuf>) -> Result<()> {
    let properties = properties.unwrap_or_else(|| data_dir().join("config.properties"));
    let config = ApiConfig::load(&properties)?.with_env_override();
    let client = GeminiClient::new(&config)?;

    let reply = match client.describe(&cancer_type) {
        Ok(info) => TreatmentReply {
            success: true,
            cancer_type,
            treatment_info: Some(info),
            error: None,
        },
        Err(err) => {
            warn!(error = %err, "treatment lookup failed");
            TreatmentReply {
                success: false,
                cancer_type,
                treatment_info: None,
                error: Some(format!("Failed to retrieve treatment information: {err}")),
            }
        }
    };
    print_json(&reply)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let model = cli.model.unwrap_or_else(|| data_dir().join("best.model"));

    match cli.command {
        Commands::Predict => {
            let predictor = Predictor::load(&model, cli.csv.as_deref())
                .with_context(|| format!("cannot start predictor from {}", model.display()))?;
            predict(&predictor)
        }
        Commands::Categories => {
            let predictor = Predictor::load(&model, cli.csv.as_deref())
                .with_context(|| format!("cannot load {}", model.display()))?;
            print_json(&predictor.categories())
        }
        Commands::Health => print_json(&health(&model)),
        Commands::Treatment {
            cancer_type,
            properties,
        } => treatment(cancer_type, properties),
    }
}
