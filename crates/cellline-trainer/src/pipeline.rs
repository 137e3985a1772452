//! End-to-end training run: CSV → vocabulary → split → candidates → artifact.

use std::path::PathBuf;

use anyhow::{Context, Result};
use cellline_core::{CsvTable, InstanceAssembler, ModelArtifact, Vocabulary};
use serde::Serialize;
use tracing::info;

use crate::config::TrainingConfig;
use crate::portfolio::train_portfolio;
use crate::selection::{CandidateScore, evaluate, select_best};
use crate::split::split;

/// Outcome of a training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub selected: String,
    pub accuracy: f64,
    /// Every candidate in portfolio order.
    pub candidates: Vec<CandidateScore>,
    pub train_rows: usize,
    pub holdout_rows: usize,
    pub model_path: PathBuf,
}

/// Runs the whole pipeline and writes the selected model to
/// `config.model_path`. Any failure aborts the run.
pub fn run_training(config: &TrainingConfig) -> Result<TrainingReport> {
    config.validate()?;

    info!(path = %config.csv_path.display(), "loading dataset");
    let table = CsvTable::from_path(&config.csv_path)
        .with_context(|| format!("failed to read {}", config.csv_path.display()))?;
    info!(
        columns = table.headers().len(),
        rows = table.rows().len(),
        "dataset loaded"
    );

    config.schema.locate(&table)?;
    info!(
        features = ?config.schema.features(),
        label = config.schema.label(),
        "selected columns"
    );

    let vocabulary = Vocabulary::build(&table)?;
    let assembler = InstanceAssembler::new(config.schema.clone(), &vocabulary)?;
    let dataset = assembler.assemble_table(&table)?;

    let parts = split(&dataset, config.train_ratio, config.split_seed)?;
    let candidates = train_portfolio(&parts.train, &config.hyperparameters)?;
    let scored = evaluate(candidates, &parts.holdout)?;
    let scores: Vec<CandidateScore> = scored.iter().map(|c| c.score()).collect();
    let best = select_best(scored)?;

    let report = TrainingReport {
        selected: best.name().to_string(),
        accuracy: best.accuracy,
        candidates: scores,
        train_rows: parts.train.len(),
        holdout_rows: parts.holdout.len(),
        model_path: config.model_path.clone(),
    };

    let artifact = ModelArtifact::new(best.model, best.accuracy, config.schema.clone(), &vocabulary)?;
    artifact
        .save(&config.model_path)
        .with_context(|| format!("failed to save model to {}", config.model_path.display()))?;

    info!(
        model = %report.selected,
        accuracy = report.accuracy,
        path = %config.model_path.display(),
        "training complete"
    );
    Ok(report)
}
