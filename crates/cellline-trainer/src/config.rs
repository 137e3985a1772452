//! Training run configuration.

use std::fs;
use std::path::{Path, PathBuf};

use cellline_core::model::DEFAULT_SEED;
use cellline_core::{CelllineError, FeatureSchema, Hyperparameters, Result};

use crate::split::DEFAULT_TRAIN_RATIO;

/// Default CSV file name inside the data directory.
pub const DEFAULT_CSV_NAME: &str = "cell_lines.csv";
/// Default artifact file name inside the data directory.
pub const DEFAULT_MODEL_NAME: &str = "best.model";

/// `<data dir>/cellline`, or `./cellline` when the platform has none.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cellline")
}

/// Everything a training run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub csv_path: PathBuf,
    pub model_path: PathBuf,
    pub schema: FeatureSchema,
    /// Fraction of rows used for training, strictly inside (0, 1).
    pub train_ratio: f64,
    /// Seed of the train/holdout shuffle.
    pub split_seed: u64,
    pub hyperparameters: Hyperparameters,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let dir = default_data_dir();
        Self {
            csv_path: dir.join(DEFAULT_CSV_NAME),
            model_path: dir.join(DEFAULT_MODEL_NAME),
            schema: FeatureSchema::cell_lines(),
            train_ratio: DEFAULT_TRAIN_RATIO,
            split_seed: DEFAULT_SEED,
            hyperparameters: Hyperparameters::default(),
        }
    }
}

impl TrainingConfig {
    /// Defaults for everything but the two paths.
    pub fn new(csv_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            csv_path: csv_path.into(),
            model_path: model_path.into(),
            ..Self::default()
        }
    }

    pub fn with_schema(mut self, schema: FeatureSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_train_ratio(mut self, ratio: f64) -> Self {
        self.train_ratio = ratio;
        self
    }

    pub fn with_split_seed(mut self, seed: u64) -> Self {
        self.split_seed = seed;
        self
    }

    pub fn with_hyperparameters(mut self, hyperparameters: Hyperparameters) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }

    /// Checks what can be checked before touching the data.
    ///
    /// # Errors
    ///
    /// `CelllineError::Configuration` for an out-of-range ratio or a missing CSV.
    pub fn validate(&self) -> Result<()> {
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(CelllineError::Configuration(format!(
                "train ratio must lie strictly between 0 and 1, got {}",
                self.train_ratio
            )));
        }
        if !self.csv_path.is_file() {
            return Err(CelllineError::Configuration(format!(
                "csv file not found: {}",
                self.csv_path.display()
            )));
        }
        Ok(())
    }
}

/// Reads hyperparameters from a JSON file; omitted fields keep their defaults.
///
/// # Errors
///
/// `CelllineError::Configuration` if the file cannot be read or parsed.
pub fn load_hyperparameters<P: AsRef<Path>>(path: P) -> Result<Hyperparameters> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        CelllineError::Configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        CelllineError::Configuration(format!("invalid hyperparameters in {}: {e}", path.display()))
    })
}
