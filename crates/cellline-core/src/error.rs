use thiserror::Error;

/// Errors that can occur while building, training or serving a cell-line classifier.
#[derive(Debug, Error)]
pub enum CelllineError {
    /// A path, column or parameter is missing or invalid. Raised before any training.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The dataset itself is unusable (empty, header-only, duplicate headers).
    #[error("data error: {0}")]
    Data(String),

    /// A candidate classifier failed to fit.
    #[error("failed to train {model}: {reason}")]
    Training {
        /// Portfolio name of the candidate.
        model: String,
        /// Why fitting failed.
        reason: String,
    },

    /// The model artifact is missing, corrupt or incompatible.
    #[error("failed to load model: {0}")]
    ModelLoadError(String),

    /// A single request could not be scored. The service keeps running.
    #[error("prediction failed: {0}")]
    Prediction(String),

    /// Underlying filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CelllineError {
    pub(crate) fn training(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Training {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that only affect one request.
    #[must_use]
    pub fn is_per_request(&self) -> bool {
        matches!(self, Self::Prediction(_))
    }
}

/// Result type alias for cellline operations.
pub type Result<T> = std::result::Result<T, CelllineError>;
