use thiserror::Error;

/// Errors from the treatment-text service.
#[derive(Debug, Error)]
pub enum TreatmentError {
    /// Connection, timeout or transport failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-200 status.
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The reply did not contain generated text.
    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TreatmentError>;
