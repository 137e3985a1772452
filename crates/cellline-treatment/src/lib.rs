//! # Cellline Treatment
//!
//! Short treatment summaries for a predicted cancer type, fetched from an
//! external text-generation service. Unknown labels never trigger a lookup.

pub mod client;
pub mod config;
pub mod error;

pub use client::{GeminiClient, MISSING_KEY_MESSAGE, TreatmentSource, is_unknown_label};
pub use config::ApiConfig;
pub use error::{Result, TreatmentError};
