//! # Cellline Trainer
//!
//! Builds the encoded dataset from a CSV snapshot, trains the candidate
//! portfolio on a seeded split, scores each candidate on the holdout and
//! persists the most accurate one.

pub mod config;
pub mod pipeline;
pub mod portfolio;
pub mod selection;
pub mod split;

pub use config::{TrainingConfig, default_data_dir, load_hyperparameters};
pub use pipeline::{TrainingReport, run_training};
pub use portfolio::{Candidate, train_candidates, train_portfolio};
pub use selection::{CandidateScore, ScoredCandidate, accuracy, evaluate, select_best};
pub use split::{DEFAULT_TRAIN_RATIO, Split, SplitIndices, split, split_indices};
