//! Trains every candidate family on the same training split.

use std::time::Instant;

use cellline_core::{Classifier, Dataset, Hyperparameters, ModelFamily, Result, TrainedModel};
use tracing::info;

/// A fitted model that has not been scored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub family: ModelFamily,
    pub model: TrainedModel,
}

impl Candidate {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.family.name()
    }
}

/// Fits each of `families`, in order. The first failure aborts the run.
///
/// # Errors
///
/// `CelllineError::Training` from the failing family.
pub fn train_candidates(
    families: &[ModelFamily],
    train: &Dataset,
    params: &Hyperparameters,
) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::with_capacity(families.len());
    for &family in families {
        info!(model = family.name(), rows = train.len(), "training candidate");
        let started = Instant::now();
        let mut model = family.build(params);
        model.fit(train)?;
        info!(
            model = family.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "candidate trained"
        );
        candidates.push(Candidate { family, model });
    }
    Ok(candidates)
}

/// Fits the full portfolio in [`ModelFamily::PORTFOLIO`] order.
///
/// # Errors
///
/// As [`train_candidates`].
pub fn train_portfolio(train: &Dataset, params: &Hyperparameters) -> Result<Vec<Candidate>> {
    train_candidates(&ModelFamily::PORTFOLIO, train, params)
}
