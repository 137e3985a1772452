//! Holdout evaluation and best-candidate selection.

use cellline_core::{CelllineError, Classifier, Dataset, ModelFamily, Result, TrainedModel};
use serde::Serialize;
use tracing::info;

use crate::portfolio::Candidate;

/// A candidate with its holdout accuracy.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub family: ModelFamily,
    pub model: TrainedModel,
    /// Percent of holdout rows classified correctly.
    pub accuracy: f64,
}

/// Name and accuracy of one candidate, for reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore {
    pub name: String,
    pub accuracy: f64,
}

impl ScoredCandidate {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.family.name()
    }

    #[must_use]
    pub fn score(&self) -> CandidateScore {
        CandidateScore {
            name: self.name().to_string(),
            accuracy: self.accuracy,
        }
    }
}

/// `correct / holdout * 100`.
///
/// # Errors
///
/// `CelllineError::Data` for an empty holdout, or any prediction error.
pub fn accuracy<C: Classifier + ?Sized>(model: &C, holdout: &Dataset) -> Result<f64> {
    if holdout.is_empty() {
        return Err(CelllineError::Data("holdout split is empty".into()));
    }
    let mut correct = 0usize;
    for (features, label) in holdout.iter() {
        if model.predict_index(features)? == label {
            correct += 1;
        }
    }
    Ok(correct as f64 / holdout.len() as f64 * 100.0)
}

/// Scores every candidate once on `holdout`, keeping portfolio order.
///
/// # Errors
///
/// As [`accuracy`].
pub fn evaluate(candidates: Vec<Candidate>, holdout: &Dataset) -> Result<Vec<ScoredCandidate>> {
    candidates
        .into_iter()
        .map(|candidate| {
            let accuracy = accuracy(&candidate.model, holdout)?;
            info!(model = candidate.name(), accuracy, "candidate accuracy");
            Ok(ScoredCandidate {
                family: candidate.family,
                model: candidate.model,
                accuracy,
            })
        })
        .collect()
}

/// The candidate with strictly highest accuracy; ties keep the earlier one.
///
/// # Errors
///
/// `CelllineError::Configuration` if `scored` is empty.
pub fn select_best(scored: Vec<ScoredCandidate>) -> Result<ScoredCandidate> {
    let mut best: Option<ScoredCandidate> = None;
    for candidate in scored {
        let better = match &best {
            None => true,
            Some(current) => candidate.accuracy > current.accuracy,
        };
        if better {
            best = Some(candidate);
        }
    }
    let best =
        best.ok_or_else(|| CelllineError::Configuration("no candidates to select from".into()))?;
    info!(model = best.name(), accuracy = best.accuracy, "selected model");
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellline_core::{Attributes, EncodedInstance, Hyperparameters};

    fn dataset() -> Dataset {
        let attributes = Attributes {
            cardinalities: vec![3],
            num_classes: 3,
        };
        let instances = [(1, 1), (2, 2), (1, 1), (2, 1)]
            .iter()
            .map(|&(f, l)| EncodedInstance {
                features: vec![f],
                label: Some(l),
            })
            .collect();
        Dataset::new(attributes, instances).unwrap()
    }

    fn scored(family: ModelFamily, accuracy: f64) -> ScoredCandidate {
        ScoredCandidate {
            family,
            model: family.build(&Hyperparameters::default()),
            accuracy,
        }
    }

    #[test]
    fn accuracy_is_percent_correct() {
        let data = dataset();
        let mut model = ModelFamily::NearestNeighbors.build(&Hyperparameters::default());
        model.fit(&data.subset(&[0, 1, 2])).unwrap();
        // rows 0..3 are memorised; row 3 contradicts row 1
        assert_eq!(accuracy(&model, &data).unwrap(), 75.0);
    }

    #[test]
    fn empty_holdout_is_an_error() {
        let data = dataset();
        let mut model = ModelFamily::NearestNeighbors.build(&Hyperparameters::default());
        model.fit(&data).unwrap();
        assert!(accuracy(&model, &data.subset(&[])).is_err());
    }

    #[test]
    fn ties_go_to_the_earlier_candidate() {
        for _ in 0..3 {
            let best = select_best(vec![
                scored(ModelFamily::RandomForest, 80.0),
                scored(ModelFamily::NearestNeighbors, 90.0),
                scored(ModelFamily::LinearSvm, 90.0),
                scored(ModelFamily::LogitBoost, 85.0),
            ])
            .unwrap();
            assert_eq!(best.family, ModelFamily::NearestNeighbors);
            assert_eq!(best.accuracy, 90.0);
        }
    }

    #[test]
    fn strictly_better_wins() {
        let best = select_best(vec![
            scored(ModelFamily::RandomForest, 50.0),
            scored(ModelFamily::LogitBoost, 50.1),
        ])
        .unwrap();
        assert_eq!(best.name(), "LogitBoost");
    }

    #[test]
    fn nothing_to_select_is_an_error() {
        assert!(select_best(Vec::new()).is_err());
    }
}
