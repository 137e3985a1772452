//! Candidate classifier families.
//!
//! Every family implements [`Classifier`] over categorical indices. The
//! persisted form is [`TrainedModel`], a tagged enum over the four concrete
//! types, so the trainer and predictor never depend on one family's internals.

pub mod boost;
pub mod forest;
pub mod knn;
pub mod svm;
pub mod tree;

use ndarray::{Array1, Array2};
use oorandom::Rand64;
use serde::{Deserialize, Serialize};

use crate::encoding::{Attributes, Dataset};
use crate::error::{CelllineError, Result};

pub use boost::{BoostParams, LogitBoost};
pub use forest::{ForestParams, RandomForest};
pub use knn::{KnnParams, NearestNeighbors};
pub use svm::{LinearSvm, SvmParams};

/// Default seed for every stochastic family and for the holdout split.
pub const DEFAULT_SEED: u64 = 42;

/// Capability shared by all classifier families.
pub trait Classifier {
    /// Portfolio name, e.g. `"Random Forest"`.
    fn name(&self) -> &'static str;

    /// Fits the model to `data`, replacing any previous fit.
    ///
    /// # Errors
    ///
    /// `CelllineError::Training` if the data cannot be fitted.
    fn fit(&mut self, data: &Dataset) -> Result<()>;

    /// Class-probability distribution for one encoded feature vector.
    /// Entries are non-negative and sum to one.
    ///
    /// # Errors
    ///
    /// `CelllineError::Prediction` for untrained models or malformed instances.
    fn predict_distribution(&self, features: &[usize]) -> Result<Vec<f64>>;

    /// Most probable class; the lowest index wins ties.
    ///
    /// # Errors
    ///
    /// As [`Classifier::predict_distribution`].
    fn predict_index(&self, features: &[usize]) -> Result<usize> {
        Ok(argmax(&self.predict_distribution(features)?))
    }

    /// Attributes of the last fit; `None` before the first.
    fn attributes(&self) -> Option<&Attributes>;

    /// Checks that the fitted internals have the sizes the attributes
    /// imply, so no well-formed instance can index past them. Describes
    /// the first mismatch.
    fn check_consistency(&self) -> std::result::Result<(), String>;
}

/// Hyperparameters for the whole candidate portfolio.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub forest: ForestParams,
    pub knn: KnnParams,
    pub svm: SvmParams,
    pub boost: BoostParams,
}

/// The candidate families, in portfolio order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    RandomForest,
    NearestNeighbors,
    LinearSvm,
    LogitBoost,
}

impl ModelFamily {
    /// Fixed portfolio order. Selection ties go to the earlier entry.
    pub const PORTFOLIO: [ModelFamily; 4] = [
        Self::RandomForest,
        Self::NearestNeighbors,
        Self::LinearSvm,
        Self::LogitBoost,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::RandomForest => forest::NAME,
            Self::NearestNeighbors => knn::NAME,
            Self::LinearSvm => svm::NAME,
            Self::LogitBoost => boost::NAME,
        }
    }

    /// An untrained model of this family.
    #[must_use]
    pub fn build(self, params: &Hyperparameters) -> TrainedModel {
        match self {
            Self::RandomForest => TrainedModel::RandomForest(RandomForest::new(params.forest.clone())),
            Self::NearestNeighbors => {
                TrainedModel::NearestNeighbors(NearestNeighbors::new(params.knn.clone()))
            }
            Self::LinearSvm => TrainedModel::LinearSvm(LinearSvm::new(params.svm.clone())),
            Self::LogitBoost => TrainedModel::LogitBoost(LogitBoost::new(params.boost.clone())),
        }
    }
}

/// A model of any family; this is what the model store persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum TrainedModel {
    RandomForest(RandomForest),
    NearestNeighbors(NearestNeighbors),
    LinearSvm(LinearSvm),
    LogitBoost(LogitBoost),
}

impl TrainedModel {
    #[must_use]
    pub fn family(&self) -> ModelFamily {
        match self {
            Self::RandomForest(_) => ModelFamily::RandomForest,
            Self::NearestNeighbors(_) => ModelFamily::NearestNeighbors,
            Self::LinearSvm(_) => ModelFamily::LinearSvm,
            Self::LogitBoost(_) => ModelFamily::LogitBoost,
        }
    }

    /// Checks that the model is fitted, was fitted under `expected`, and that
    /// its internals agree with those attributes.
    ///
    /// # Errors
    ///
    /// A description of the first mismatch.
    pub fn check_fitted_under(&self, expected: &Attributes) -> std::result::Result<(), String> {
        let Some(attributes) = self.attributes() else {
            return Err(format!("{} model is not trained", self.name()));
        };
        if attributes != expected {
            return Err(format!(
                "{} model was fitted with {} features / {} classes ({:?}), encoding has {} / {} ({:?})",
                self.name(),
                attributes.num_features(),
                attributes.num_classes,
                attributes.cardinalities,
                expected.num_features(),
                expected.num_classes,
                expected.cardinalities
            ));
        }
        self.check_consistency()
            .map_err(|reason| format!("{} model is inconsistent: {reason}", self.name()))
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            Self::RandomForest(m) => m,
            Self::NearestNeighbors(m) => m,
            Self::LinearSvm(m) => m,
            Self::LogitBoost(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Self::RandomForest(m) => m,
            Self::NearestNeighbors(m) => m,
            Self::LinearSvm(m) => m,
            Self::LogitBoost(m) => m,
        }
    }
}

impl Classifier for TrainedModel {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn fit(&mut self, data: &Dataset) -> Result<()> {
        self.inner_mut().fit(data)
    }

    fn predict_distribution(&self, features: &[usize]) -> Result<Vec<f64>> {
        self.inner().predict_distribution(features)
    }

    fn predict_index(&self, features: &[usize]) -> Result<usize> {
        self.inner().predict_index(features)
    }

    fn attributes(&self) -> Option<&Attributes> {
        self.inner().attributes()
    }

    fn check_consistency(&self) -> std::result::Result<(), String> {
        self.inner().check_consistency()
    }
}

/// Index of the first maximum; `0` for an empty slice.
#[must_use]
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Numerically stable softmax. `NEG_INFINITY` entries get probability zero.
#[must_use]
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return uniform(scores.len());
    }
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Scales non-negative counts to sum to one; uniform if they sum to zero.
#[must_use]
pub fn normalize(counts: &[f64]) -> Vec<f64> {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return uniform(counts.len());
    }
    counts.iter().map(|c| c / total).collect()
}

fn uniform(len: usize) -> Vec<f64> {
    if len == 0 {
        return Vec::new();
    }
    vec![1.0 / len as f64; len]
}

/// Seeded generator shared by every stochastic step.
#[must_use]
pub fn seeded_rng(seed: u64) -> Rand64 {
    Rand64::new(u128::from(seed))
}

/// In-place Fisher–Yates shuffle.
pub fn shuffle<T>(items: &mut [T], rng: &mut Rand64) {
    for i in (1..items.len()).rev() {
        let j = rng.rand_range(0..(i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}

/// Start of each feature's block in the one-hot expansion.
pub(crate) fn one_hot_offsets(attributes: &Attributes) -> Vec<usize> {
    let mut offset = 0;
    attributes
        .cardinalities
        .iter()
        .map(|&cardinality| {
            let start = offset;
            offset += cardinality;
            start
        })
        .collect()
}

/// One-hot vector of a validated instance.
pub(crate) fn one_hot(features: &[usize], attributes: &Attributes) -> Array1<f64> {
    let mut point = Array1::zeros(attributes.one_hot_width());
    for (value, offset) in features.iter().zip(one_hot_offsets(attributes)) {
        point[offset + value] = 1.0;
    }
    point
}

/// One-hot rows of every training instance.
pub(crate) fn one_hot_matrix<'a>(
    rows: impl IntoIterator<Item = &'a [usize]>,
    attributes: &Attributes,
) -> Array2<f64> {
    let rows: Vec<&[usize]> = rows.into_iter().collect();
    let offsets = one_hot_offsets(attributes);
    let mut matrix = Array2::zeros((rows.len(), attributes.one_hot_width()));
    for (i, features) in rows.into_iter().enumerate() {
        for (value, offset) in features.iter().zip(&offsets) {
            matrix[[i, offset + value]] = 1.0;
        }
    }
    matrix
}

/// Fitted attributes of a model, or a prediction error if it was never fitted.
pub(crate) fn fitted<'a>(attributes: &'a Option<Attributes>, name: &str) -> Result<&'a Attributes> {
    attributes
        .as_ref()
        .ok_or_else(|| CelllineError::Prediction(format!("{name} model is not trained")))
}

pub(crate) fn require_rows(data: &Dataset, name: &str) -> Result<()> {
    if data.is_empty() {
        return Err(CelllineError::training(name, "training set is empty"));
    }
    if data.attributes().num_classes == 0 {
        return Err(CelllineError::training(name, "label column has no classes"));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::encoding::{Attributes, Dataset, EncodedInstance};

    /// Three features: 0 and 1 both determine the label, 2 is noise.
    /// Class 0 never occurs.
    pub fn separable() -> Dataset {
        let attributes = Attributes {
            cardinalities: vec![4, 3, 3],
            num_classes: 4,
        };
        let mut instances = Vec::new();
        for i in 0..24usize {
            let a = 1 + i % 3;
            let b = a - 1;
            let noise = (i / 3) % 3;
            instances.push(EncodedInstance {
                features: vec![a, b, noise],
                label: Some(a),
            });
        }
        Dataset::new(attributes, instances).unwrap()
    }
}
