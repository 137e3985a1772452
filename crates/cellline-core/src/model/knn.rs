//! k-nearest neighbours over a linfa-nn ball tree.
//!
//! Instances are indexed by their one-hot expansion. Squared Euclidean
//! distance between one-hot vectors is twice the number of mismatching
//! features, so the tree ranks neighbours by overlap distance.

use linfa_nn::distance::L2Dist;
use linfa_nn::{BallTree, NearestNeighbour, NearestNeighbourIndex};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Classifier, fitted, normalize, one_hot, one_hot_matrix, require_rows};
use crate::encoding::{Attributes, Dataset};
use crate::error::{CelllineError, Result};

pub(crate) const NAME: &str = "K-Nearest Neighbors";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnParams {
    /// Upper bound on k when cross-validating, the exact k otherwise.
    pub k: usize,
    /// Pick the best k in `1..=k` by leave-one-out accuracy.
    pub cross_validate: bool,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self {
            k: 5,
            cross_validate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestNeighbors {
    params: KnnParams,
    attributes: Option<Attributes>,
    /// k after cross-validation.
    k: usize,
    features: Vec<Vec<usize>>,
    labels: Vec<usize>,
}

impl NearestNeighbors {
    #[must_use]
    pub fn new(params: KnnParams) -> Self {
        let k = params.k;
        Self {
            params,
            attributes: None,
            k,
            features: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// The k used for prediction.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    fn points(&self, attributes: &Attributes) -> Array2<f64> {
        one_hot_matrix(self.features.iter().map(Vec::as_slice), attributes)
    }

    /// The `k` training rows nearest to `query`, closest first. Rows the
    /// tree returns at equal distance are ordered by training position.
    fn nearest(
        &self,
        index: &dyn NearestNeighbourIndex<f64>,
        query: &[usize],
        k: usize,
        attributes: &Attributes,
    ) -> Result<Vec<usize>> {
        let point = one_hot(query, attributes);
        let found = index
            .k_nearest(point.view(), k.min(self.features.len()))
            .map_err(|e| CelllineError::Prediction(format!("neighbour search failed: {e}")))?;
        let mut rows: Vec<(usize, usize)> = found
            .into_iter()
            .map(|(_, row)| (overlap_distance(query, &self.features[row]), row))
            .collect();
        rows.sort_unstable();
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }

    fn votes(&self, neighbors: &[usize], num_classes: usize) -> Vec<f64> {
        let mut votes = vec![0.0; num_classes];
        for &row in neighbors {
            votes[self.labels[row]] += 1.0;
        }
        votes
    }

    /// Leave-one-out accuracy for every k in `1..=max_k`; the smallest best k wins.
    fn select_k(
        &self,
        index: &dyn NearestNeighbourIndex<f64>,
        max_k: usize,
        attributes: &Attributes,
    ) -> Result<usize> {
        let mut correct = vec![0usize; max_k];
        for (row, features) in self.features.iter().enumerate() {
            let mut ranked = self.nearest(index, features, max_k + 1, attributes)?;
            match ranked.iter().position(|&r| r == row) {
                Some(own) => {
                    ranked.remove(own);
                }
                None => ranked.truncate(max_k),
            }
            let mut votes = vec![0.0; attributes.num_classes];
            for (k, &neighbor) in ranked.iter().take(max_k).enumerate() {
                votes[self.labels[neighbor]] += 1.0;
                if super::argmax(&votes) == self.labels[row] {
                    correct[k] += 1;
                }
            }
        }
        let mut best = 0;
        for (k, &hits) in correct.iter().enumerate() {
            if hits > correct[best] {
                best = k;
            }
        }
        Ok(best + 1)
    }
}

/// Number of positions where two category vectors differ.
fn overlap_distance(a: &[usize], b: &[usize]) -> usize {
    a.iter().zip(b).filter(|(x, y)| x != y).count()
}

impl Classifier for NearestNeighbors {
    fn name(&self) -> &'static str {
        NAME
    }

    fn fit(&mut self, data: &Dataset) -> Result<()> {
        require_rows(data, NAME)?;
        if self.params.k == 0 {
            return Err(CelllineError::training(NAME, "k must be at least 1"));
        }

        let attributes = data.attributes().clone();
        self.features = data.iter().map(|(f, _)| f.to_vec()).collect();
        self.labels = data.labels().to_vec();

        let max_k = self.params.k.min(data.len());
        self.k = if self.params.cross_validate && data.len() > 1 {
            let points = self.points(&attributes);
            let index = BallTree::new()
                .from_batch(&points, L2Dist)
                .map_err(|e| CelllineError::training(NAME, e.to_string()))?;
            self.select_k(&*index, max_k.min(data.len() - 1), &attributes)
                .map_err(|e| CelllineError::training(NAME, e.to_string()))?
        } else {
            max_k
        };

        debug!(k = self.k, rows = self.labels.len(), "fitted nearest neighbours");
        self.attributes = Some(attributes);
        Ok(())
    }

    fn predict_distribution(&self, features: &[usize]) -> Result<Vec<f64>> {
        let attributes = fitted(&self.attributes, NAME)?;
        attributes.validate(features)?;

        let points = self.points(attributes);
        let index = BallTree::new()
            .from_batch(&points, L2Dist)
            .map_err(|e| CelllineError::Prediction(format!("cannot index training rows: {e}")))?;
        let neighbors = self.nearest(&*index, features, self.k, attributes)?;
        Ok(normalize(&self.votes(&neighbors, attributes.num_classes)))
    }

    fn attributes(&self) -> Option<&Attributes> {
        self.attributes.as_ref()
    }

    fn check_consistency(&self) -> std::result::Result<(), String> {
        let Some(attributes) = &self.attributes else {
            return Ok(());
        };
        if self.features.is_empty() || self.features.len() != self.labels.len() {
            return Err(format!(
                "{} training rows with {} labels",
                self.features.len(),
                self.labels.len()
            ));
        }
        if self.k == 0 || self.k > self.features.len() {
            return Err(format!("k = {} with {} rows", self.k, self.features.len()));
        }
        for (row, features) in self.features.iter().enumerate() {
            attributes
                .validate(features)
                .map_err(|e| format!("training row {row}: {e}"))?;
        }
        if let Some(label) = self.labels.iter().find(|&&l| l >= attributes.num_classes) {
            return Err(format!(
                "label {label} outside {} classes",
                attributes.num_classes
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::EncodedInstance;
    use crate::model::fixtures;

    fn tiny() -> Dataset {
        let attributes = Attributes {
            cardinalities: vec![3, 3],
            num_classes: 3,
        };
        let rows = [([1, 1], 1), ([1, 2], 1), ([2, 2], 2), ([2, 1], 2), ([1, 1], 1)];
        let instances = rows
            .iter()
            .map(|(f, l)| EncodedInstance {
                features: f.to_vec(),
                label: Some(*l),
            })
            .collect();
        Dataset::new(attributes, instances).unwrap()
    }

    #[test]
    fn overlap_distance_counts_mismatches() {
        assert_eq!(overlap_distance(&[1, 2, 3], &[1, 0, 0]), 2);
        assert_eq!(overlap_distance(&[1, 2], &[1, 2]), 0);
    }

    #[test]
    fn fixed_k_votes_proportionally() {
        let mut knn = NearestNeighbors::new(KnnParams {
            k: 2,
            cross_validate: false,
        });
        knn.fit(&tiny()).unwrap();
        assert_eq!(knn.k(), 2);
        // [1,1] matches rows 0 and 4 exactly
        let dist = knn.predict_distribution(&[1, 1]).unwrap();
        assert_eq!(dist, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn neighbours_come_closest_first() {
        let mut knn = NearestNeighbors::new(KnnParams {
            k: 5,
            cross_validate: false,
        });
        knn.fit(&tiny()).unwrap();
        let attributes = knn.attributes.clone().unwrap();
        let points = knn.points(&attributes);
        let index = BallTree::new().from_batch(&points, L2Dist).unwrap();
        let ranked = knn.nearest(&*index, &[2, 2], 5, &attributes).unwrap();
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0], 2);
        let distances: Vec<usize> = ranked
            .iter()
            .map(|&r| overlap_distance(&[2, 2], &knn.features[r]))
            .collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]), "{distances:?}");
    }

    #[test]
    fn cross_validation_picks_a_k_in_range() {
        let mut knn = NearestNeighbors::new(KnnParams::default());
        knn.fit(&fixtures::separable()).unwrap();
        assert!((1..=5).contains(&knn.k()));
    }

    #[test]
    fn k_larger_than_training_set_is_capped() {
        let mut knn = NearestNeighbors::new(KnnParams {
            k: 50,
            cross_validate: false,
        });
        knn.fit(&tiny()).unwrap();
        assert_eq!(knn.k(), 5);
    }

    #[test]
    fn out_of_range_training_rows_are_inconsistent() {
        let mut knn = NearestNeighbors::new(KnnParams::default());
        knn.fit(&tiny()).unwrap();
        knn.check_consistency().unwrap();

        knn.features[3] = vec![1, 7];
        assert!(knn.check_consistency().unwrap_err().contains("row 3"));

        knn.features[3] = vec![2, 1];
        knn.labels.pop();
        assert!(knn.check_consistency().is_err());
    }
}
