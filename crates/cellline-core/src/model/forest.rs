//! Random forest over categorical trees.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{self, Node, TreeParams};
use super::{Classifier, DEFAULT_SEED, fitted, require_rows, seeded_rng};
use crate::encoding::{Attributes, Dataset};
use crate::error::{CelllineError, Result};

pub(crate) const NAME: &str = "Random Forest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub trees: usize,
    /// `0` means `floor(log2(features)) + 1`.
    pub features_per_split: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            trees: 100,
            features_per_split: 0,
            max_depth: None,
            seed: DEFAULT_SEED,
        }
    }
}

impl ForestParams {
    fn effective_features(&self, num_features: usize) -> usize {
        if self.features_per_split > 0 {
            return self.features_per_split.min(num_features);
        }
        if num_features == 0 {
            return 0;
        }
        (num_features.ilog2() as usize + 1).min(num_features)
    }
}

/// Bagged trees; the distribution is the mean of the trees' leaf distributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    attributes: Option<Attributes>,
    trees: Vec<Node>,
}

impl RandomForest {
    #[must_use]
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            attributes: None,
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    #[must_use]
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &'static str {
        NAME
    }

    fn fit(&mut self, data: &Dataset) -> Result<()> {
        require_rows(data, NAME)?;
        if self.params.trees == 0 {
            return Err(CelllineError::training(NAME, "forest needs at least one tree"));
        }

        let num_features = data.attributes().num_features();
        let tree_params = TreeParams {
            features_per_split: self.params.effective_features(num_features),
            max_depth: self.params.max_depth,
        };

        let mut rng = seeded_rng(self.params.seed);
        let n = data.len() as u64;
        let mut trees = Vec::with_capacity(self.params.trees);
        for _ in 0..self.params.trees {
            let mut tree_rng = seeded_rng(rng.rand_u64());
            let sample: Vec<usize> = (0..n)
                .map(|_| tree_rng.rand_range(0..n) as usize)
                .collect();
            trees.push(tree::grow(data, &sample, tree_params, &mut tree_rng));
        }

        debug!(
            trees = trees.len(),
            features_per_split = tree_params.features_per_split,
            "fitted random forest"
        );
        self.trees = trees;
        self.attributes = Some(data.attributes().clone());
        Ok(())
    }

    fn predict_distribution(&self, features: &[usize]) -> Result<Vec<f64>> {
        let attributes = fitted(&self.attributes, NAME)?;
        attributes.validate(features)?;

        let mut sum = vec![0.0; attributes.num_classes];
        for tree in &self.trees {
            for (total, p) in sum.iter_mut().zip(tree.distribution(features)) {
                *total += p;
            }
        }
        let count = self.trees.len() as f64;
        Ok(sum.into_iter().map(|s| s / count).collect())
    }

    fn attributes(&self) -> Option<&Attributes> {
        self.attributes.as_ref()
    }

    fn check_consistency(&self) -> std::result::Result<(), String> {
        let Some(attributes) = &self.attributes else {
            return Ok(());
        };
        if self.trees.is_empty() {
            return Err("forest has no trees".into());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.check_against(attributes)
                .map_err(|reason| format!("tree {i}: {reason}"))?;
        }
        Ok(())
    }
}
