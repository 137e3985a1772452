//! Multiway categorical decision trees, the base learner of the random forest.

use oorandom::Rand64;
use serde::{Deserialize, Serialize};

use super::{normalize, shuffle};
use crate::encoding::{Attributes, Dataset};

/// Growth limits for one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParams {
    /// Features examined per node before settling for the best positive gain.
    pub features_per_split: usize,
    /// `None` grows until nodes are pure or unsplittable.
    pub max_depth: Option<usize>,
}

/// One node. Splits have a child per category of the split feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Leaf { distribution: Vec<f64> },
    Split { feature: usize, children: Vec<Node> },
}

impl Node {
    /// Class distribution for an instance already validated against the tree's attributes.
    pub fn distribution(&self, features: &[usize]) -> &[f64] {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { distribution } => return distribution,
                Node::Split { feature, children } => node = &children[features[*feature]],
            }
        }
    }

    /// Checks every split against `attributes`: the feature exists and has
    /// one child per category, and leaves cover every class.
    ///
    /// # Errors
    ///
    /// A description of the first bad node.
    pub fn check_against(&self, attributes: &Attributes) -> Result<(), String> {
        match self {
            Node::Leaf { distribution } => {
                if distribution.len() != attributes.num_classes {
                    return Err(format!(
                        "leaf has {} probabilities for {} classes",
                        distribution.len(),
                        attributes.num_classes
                    ));
                }
                Ok(())
            }
            Node::Split { feature, children } => {
                let Some(&cardinality) = attributes.cardinalities.get(*feature) else {
                    return Err(format!("split on missing feature {feature}"));
                };
                if children.len() != cardinality {
                    return Err(format!(
                        "split on feature {feature} has {} children for {cardinality} categories",
                        children.len()
                    ));
                }
                children.iter().try_for_each(|child| child.check_against(attributes))
            }
        }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { children, .. } => 1 + children.iter().map(Node::depth).max().unwrap_or(0),
        }
    }
}

/// Grows a tree over `rows` of `data`. Rows may repeat (bootstrap samples).
pub fn grow(data: &Dataset, rows: &[usize], params: TreeParams, rng: &mut Rand64) -> Node {
    grow_node(data, rows, params, 0, rng)
}

fn grow_node(
    data: &Dataset,
    rows: &[usize],
    params: TreeParams,
    depth: usize,
    rng: &mut Rand64,
) -> Node {
    let counts = class_counts(data, rows);
    let distribution = normalize(&counts);

    let pure = counts.iter().filter(|&&c| c > 0.0).count() <= 1;
    let at_limit = params.max_depth.is_some_and(|max| depth >= max);
    if pure || at_limit || rows.len() < 2 {
        return Node::Leaf { distribution };
    }

    let Some(feature) = choose_split(data, rows, &counts, params, rng) else {
        return Node::Leaf { distribution };
    };

    let cardinality = data.attributes().cardinalities[feature];
    let mut partitions: Vec<Vec<usize>> = vec![Vec::new(); cardinality];
    for &row in rows {
        partitions[data.features(row)[feature]].push(row);
    }

    let children = partitions
        .iter()
        .map(|part| {
            if part.is_empty() {
                // unseen branch value
                Node::Leaf {
                    distribution: distribution.clone(),
                }
            } else {
                grow_node(data, part, params, depth + 1, rng)
            }
        })
        .collect();

    Node::Split { feature, children }
}

/// Visits features in random order. After `features_per_split` candidates,
/// keeps going only until some feature has positive gain.
fn choose_split(
    data: &Dataset,
    rows: &[usize],
    counts: &[f64],
    params: TreeParams,
    rng: &mut Rand64,
) -> Option<usize> {
    let num_features = data.attributes().num_features();
    let mut order: Vec<usize> = (0..num_features).collect();
    shuffle(&mut order, rng);

    let window = if params.features_per_split == 0 {
        num_features
    } else {
        params.features_per_split.min(num_features)
    };

    let parent = entropy(counts);
    let mut best: Option<(usize, f64)> = None;
    for (visited, &feature) in order.iter().enumerate() {
        if visited >= window && best.is_some() {
            break;
        }
        let gain = parent - split_entropy(data, rows, feature);
        if gain > 1e-10 && best.is_none_or(|(_, g)| gain > g) {
            best = Some((feature, gain));
        }
    }
    best.map(|(feature, _)| feature)
}

fn class_counts(data: &Dataset, rows: &[usize]) -> Vec<f64> {
    let mut counts = vec![0.0; data.attributes().num_classes];
    for &row in rows {
        counts[data.label(row)] += 1.0;
    }
    counts
}

fn entropy(counts: &[f64]) -> f64 {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    counts
        .iter()
        .filter(|&&c| c > 0.0)
        .map(|&c| {
            let p = c / total;
            -p * p.log2()
        })
        .sum()
}

/// Weighted entropy of the children produced by splitting on `feature`.
fn split_entropy(data: &Dataset, rows: &[usize], feature: usize) -> f64 {
    let attributes = data.attributes();
    let mut counts = vec![vec![0.0; attributes.num_classes]; attributes.cardinalities[feature]];
    for &row in rows {
        counts[data.features(row)[feature]][data.label(row)] += 1.0;
    }
    let total = rows.len() as f64;
    counts
        .iter()
        .map(|c| c.iter().sum::<f64>() / total * entropy(c))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{fixtures, seeded_rng};

    fn all_rows(data: &Dataset) -> Vec<usize> {
        (0..data.len()).collect()
    }

    #[test]
    fn entropy_of_pure_and_even_sets() {
        assert_eq!(entropy(&[4.0, 0.0]), 0.0);
        assert!((entropy(&[2.0, 2.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn separable_data_fits_in_one_split() {
        let data = fixtures::separable();
        let params = TreeParams {
            features_per_split: 0,
            max_depth: None,
        };
        let tree = grow(&data, &all_rows(&data), params, &mut seeded_rng(1));
        assert_eq!(tree.depth(), 1);
        for (features, label) in data.iter() {
            assert_eq!(tree.distribution(features)[label], 1.0);
        }
    }

    #[test]
    fn empty_branches_inherit_parent_distribution() {
        let data = fixtures::separable();
        let params = TreeParams {
            features_per_split: 0,
            max_depth: None,
        };
        let tree = grow(&data, &all_rows(&data), params, &mut seeded_rng(1));
        let Node::Split { feature, children } = &tree else {
            panic!("expected a split");
        };
        // category 0 of feature 0 never occurs in the fixture
        if *feature == 0 {
            assert_eq!(children[0], Node::Leaf {
                distribution: vec![0.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0]
            });
        }
    }

    #[test]
    fn missing_children_fail_the_check() {
        let data = fixtures::separable();
        let params = TreeParams {
            features_per_split: 0,
            max_depth: None,
        };
        let mut tree = grow(&data, &all_rows(&data), params, &mut seeded_rng(1));
        tree.check_against(data.attributes()).unwrap();

        let Node::Split { children, .. } = &mut tree else {
            panic!("expected a split");
        };
        children.pop();
        let err = tree.check_against(data.attributes()).unwrap_err();
        assert!(err.contains("children"), "{err}");
    }

    #[test]
    fn depth_limit_yields_a_leaf() {
        let data = fixtures::separable();
        let params = TreeParams {
            features_per_split: 0,
            max_depth: Some(0),
        };
        let tree = grow(&data, &all_rows(&data), params, &mut seeded_rng(1));
        assert_eq!(tree.depth(), 0);
    }
}
