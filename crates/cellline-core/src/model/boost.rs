//! Multi-class LogitBoost with regression stumps.
//!
//! Each round fits one stump per class to the working responses of the
//! additive logistic model; class scores are centred across classes and the
//! distribution is their softmax. Fitting is deterministic.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Classifier, fitted, require_rows, softmax};
use crate::encoding::{Attributes, Dataset};
use crate::error::{CelllineError, Result};

pub(crate) const NAME: &str = "LogitBoost";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostParams {
    pub iterations: usize,
    pub shrinkage: f64,
    /// Clamp on the working response.
    pub z_max: f64,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            iterations: 100,
            shrinkage: 1.0,
            z_max: 3.0,
        }
    }
}

/// `hit` if `features[feature] == value`, else `miss`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Stump {
    feature: usize,
    value: usize,
    hit: f64,
    miss: f64,
}

impl Stump {
    fn constant(value: f64) -> Self {
        Self {
            feature: 0,
            value: usize::MAX,
            hit: value,
            miss: value,
        }
    }

    fn eval(&self, features: &[usize]) -> f64 {
        if features.get(self.feature) == Some(&self.value) {
            self.hit
        } else {
            self.miss
        }
    }

    /// Weighted least-squares stump over "feature == value" tests.
    fn fit(data: &Dataset, z: &[f64], w: &[f64]) -> Self {
        let total_w: f64 = w.iter().sum();
        if total_w <= 0.0 {
            return Self::constant(0.0);
        }
        let total_wz: f64 = w.iter().zip(z).map(|(w, z)| w * z).sum();

        let mut best = Self::constant(total_wz / total_w);
        let mut best_score = total_wz * total_wz / total_w;

        let attributes = data.attributes();
        for (feature, &cardinality) in attributes.cardinalities.iter().enumerate() {
            let mut sum_w = vec![0.0; cardinality];
            let mut sum_wz = vec![0.0; cardinality];
            for (row, (features, _)) in data.iter().enumerate() {
                sum_w[features[feature]] += w[row];
                sum_wz[features[feature]] += w[row] * z[row];
            }
            for value in 0..cardinality {
                let (hw, hwz) = (sum_w[value], sum_wz[value]);
                let (mw, mwz) = (total_w - hw, total_wz - hwz);
                if hw <= 1e-12 || mw <= 1e-12 {
                    continue;
                }
                let score = hwz * hwz / hw + mwz * mwz / mw;
                if score > best_score + 1e-12 {
                    best_score = score;
                    best = Self {
                        feature,
                        value,
                        hit: hwz / hw,
                        miss: mwz / mw,
                    };
                }
            }
        }
        best
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogitBoost {
    params: BoostParams,
    attributes: Option<Attributes>,
    /// `rounds[m][class]`
    rounds: Vec<Vec<Stump>>,
}

impl LogitBoost {
    #[must_use]
    pub fn new(params: BoostParams) -> Self {
        Self {
            params,
            attributes: None,
            rounds: Vec::new(),
        }
    }

    #[must_use]
    pub fn num_rounds(&self) -> usize {
        self.rounds.len()
    }

    fn round_scores(&self, round: &[Stump], features: &[usize]) -> Vec<f64> {
        let raw: Vec<f64> = round.iter().map(|s| s.eval(features)).collect();
        centred(&raw, self.params.shrinkage)
    }

    fn scores(&self, features: &[usize], num_classes: usize) -> Vec<f64> {
        let mut scores = vec![0.0; num_classes];
        for round in &self.rounds {
            for (score, delta) in scores.iter_mut().zip(self.round_scores(round, features)) {
                *score += delta;
            }
        }
        scores
    }
}

/// `shrinkage * (J-1)/J * (f_j - mean f)`.
fn centred(raw: &[f64], shrinkage: f64) -> Vec<f64> {
    let j = raw.len() as f64;
    if j <= 1.0 {
        return vec![0.0; raw.len()];
    }
    let mean = raw.iter().sum::<f64>() / j;
    raw.iter()
        .map(|f| shrinkage * (j - 1.0) / j * (f - mean))
        .collect()
}

impl Classifier for LogitBoost {
    fn name(&self) -> &'static str {
        NAME
    }

    fn fit(&mut self, data: &Dataset) -> Result<()> {
        require_rows(data, NAME)?;
        if !(self.params.shrinkage.is_finite() && self.params.shrinkage > 0.0) {
            return Err(CelllineError::training(NAME, "shrinkage must be positive"));
        }
        if !(self.params.z_max.is_finite() && self.params.z_max > 0.0) {
            return Err(CelllineError::training(NAME, "z_max must be positive"));
        }

        let num_classes = data.attributes().num_classes;
        let n = data.len();
        let mut scores = vec![vec![0.0; num_classes]; n];
        let mut probs = vec![vec![1.0 / num_classes as f64; num_classes]; n];
        let mut rounds = Vec::with_capacity(self.params.iterations);

        for _ in 0..self.params.iterations {
            let mut round = Vec::with_capacity(num_classes);
            for class in 0..num_classes {
                let mut z = Vec::with_capacity(n);
                let mut w = Vec::with_capacity(n);
                for row in 0..n {
                    let p = probs[row][class];
                    let (zi, wi) = working_response(data.label(row) == class, p, self.params.z_max);
                    z.push(zi);
                    w.push(wi);
                }
                round.push(Stump::fit(data, &z, &w));
            }

            for (row, (features, _)) in data.iter().enumerate() {
                let delta = centred(
                    &round.iter().map(|s| s.eval(features)).collect::<Vec<_>>(),
                    self.params.shrinkage,
                );
                for (score, d) in scores[row].iter_mut().zip(delta) {
                    *score += d;
                }
                probs[row] = softmax(&scores[row]);
            }
            rounds.push(round);
        }

        debug!(rounds = rounds.len(), classes = num_classes, "fitted logitboost");
        self.rounds = rounds;
        self.attributes = Some(data.attributes().clone());
        Ok(())
    }

    fn predict_distribution(&self, features: &[usize]) -> Result<Vec<f64>> {
        let attributes = fitted(&self.attributes, NAME)?;
        attributes.validate(features)?;
        Ok(softmax(&self.scores(features, attributes.num_classes)))
    }

    fn attributes(&self) -> Option<&Attributes> {
        self.attributes.as_ref()
    }

    fn check_consistency(&self) -> std::result::Result<(), String> {
        let Some(attributes) = &self.attributes else {
            return Ok(());
        };
        for (m, round) in self.rounds.iter().enumerate() {
            if round.len() != attributes.num_classes {
                return Err(format!(
                    "round {m} has {} stumps for {} classes",
                    round.len(),
                    attributes.num_classes
                ));
            }
            if round.iter().any(|s| !(s.hit.is_finite() && s.miss.is_finite())) {
                return Err(format!("round {m} has a non-finite stump"));
            }
        }
        Ok(())
    }
}

/// Working response and weight for one row and class, clamped to `z_max`.
fn working_response(is_class: bool, p: f64, z_max: f64) -> (f64, f64) {
    if is_class {
        let z = if p > 0.0 { (1.0 / p).min(z_max) } else { z_max };
        (z, (1.0 - p) / z)
    } else {
        let z = if p < 1.0 { (-1.0 / (1.0 - p)).max(-z_max) } else { -z_max };
        (z, -p / z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures;

    #[test]
    fn working_response_matches_unclamped_formula() {
        let (z, w) = working_response(true, 0.5, 3.0);
        assert!((z - 2.0).abs() < 1e-12);
        assert!((w - 0.25).abs() < 1e-12);

        let (z, w) = working_response(false, 0.5, 3.0);
        assert!((z + 2.0).abs() < 1e-12);
        assert!((w - 0.25).abs() < 1e-12);
    }

    #[test]
    fn working_response_is_clamped() {
        let (z, _) = working_response(true, 0.01, 3.0);
        assert_eq!(z, 3.0);
        let (z, _) = working_response(false, 0.99, 3.0);
        assert_eq!(z, -3.0);
    }

    #[test]
    fn centred_scores_sum_to_zero() {
        let c = centred(&[1.0, 2.0, 6.0], 1.0);
        assert!(c.iter().sum::<f64>().abs() < 1e-12);
    }

    #[test]
    fn boosting_runs_every_iteration() {
        let mut boost = LogitBoost::new(BoostParams {
            iterations: 7,
            ..BoostParams::default()
        });
        boost.fit(&fixtures::separable()).unwrap();
        assert_eq!(boost.num_rounds(), 7);
    }

    #[test]
    fn short_rounds_are_inconsistent() {
        let mut boost = LogitBoost::new(BoostParams {
            iterations: 3,
            ..BoostParams::default()
        });
        boost.fit(&fixtures::separable()).unwrap();
        boost.check_consistency().unwrap();
        boost.rounds[1].pop();
        assert!(boost.check_consistency().unwrap_err().contains("round 1"));
    }

    #[test]
    fn confident_on_separable_data() {
        let mut boost = LogitBoost::new(BoostParams::default());
        boost.fit(&fixtures::separable()).unwrap();
        let dist = boost.predict_distribution(&[2, 1, 0]).unwrap();
        assert!(dist[2] > 0.9, "{dist:?}");
    }
}
