//! One-vs-rest linear-kernel SVM on the one-hot expansion, fitted with linfa's SMO solver.
//!
//! Each binary machine is collapsed to its primal form `w·x - rho` with
//! `w = Σ αᵢ·xᵢ`, so the artifact holds one weight per feature category and
//! prediction never needs the training rows.

use linfa::traits::Fit;
use linfa_svm::Svm;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Classifier, fitted, one_hot_matrix, one_hot_offsets, require_rows, softmax};
use crate::encoding::{Attributes, Dataset};
use crate::error::{CelllineError, Result};

pub(crate) const NAME: &str = "Support Vector Machine";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmParams {
    /// Soft-margin cost, applied to both classes of every machine.
    pub c: f64,
    /// Solver stopping tolerance.
    pub eps: f64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self { c: 1.0, eps: 1e-3 }
    }
}

/// Primal form of one binary machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Machine {
    weights: Vec<f64>,
    rho: f64,
}

impl Machine {
    /// Always positive; used when every training row belongs to the class.
    fn constant(width: usize) -> Self {
        Self {
            weights: vec![0.0; width],
            rho: -1.0,
        }
    }

    fn margin(&self, active: &[usize]) -> f64 {
        active.iter().map(|&j| self.weights[j]).sum::<f64>() - self.rho
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSvm {
    params: SvmParams,
    attributes: Option<Attributes>,
    /// One machine per class; `None` for classes absent from training.
    machines: Vec<Option<Machine>>,
}

impl LinearSvm {
    #[must_use]
    pub fn new(params: SvmParams) -> Self {
        Self {
            params,
            attributes: None,
            machines: Vec::new(),
        }
    }

    /// Indices of the non-zero one-hot inputs.
    fn active(features: &[usize], attributes: &Attributes) -> Vec<usize> {
        features
            .iter()
            .zip(one_hot_offsets(attributes))
            .map(|(&value, offset)| offset + value)
            .collect()
    }

    fn train_machine(&self, records: &Array2<f64>, labels: &[usize], class: usize) -> Result<Machine> {
        let targets: Array1<bool> = labels.iter().map(|&l| l == class).collect();
        if targets.iter().all(|&t| t) {
            return Ok(Machine::constant(records.ncols()));
        }

        let dataset = linfa::Dataset::new(records.clone(), targets);
        let svm = Svm::<f64, bool>::params()
            .pos_neg_weights(self.params.c, self.params.c)
            .eps(self.params.eps)
            .linear_kernel()
            .fit(&dataset)
            .map_err(|e| CelllineError::training(NAME, format!("class {class}: {e}")))?;

        let mut weights = vec![0.0; records.ncols()];
        for (alpha, row) in svm.alpha.iter().zip(records.rows()) {
            for (w, x) in weights.iter_mut().zip(row) {
                *w += alpha * x;
            }
        }
        Ok(Machine {
            weights,
            rho: svm.rho,
        })
    }
}

impl Classifier for LinearSvm {
    fn name(&self) -> &'static str {
        NAME
    }

    fn fit(&mut self, data: &Dataset) -> Result<()> {
        require_rows(data, NAME)?;
        if !(self.params.c.is_finite() && self.params.c > 0.0) {
            return Err(CelllineError::training(NAME, "C must be a positive number"));
        }
        if !(self.params.eps.is_finite() && self.params.eps > 0.0) {
            return Err(CelllineError::training(NAME, "eps must be a positive number"));
        }

        let attributes = data.attributes().clone();
        let records = one_hot_matrix(data.iter().map(|(f, _)| f), &attributes);

        let mut machines = Vec::with_capacity(attributes.num_classes);
        for class in 0..attributes.num_classes {
            if data.labels().contains(&class) {
                machines.push(Some(self.train_machine(&records, data.labels(), class)?));
            } else {
                machines.push(None);
            }
        }

        debug!(
            classes = machines.iter().filter(|m| m.is_some()).count(),
            width = records.ncols(),
            "fitted linear svm"
        );
        self.machines = machines;
        self.attributes = Some(attributes);
        Ok(())
    }

    fn predict_distribution(&self, features: &[usize]) -> Result<Vec<f64>> {
        let attributes = fitted(&self.attributes, NAME)?;
        attributes.validate(features)?;

        let active = Self::active(features, attributes);
        let margins: Vec<f64> = self
            .machines
            .iter()
            .map(|m| m.as_ref().map_or(f64::NEG_INFINITY, |m| m.margin(&active)))
            .collect();
        Ok(softmax(&margins))
    }

    fn attributes(&self) -> Option<&Attributes> {
        self.attributes.as_ref()
    }

    fn check_consistency(&self) -> std::result::Result<(), String> {
        let Some(attributes) = &self.attributes else {
            return Ok(());
        };
        if self.machines.len() != attributes.num_classes {
            return Err(format!(
                "{} machines for {} classes",
                self.machines.len(),
                attributes.num_classes
            ));
        }
        let width = attributes.one_hot_width();
        for (class, machine) in self.machines.iter().enumerate() {
            let Some(machine) = machine else { continue };
            if machine.weights.len() != width {
                return Err(format!(
                    "machine {class} has {} weights, one-hot width is {width}",
                    machine.weights.len()
                ));
            }
            if !machine.rho.is_finite() || machine.weights.iter().any(|w| !w.is_finite()) {
                return Err(format!("machine {class} has non-finite parameters"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures;

    #[test]
    fn absent_classes_get_zero_probability() {
        let mut svm = LinearSvm::new(SvmParams::default());
        svm.fit(&fixtures::separable()).unwrap();
        let dist = svm.predict_distribution(&[1, 0, 0]).unwrap();
        assert_eq!(dist[0], 0.0);
        assert!(dist[1] > dist[2] && dist[1] > dist[3]);
    }

    #[test]
    fn refitting_gives_identical_machines() {
        let data = fixtures::separable();
        let mut a = LinearSvm::new(SvmParams::default());
        let mut b = LinearSvm::new(SvmParams::default());
        a.fit(&data).unwrap();
        b.fit(&data).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_cost_is_training_error() {
        let mut svm = LinearSvm::new(SvmParams {
            c: 0.0,
            ..SvmParams::default()
        });
        assert!(matches!(
            svm.fit(&fixtures::separable()),
            Err(CelllineError::Training { .. })
        ));
    }

    #[test]
    fn machines_span_the_one_hot_width() {
        let mut svm = LinearSvm::new(SvmParams::default());
        svm.fit(&fixtures::separable()).unwrap();
        // cardinalities [4, 3, 3]
        assert_eq!(svm.machines.len(), 4);
        assert!(svm.machines[0].is_none());
        for machine in svm.machines.iter().flatten() {
            assert_eq!(machine.weights.len(), 10);
        }
        svm.check_consistency().unwrap();
    }

    #[test]
    fn single_class_data_is_always_that_class() {
        let attributes = Attributes {
            cardinalities: vec![3],
            num_classes: 2,
        };
        let instances = (0..3)
            .map(|v| crate::encoding::EncodedInstance {
                features: vec![v],
                label: Some(1),
            })
            .collect();
        let data = Dataset::new(attributes, instances).unwrap();
        let mut svm = LinearSvm::new(SvmParams::default());
        svm.fit(&data).unwrap();
        assert_eq!(svm.predict_distribution(&[2]).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn truncated_weights_are_inconsistent() {
        let mut svm = LinearSvm::new(SvmParams::default());
        svm.fit(&fixtures::separable()).unwrap();
        for machine in svm.machines.iter_mut().flatten() {
            machine.weights.truncate(1);
        }
        let err = svm.check_consistency().unwrap_err();
        assert!(err.contains("weights"), "{err}");
    }
}
