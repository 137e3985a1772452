//! Serving-side prediction.
//!
//! A [`Predictor`] is built once from a model artifact and is immutable
//! afterwards; concurrent requests share it through `&Predictor` or `Arc`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::encoding::{EncodingWarning, FeatureMap, InstanceAssembler};
use crate::error::{CelllineError, Result};
use crate::model::{Classifier, TrainedModel, argmax};
use crate::schema::{FeatureSchema, column_key};
use crate::store::ModelArtifact;
use crate::table::CsvTable;
use crate::vocab::Vocabulary;

/// Lifecycle of a predictor. `Uninitialized` is an empty [`PredictorSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorState {
    Uninitialized,
    Loaded,
    Serving,
}

/// A successful prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// Probability of `label` in percent, within `[0, 100]`.
    pub confidence: f64,
    /// Input values replaced by `unknown`.
    pub substitutions: Vec<EncodingWarning>,
}

/// Wire shape of a prediction reply: `{success, prediction, confidence}` or
/// `{success: false, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<Prediction>> for PredictionResponse {
    fn from(result: Result<Prediction>) -> Self {
        match result {
            Ok(prediction) => Self {
                success: true,
                prediction: Some(prediction.label),
                confidence: Some(prediction.confidence),
                error: None,
            },
            Err(err) => Self {
                success: false,
                prediction: None,
                confidence: None,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Liveness report for the model file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    /// Milliseconds since the Unix epoch.
    pub server_time: u64,
    pub model_exists: bool,
    pub model_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_size: Option<u64>,
    /// Milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_last_modified: Option<u64>,
}

fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Reports whether the model file at `model_path` exists, with its size and mtime.
pub fn health<P: AsRef<Path>>(model_path: P) -> HealthReport {
    let path = model_path.as_ref();
    let metadata = fs::metadata(path).ok().filter(|m| m.is_file());
    HealthReport {
        status: "UP".to_string(),
        server_time: epoch_millis(SystemTime::now()),
        model_exists: metadata.is_some(),
        model_path: path.display().to_string(),
        model_size: metadata.as_ref().map(fs::Metadata::len),
        model_last_modified: metadata
            .as_ref()
            .and_then(|m| m.modified().ok())
            .map(epoch_millis),
    }
}

pub struct Predictor {
    assembler: InstanceAssembler,
    model: TrainedModel,
    name: String,
    accuracy: f64,
    served: AtomicU64,
}

impl Predictor {
    /// Loads the artifact at `artifact_path`.
    ///
    /// If `csv` is given, a vocabulary is rebuilt from it and compared with
    /// the persisted one; differences are logged and the persisted
    /// vocabulary is used regardless.
    ///
    /// # Errors
    ///
    /// `CelllineError::ModelLoadError` if the artifact cannot be loaded,
    /// or any error from reading `csv`.
    pub fn load<P: AsRef<Path>>(artifact_path: P, csv: Option<&Path>) -> Result<Self> {
        let artifact = ModelArtifact::load(artifact_path)?;
        let predictor = Self::from_artifact(artifact)?;
        if let Some(csv) = csv {
            let table = CsvTable::from_path(csv)?;
            predictor.check_drift(&Vocabulary::build(&table)?);
        }
        Ok(predictor)
    }

    /// Serves an artifact already in memory.
    ///
    /// # Errors
    ///
    /// `CelllineError::ModelLoadError` if the artifact's vocabulary does not
    /// cover its schema or its model does not fit that vocabulary.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self> {
        artifact.check_model()?;
        let assembler = InstanceAssembler::new(artifact.schema, &artifact.vocabulary)
            .map_err(|e| CelllineError::ModelLoadError(e.to_string()))?;
        info!(
            model = %artifact.name,
            accuracy = artifact.accuracy,
            features = assembler.schema().num_features(),
            "predictor loaded"
        );
        Ok(Self {
            assembler,
            model: artifact.model,
            name: artifact.name,
            accuracy: artifact.accuracy,
            served: AtomicU64::new(0),
        })
    }

    /// Logs columns whose rebuilt vocabulary differs from the persisted one.
    /// Returns the drifted column names.
    pub fn check_drift(&self, rebuilt: &Vocabulary) -> Vec<String> {
        let drifted = match rebuilt.restrict_to(self.assembler.schema()) {
            Ok(rebuilt) => rebuilt.drift_from(self.assembler.vocabulary()),
            Err(err) => {
                warn!(error = %err, "rebuilt vocabulary does not cover the schema");
                self.assembler.schema().columns().map(str::to_string).collect()
            }
        };
        if drifted.is_empty() {
            debug!("rebuilt vocabulary matches the model");
        } else {
            warn!(
                columns = ?drifted,
                "vocabulary drift between csv and model; using the model's vocabulary"
            );
        }
        drifted
    }

    /// Name of the served candidate.
    pub fn model_name(&self) -> &str {
        &self.name
    }

    /// Holdout accuracy recorded at training time, in percent.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.assembler.schema()
    }

    #[must_use]
    pub fn state(&self) -> PredictorState {
        if self.served.load(Ordering::Relaxed) == 0 {
            PredictorState::Loaded
        } else {
            PredictorState::Serving
        }
    }

    /// Predicts the label for a raw feature map.
    ///
    /// Absent, blank and unrecognized values become `unknown`; unknown keys
    /// are ignored.
    ///
    /// # Errors
    ///
    /// `CelllineError::Prediction` if the model cannot score the instance.
    pub fn predict(&self, features: &FeatureMap) -> Result<Prediction> {
        let (instance, substitutions) = self.assembler.assemble_features(features);
        let (label, confidence) = self.predict_encoded(&instance.features)?;
        Ok(Prediction {
            label,
            confidence,
            substitutions,
        })
    }

    /// Scores an already encoded feature vector: decoded label and confidence.
    ///
    /// # Errors
    ///
    /// `CelllineError::Prediction` for malformed instances.
    pub fn predict_encoded(&self, features: &[usize]) -> Result<(String, f64)> {
        self.served.fetch_add(1, Ordering::Relaxed);
        let distribution = self.model.predict_distribution(features)?;
        let index = argmax(&distribution);
        let probability = distribution
            .get(index)
            .copied()
            .filter(|p| p.is_finite())
            .ok_or_else(|| {
                CelllineError::Prediction(format!("{} returned no usable distribution", self.name))
            })?;
        let confidence = (probability * 100.0).clamp(0.0, 100.0);
        let label = self.assembler.decode_label(index)?.to_string();
        debug!(label = %label, confidence, "prediction");
        Ok((label, confidence))
    }

    /// Like [`Predictor::predict`], but errors become a failed response.
    pub fn respond(&self, features: &FeatureMap) -> PredictionResponse {
        let result = self.predict(features);
        if let Err(err) = &result {
            warn!(error = %err, "prediction failed");
        }
        result.into()
    }

    /// Known values of every schema column, keyed by short form-field key.
    #[must_use]
    pub fn categories(&self) -> BTreeMap<String, Vec<String>> {
        self.assembler
            .vocabulary()
            .columns()
            .iter()
            .map(|c| (column_key(c.name()), c.values().to_vec()))
            .collect()
    }
}

/// Holds at most one predictor for the lifetime of a service.
#[derive(Default)]
pub struct PredictorSlot {
    cell: OnceLock<Predictor>,
}

impl PredictorSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> PredictorState {
        self.cell
            .get()
            .map_or(PredictorState::Uninitialized, Predictor::state)
    }

    pub fn get(&self) -> Option<&Predictor> {
        self.cell.get()
    }

    /// Loads the predictor on first call and returns the stored one afterwards.
    ///
    /// # Errors
    ///
    /// As [`Predictor::load`]; the slot stays empty on failure.
    pub fn get_or_load<P: AsRef<Path>>(
        &self,
        artifact_path: P,
        csv: Option<&Path>,
    ) -> Result<&Predictor> {
        if let Some(predictor) = self.cell.get() {
            return Ok(predictor);
        }
        let predictor = Predictor::load(artifact_path, csv)?;
        // a concurrent loader may have filled the slot first; keep its predictor
        let _ = self.cell.set(predictor);
        self.cell
            .get()
            .ok_or_else(|| CelllineError::ModelLoadError("predictor slot is empty".into()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{Hyperparameters, ModelFamily};
    use crate::vocab::UNKNOWN;

    const CSV: &str = "\
tissue,msi,medium,label
lung,MSS,R,LUAD
lung,MSS,D,LUAD
skin,MSI-H,R,SKCM
skin,MSI-H,D,SKCM
breast,MSS,R,BRCA
breast,MSS,D,BRCA
";

    fn artifact(family: ModelFamily) -> ModelArtifact {
        let table = CsvTable::parse_str(CSV).unwrap();
        let vocab = Vocabulary::build(&table).unwrap();
        let schema = FeatureSchema::new(["tissue", "msi", "medium"], "label").unwrap();
        let assembler = InstanceAssembler::new(schema.clone(), &vocab).unwrap();
        let data = assembler.assemble_table(&table).unwrap();
        let mut model = family.build(&Hyperparameters::default());
        model.fit(&data).unwrap();
        ModelArtifact::new(model, 100.0, schema, &vocab).unwrap()
    }

    fn predictor() -> Predictor {
        Predictor::from_artifact(artifact(ModelFamily::RandomForest)).unwrap()
    }

    fn input(pairs: &[(&str, &str)]) -> FeatureMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn inconsistent_artifact_is_refused_before_serving() {
        let mut artifact = artifact(ModelFamily::LinearSvm);
        let mut json = serde_json::to_value(&artifact.model).unwrap();
        for machine in json["machines"].as_array_mut().unwrap() {
            if let Some(weights) = machine.get_mut("weights") {
                weights.as_array_mut().unwrap().truncate(1);
            }
        }
        artifact.model = serde_json::from_value(json).unwrap();
        assert!(matches!(
            Predictor::from_artifact(artifact),
            Err(CelllineError::ModelLoadError(_))
        ));
    }

    #[test]
    fn predicts_a_known_row() {
        let predictor = predictor();
        let out = predictor
            .predict(&input(&[("tissue", "skin"), ("msi", "MSI-H"), ("medium", "R")]))
            .unwrap();
        assert_eq!(out.label, "SKCM");
        assert!((0.0..=100.0).contains(&out.confidence));
        assert!(out.substitutions.is_empty());
    }

    #[test]
    fn missing_column_still_predicts() {
        let predictor = predictor();
        let out = predictor
            .predict(&input(&[("tissue", "lung"), ("medium", "D")]))
            .unwrap();
        assert!(!out.label.is_empty());
        assert!((0.0..=100.0).contains(&out.confidence));
        assert_eq!(out.substitutions.len(), 1);
        assert_eq!(out.substitutions[0].column, "msi");
    }

    #[test]
    fn confidence_is_probability_of_label() {
        let artifact = artifact(ModelFamily::NearestNeighbors);
        let predictor = Predictor::from_artifact(artifact.clone()).unwrap();
        let features = [1, 1, 1];
        let dist = artifact.model.predict_distribution(&features).unwrap();
        let (label, confidence) = predictor.predict_encoded(&features).unwrap();
        let index = argmax(&dist);
        assert_eq!(label, artifact.vocabulary.columns()[3].values()[index]);
        assert!((confidence - dist[index] * 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_is_all_unknown() {
        let predictor = predictor();
        let out = predictor.predict(&FeatureMap::new()).unwrap();
        assert_eq!(out.substitutions.len(), 3);
        assert!((0.0..=100.0).contains(&out.confidence));
    }

    #[test]
    fn respond_reports_failure_without_panicking() {
        let predictor = predictor();
        let ok = predictor.respond(&input(&[("tissue", "lung")]));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let err = predictor.predict_encoded(&[1, 1]).unwrap_err();
        let failed = PredictionResponse::from(Err::<Prediction, _>(err));
        assert!(!failed.success);
        let json = serde_json::to_value(&failed).unwrap();
        assert!(json.get("prediction").is_none());
        assert!(json["error"].as_str().unwrap().contains("features"));
    }

    #[test]
    fn state_moves_to_serving_on_first_request() {
        let predictor = predictor();
        assert_eq!(predictor.state(), PredictorState::Loaded);
        let _ = predictor.respond(&FeatureMap::new());
        assert_eq!(predictor.state(), PredictorState::Serving);
    }

    #[test]
    fn categories_are_keyed_by_short_key() {
        let predictor = predictor();
        let categories = predictor.categories();
        assert_eq!(categories.len(), 4);
        assert_eq!(categories["tissue"], vec![UNKNOWN, "lung", "skin", "breast"]);
        assert_eq!(categories["label"][0], UNKNOWN);
    }

    #[test]
    fn drift_is_detected_but_not_applied() {
        let predictor = predictor();
        let same = Vocabulary::build(&CsvTable::parse_str(CSV).unwrap()).unwrap();
        assert!(predictor.check_drift(&same).is_empty());

        let changed = CsvTable::parse_str(
            "tissue,msi,medium,label\nkidney,MSS,R,KIRC\nkidney,MSI-H,D,KIRC\n",
        )
        .unwrap();
        let drifted = predictor.check_drift(&Vocabulary::build(&changed).unwrap());
        assert_eq!(drifted, vec!["tissue", "label"]);
        assert_eq!(predictor.categories()["tissue"][1], "lung");
    }

    #[test]
    fn load_with_csv_checks_drift() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.json");
        let csv = dir.path().join("data.csv");
        artifact(ModelFamily::LogitBoost).save(&model).unwrap();
        fs::write(&csv, CSV).unwrap();
        let predictor = Predictor::load(&model, Some(csv.as_path())).unwrap();
        assert_eq!(predictor.model_name(), "LogitBoost");
    }

    #[test]
    fn slot_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.json");
        artifact(ModelFamily::RandomForest).save(&model).unwrap();

        let slot = PredictorSlot::new();
        assert_eq!(slot.state(), PredictorState::Uninitialized);
        assert!(slot.get_or_load(dir.path().join("absent.json"), None).is_err());
        assert_eq!(slot.state(), PredictorState::Uninitialized);

        slot.get_or_load(&model, None).unwrap();
        assert_eq!(slot.state(), PredictorState::Loaded);
        fs::remove_file(&model).unwrap();
        assert!(slot.get_or_load(&model, None).is_ok());
    }

    #[test]
    fn health_reports_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.json");
        let report = health(&model);
        assert_eq!(report.status, "UP");
        assert!(!report.model_exists);
        assert!(report.model_size.is_none());

        fs::write(&model, "{}").unwrap();
        let report = health(&model);
        assert!(report.model_exists);
        assert_eq!(report.model_size, Some(2));
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("modelLastModified").is_some());
        assert!(json.get("serverTime").is_some());
    }

    #[test]
    fn concurrent_predictions_share_one_predictor() {
        let predictor = Arc::new(predictor());
        let expected = predictor
            .predict(&input(&[("tissue", "breast")]))
            .unwrap();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let predictor = Arc::clone(&predictor);
                let expected = expected.clone();
                scope.spawn(move || {
                    for _ in 0..10 {
                        let out = predictor.predict(&input(&[("tissue", "breast")])).unwrap();
                        assert_eq!(out, expected);
                    }
                });
            }
        });
        assert_eq!(predictor.state(), PredictorState::Serving);
    }
}
