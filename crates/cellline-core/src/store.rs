//! Model artifact persistence.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::encoding::InstanceAssembler;
use crate::error::{CelllineError, Result};
use crate::model::{Classifier, TrainedModel};
use crate::schema::FeatureSchema;
use crate::vocab::Vocabulary;

/// Bumped whenever the artifact layout changes incompatibly.
pub const FORMAT_VERSION: u32 = 1;

/// Everything the predictor needs to answer requests without the training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    /// Portfolio name of the selected candidate.
    pub name: String,
    /// Holdout accuracy in percent.
    pub accuracy: f64,
    pub schema: FeatureSchema,
    /// Restricted to schema columns, in schema order.
    pub vocabulary: Vocabulary,
    pub model: TrainedModel,
}

impl ModelArtifact {
    /// Bundles a fitted model with the encoding it was trained under.
    ///
    /// # Errors
    ///
    /// `CelllineError::Configuration` if a schema column has no vocabulary,
    /// or the model is unfitted or was fitted under another encoding.
    pub fn new(
        model: TrainedModel,
        accuracy: f64,
        schema: FeatureSchema,
        vocabulary: &Vocabulary,
    ) -> Result<Self> {
        let vocabulary = vocabulary.restrict_to(&schema)?;
        let artifact = Self {
            format_version: FORMAT_VERSION,
            name: model.name().to_string(),
            accuracy,
            schema,
            vocabulary,
            model,
        };
        artifact.check_model().map_err(|e| match e {
            CelllineError::ModelLoadError(reason) => CelllineError::Configuration(reason),
            other => other,
        })?;
        Ok(artifact)
    }

    /// Checks that the model is fitted against exactly the category counts
    /// of the persisted vocabulary.
    ///
    /// # Errors
    ///
    /// `CelllineError::ModelLoadError` describing the first mismatch.
    pub fn check_model(&self) -> Result<()> {
        if self.vocabulary.columns().len() != self.schema.num_features() + 1 {
            return Err(CelllineError::ModelLoadError(
                "vocabulary does not cover the schema".into(),
            ));
        }
        let assembler = InstanceAssembler::new(self.schema.clone(), &self.vocabulary)
            .map_err(|e| CelllineError::ModelLoadError(e.to_string()))?;
        self.model
            .check_fitted_under(&assembler.attributes())
            .map_err(CelllineError::ModelLoadError)
    }

    /// Writes the artifact as JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// `CelllineError::Io` if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), model = %self.name, "saved model artifact");
        Ok(())
    }

    /// Reads an artifact written by [`ModelArtifact::save`].
    ///
    /// # Errors
    ///
    /// `CelllineError::ModelLoadError` if the file is missing, unreadable,
    /// corrupt, of another format version, or holds a model that does not
    /// fit its own vocabulary.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CelllineError::ModelLoadError(format!("cannot read {}: {e}", path.display()))
        })?;
        let artifact: Self = serde_json::from_str(&content).map_err(|e| {
            CelllineError::ModelLoadError(format!("corrupt artifact {}: {e}", path.display()))
        })?;
        if artifact.format_version != FORMAT_VERSION {
            return Err(CelllineError::ModelLoadError(format!(
                "artifact {} has format version {}, expected {FORMAT_VERSION}",
                path.display(),
                artifact.format_version
            )));
        }
        artifact.check_model().map_err(|e| {
            CelllineError::ModelLoadError(format!("artifact {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), model = %artifact.name, "loaded model artifact");
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Hyperparameters, ModelFamily};
    use crate::table::CsvTable;

    fn artifact() -> ModelArtifact {
        let table = CsvTable::parse_str(
            "id,tissue,label\n1,lung,LUAD\n2,skin,SKCM\n3,lung,LUAD\n4,skin,SKCM\n",
        )
        .unwrap();
        let vocab = Vocabulary::build(&table).unwrap();
        let schema = FeatureSchema::new(["tissue"], "label").unwrap();
        let assembler = InstanceAssembler::new(schema.clone(), &vocab).unwrap();
        let data = assembler.assemble_table(&table).unwrap();
        let mut model = ModelFamily::NearestNeighbors.build(&Hyperparameters::default());
        model.fit(&data).unwrap();
        ModelArtifact::new(model, 100.0, schema, &vocab).unwrap()
    }

    #[test]
    fn vocabulary_is_restricted_to_schema() {
        let artifact = artifact();
        assert!(artifact.vocabulary.column("id").is_none());
        assert_eq!(artifact.vocabulary.columns().len(), 2);
        assert_eq!(artifact.name, "K-Nearest Neighbors");
    }

    #[test]
    fn save_then_load_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        let artifact = artifact();
        artifact.save(&path).unwrap();
        assert_eq!(ModelArtifact::load(&path).unwrap(), artifact);
    }

    #[test]
    fn missing_file_is_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelArtifact::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CelllineError::ModelLoadError(_)));
    }

    #[test]
    fn corrupt_file_is_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ModelArtifact::load(&path),
            Err(CelllineError::ModelLoadError(_))
        ));
    }

    #[test]
    fn other_format_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut artifact = artifact();
        artifact.format_version = FORMAT_VERSION + 1;
        artifact.save(&path).unwrap();
        assert!(matches!(
            ModelArtifact::load(&path),
            Err(CelllineError::ModelLoadError(_))
        ));
    }

    fn tamper(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
        let mut json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        edit(&mut json);
        fs::write(path, json.to_string()).unwrap();
    }

    fn saved(family: ModelFamily) -> (tempfile::TempDir, std::path::PathBuf) {
        let table = CsvTable::parse_str(
            "tissue,msi,label\nlung,MSS,LUAD\nskin,MSI-H,SKCM\nlung,MSS,LUAD\nskin,MSS,SKCM\n",
        )
        .unwrap();
        let vocab = Vocabulary::build(&table).unwrap();
        let schema = FeatureSchema::new(["tissue", "msi"], "label").unwrap();
        let assembler = InstanceAssembler::new(schema.clone(), &vocab).unwrap();
        let mut model = family.build(&Hyperparameters::default());
        model.fit(&assembler.assemble_table(&table).unwrap()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        ModelArtifact::new(model, 100.0, schema, &vocab)
            .unwrap()
            .save(&path)
            .unwrap();
        (dir, path)
    }

    fn assert_load_error(path: &Path) {
        let err = ModelArtifact::load(path).unwrap_err();
        assert!(matches!(err, CelllineError::ModelLoadError(_)), "{err}");
    }

    #[test]
    fn untrained_model_is_rejected() {
        let (_dir, path) = saved(ModelFamily::LinearSvm);
        tamper(&path, |json| json["model"]["attributes"] = serde_json::Value::Null);
        assert_load_error(&path);
    }

    #[test]
    fn truncated_svm_weights_are_rejected() {
        let (_dir, path) = saved(ModelFamily::LinearSvm);
        tamper(&path, |json| {
            for machine in json["model"]["machines"].as_array_mut().unwrap() {
                if let Some(weights) = machine.get_mut("weights") {
                    weights.as_array_mut().unwrap().truncate(1);
                }
            }
        });
        assert_load_error(&path);
    }

    #[test]
    fn truncated_tree_children_are_rejected() {
        let (_dir, path) = saved(ModelFamily::RandomForest);
        tamper(&path, |json| {
            for tree in json["model"]["trees"].as_array_mut().unwrap() {
                if let Some(children) = tree.pointer_mut("/split/children") {
                    children.as_array_mut().unwrap().truncate(1);
                }
            }
        });
        assert_load_error(&path);
    }

    #[test]
    fn vocabulary_growth_after_fitting_is_rejected() {
        let (_dir, path) = saved(ModelFamily::NearestNeighbors);
        tamper(&path, |json| {
            let column = &mut json["vocabulary"]["columns"][0]["values"];
            column.as_array_mut().unwrap().push("kidney".into());
        });
        assert_load_error(&path);
    }

    #[test]
    fn new_rejects_a_model_fitted_under_another_vocabulary() {
        let table = CsvTable::parse_str("tissue,label\nlung,LUAD\nskin,SKCM\n").unwrap();
        let wider =
            CsvTable::parse_str("tissue,label\nlung,LUAD\nskin,SKCM\nbone,SARC\n").unwrap();
        let schema = FeatureSchema::new(["tissue"], "label").unwrap();
        let vocab = Vocabulary::build(&table).unwrap();
        let assembler = InstanceAssembler::new(schema.clone(), &vocab).unwrap();
        let mut model = ModelFamily::LogitBoost.build(&Hyperparameters::default());
        model.fit(&assembler.assemble_table(&table).unwrap()).unwrap();

        let err = ModelArtifact::new(model, 50.0, schema, &Vocabulary::build(&wider).unwrap())
            .unwrap_err();
        assert!(matches!(err, CelllineError::Configuration(_)), "{err}");
    }

    #[test]
    fn new_rejects_an_unfitted_model() {
        let table = CsvTable::parse_str("tissue,label\nlung,LUAD\n").unwrap();
        let schema = FeatureSchema::new(["tissue"], "label").unwrap();
        let model = ModelFamily::RandomForest.build(&Hyperparameters::default());
        let err = ModelArtifact::new(model, 0.0, schema, &Vocabulary::build(&table).unwrap())
            .unwrap_err();
        assert!(matches!(err, CelllineError::Configuration(_)), "{err}");
    }
}
