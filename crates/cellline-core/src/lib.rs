//! # Cellline Core
//!
//! Categorical encoding, classifier families and serving-side prediction for
//! typing cancer cell lines from assay descriptors.
//!
//! ## Quick Start
//!
//! ```rust
//! use cellline_core::{
//!     Classifier, CsvTable, FeatureMap, FeatureSchema, Hyperparameters, InstanceAssembler,
//!     ModelArtifact, ModelFamily, Predictor, Vocabulary,
//! };
//!
//! let table = CsvTable::parse_str("tissue,label\nlung,LUAD\nskin,SKCM\nlung,LUAD\n").unwrap();
//! let vocabulary = Vocabulary::build(&table).unwrap();
//! let schema = FeatureSchema::new(["tissue"], "label").unwrap();
//! let assembler = InstanceAssembler::new(schema.clone(), &vocabulary).unwrap();
//! let data = assembler.assemble_table(&table).unwrap();
//!
//! let mut model = ModelFamily::NearestNeighbors.build(&Hyperparameters::default());
//! model.fit(&data).unwrap();
//!
//! let artifact = ModelArtifact::new(model, 100.0, schema, &vocabulary).unwrap();
//! let predictor = Predictor::from_artifact(artifact).unwrap();
//!
//! let mut input = FeatureMap::new();
//! input.insert("tissue".into(), "lung".into());
//! let prediction = predictor.predict(&input).unwrap();
//! assert_eq!(prediction.label, "LUAD");
//! ```
pub mod encoding;
pub mod error;
pub mod model;
pub mod predictor;
pub mod schema;
pub mod store;
pub mod table;
pub mod vocab;

// Re-export primary API
pub use encoding::{
    Attributes, Dataset, EncodedInstance, EncodingWarning, FeatureEncoder, FeatureMap,
    InstanceAssembler, WarningReason,
};
pub use error::{CelllineError, Result};
pub use model::{Classifier, Hyperparameters, ModelFamily, TrainedModel};
pub use predictor::{
    HealthReport, Prediction, PredictionResponse, Predictor, PredictorSlot, PredictorState,
    health,
};
pub use schema::{FEATURE_COLUMNS, FeatureSchema, LABEL_COLUMN, column_key};
pub use store::ModelArtifact;
pub use table::CsvTable;
pub use vocab::{UNKNOWN, Vocabulary};
