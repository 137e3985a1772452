//! Categorical encoding and instance assembly.
//!
//! Raw strings become indices into a column's [`ColumnVocabulary`]. Anything
//! the vocabulary does not know resolves to the `unknown` index and produces
//! an [`EncodingWarning`]; this is the routine case for user input, never an
//! error.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CelllineError, Result};
use crate::schema::{FeatureSchema, column_key};
use crate::table::CsvTable;
use crate::vocab::{ColumnVocabulary, UNKNOWN, Vocabulary};

/// Raw inference input: column name (or short key) → raw value.
pub type FeatureMap = HashMap<String, String>;

/// Why a value was replaced by `unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningReason {
    /// The column was absent from the input.
    Missing,
    /// The value was empty or whitespace.
    Blank,
    /// The value is not in the column's vocabulary.
    NotInVocabulary,
}

/// Non-fatal diagnostic emitted when a value is substituted with `unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingWarning {
    pub column: String,
    pub value: Option<String>,
    pub reason: WarningReason,
}

impl fmt::Display for EncodingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.reason, &self.value) {
            (WarningReason::NotInVocabulary, Some(value)) => write!(
                f,
                "unknown value {value:?} for column {:?}, using {UNKNOWN:?}",
                self.column
            ),
            (WarningReason::Blank, _) => {
                write!(f, "blank value for column {:?}, using {UNKNOWN:?}", self.column)
            }
            _ => write!(f, "no value for column {:?}, using {UNKNOWN:?}", self.column),
        }
    }
}

/// An index plus the diagnostic produced while computing it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub index: usize,
    pub warning: Option<EncodingWarning>,
}

/// Encodes one raw value against one column. Pure; never fails.
#[must_use]
pub fn encode_value(column: &ColumnVocabulary, value: Option<&str>) -> Encoded {
    let unknown = column.unknown_index();
    let substitute = |reason, value: Option<&str>| Encoded {
        index: unknown,
        warning: Some(EncodingWarning {
            column: column.name().to_string(),
            value: value.map(str::to_string),
            reason,
        }),
    };

    let Some(raw) = value else {
        return substitute(WarningReason::Missing, None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return substitute(WarningReason::Blank, Some(raw));
    }
    match column.index_of(trimmed) {
        Some(index) => Encoded {
            index,
            warning: None,
        },
        None => substitute(WarningReason::NotInVocabulary, Some(trimmed)),
    }
}

/// Bidirectional value ↔ index mapping over a whole [`Vocabulary`].
#[derive(Debug, Clone, Copy)]
pub struct FeatureEncoder<'a> {
    vocabulary: &'a Vocabulary,
}

impl<'a> FeatureEncoder<'a> {
    #[must_use]
    pub fn new(vocabulary: &'a Vocabulary) -> Self {
        Self { vocabulary }
    }

    fn column(&self, name: &str) -> Result<&'a ColumnVocabulary> {
        self.vocabulary.column(name).ok_or_else(|| {
            CelllineError::Configuration(format!("no vocabulary for column {name:?}"))
        })
    }

    /// Index of `value` in `column`, or the `unknown` index with a logged warning.
    ///
    /// # Errors
    ///
    /// Only if `column` itself is not part of the vocabulary.
    pub fn encode(&self, value: Option<&str>, column: &str) -> Result<usize> {
        let encoded = encode_value(self.column(column)?, value);
        if let Some(warning) = encoded.warning {
            warn!("{warning}");
        }
        Ok(encoded.index)
    }

    /// Value at `index` in `column`.
    ///
    /// # Errors
    ///
    /// `CelllineError::Prediction` if `index` is out of range.
    pub fn decode(&self, index: usize, column: &str) -> Result<&'a str> {
        let vocab = self.column(column)?;
        vocab.value(index).ok_or_else(|| {
            CelllineError::Prediction(format!(
                "class index {index} out of range for column {column:?} ({} values)",
                vocab.len()
            ))
        })
    }
}

/// A fixed-length encoded row. `features` follows schema order; `label` is
/// `None` for inference input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedInstance {
    pub features: Vec<usize>,
    pub label: Option<usize>,
}

/// Category counts a classifier is trained against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    /// Number of categories per feature column, `unknown` included.
    pub cardinalities: Vec<usize>,
    /// Number of label categories, `unknown` included.
    pub num_classes: usize,
}

impl Attributes {
    #[must_use]
    pub fn num_features(&self) -> usize {
        self.cardinalities.len()
    }

    /// Total width of the one-hot expansion of an instance.
    #[must_use]
    pub fn one_hot_width(&self) -> usize {
        self.cardinalities.iter().sum()
    }

    /// Checks that `features` has the right length and in-range indices.
    ///
    /// # Errors
    ///
    /// `CelllineError::Prediction` describing the first violation.
    pub fn validate(&self, features: &[usize]) -> Result<()> {
        if features.len() != self.cardinalities.len() {
            return Err(CelllineError::Prediction(format!(
                "instance has {} features, model expects {}",
                features.len(),
                self.cardinalities.len()
            )));
        }
        for (position, (&value, &cardinality)) in
            features.iter().zip(&self.cardinalities).enumerate()
        {
            if value >= cardinality {
                return Err(CelllineError::Prediction(format!(
                    "feature {position} has index {value}, column has {cardinality} values"
                )));
            }
        }
        Ok(())
    }
}

/// Labeled, encoded training data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    attributes: Attributes,
    features: Vec<Vec<usize>>,
    labels: Vec<usize>,
}

impl Dataset {
    /// Collects labeled instances.
    ///
    /// # Errors
    ///
    /// `CelllineError::Data` if an instance is unlabeled or out of range.
    pub fn new(attributes: Attributes, instances: Vec<EncodedInstance>) -> Result<Self> {
        let mut features = Vec::with_capacity(instances.len());
        let mut labels = Vec::with_capacity(instances.len());
        for (row, instance) in instances.into_iter().enumerate() {
            let label = instance
                .label
                .ok_or_else(|| CelllineError::Data(format!("row {row} has no label")))?;
            if label >= attributes.num_classes {
                return Err(CelllineError::Data(format!(
                    "row {row} label {label} exceeds {} classes",
                    attributes.num_classes
                )));
            }
            attributes
                .validate(&instance.features)
                .map_err(|e| CelllineError::Data(format!("row {row}: {e}")))?;
            features.push(instance.features);
            labels.push(label);
        }
        Ok(Self {
            attributes,
            features,
            labels,
        })
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn features(&self, row: usize) -> &[usize] {
        &self.features[row]
    }

    pub fn label(&self, row: usize) -> usize {
        self.labels[row]
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Iterates `(features, label)` pairs in row order.
    pub fn iter(&self) -> impl Iterator<Item = (&[usize], usize)> {
        self.features
            .iter()
            .map(Vec::as_slice)
            .zip(self.labels.iter().copied())
    }

    /// Rows at `indices`, in that order.
    #[must_use]
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            attributes: self.attributes.clone(),
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// The row as an [`EncodedInstance`].
    pub fn instance(&self, row: usize) -> EncodedInstance {
        EncodedInstance {
            features: self.features[row].clone(),
            label: Some(self.labels[row]),
        }
    }
}

/// Turns CSV rows or feature maps into [`EncodedInstance`]s in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceAssembler {
    schema: FeatureSchema,
    vocabulary: Vocabulary,
}

impl InstanceAssembler {
    /// Pairs a schema with the schema's slice of `vocabulary`.
    ///
    /// # Errors
    ///
    /// `CelllineError::Configuration` if a schema column has no vocabulary.
    pub fn new(schema: FeatureSchema, vocabulary: &Vocabulary) -> Result<Self> {
        let vocabulary = vocabulary.restrict_to(&schema)?;
        Ok(Self { schema, vocabulary })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// The vocabulary restricted to schema columns, in schema order.
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn encoder(&self) -> FeatureEncoder<'_> {
        FeatureEncoder::new(&self.vocabulary)
    }

    fn feature_vocab(&self, position: usize) -> &ColumnVocabulary {
        &self.vocabulary.columns()[position]
    }

    fn label_vocab(&self) -> &ColumnVocabulary {
        &self.vocabulary.columns()[self.schema.num_features()]
    }

    pub fn attributes(&self) -> Attributes {
        Attributes {
            cardinalities: (0..self.schema.num_features())
                .map(|p| self.feature_vocab(p).len())
                .collect(),
            num_classes: self.label_vocab().len(),
        }
    }

    /// Encodes one CSV data row, label included. `positions` comes from
    /// [`FeatureSchema::locate`].
    pub fn assemble_row(&self, row: &[String], positions: &[usize]) -> EncodedInstance {
        let mut encoded = self
            .vocabulary
            .columns()
            .iter()
            .zip(positions)
            .map(|(vocab, &position)| {
                let result = encode_value(vocab, Some(CsvTable::cell(row, position)));
                match &result.warning {
                    Some(warning) if warning.reason == WarningReason::NotInVocabulary => {
                        warn!("{warning}");
                    }
                    _ => {}
                }
                result.index
            })
            .collect::<Vec<_>>();
        let label = encoded.pop();
        EncodedInstance {
            features: encoded,
            label,
        }
    }

    /// Encodes every data row of `table`.
    ///
    /// # Errors
    ///
    /// `CelllineError::Configuration` if the header lacks a schema column,
    /// `CelllineError::Data` if the table has no rows.
    pub fn assemble_table(&self, table: &CsvTable) -> Result<Dataset> {
        let positions = self.schema.locate(table)?;
        if table.is_empty() {
            return Err(CelllineError::Data("csv file has no data rows".into()));
        }
        let instances = table
            .rows()
            .iter()
            .map(|row| self.assemble_row(row, &positions))
            .collect();
        let dataset = Dataset::new(self.attributes(), instances)?;
        debug!(
            instances = dataset.len(),
            features = self.schema.num_features(),
            classes = dataset.attributes().num_classes,
            "assembled dataset"
        );
        Ok(dataset)
    }

    /// Encodes inference input. Absent, blank and unrecognized values become
    /// `unknown`; keys that name no feature column are ignored.
    pub fn assemble_features(
        &self,
        features: &FeatureMap,
    ) -> (EncodedInstance, Vec<EncodingWarning>) {
        let mut warnings = Vec::new();
        let encoded = self
            .schema
            .features()
            .iter()
            .enumerate()
            .map(|(position, name)| {
                let value = features
                    .get(name)
                    .or_else(|| features.get(&column_key(name)))
                    .map(String::as_str);
                let result = encode_value(self.feature_vocab(position), value);
                if let Some(warning) = result.warning {
                    warn!("{warning}");
                    warnings.push(warning);
                }
                result.index
            })
            .collect();

        for key in features.keys() {
            if self.schema.resolve_feature(key).is_none() {
                debug!(key = key.as_str(), "ignoring unrecognized input field");
            }
        }

        (
            EncodedInstance {
                features: encoded,
                label: None,
            },
            warnings,
        )
    }

    /// Decodes a predicted class index to its label value.
    ///
    /// # Errors
    ///
    /// `CelllineError::Prediction` if the index is out of range.
    pub fn decode_label(&self, index: usize) -> Result<&str> {
        self.encoder().decode(index, self.schema.label())
    }
}
