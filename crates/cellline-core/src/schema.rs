//! Feature schema and the column → form-key table.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{CelllineError, Result};
use crate::table::CsvTable;

/// Label column of the cell-line dataset.
pub const LABEL_COLUMN: &str = "Cancer Type (matching TCGA label)";

/// Feature columns of the cell-line dataset, in encoding order.
pub const FEATURE_COLUMNS: &[&str] = &[
    "Whole Exome Sequencing (WES)",
    "Copy Number Alterations (CNA)",
    "Gene Expression",
    "Methylation",
    "Drug Response",
    "GDSC Tissue descriptor 1",
    "GDSC Tissue descriptor 2",
    "Microsatellite instability Status (MSI)",
    "Screen Medium",
    "Growth Properties",
];

/// Short form-field keys for known columns.
pub const COLUMN_KEYS: &[(&str, &str)] = &[
    ("Whole Exome Sequencing (WES)", "wes"),
    ("Copy Number Alterations (CNA)", "cna"),
    ("Gene Expression", "geneExpression"),
    ("Methylation", "methylation"),
    ("Drug Response", "drugResponse"),
    ("GDSC Tissue descriptor 1", "gdscTissue1"),
    ("GDSC Tissue descriptor 2", "gdscTissue2"),
    ("Microsatellite instability Status (MSI)", "msi"),
    ("Screen Medium", "screenMedium"),
    ("Growth Properties", "growthProperties"),
    ("Cancer Type (matching TCGA label)", "cancerType"),
];

/// Short key for a column: the table entry if present, camelCase otherwise.
#[must_use]
pub fn column_key(column: &str) -> String {
    COLUMN_KEYS
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, key)| (*key).to_string())
        .unwrap_or_else(|| camel_case(column))
}

/// A run of non-alphanumerics and the character after it.
static SEPARATOR_RUN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]+(.)").ok());

/// Lower-cases `input` and replaces each separator run plus the following
/// character with that character upper-cased. A run at the very end has no
/// following character and is kept.
fn camel_case(input: &str) -> String {
    let lower = input.to_lowercase();
    match SEPARATOR_RUN.as_ref() {
        Some(re) => re
            .replace_all(&lower, |caps: &Captures| caps[1].to_uppercase())
            .into_owned(),
        None => lower,
    }
}

/// Ordered list of modeled columns; the label is always last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    features: Vec<String>,
    label: String,
}

impl FeatureSchema {
    /// Builds a schema from feature names and a label name.
    ///
    /// # Errors
    ///
    /// `CelllineError::Configuration` if there are no features, a name is
    /// blank or repeated, or the label is also listed as a feature.
    pub fn new<I, S>(features: I, label: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let features: Vec<String> = features.into_iter().map(Into::into).collect();
        let label = label.into();

        if features.is_empty() {
            return Err(CelllineError::Configuration(
                "schema needs at least one feature column".into(),
            ));
        }
        if label.trim().is_empty() || features.iter().any(|f| f.trim().is_empty()) {
            return Err(CelllineError::Configuration(
                "schema column names must not be blank".into(),
            ));
        }
        for (i, name) in features.iter().enumerate() {
            if features[..i].contains(name) {
                return Err(CelllineError::Configuration(format!(
                    "feature column {name:?} listed twice"
                )));
            }
        }
        if features.contains(&label) {
            return Err(CelllineError::Configuration(format!(
                "label column {label:?} is also a feature"
            )));
        }

        Ok(Self { features, label })
    }

    /// The cell-line schema: ten assay/tissue features and the TCGA label.
    #[must_use]
    pub fn cell_lines() -> Self {
        Self {
            features: FEATURE_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            label: LABEL_COLUMN.to_string(),
        }
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of feature columns (label excluded).
    #[must_use]
    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// All columns, features first, label last.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.features
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.label.as_str()))
    }

    /// Position of a feature column in an encoded instance.
    #[must_use]
    pub fn feature_position(&self, column: &str) -> Option<usize> {
        self.features.iter().position(|f| f == column)
    }

    /// Resolves either a column name or its short key to a feature position.
    #[must_use]
    pub fn resolve_feature(&self, name_or_key: &str) -> Option<usize> {
        self.feature_position(name_or_key).or_else(|| {
            self.features
                .iter()
                .position(|f| column_key(f) == name_or_key)
        })
    }

    /// Maps every schema column to its position in the CSV header.
    ///
    /// # Errors
    ///
    /// `CelllineError::Configuration` naming the first column the header lacks.
    /// The label column is checked first.
    pub fn locate(&self, table: &CsvTable) -> Result<Vec<usize>> {
        if table.column_position(&self.label).is_none() {
            return Err(CelllineError::Configuration(format!(
                "target column {:?} not found in csv header",
                self.label
            )));
        }
        self.columns()
            .map(|column| {
                table.column_position(column).ok_or_else(|| {
                    CelllineError::Configuration(format!(
                        "column {column:?} not found in csv header"
                    ))
                })
            })
            .collect()
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::cell_lines()
    }
}
