//! Per-column categorical vocabularies.
//!
//! A [`Vocabulary`] maps each column to its distinct values in first-seen
//! order, with [`UNKNOWN`] reserved at index 0. Index `i` of a column only
//! means the same thing at training and serving time if both vocabularies
//! were built from the same rows, which is why the model artifact stores the
//! vocabulary it was trained with.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CelllineError, Result};
use crate::schema::FeatureSchema;
use crate::table::CsvTable;

/// Sentinel value for missing, blank or unrecognized input.
pub const UNKNOWN: &str = "unknown";

/// Ordered distinct values of one column. `values[0]` is always [`UNKNOWN`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnVocabulary {
    name: String,
    values: Vec<String>,
}

impl ColumnVocabulary {
    /// A vocabulary containing only [`UNKNOWN`].
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: vec![UNKNOWN.to_string()],
        }
    }

    /// Records `raw` if it is not already known. Blank values fold to [`UNKNOWN`].
    pub fn observe(&mut self, raw: &str) {
        let value = normalize(raw);
        if !self.values.iter().any(|v| v == value) {
            self.values.push(value.to_string());
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Number of categories, [`UNKNOWN`] included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Never true; a column always knows [`UNKNOWN`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }

    /// Index of the [`UNKNOWN`] sentinel.
    #[must_use]
    pub fn unknown_index(&self) -> usize {
        self.index_of(UNKNOWN).unwrap_or(0)
    }

    #[must_use]
    pub fn value(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }
}

/// Column name → ordered distinct values, in CSV header order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    columns: Vec<ColumnVocabulary>,
}

impl Vocabulary {
    /// Builds a vocabulary for every column of `table`.
    ///
    /// Ragged rows contribute [`UNKNOWN`] for their missing trailing cells.
    ///
    /// # Errors
    ///
    /// `CelllineError::Data` if the table has a header but no data rows.
    pub fn build(table: &CsvTable) -> Result<Self> {
        if table.is_empty() {
            return Err(CelllineError::Data(
                "csv file has a header but no data rows".into(),
            ));
        }

        let mut columns: Vec<ColumnVocabulary> = table
            .headers()
            .iter()
            .map(ColumnVocabulary::new)
            .collect();

        for row in table.rows() {
            for (position, column) in columns.iter_mut().enumerate() {
                column.observe(CsvTable::cell(row, position));
            }
        }

        for column in &columns {
            debug!(column = column.name(), categories = column.len(), "column vocabulary");
        }
        info!(columns = columns.len(), "built vocabulary");

        Ok(Self { columns })
    }

    /// Keeps only the schema's columns, in schema order.
    ///
    /// # Errors
    ///
    /// `CelllineError::Configuration` if a schema column has no vocabulary.
    pub fn restrict_to(&self, schema: &FeatureSchema) -> Result<Self> {
        let columns = schema
            .columns()
            .map(|name| {
                self.column(name).cloned().ok_or_else(|| {
                    CelllineError::Configuration(format!("no vocabulary for column {name:?}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnVocabulary> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn columns(&self) -> &[ColumnVocabulary] {
        &self.columns
    }

    /// Columns whose value lists differ between `self` and `other`, by name.
    ///
    /// A column present in only one of the two counts as different.
    #[must_use]
    pub fn drift_from(&self, other: &Vocabulary) -> Vec<String> {
        let mut drifted: Vec<String> = self
            .columns
            .iter()
            .filter(|c| other.column(&c.name) != Some(c))
            .map(|c| c.name.clone())
            .collect();
        drifted.extend(
            other
                .columns
                .iter()
                .filter(|c| self.column(&c.name).is_none())
                .map(|c| c.name.clone()),
        );
        drifted
    }
}

/// Blank (after trimming) values are the [`UNKNOWN`] category.
pub(crate) fn normalize(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.is_empty() { UNKNOWN } else { trimmed }
}
