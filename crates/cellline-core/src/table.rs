//! CSV loading for the cell-line dataset.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use tracing::{debug, info};

use crate::error::{CelllineError, Result};

/// A header row plus all data rows of a CSV snapshot, fields trimmed.
///
/// Rows may be shorter than the header; callers treat the missing trailing
/// cells as empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Reads a table from any reader.
    ///
    /// # Errors
    ///
    /// Returns `CelllineError::Data` when the input has no header row, when
    /// every header cell is blank, or when a header name repeats.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let mut records = reader.records();
        let headers: Vec<String> = match records.next() {
            Some(record) => record?.iter().map(str::to_string).collect(),
            None => return Err(CelllineError::Data("csv file is empty".into())),
        };

        if headers.iter().all(|h| h.is_empty()) {
            return Err(CelllineError::Data("csv header row is blank".into()));
        }
        for (i, name) in headers.iter().enumerate() {
            if headers[..i].contains(name) {
                return Err(CelllineError::Data(format!(
                    "duplicate column {name:?} in csv header"
                )));
            }
        }

        let mut rows = Vec::new();
        for record in records {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        debug!(columns = headers.len(), rows = rows.len(), "parsed csv table");
        Ok(Self { headers, rows })
    }

    /// Reads a table from a file path.
    ///
    /// # Errors
    ///
    /// A missing file is a `CelllineError::Configuration`; content problems are
    /// reported as in [`CsvTable::from_reader`].
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            CelllineError::Configuration(format!("cannot open csv {}: {e}", path.display()))
        })?;
        let table = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            columns = table.headers.len(),
            rows = table.rows.len(),
            "loaded csv dataset"
        );
        Ok(table)
    }

    /// Convenience constructor used by tests and tooling.
    pub fn parse_str(text: &str) -> Result<Self> {
        Self::from_reader(text.as_bytes())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a header, matched exactly.
    #[must_use]
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell `column` of `row`, or `""` for ragged rows.
    #[must_use]
    pub fn cell<'a>(row: &'a [String], column: usize) -> &'a str {
        row.get(column).map(String::as_str).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_quoted_fields_with_commas() {
        let table = CsvTable::parse_str("a,b\n\"x, y\",z\n").unwrap();
        assert_eq!(table.headers(), ["a", "b"]);
        assert_eq!(table.rows()[0], vec!["x, y".to_string(), "z".to_string()]);
    }

    #[test]
    fn trims_fields_and_keeps_ragged_rows() {
        let table = CsvTable::parse_str("a , b,c\n 1 ,2\n").unwrap();
        assert_eq!(table.headers(), ["a", "b", "c"]);
        assert_eq!(table.rows()[0].len(), 2);
        assert_eq!(CsvTable::cell(&table.rows()[0], 0), "1");
        assert_eq!(CsvTable::cell(&table.rows()[0], 2), "");
    }

    #[test]
    fn empty_input_is_data_error() {
        let err = CsvTable::parse_str("").unwrap_err();
        assert!(matches!(err, CelllineError::Data(_)));
    }

    #[test]
    fn duplicate_header_is_data_error() {
        let err = CsvTable::parse_str("a,a\n1,2\n").unwrap_err();
        assert!(matches!(err, CelllineError::Data(_)));
    }

    #[test]
    fn header_only_is_an_empty_table() {
        let table = CsvTable::parse_str("a,b\n").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = CsvTable::from_path("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, CelllineError::Configuration(_)));
    }

    #[test]
    fn column_lookup_is_case_sensitive() {
        let table = CsvTable::parse_str("Methylation\nyes\n").unwrap();
        assert_eq!(table.column_position("Methylation"), Some(0));
        assert_eq!(table.column_position("methylation"), None);
    }
}
