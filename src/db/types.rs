//! Database type definitions
//!
//! Core data structures for representing query results and cell values.

use crate::db::executor::format_duration;
use crate::error::{DbError, DbResult};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::time::Duration;

/// Query execution results.
///
/// Every row has exactly `columns.len()` cells and `row_count == rows.len()`;
/// the only constructor checks both.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct QueryResult {
    /// Column names in result order
    pub columns: Vec<String>,
    /// Result rows, each aligned to `columns`
    pub rows: Vec<Vec<CellValue>>,
    /// Number of rows
    #[serde(rename = "rowCount")]
    pub row_count: usize,
    /// Wall-clock execution time, human readable (e.g. `15ms`)
    pub duration: String,
}

impl QueryResult {
    /// Build a result, rejecting rows whose width differs from the header
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>, elapsed: Duration) -> DbResult<Self> {
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns.len())
        {
            return Err(DbError::Backend(format!(
                "row {} has {} cells but the result has {} columns",
                i,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self {
            row_count: rows.len(),
            columns,
            rows,
            duration: format_duration(elapsed),
        })
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at (row, column name)
    pub fn get(&self, row: usize, column: &str) -> Option<&CellValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Concatenate every cell as text, one row per line (for plan scanning)
    pub fn to_text(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|c| c.display_string(usize::MAX))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Collects a multi-statement run, keeping only the last statement's output
#[derive(Debug, Default)]
pub(crate) struct BatchResult {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    current_columns: Vec<String>,
    current_rows: Vec<Vec<CellValue>>,
}

impl BatchResult {
    /// Header of the statement being read
    pub(crate) fn describe(&mut self, columns: Vec<String>) {
        self.current_columns = columns;
    }

    pub(crate) fn has_columns(&self) -> bool {
        !self.current_columns.is_empty()
    }

    pub(crate) fn push_row(&mut self, row: Vec<CellValue>) {
        self.current_rows.push(row);
    }

    /// The current statement finished; its output replaces the previous one
    pub(crate) fn complete(&mut self) {
        self.columns = std::mem::take(&mut self.current_columns);
        self.rows = std::mem::take(&mut self.current_rows);
    }

    pub(crate) fn finish(self, elapsed: Duration) -> DbResult<QueryResult> {
        QueryResult::new(self.columns, self.rows, elapsed)
    }
}

/// A cell value (single column value in a row)
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// NULL value
    Null,

    /// Integer value
    Integer(i64),

    /// Floating point value
    Float(f64),

    /// Text/string value (byte columns are decoded into this as UTF-8)
    Text(String),

    /// Boolean value
    Boolean(bool),

    /// JSON value (parsed)
    Json(serde_json::Value),

    /// Date/time value, ISO-8601 where the driver allows
    DateTime(String),

    /// UUID value
    Uuid(String),

    /// Array value
    Array(Vec<CellValue>),
}

impl CellValue {
    /// Decode bytes as UTF-8 text, replacing invalid sequences
    pub fn from_bytes(bytes: &[u8]) -> Self {
        CellValue::Text(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Get a display string for this cell value (truncated if needed)
    pub fn display_string(&self, max_len: usize) -> String {
        let full = match self {
            CellValue::Null => "NULL".to_string(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Boolean(b) => b.to_string(),
            CellValue::Json(v) => v.to_string(),
            CellValue::DateTime(s) => s.clone(),
            CellValue::Uuid(s) => s.clone(),
            CellValue::Array(arr) => {
                let items: Vec<String> = arr.iter().map(|v| v.display_string(max_len)).collect();
                format!("{{{}}}", items.join(","))
            }
        };

        if full.chars().count() > max_len {
            let kept: String = full.chars().take(max_len.saturating_sub(3)).collect();
            format!("{}...", kept)
        } else {
            full
        }
    }

    /// Check if this is a NULL value
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            CellValue::Float(f) => Some(*f as i64),
            CellValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) | CellValue::DateTime(s) | CellValue::Uuid(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Integer(i) => serializer.serialize_i64(*i),
            // JSON has no NaN/Infinity
            CellValue::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            CellValue::Float(f) => serializer.serialize_str(&f.to_string()),
            CellValue::Text(s) | CellValue::DateTime(s) | CellValue::Uuid(s) => {
                serializer.serialize_str(s)
            }
            CellValue::Boolean(b) => serializer.serialize_bool(*b),
            CellValue::Json(v) => v.serialize(serializer),
            CellValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}
