//! Query result export (CSV / JSON)
//!
//! Pure serialization functions with no filesystem I/O. The caller decides
//! where the returned string goes.

use crate::db::types::{CellValue, QueryResult};
use serde_json::{Map, Value};

/// Output format selector for `dbpilot query`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExportFormat {
    /// Aligned text table
    #[default]
    Table,
    Csv,
    Json,
}

/// Serialize a result as RFC 4180 CSV.
pub fn to_csv(result: &QueryResult) -> String {
    let mut out = String::new();

    for (i, col) in result.columns.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        csv_escape_into(&mut out, col);
    }
    out.push('\n');

    for row in &result.rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            csv_escape_into(&mut out, &cell_to_export_string(cell));
        }
        out.push('\n');
    }

    out
}

/// Serialize a result as a JSON array of objects with typed values.
pub fn to_json(result: &QueryResult) -> String {
    let rows: Vec<Value> = result
        .rows
        .iter()
        .map(|row| {
            let mut obj = Map::new();
            for (name, cell) in result.columns.iter().zip(row) {
                obj.insert(name.clone(), serde_json::to_value(cell).unwrap_or(Value::Null));
            }
            Value::Object(obj)
        })
        .collect();

    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

/// Full untruncated value string for CSV (NULL is an empty field).
fn cell_to_export_string(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => String::new(),
        other => other.display_string(usize::MAX),
    }
}

/// Quote a field if it contains `,` `"` or a line break (RFC 4180).
fn csv_escape_into(out: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}
