//! Introspection records
//!
//! Backend-independent shapes returned by the introspection surface. Each
//! backend fills them from its own catalog queries.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A table or view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub schema: String,
    /// `table`, `view`, `materialized view`, `foreign table`, ...
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

/// A table column in declared order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub max_length: Option<i32>,
    pub precision: Option<i32>,
    pub scale: Option<i32>,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub description: String,
}

/// An index with its key columns in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub is_unique: bool,
    pub is_primary: bool,
    pub columns: Vec<String>,
    pub index_type: String,
    pub tablespace: String,
    pub description: String,
}

/// Per-table size and activity counters.
///
/// Filled best-effort: fields a backend cannot provide stay zero or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub name: String,
    pub schema: String,
    pub row_count: i64,
    pub table_size: String,
    pub index_size: String,
    pub total_size: String,
    pub total_bytes: i64,
    pub last_vacuum: Option<DateTime<Utc>>,
    pub last_analyze: Option<DateTime<Utc>>,
    pub seq_scan: i64,
    pub idx_scan: i64,
    pub inserts: i64,
    pub updates: i64,
    pub deletes: i64,
}

/// A normalized statement from `pg_stat_statements`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowQuery {
    pub query: String,
    pub calls: i64,
    pub total_time_ms: f64,
    pub mean_time_ms: f64,
    pub min_time_ms: f64,
    pub max_time_ms: f64,
    pub stddev_time_ms: f64,
    pub rows: i64,
}

/// Size of the connected database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseSize {
    pub database: String,
    pub size: String,
    pub size_bytes: i64,
}

/// A backend session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveConnection {
    pub pid: i64,
    pub user: String,
    pub database: String,
    pub client_addr: String,
    pub state: String,
    pub query: String,
    pub duration: String,
}

/// Format a byte count the way `pg_size_pretty` does
pub fn pretty_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["bytes", "kB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value.abs() >= 10240.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{} {}", value.round() as i64, UNITS[unit])
}
