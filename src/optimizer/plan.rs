//! Plan scanning
//!
//! Pulls diagnostic markers out of EXPLAIN output: sequential scans and
//! on-disk sorts from PostgreSQL JSON plans, full table scans from SQLite
//! `EXPLAIN QUERY PLAN` lines.

use crate::db::types::{CellValue, QueryResult};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static SEQ_SCAN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Seq Scan on (\S+)").expect("valid seq scan regex"));

static SQLITE_SCAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*scan(?: table)? ([A-Za-z_][A-Za-z0-9_]*)").expect("valid scan regex")
});

/// Markers found in a PostgreSQL plan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanMarkers {
    /// Relations read by `Seq Scan` nodes, in plan order
    pub seq_scans: Vec<String>,
    /// A sort node spilled to disk
    pub external_sort: bool,
    /// Planner's total cost of the root node
    pub total_cost: Option<f64>,
    pub execution_time_ms: Option<f64>,
}

impl PlanMarkers {
    /// Scan `EXPLAIN (FORMAT JSON)` output, falling back to plain text
    pub fn from_postgres(result: &QueryResult) -> Self {
        let plan = result.rows.first().and_then(|row| row.first()).and_then(|cell| match cell {
            CellValue::Json(v) => Some(v.clone()),
            CellValue::Text(s) => serde_json::from_str(s).ok(),
            _ => None,
        });

        match plan {
            Some(v) => Self::from_json(&v),
            None => Self::from_text(&result.to_text()),
        }
    }

    fn from_json(plan: &Value) -> Self {
        let mut markers = PlanMarkers::default();
        let root = match plan {
            Value::Array(items) => items.first(),
            other => Some(other),
        };
        let Some(root) = root else {
            return markers;
        };

        markers.execution_time_ms = root.get("Execution Time").and_then(Value::as_f64);
        if let Some(node) = root.get("Plan") {
            markers.total_cost = node.get("Total Cost").and_then(Value::as_f64);
            markers.walk(node);
        }
        markers
    }

    fn walk(&mut self, node: &Value) {
        match node.get("Node Type").and_then(Value::as_str) {
            Some("Seq Scan") => {
                let relation = node
                    .get("Relation Name")
                    .and_then(Value::as_str)
                    .unwrap_or("?");
                if !self.seq_scans.iter().any(|r| r == relation) {
                    self.seq_scans.push(relation.to_string());
                }
            }
            Some("Sort") | Some("Incremental Sort") => {
                let method = node.get("Sort Method").and_then(Value::as_str).unwrap_or("");
                let space = node.get("Sort Space Type").and_then(Value::as_str).unwrap_or("");
                if method.contains("external") || space == "Disk" {
                    self.external_sort = true;
                }
            }
            _ => {}
        }

        if let Some(Value::Array(children)) = node.get("Plans") {
            for child in children {
                self.walk(child);
            }
        }
    }

    fn from_text(text: &str) -> Self {
        let mut markers = PlanMarkers::default();
        for caps in SEQ_SCAN_TEXT.captures_iter(text) {
            let relation = caps[1].to_string();
            if !markers.seq_scans.contains(&relation) {
                markers.seq_scans.push(relation);
            }
        }
        let lower = text.to_lowercase();
        markers.external_sort = lower.contains("sort") && lower.contains("external");
        markers
    }
}

/// Tables SQLite reads in full, per `EXPLAIN QUERY PLAN`.
///
/// `SCAN t USING [COVERING] INDEX` walks an index and is not counted.
pub fn sqlite_full_scans(result: &QueryResult) -> Vec<String> {
    let lines: Vec<String> = match result.column_index("detail") {
        Some(idx) => result
            .rows
            .iter()
            .filter_map(|row| row.get(idx))
            .map(|cell| cell.display_string(usize::MAX))
            .collect(),
        None => result.to_text().lines().map(String::from).collect(),
    };

    let mut tables = Vec::new();
    for line in lines {
        let upper = line.to_uppercase();
        if upper.contains("USING INDEX") || upper.contains("COVERING INDEX") {
            continue;
        }
        if let Some(caps) = SQLITE_SCAN.captures(&line) {
            let table = caps[1].to_string();
            if !tables.contains(&table) {
                tables.push(table);
            }
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn single_cell(value: CellValue) -> QueryResult {
        QueryResult::new(vec!["QUERY PLAN".into()], vec![vec![value]], Duration::ZERO).unwrap()
    }

    #[test]
    fn test_json_plan_markers() {
        let plan = json!([{
            "Plan": {
                "Node Type": "Sort",
                "Total Cost": 1234.5,
                "Sort Method": "external merge",
                "Plans": [{
                    "Node Type": "Hash Join",
                    "Plans": [
                        {"Node Type": "Seq Scan", "Relation Name": "orders"},
                        {"Node Type": "Index Scan", "Relation Name": "users"}
                    ]
                }]
            },
            "Execution Time": 42.0
        }]);
        let markers = PlanMarkers::from_postgres(&single_cell(CellValue::Json(plan)));
        assert_eq!(markers.seq_scans, vec!["orders"]);
        assert!(markers.external_sort);
        assert_eq!(markers.total_cost, Some(1234.5));
        assert_eq!(markers.execution_time_ms, Some(42.0));
    }

    #[test]
    fn test_in_memory_sort_is_not_external() {
        let plan = json!([{"Plan": {"Node Type": "Sort", "Sort Method": "quicksort",
                                     "Sort Space Type": "Memory"}}]);
        let markers = PlanMarkers::from_postgres(&single_cell(CellValue::Json(plan)));
        assert!(!markers.external_sort);
        assert!(markers.seq_scans.is_empty());
    }

    #[test]
    fn test_text_plan_fallback() {
        let text = "Sort  (cost=1.0..2.0)\n  Sort Method: external merge  Disk: 1024kB\n  ->  Seq Scan on events  (cost=0.00..1.00)";
        let markers = PlanMarkers::from_postgres(&single_cell(CellValue::Text(text.into())));
        assert_eq!(markers.seq_scans, vec!["events"]);
        assert!(markers.external_sort);
    }

    #[test]
    fn test_sqlite_full_scans() {
        let result = QueryResult::new(
            vec!["id".into(), "parent".into(), "notused".into(), "detail".into()],
            vec![
                vec![
                    CellValue::Integer(2),
                    CellValue::Integer(0),
                    CellValue::Integer(0),
                    CellValue::Text("SCAN users".into()),
                ],
                vec![
                    CellValue::Integer(3),
                    CellValue::Integer(0),
                    CellValue::Integer(0),
                    CellValue::Text("SCAN TABLE logs".into()),
                ],
                vec![
                    CellValue::Integer(4),
                    CellValue::Integer(0),
                    CellValue::Integer(0),
                    CellValue::Text("SCAN orders USING COVERING INDEX idx_orders_user_id".into()),
                ],
                vec![
                    CellValue::Integer(5),
                    CellValue::Integer(0),
                    CellValue::Integer(0),
                    CellValue::Text("SEARCH items USING INDEX idx_items_sku (sku=?)".into()),
                ],
            ],
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(sqlite_full_scans(&result), vec!["users", "logs"]);
    }
}
