//! Index heuristics
//!
//! Everything here works on catalog records already fetched by the
//! introspection layer, so it is plain synchronous code.

use crate::config::DbKind;
use crate::db::models::{ColumnInfo, IndexInfo, pretty_bytes};
use crate::optimizer::IndexSuggestion;
use regex::Regex;
use std::sync::LazyLock;

static USER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^user.*id$").expect("valid user id regex"));

static HOT_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)email|status|state|created|updated").expect("valid hot column regex")
});

static COVERING_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)name|title|status|type").expect("valid covering regex"));

/// Per-key-column bytes, plus tuple overhead, used for size estimates
const KEY_WIDTH: i64 = 8;
const ENTRY_OVERHEAD: i64 = 16;

/// `idx_<table>_<col>[_<col>...]`, ignoring any schema prefix
pub fn index_name(table: &str, columns: &[String]) -> String {
    let base = table.rsplit('.').next().unwrap_or(table);
    format!("idx_{}_{}", base, columns.join("_"))
}

pub fn create_index_sql(kind: DbKind, table: &str, name: &str, columns: &[String]) -> String {
    let cols = columns.join(", ");
    match kind {
        DbKind::Postgres => format!("CREATE INDEX CONCURRENTLY {} ON {} ({});", name, table, cols),
        DbKind::Sqlite => format!("CREATE INDEX IF NOT EXISTS {} ON {} ({});", name, table, cols),
    }
}

/// Rough on-disk size of a b-tree over `rows` entries
pub fn estimate_index_size(rows: i64, columns: usize) -> String {
    let per_entry = KEY_WIDTH * columns as i64 + ENTRY_OVERHEAD;
    pretty_bytes(rows.max(0).saturating_mul(per_entry))
}

/// Shared inputs for every heuristic
pub struct IndexContext<'a> {
    pub kind: DbKind,
    pub table: &'a str,
    pub columns: &'a [ColumnInfo],
    pub indexes: &'a [IndexInfo],
    pub row_count: i64,
}

impl IndexContext<'_> {
    fn suggest(&self, columns: &[&str], index_type: &str, reason: String, impact: &str) -> IndexSuggestion {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let name = index_name(self.table, &columns);
        IndexSuggestion {
            table: self.table.to_string(),
            create_statement: create_index_sql(self.kind, self.table, &name, &columns),
            estimated_size: estimate_index_size(self.row_count, columns.len()),
            name,
            columns,
            index_type: index_type.to_string(),
            reason,
            impact: impact.to_string(),
        }
    }

    /// Some existing index starts with `column`
    fn leads_index(&self, column: &str) -> bool {
        self.indexes
            .iter()
            .any(|idx| idx.columns.first().is_some_and(|c| c == column))
    }

    /// Some existing index starts with exactly these columns
    fn covers_prefix(&self, columns: &[&str]) -> bool {
        self.indexes.iter().any(|idx| {
            idx.columns.len() >= columns.len()
                && idx.columns.iter().zip(columns).all(|(a, b)| a == *b)
        })
    }

    fn has_index_named(&self, name: &str) -> bool {
        self.indexes.iter().any(|idx| idx.name == name)
    }

    fn find_column(&self, pred: impl Fn(&ColumnInfo) -> bool) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| !c.is_primary_key && pred(c))
    }
}

/// Foreign-key columns with no index leading on them
pub fn foreign_key_gaps(ctx: &IndexContext<'_>) -> Vec<IndexSuggestion> {
    ctx.columns
        .iter()
        .filter(|c| c.is_foreign_key && !ctx.leads_index(&c.name))
        .map(|c| {
            ctx.suggest(
                &[c.name.as_str()],
                "btree",
                format!("Foreign key column {} has no index; joins and cascades scan the table", c.name),
                "High",
            )
        })
        .collect()
}

/// One single-column suggestion per non-key column, directed by type and name
pub fn column_heuristics(ctx: &IndexContext<'_>) -> Vec<IndexSuggestion> {
    let mut out = Vec::new();
    for col in ctx.columns.iter().filter(|c| !c.is_primary_key) {
        let family = type_family(&col.data_type);
        let name = index_name(ctx.table, std::slice::from_ref(&col.name));
        if ctx.has_index_named(&name) || ctx.leads_index(&col.name) {
            continue;
        }

        let (mut impact, mut reason) = match family {
            TypeFamily::Integer => ("Medium", format!("Integer column {} suits equality and range lookups", col.name)),
            TypeFamily::Temporal => ("Medium", format!("Date column {} is a common range filter", col.name)),
            TypeFamily::Text => ("Low", format!("Text column {} may be used for lookups", col.name)),
            TypeFamily::Numeric | TypeFamily::Other => ("Low", format!("Column {} may be filtered on", col.name)),
            TypeFamily::Blob => continue,
        };
        if HOT_COLUMN.is_match(&col.name) || USER_ID.is_match(&col.name) {
            impact = "High";
            reason = format!("Column {} is commonly filtered or sorted on", col.name);
        }
        out.push(ctx.suggest(&[col.name.as_str()], "btree", reason, impact));
    }
    out
}

/// Multi-column patterns worth a composite index
pub fn composite_opportunities(ctx: &IndexContext<'_>) -> Vec<IndexSuggestion> {
    let mut out = Vec::new();
    let mut push = |cols: [&str; 2], index_type: &str, reason: String, impact: &str| {
        if cols[0] != cols[1] && !ctx.covers_prefix(&cols) {
            out.push(ctx.suggest(&cols, index_type, reason, impact));
        }
    };

    let fks: Vec<&str> = ctx
        .columns
        .iter()
        .filter(|c| c.is_foreign_key)
        .map(|c| c.name.as_str())
        .collect();
    if let [a, b, ..] = fks[..] {
        push([a, b], "btree", format!("Joins through both {} and {}", a, b), "Medium");
    }

    let status = ctx.find_column(|c| matches!(c.name.to_lowercase().as_str(), "status" | "state"));
    let date = ctx.find_column(|c| {
        type_family(&c.data_type) == TypeFamily::Temporal || c.name.to_lowercase().contains("date")
            || c.name.to_lowercase().starts_with("created")
    });
    if let (Some(s), Some(d)) = (status, date) {
        push(
            [s.name.as_str(), d.name.as_str()],
            "btree",
            format!("Filtering by {} within a {} range", s.name, d.name),
            "High",
        );
    }

    let user = ctx.find_column(|c| USER_ID.is_match(&c.name));
    let created = ctx.find_column(|c| c.name.to_lowercase().starts_with("created"));
    if let (Some(u), Some(c)) = (user, created) {
        push(
            [u.name.as_str(), c.name.as_str()],
            "btree",
            format!("Per-user listings ordered by {}", c.name),
            "High",
        );
    }

    let ints: Vec<&str> = ctx
        .columns
        .iter()
        .filter(|c| !c.is_primary_key && type_family(&c.data_type) == TypeFamily::Integer)
        .map(|c| c.name.as_str())
        .collect();
    if let [a, b, ..] = ints[..] {
        push([a, b], "btree", format!("Combined filters on {} and {}", a, b), "Low");
    }

    let covering: Vec<&str> = ctx
        .columns
        .iter()
        .filter(|c| {
            !c.is_primary_key
                && COVERING_NAME.is_match(&c.name)
                && matches!(type_family(&c.data_type), TypeFamily::Text | TypeFamily::Integer)
        })
        .map(|c| c.name.as_str())
        .collect();
    if let [a, b, ..] = covering[..] {
        push(
            [a, b],
            "covering",
            format!("Lets lookups on {} read {} from the index alone", a, b),
            "Low",
        );
    }

    out
}

/// Drop suggestions that reuse an existing index name or repeat an earlier one
pub fn dedupe(suggestions: Vec<IndexSuggestion>, existing: &[IndexInfo]) -> Vec<IndexSuggestion> {
    let mut seen: Vec<String> = existing.iter().map(|i| i.name.clone()).collect();
    let mut out = Vec::new();
    for s in suggestions {
        if seen.contains(&s.name) {
            continue;
        }
        seen.push(s.name.clone());
        out.push(s);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeFamily {
    Integer,
    Numeric,
    Text,
    Temporal,
    Blob,
    Other,
}

/// Classify a declared type the way SQLite's affinity rules do, with dates split out
fn type_family(declared: &str) -> TypeFamily {
    let t = declared.to_uppercase();
    if t.contains("INT") || t == "SERIAL" || t == "BIGSERIAL" {
        TypeFamily::Integer
    } else if t.contains("DATE") || t.contains("TIME") {
        TypeFamily::Temporal
    } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") || t == "UUID" {
        TypeFamily::Text
    } else if t.contains("BLOB") || t.contains("BYTEA") {
        TypeFamily::Blob
    } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") || t.contains("NUM") || t.contains("DEC") {
        TypeFamily::Numeric
    } else {
        TypeFamily::Other
    }
}
