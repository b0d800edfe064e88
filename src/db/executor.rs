//! Query execution helpers shared by both backends
//!
//! Duration formatting, identifier validation, EXPLAIN wrapping and the
//! duplicate-row finder. Identifiers that end up interpolated into SQL text
//! must pass [`validate_identifier`] first.

use crate::config::DbKind;
use crate::db::Database;
use crate::db::types::QueryResult;
use crate::error::{DbError, DbResult};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// Rows returned by the duplicate finder
pub const DUPLICATE_LIMIT: usize = 100;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

// `INTO` covers SELECT ... INTO and REPLACE INTO
static WRITE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(INSERT|UPDATE|DELETE|DROP|ALTER|TRUNCATE|CREATE|REPLACE|MERGE|UPSERT|INTO|GRANT|REVOKE|ATTACH|DETACH|VACUUM|REINDEX|CLUSTER|REFRESH|LOCK|COPY|CALL|DO)\b",
    )
    .expect("valid write keyword regex")
});

/// Format an elapsed time for humans: `850µs`, `15ms`, `2.31s`
pub fn format_duration(d: Duration) -> String {
    let micros = d.as_micros();
    if micros < 1_000 {
        format!("{}µs", micros)
    } else if micros < 1_000_000 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}

/// Accept `name` or `schema.name` where each part is a plain identifier
pub fn validate_identifier(name: &str) -> DbResult<()> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 || parts.iter().any(|p| !IDENTIFIER.is_match(p)) {
        return Err(DbError::InvalidArgument(format!(
            "'{}' is not a valid identifier (expected [A-Za-z_][A-Za-z0-9_]*)",
            name
        )));
    }
    Ok(())
}

/// Validate and double-quote an identifier (`schema.name` quotes both parts)
pub fn quote_identifier(name: &str) -> DbResult<String> {
    validate_identifier(name)?;
    Ok(name
        .split('.')
        .map(|p| format!("\"{}\"", p))
        .collect::<Vec<_>>()
        .join("."))
}

/// Split `schema.table` into its parts; an unqualified name has no schema
pub fn split_table(table: &str) -> (Option<&str>, &str) {
    match table.split_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, table),
    }
}

/// Wrap a statement in the backend's plan-producing form.
///
/// PostgreSQL statements that may write are planned but not executed.
pub fn explain_sql(kind: DbKind, sql: &str) -> String {
    let stmt = strip_terminator(sql);
    match kind {
        DbKind::Postgres if is_read_only_statement(sql) => {
            format!("EXPLAIN (ANALYZE, BUFFERS, FORMAT JSON) {}", stmt)
        }
        DbKind::Postgres => format!("EXPLAIN (FORMAT JSON) {}", stmt),
        DbKind::Sqlite => format!("EXPLAIN QUERY PLAN {}", stmt),
    }
}

/// Build the duplicate-finder statement for `columns` of `table`
pub fn duplicate_data_sql(table: &str, columns: &[String]) -> DbResult<String> {
    if columns.is_empty() {
        return Err(DbError::InvalidArgument(
            "at least one column is required to find duplicates".into(),
        ));
    }
    validate_identifier(table)?;
    for column in columns {
        validate_identifier(column)?;
    }
    let cols = columns.join(", ");
    Ok(format!(
        "SELECT {cols}, COUNT(*) AS duplicate_count FROM {table} GROUP BY {cols} \
         HAVING COUNT(*) > 1 ORDER BY COUNT(*) DESC LIMIT {DUPLICATE_LIMIT}"
    ))
}

/// Rows of `table` whose `columns` values occur more than once
pub async fn find_duplicate_data<D: Database + ?Sized>(
    db: &D,
    table: &str,
    columns: &[String],
) -> DbResult<QueryResult> {
    let sql = duplicate_data_sql(table, columns)?;
    tracing::debug!(table, columns = ?columns, "Finding duplicate rows");
    db.execute_query(&sql).await
}

/// Whether a statement only reads data.
///
/// Used to decide whether a tool call needs user confirmation; it does not
/// block anything by itself.
pub fn is_read_only_statement(sql: &str) -> bool {
    let body = strip_terminator(strip_leading_comments(sql));
    // More than one statement is never treated as a read
    if body.contains(';') {
        return false;
    }
    let upper = body.to_uppercase();
    let first = upper.split_whitespace().next().unwrap_or("");
    let first = first.trim_start_matches('(');
    if !matches!(
        first,
        "SELECT" | "WITH" | "EXPLAIN" | "SHOW" | "PRAGMA" | "VALUES" | "TABLE"
    ) {
        return false;
    }
    // PRAGMA name = value changes settings
    if first == "PRAGMA" && body.contains('=') {
        return false;
    }
    // Data-modifying CTEs and EXPLAIN ANALYZE of writes still write
    !WRITE_KEYWORD.is_match(&upper)
}

fn strip_terminator(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, r)| r).trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, r)| r).trim_start();
        } else {
            return rest;
        }
    }
}
