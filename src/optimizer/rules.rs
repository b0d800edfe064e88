//! Static anti-pattern rules
//!
//! Lexical checks over the raw statement text: no parsing, only
//! case-insensitive regexes.

use crate::config::DbKind;
use crate::db::models::{SlowQuery, TableStats};
use crate::optimizer::{
    PatternKind, Priority, QueryOptimizationSuggestion, QueryPattern, SLOW_QUERY_MS,
    SuggestionKind,
};
use crate::sql::format_sql;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::sync::LazyLock;

/// Calls above which a statement is "frequent"
pub const FREQUENT_CALLS: i64 = 100;

/// Rows above which a table is a partitioning candidate
pub const PARTITION_ROWS: i64 = 100_000;

macro_rules! rule_regex {
    ($name:ident, $pattern:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($pattern).expect("valid rule regex"));
    };
}

rule_regex!(SELECT_STAR, r"(?i)\bSELECT\s+\*");
rule_regex!(LEADING_WILDCARD, r"(?i)\bLIKE\s+'%");
rule_regex!(SELECT_KEYWORD, r"(?i)\bSELECT\b");
rule_regex!(DISTINCT, r"(?i)\bDISTINCT\b");
rule_regex!(UNION, r"(?i)\bUNION\b");
rule_regex!(UNION_ALL, r"(?i)\bUNION\s+ALL\b");
rule_regex!(WHERE_FUNCTION, r"(?i)WHERE\s+\w+\s*\(");
rule_regex!(WHERE_KEYWORD, r"(?i)\bWHERE\b");
rule_regex!(LIMIT_KEYWORD, r"(?i)\bLIMIT\b");
rule_regex!(ORDER_BY, r"(?i)\bORDER\s+BY\b");
rule_regex!(TABLE_REF, r"(?i)\b(?:FROM|JOIN)\s+([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)");

/// Run every static rule against `sql`
pub fn optimize_query(kind: DbKind, sql: &str) -> Vec<QueryOptimizationSuggestion> {
    let mut out = Vec::new();

    if SELECT_STAR.is_match(sql) {
        let rewritten = SELECT_STAR.replace(sql, "SELECT column1, column2");
        out.push(
            QueryOptimizationSuggestion::new(
                SuggestionKind::Rewrite,
                Priority::Low,
                "Avoid SELECT *",
                "Name only the columns you need; wide rows cost I/O and network transfer \
                 and defeat index-only scans",
                "Less data read and transferred",
            )
            .with_rewrite(format_sql(sql), format_sql(&rewritten)),
        );
    }

    if LEADING_WILDCARD.is_match(sql) {
        let details = match kind {
            DbKind::Postgres => {
                "A pattern starting with % cannot use a B-tree index; consider a pg_trgm GIN \
                 index or full-text search"
            }
            DbKind::Sqlite => {
                "A pattern starting with % cannot use an index; consider an FTS5 virtual table"
            }
        };
        out.push(QueryOptimizationSuggestion::new(
            SuggestionKind::Index,
            Priority::Medium,
            "Leading wildcard in LIKE",
            details,
            "Avoids a full scan for substring searches",
        ));
    }

    if SELECT_KEYWORD.find_iter(sql).count() > 1 {
        out.push(QueryOptimizationSuggestion::new(
            SuggestionKind::Rewrite,
            Priority::Medium,
            "Convert subqueries to joins",
            "Nested SELECTs are often evaluated per row; a JOIN or a CTE lets the planner \
             pick a better strategy",
            "Fewer repeated subquery evaluations",
        ));
    }

    if DISTINCT.is_match(sql) {
        out.push(QueryOptimizationSuggestion::new(
            SuggestionKind::Rewrite,
            Priority::Medium,
            "Review DISTINCT usage",
            "DISTINCT sorts or hashes the whole result; it often hides a join that \
             multiplies rows",
            "Avoids a sort or hash over the full result",
        ));
    }

    if UNION.find_iter(sql).count() > UNION_ALL.find_iter(sql).count() {
        out.push(QueryOptimizationSuggestion::new(
            SuggestionKind::Rewrite,
            Priority::Low,
            "Use UNION ALL where duplicates are impossible",
            "UNION removes duplicates with an extra sort or hash step",
            "Skips duplicate elimination",
        ));
    }

    if WHERE_FUNCTION.is_match(sql) {
        out.push(QueryOptimizationSuggestion::new(
            SuggestionKind::Rewrite,
            Priority::High,
            "Function applied to a column in WHERE",
            "Wrapping a column in a function prevents index use; compare the bare column \
             against a transformed constant or create an expression index",
            "Lets the filter use an index",
        ));
    }

    if kind == DbKind::Sqlite {
        let has_limit = LIMIT_KEYWORD.is_match(sql);
        if SELECT_KEYWORD.is_match(sql) && !WHERE_KEYWORD.is_match(sql) && !has_limit {
            out.push(QueryOptimizationSuggestion::new(
                SuggestionKind::Rewrite,
                Priority::High,
                "Unbounded SELECT",
                "The statement reads every row; add a WHERE clause or a LIMIT",
                "Bounded reads on large tables",
            ));
        }
        if ORDER_BY.is_match(sql) && !has_limit {
            out.push(QueryOptimizationSuggestion::new(
                SuggestionKind::Rewrite,
                Priority::Medium,
                "ORDER BY without LIMIT",
                "Sorting the full result is expensive; add a LIMIT if only the first rows \
                 are used",
                "Smaller sorts",
            ));
        }
    }

    out
}

/// Table names referenced by `FROM` and `JOIN`, in first-seen order
pub fn extract_tables(sql: &str) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for caps in TABLE_REF.captures_iter(sql) {
        let name = caps[1].to_string();
        if !tables.contains(&name) {
            tables.push(name);
        }
    }
    tables
}

/// Classify a statistics row into a pattern with kind-specific advice
pub fn classify_pattern(stat: &SlowQuery) -> QueryPattern {
    let kind = if stat.mean_time_ms > SLOW_QUERY_MS {
        PatternKind::Slow
    } else if stat.calls > FREQUENT_CALLS {
        PatternKind::Frequent
    } else {
        PatternKind::Complex
    };

    let mut suggestions = vec![match kind {
        PatternKind::Slow => QueryOptimizationSuggestion::new(
            SuggestionKind::Index,
            Priority::High,
            "Slow statement",
            format!(
                "Averages {:.1} ms over {} calls; explain it and index its filter columns",
                stat.mean_time_ms, stat.calls
            ),
            "Largest share of database time",
        ),
        PatternKind::Frequent => QueryOptimizationSuggestion::new(
            SuggestionKind::Structure,
            Priority::Medium,
            "Frequently executed statement",
            format!(
                "Called {} times; cache the result or batch the calls",
                stat.calls
            ),
            "Fewer round trips",
        ),
        _ => QueryOptimizationSuggestion::new(
            SuggestionKind::Rewrite,
            Priority::Low,
            "Review statement structure",
            "Repeated statement with moderate cost; check it against the static rules",
            "Incremental",
        ),
    }];
    suggestions.extend(optimize_query(DbKind::Postgres, &stat.query));

    QueryPattern {
        kind,
        query: stat.query.clone(),
        calls: stat.calls,
        total_time_ms: stat.total_time_ms,
        avg_time_ms: stat.mean_time_ms,
        tables: extract_tables(&stat.query),
        suggestions,
    }
}

/// Recommendations and bottlenecks derived from one table's counters.
///
/// Staleness only applies where the backend tracks `last_analyze`.
pub fn table_findings(
    stats: &TableStats,
    now: DateTime<Utc>,
    check_staleness: bool,
) -> (Vec<QueryOptimizationSuggestion>, Vec<String>) {
    let mut recommendations = Vec::new();
    let mut bottlenecks = Vec::new();
    let table = &stats.name;

    let stale = stats
        .last_analyze
        .is_none_or(|at| now - at > Duration::hours(24));
    if check_staleness && stats.row_count > 0 && stale {
        let mut rec = QueryOptimizationSuggestion::new(
            SuggestionKind::Structure,
            Priority::Medium,
            "Planner statistics are stale",
            format!("{} has not been analyzed in the last 24 hours", table),
            "Better row estimates and plan choices",
        );
        rec.after = Some(format!("ANALYZE {};", table));
        recommendations.push(rec);
    }

    if stats.seq_scan > 2 * stats.idx_scan {
        recommendations.push(QueryOptimizationSuggestion::new(
            SuggestionKind::Index,
            Priority::High,
            "Sequential scans dominate",
            format!(
                "{} sequential scans vs {} index scans on {}; index the columns it is \
                 filtered on",
                stats.seq_scan, stats.idx_scan, table
            ),
            "Index lookups instead of full reads",
        ));
    }

    if stats.row_count > PARTITION_ROWS {
        bottlenecks.push(format!(
            "{} has {} rows; consider partitioning",
            table, stats.row_count
        ));
    }

    if stats.updates > stats.row_count / 2 {
        bottlenecks.push(format!(
            "{} has high update churn ({} updates for {} rows); check autovacuum and fillfactor",
            table, stats.updates, stats.row_count
        ));
    }

    (recommendations, bottlenecks)
}
