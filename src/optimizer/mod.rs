//! Optimizer engine
//!
//! Static rules over raw SQL text ([`rules`]), plan scanning ([`plan`]),
//! index heuristics ([`indexes`]) and the per-backend entry points that glue
//! them to the introspection surface.

pub mod indexes;
pub mod plan;
pub mod postgres;
pub mod rules;
pub mod sqlite;

use crate::db::Introspector;
use crate::db::models::{DatabaseSize, TableStats};
use crate::error::DbResult;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Mean execution time above which a statement counts as slow
pub const SLOW_QUERY_MS: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Index,
    Rewrite,
    Structure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// One piece of advice about a statement or table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOptimizationSuggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub priority: Priority,
    pub description: String,
    pub details: String,
    pub impact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
}

impl QueryOptimizationSuggestion {
    pub fn new(
        kind: SuggestionKind,
        priority: Priority,
        description: impl Into<String>,
        details: impl Into<String>,
        impact: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            priority,
            description: description.into(),
            details: details.into(),
            impact: impact.into(),
            before: None,
            after: None,
            estimated_cost: None,
        }
    }

    /// Attach before/after SQL
    pub fn with_rewrite(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.before = Some(before.into());
        self.after = Some(after.into());
        self
    }

    pub fn with_cost(mut self, cost: Option<f64>) -> Self {
        self.estimated_cost = cost;
        self
    }
}

/// A proposed index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSuggestion {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
    #[serde(rename = "type")]
    pub index_type: String,
    pub reason: String,
    /// `High`, `Medium` or `Low`
    pub impact: String,
    pub create_statement: String,
    pub estimated_size: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Slow,
    Frequent,
    Complex,
    Basic,
}

/// A recurring statement observed in backend statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPattern {
    #[serde(rename = "type")]
    pub kind: PatternKind,
    pub query: String,
    pub calls: i64,
    pub total_time_ms: f64,
    pub avg_time_ms: f64,
    pub tables: Vec<String>,
    pub suggestions: Vec<QueryOptimizationSuggestion>,
}

/// Result of a query or table analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceAnalysis {
    /// ISO-8601, UTC
    pub analyzed_at: String,
    pub database_size: String,
    pub table_count: i64,
    pub index_count: i64,
    pub slow_query_count: usize,
    pub bottlenecks: Vec<String>,
    pub index_suggestions: Vec<IndexSuggestion>,
    pub query_patterns: Vec<QueryPattern>,
    /// Always within 0..=100
    pub overall_score: u8,
    pub recommendations: Vec<QueryOptimizationSuggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_stats: Option<TableStats>,
}

impl PerformanceAnalysis {
    /// An empty analysis stamped now, carrying the database-wide figures
    pub fn new(size: &DatabaseSize, table_count: i64, index_count: i64) -> Self {
        Self {
            analyzed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            database_size: size.size.clone(),
            table_count,
            index_count,
            slow_query_count: 0,
            bottlenecks: Vec::new(),
            index_suggestions: Vec::new(),
            query_patterns: Vec::new(),
            overall_score: 100,
            recommendations: Vec::new(),
            table_stats: None,
        }
    }
}

/// Analysis entry points shared by both backends
#[allow(async_fn_in_trait)]
pub trait Optimizer: Introspector {
    /// Explain `sql`, scan the plan and combine with catalog counts
    async fn analyze_query_performance(&self, sql: &str) -> DbResult<PerformanceAnalysis>;

    /// Missing indexes for `table`
    async fn suggest_indexes(&self, table: &str) -> DbResult<Vec<IndexSuggestion>>;

    /// Recurring statements worth looking at
    ///
    /// # Errors
    /// Returns `DbError::ExtensionMissing` when statement statistics are
    /// unavailable
    async fn get_query_patterns(&self) -> DbResult<Vec<QueryPattern>>;

    /// Static anti-pattern rules; never touches the database
    fn optimize_query(&self, sql: &str) -> Vec<QueryOptimizationSuggestion> {
        rules::optimize_query(self.kind(), sql)
    }

    async fn analyze_table_performance(&self, table: &str) -> DbResult<PerformanceAnalysis>;
}

/// Health score: slow statements, missing indexes and bottlenecks
pub fn overall_score(slow_queries: usize, index_suggestions: usize, bottlenecks: usize) -> u8 {
    let mut score: i64 = 100;
    if slow_queries > 10 {
        score -= 20;
    } else if slow_queries > 5 {
        score -= 10;
    }
    if index_suggestions > 5 {
        score -= 15;
    } else if index_suggestions > 2 {
        score -= 8;
    }
    score -= 5 * bottlenecks as i64;
    score.clamp(0, 100) as u8
}

/// Health score for SQLite: flat deductions per finding
pub fn sqlite_score(bottlenecks: usize, recommendations: &[QueryOptimizationSuggestion]) -> u8 {
    let mut score: i64 = 100 - 10 * bottlenecks as i64;
    for rec in recommendations {
        score -= match rec.priority {
            Priority::High => 15,
            Priority::Medium => 10,
            Priority::Low => 5,
        };
    }
    score.clamp(0, 100) as u8
}
