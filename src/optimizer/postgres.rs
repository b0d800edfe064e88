//! PostgreSQL optimizer entry points

use crate::config::DbKind;
use crate::db::postgres::{PostgresProvider, StatementOrder};
use crate::db::{Database, Introspector};
use crate::error::{DbError, DbResult};
use crate::optimizer::indexes::{self, IndexContext};
use crate::optimizer::plan::PlanMarkers;
use crate::optimizer::{
    IndexSuggestion, Optimizer, PerformanceAnalysis, Priority, QueryOptimizationSuggestion,
    QueryPattern, SLOW_QUERY_MS, SuggestionKind, overall_score, rules,
};
use chrono::Utc;

/// Statements must have run more often than this to count as a pattern
const PATTERN_MIN_CALLS: i64 = 10;

impl Optimizer for PostgresProvider {
    async fn analyze_query_performance(&self, sql: &str) -> DbResult<PerformanceAnalysis> {
        let plan = self.explain_query(sql).await?;
        let markers = PlanMarkers::from_postgres(&plan);
        let (recommendations, bottlenecks) = plan_findings(&markers);

        let size = self.get_database_size().await?;
        let (tables, idx) = self.object_counts().await?;
        let slow_query_count = match self.get_slow_queries().await {
            Ok(queries) => queries
                .iter()
                .filter(|q| q.mean_time_ms > SLOW_QUERY_MS)
                .count(),
            Err(DbError::ExtensionMissing(_)) => 0,
            Err(e) => return Err(e),
        };

        let mut analysis = PerformanceAnalysis::new(&size, tables, idx);
        analysis.slow_query_count = slow_query_count;
        analysis.overall_score = overall_score(slow_query_count, 0, bottlenecks.len());
        analysis.bottlenecks = bottlenecks;
        analysis.recommendations = recommendations;
        analysis
            .recommendations
            .extend(rules::optimize_query(DbKind::Postgres, sql));
        Ok(analysis)
    }

    async fn suggest_indexes(&self, table: &str) -> DbResult<Vec<IndexSuggestion>> {
        let columns = self.get_table_schema(table).await?;
        let existing = self.get_table_indexes(table).await?;
        let row_count = self.get_table_stats(table).await?.row_count;

        let ctx = IndexContext {
            kind: DbKind::Postgres,
            table,
            columns: &columns,
            indexes: &existing,
            row_count,
        };
        Ok(indexes::dedupe(indexes::foreign_key_gaps(&ctx), &existing))
    }

    async fn get_query_patterns(&self) -> DbResult<Vec<QueryPattern>> {
        let stats = self
            .statement_stats(PATTERN_MIN_CALLS, StatementOrder::TotalTime)
            .await?;
        Ok(stats.iter().map(rules::classify_pattern).collect())
    }

    async fn analyze_table_performance(&self, table: &str) -> DbResult<PerformanceAnalysis> {
        let stats = self.get_table_stats(table).await?;
        let suggestions = self.suggest_indexes(table).await?;
        let size = self.get_database_size().await?;
        let (tables, idx) = self.object_counts().await?;

        let (recommendations, bottlenecks) = rules::table_findings(&stats, Utc::now(), true);

        let mut analysis = PerformanceAnalysis::new(&size, tables, idx);
        analysis.overall_score = overall_score(0, suggestions.len(), bottlenecks.len());
        analysis.bottlenecks = bottlenecks;
        analysis.recommendations = recommendations;
        analysis.index_suggestions = suggestions;
        analysis.table_stats = Some(stats);
        Ok(analysis)
    }
}

/// Turn plan markers into recommendations and bottleneck lines
fn plan_findings(markers: &PlanMarkers) -> (Vec<QueryOptimizationSuggestion>, Vec<String>) {
    let mut recommendations = Vec::new();
    let mut bottlenecks = Vec::new();

    for relation in &markers.seq_scans {
        recommendations.push(
            QueryOptimizationSuggestion::new(
                SuggestionKind::Index,
                Priority::High,
                format!("Sequential scan on {}", relation),
                format!(
                    "The plan reads all of {}; index the columns used in its WHERE and JOIN \
                     conditions",
                    relation
                ),
                "Index lookups instead of full table reads",
            )
            .with_cost(markers.total_cost),
        );
        bottlenecks.push(format!("Sequential scan on {}", relation));
    }

    if markers.external_sort {
        recommendations.push(
            QueryOptimizationSuggestion::new(
                SuggestionKind::Structure,
                Priority::Medium,
                "Sort spilled to disk",
                "Raise work_mem for this workload or add an index matching the ORDER BY",
                "In-memory sorting",
            )
            .with_cost(markers.total_cost),
        );
        bottlenecks.push("Sort spilled to disk".to_string());
    }

    if let Some(ms) = markers.execution_time_ms.filter(|ms| *ms > SLOW_QUERY_MS) {
        bottlenecks.push(format!("Execution took {:.1} ms", ms));
    }

    (recommendations, bottlenecks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_findings_seq_scan_and_sort() {
        let markers = PlanMarkers {
            seq_scans: vec!["orders".into()],
            external_sort: true,
            total_cost: Some(5120.0),
            execution_time_ms: Some(1500.0),
        };
        let (recs, bottlenecks) = plan_findings(&markers);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].priority, Priority::High);
        assert_eq!(recs[0].kind, SuggestionKind::Index);
        assert_eq!(recs[0].estimated_cost, Some(5120.0));
        assert_eq!(recs[1].priority, Priority::Medium);
        assert_eq!(bottlenecks.len(), 3);
    }

    #[test]
    fn test_plan_findings_clean_plan() {
        let (recs, bottlenecks) = plan_findings(&PlanMarkers::default());
        assert!(recs.is_empty());
        assert!(bottlenecks.is_empty());
    }
}
