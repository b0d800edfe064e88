//! SQLite optimizer entry points
//!
//! SQLite keeps no statement statistics or scan counters, so patterns are
//! synthesized per table and the index heuristics lean on column names and
//! declared types instead.

use crate::config::DbKind;
use crate::db::sqlite::SqliteProvider;
use crate::db::{Database, Introspector};
use crate::error::DbResult;
use crate::optimizer::indexes::{self, IndexContext};
use crate::optimizer::plan::sqlite_full_scans;
use crate::optimizer::{
    IndexSuggestion, Optimizer, PatternKind, PerformanceAnalysis, Priority,
    QueryOptimizationSuggestion, QueryPattern, SuggestionKind, rules, sqlite_score,
};
use chrono::Utc;

impl Optimizer for SqliteProvider {
    async fn analyze_query_performance(&self, sql: &str) -> DbResult<PerformanceAnalysis> {
        let plan = self.explain_query(sql).await?;

        let mut recommendations = Vec::new();
        let mut bottlenecks = Vec::new();
        for table in sqlite_full_scans(&plan) {
            recommendations.push(QueryOptimizationSuggestion::new(
                SuggestionKind::Index,
                Priority::High,
                format!("Full table scan on {}", table),
                format!(
                    "SQLite reads every row of {}; index the columns in its WHERE clause",
                    table
                ),
                "Index search instead of a full scan",
            ));
            bottlenecks.push(format!("Full table scan on {}", table));
        }
        recommendations.extend(rules::optimize_query(DbKind::Sqlite, sql));

        let size = self.get_database_size().await?;
        let (tables, idx) = self.object_counts().await?;

        let mut analysis = PerformanceAnalysis::new(&size, tables, idx);
        analysis.overall_score = sqlite_score(bottlenecks.len(), &recommendations);
        analysis.bottlenecks = bottlenecks;
        analysis.recommendations = recommendations;
        Ok(analysis)
    }

    async fn suggest_indexes(&self, table: &str) -> DbResult<Vec<IndexSuggestion>> {
        let columns = self.get_table_schema(table).await?;
        let existing = self.get_table_indexes(table).await?;
        let row_count = self.get_table_stats(table).await?.row_count;

        let ctx = IndexContext {
            kind: DbKind::Sqlite,
            table,
            columns: &columns,
            indexes: &existing,
            row_count,
        };
        let mut all = indexes::foreign_key_gaps(&ctx);
        all.extend(indexes::column_heuristics(&ctx));
        all.extend(indexes::composite_opportunities(&ctx));
        Ok(indexes::dedupe(all, &existing))
    }

    async fn get_query_patterns(&self) -> DbResult<Vec<QueryPattern>> {
        let tables = self.get_all_tables().await?;
        Ok(tables
            .into_iter()
            .filter(|t| t.kind == "table")
            .map(|t| {
                let query = format!("SELECT * FROM {}", t.name);
                QueryPattern {
                    kind: PatternKind::Basic,
                    suggestions: rules::optimize_query(DbKind::Sqlite, &query),
                    query,
                    calls: 0,
                    total_time_ms: 0.0,
                    avg_time_ms: 0.0,
                    tables: vec![t.name],
                }
            })
            .collect())
    }

    async fn analyze_table_performance(&self, table: &str) -> DbResult<PerformanceAnalysis> {
        let stats = self.get_table_stats(table).await?;
        let suggestions = self.suggest_indexes(table).await?;
        let size = self.get_database_size().await?;
        let (tables, idx) = self.object_counts().await?;

        let (recommendations, bottlenecks) = rules::table_findings(&stats, Utc::now(), false);

        let mut analysis = PerformanceAnalysis::new(&size, tables, idx);
        analysis.overall_score = sqlite_score(bottlenecks.len(), &recommendations);
        analysis.bottlenecks = bottlenecks;
        analysis.recommendations = recommendations;
        analysis.index_suggestions = suggestions;
        analysis.table_stats = Some(stats);
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;

    async fn shop(dir: &tempfile::TempDir) -> SqliteProvider {
        let path = dir.path().join("shop.db");
        let config = ConnectionConfig::sqlite("shop", path.to_string_lossy());
        let db = SqliteProvider::open(&config).await.unwrap();
        db.execute_query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL, name TEXT);
             CREATE TABLE orders (
                 id INTEGER PRIMARY KEY,
                 user_id INTEGER REFERENCES users(id),
                 status TEXT,
                 created_at DATETIME,
                 note BLOB
             );
             INSERT INTO users (email, name) VALUES ('a@x', 'a'), ('b@x', 'b');
             INSERT INTO orders (user_id, status) VALUES (1, 'new'), (2, 'paid');",
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_full_scan_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let db = shop(&dir).await;

        let analysis = db
            .analyze_query_performance("SELECT * FROM orders WHERE status = 'new'")
            .await
            .unwrap();
        let scan = analysis
            .recommendations
            .iter()
            .find(|r| r.description == "Full table scan on orders")
            .unwrap();
        assert_eq!(scan.priority, Priority::High);
        assert_eq!(analysis.bottlenecks, vec!["Full table scan on orders"]);
        assert_eq!(analysis.table_count, 2);
        assert_eq!(analysis.overall_score, 70);
    }

    #[tokio::test]
    async fn test_suggest_indexes_for_orders() {
        let dir = tempfile::tempdir().unwrap();
        let db = shop(&dir).await;

        let suggestions = db.suggest_indexes("orders").await.unwrap();
        let fk = suggestions
            .iter()
            .find(|s| s.name == "idx_orders_user_id")
            .unwrap();
        assert_eq!(fk.columns, vec!["user_id"]);
        assert_eq!(fk.index_type, "btree");
        assert_eq!(fk.impact, "High");
        assert!(suggestions.iter().any(|s| s.name == "idx_orders_status_created_at"));
        assert!(suggestions.iter().all(|s| !s.columns.contains(&"note".to_string())));

        let mut names: Vec<&str> = suggestions.iter().map(|s| s.name.as_str()).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[tokio::test]
    async fn test_existing_index_suppresses_suggestion() {
        let dir = tempfile::tempdir().unwrap();
        let db = shop(&dir).await;
        db.execute_query("CREATE INDEX idx_orders_user_id ON orders (user_id)")
            .await
            .unwrap();

        let suggestions = db.suggest_indexes("orders").await.unwrap();
        assert!(suggestions.iter().all(|s| s.name != "idx_orders_user_id"));
    }

    #[tokio::test]
    async fn test_basic_patterns_per_table() {
        let dir = tempfile::tempdir().unwrap();
        let db = shop(&dir).await;

        let patterns = db.get_query_patterns().await.unwrap();
        assert_eq!(patterns.len(), 2);
        assert!(patterns.iter().all(|p| p.kind == PatternKind::Basic));
        assert_eq!(patterns[0].tables, vec!["orders"]);
    }

    #[tokio::test]
    async fn test_analyze_table_performance() {
        let dir = tempfile::tempdir().unwrap();
        let db = shop(&dir).await;

        let analysis = db.analyze_table_performance("users").await.unwrap();
        let stats = analysis.table_stats.as_ref().unwrap();
        assert_eq!(stats.row_count, 2);
        assert!(!analysis.index_suggestions.is_empty());
        assert!(analysis.overall_score <= 100);

        let err = db.analyze_table_performance("nope").await.unwrap_err();
        assert_eq!(err.kind(), "backend");
    }
}
