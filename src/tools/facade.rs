//! Capability facade
//!
//! One method per tool. Each call resolves the current connection from the
//! registry, runs under the tool deadline, and passes backend errors through
//! untouched.

use crate::db::{
    ActiveConnection, Backend, ColumnInfo, Database, DatabaseSize, IndexInfo, Introspector,
    QueryResult, SlowQuery, TableInfo, TableStats, find_duplicate_data,
};
use crate::error::{DbError, DbResult};
use crate::optimizer::{
    IndexSuggestion, Optimizer, PerformanceAnalysis, QueryOptimizationSuggestion, QueryPattern,
};
use crate::registry::ConnectionRegistry;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The tool surface over whatever connection is current
#[derive(Clone)]
pub struct DatabaseTools {
    registry: Arc<ConnectionRegistry>,
    deadline: Duration,
}

impl DatabaseTools {
    pub fn new(registry: Arc<ConnectionRegistry>, deadline: Duration) -> Self {
        Self { registry, deadline }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Resolve the current connection and run `op` on it under the deadline.
    ///
    /// On expiry the backend is asked to cancel and `Cancelled` is returned.
    async fn run<T, F, Fut>(&self, tool: &'static str, op: F) -> DbResult<T>
    where
        F: FnOnce(Backend) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let (db, connection) = self.registry.current().await?;
        let start = Instant::now();

        match tokio::time::timeout(self.deadline, op(db.clone())).await {
            Ok(result) => {
                tracing::debug!(
                    tool,
                    connection = %connection,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "Tool finished"
                );
                result
            }
            Err(_) => {
                tracing::warn!(tool, connection = %connection, deadline = ?self.deadline, "Tool deadline exceeded");
                if let Err(e) = db.cancel().await {
                    tracing::debug!(error = %e, "Cancel request failed");
                }
                Err(DbError::Cancelled)
            }
        }
    }

    pub async fn execute_sql(&self, sql: &str) -> DbResult<QueryResult> {
        self.run("execute_sql", |db| async move { db.execute_query(sql).await })
            .await
    }

    pub async fn get_all_tables(&self) -> DbResult<Vec<TableInfo>> {
        self.run("get_all_tables", |db| async move { db.get_all_tables().await })
            .await
    }

    pub async fn get_table_schema(&self, table: &str) -> DbResult<Vec<ColumnInfo>> {
        self.run("get_table_schema", |db| async move {
            db.get_table_schema(table).await
        })
        .await
    }

    pub async fn explain_query(&self, sql: &str) -> DbResult<QueryResult> {
        self.run("explain_query", |db| async move { db.explain_query(sql).await })
            .await
    }

    pub async fn get_table_indexes(&self, table: &str) -> DbResult<Vec<IndexInfo>> {
        self.run("get_table_indexes", |db| async move {
            db.get_table_indexes(table).await
        })
        .await
    }

    pub async fn get_table_stats(&self, table: &str) -> DbResult<TableStats> {
        self.run("get_table_stats", |db| async move {
            db.get_table_stats(table).await
        })
        .await
    }

    pub async fn find_duplicate_data(
        &self,
        table: &str,
        columns: &[String],
    ) -> DbResult<QueryResult> {
        self.run("find_duplicate_data", |db| async move {
            find_duplicate_data(&db, table, columns).await
        })
        .await
    }

    /// # Errors
    /// `ExtensionMissing` on PostgreSQL without `pg_stat_statements`
    pub async fn get_slow_queries(&self) -> DbResult<Vec<SlowQuery>> {
        self.run("get_slow_queries", |db| async move { db.get_slow_queries().await })
            .await
    }

    pub async fn get_database_size(&self) -> DbResult<DatabaseSize> {
        self.run("get_database_size", |db| async move {
            db.get_database_size().await
        })
        .await
    }

    pub async fn get_table_sizes(&self) -> DbResult<Vec<TableStats>> {
        self.run("get_table_sizes", |db| async move { db.get_table_sizes().await })
            .await
    }

    pub async fn get_active_connections(&self) -> DbResult<Vec<ActiveConnection>> {
        self.run("get_active_connections", |db| async move {
            db.get_active_connections().await
        })
        .await
    }

    pub async fn analyze_query_performance(&self, query: &str) -> DbResult<PerformanceAnalysis> {
        self.run("analyze_query_performance", |db| async move {
            db.analyze_query_performance(query).await
        })
        .await
    }

    pub async fn suggest_indexes(&self, table: &str) -> DbResult<Vec<IndexSuggestion>> {
        self.run("suggest_indexes", |db| async move {
            db.suggest_indexes(table).await
        })
        .await
    }

    /// # Errors
    /// `ExtensionMissing` on PostgreSQL without `pg_stat_statements`
    pub async fn get_query_patterns(&self) -> DbResult<Vec<QueryPattern>> {
        self.run("get_query_patterns", |db| async move {
            db.get_query_patterns().await
        })
        .await
    }

    pub async fn optimize_query(&self, query: &str) -> DbResult<Vec<QueryOptimizationSuggestion>> {
        self.run("optimize_query", |db| async move { Ok(db.optimize_query(query)) })
            .await
    }

    pub async fn analyze_table_performance(&self, table: &str) -> DbResult<PerformanceAnalysis> {
        self.run("analyze_table_performance", |db| async move {
            db.analyze_table_performance(table).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;

    #[tokio::test]
    async fn test_no_current_connection() {
        let tools = DatabaseTools::new(Arc::new(ConnectionRegistry::in_memory()), Duration::from_secs(5));
        let err = tools.get_all_tables().await.unwrap_err();
        assert_eq!(err, DbError::NoCurrent);
        assert_eq!(err.to_string(), "no active database connection");
    }

    #[tokio::test]
    async fn test_routes_to_current_connection() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ConnectionRegistry::in_memory());
        let path = dir.path().join("facade.db");
        registry
            .add(ConnectionConfig::sqlite("local", path.to_string_lossy()))
            .await
            .unwrap();
        let tools = DatabaseTools::new(registry, Duration::from_secs(5));

        tools.execute_sql("CREATE TABLE items (id INTEGER PRIMARY KEY, sku TEXT)").await.unwrap();
        let tables = tools.get_all_tables().await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "items");

        let err = tools.get_table_schema("nope").await.unwrap_err();
        assert_eq!(err.kind(), "backend");
    }

    #[tokio::test]
    async fn test_deadline_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ConnectionRegistry::in_memory());
        let path = dir.path().join("slow.db");
        registry
            .add(ConnectionConfig::sqlite("slow", path.to_string_lossy()))
            .await
            .unwrap();
        let tools = DatabaseTools::new(registry, Duration::from_millis(200));

        // A recursive CTE that runs far longer than the deadline
        let err = tools
            .execute_sql(
                "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n) \
                 SELECT COUNT(*) FROM n",
            )
            .await
            .unwrap_err();
        assert_eq!(err, DbError::Cancelled);
    }
}
