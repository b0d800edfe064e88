//! Database abstraction layer
//!
//! Two traits describe what every backend offers: [`Database`] (open, ping,
//! run a statement, explain it) and [`Introspector`] (catalog queries). The
//! PostgreSQL and SQLite providers implement both, and [`Backend`] is the
//! tagged variant the registry stores and the tool facade calls through.

pub mod executor;
pub mod models;
pub mod postgres;
pub mod sqlite;
pub mod types;

use crate::config::{ConnectionConfig, DbKind};
use crate::error::DbResult;
use crate::optimizer::{
    IndexSuggestion, Optimizer, PerformanceAnalysis, QueryOptimizationSuggestion, QueryPattern,
};

pub use executor::{explain_sql, find_duplicate_data, is_read_only_statement};
pub use models::{
    ActiveConnection, ColumnInfo, DatabaseSize, IndexInfo, SlowQuery, TableInfo, TableStats,
};
pub use postgres::PostgresProvider;
pub use sqlite::SqliteProvider;
pub use types::{CellValue, QueryResult};

/// A live session with one database
#[allow(async_fn_in_trait)]
pub trait Database: Send + Sync {
    /// Backend kind of this session
    fn kind(&self) -> DbKind;

    /// Round-trip a trivial statement
    ///
    /// # Errors
    /// Returns `DbError::Unreachable` if the session cannot answer
    async fn ping(&self) -> DbResult<()>;

    /// Release the session. Calling it twice is harmless.
    async fn close(&self);

    /// Ask the backend to abandon whatever statement is running
    async fn cancel(&self) -> DbResult<()>;

    /// Execute a SQL statement and materialize every row
    ///
    /// # Errors
    /// Returns `DbError::Backend` carrying the driver's message
    async fn execute_query(&self, sql: &str) -> DbResult<QueryResult>;

    /// Run `sql` under the backend's EXPLAIN form
    async fn explain_query(&self, sql: &str) -> DbResult<QueryResult> {
        self.execute_query(&explain_sql(self.kind(), sql)).await
    }
}

/// Catalog queries with a backend-independent result shape
#[allow(async_fn_in_trait)]
pub trait Introspector: Database {
    /// User tables and views, sorted by (schema, name)
    async fn get_all_tables(&self) -> DbResult<Vec<TableInfo>>;

    /// Columns of `table` in ordinal order
    async fn get_table_schema(&self, table: &str) -> DbResult<Vec<ColumnInfo>>;

    /// Indexes of `table`, key columns in order
    async fn get_table_indexes(&self, table: &str) -> DbResult<Vec<IndexInfo>>;

    async fn get_table_stats(&self, table: &str) -> DbResult<TableStats>;

    /// Stats for every user table, largest first
    async fn get_table_sizes(&self) -> DbResult<Vec<TableStats>>;

    async fn get_database_size(&self) -> DbResult<DatabaseSize>;

    async fn get_active_connections(&self) -> DbResult<Vec<ActiveConnection>>;

    /// Slowest statements by mean time
    ///
    /// # Errors
    /// Returns `DbError::ExtensionMissing` when the statistics source is not
    /// installed
    async fn get_slow_queries(&self) -> DbResult<Vec<SlowQuery>>;

    /// (table count, index count) for the user schemas
    async fn object_counts(&self) -> DbResult<(i64, i64)>;
}

/// A live connection to either backend
#[derive(Clone)]
pub enum Backend {
    Postgres(PostgresProvider),
    Sqlite(SqliteProvider),
}

impl Backend {
    /// Open and verify a connection for `config`
    pub async fn open(config: &ConnectionConfig) -> DbResult<Self> {
        config.validate()?;
        let backend = match config.kind {
            DbKind::Postgres => Backend::Postgres(PostgresProvider::connect(config).await?),
            DbKind::Sqlite => Backend::Sqlite(SqliteProvider::open(config).await?),
        };
        if let Err(e) = backend.ping().await {
            backend.close().await;
            return Err(e);
        }
        Ok(backend)
    }
}

macro_rules! dispatch {
    ($self:ident, $db:ident => $body:expr) => {
        match $self {
            Backend::Postgres($db) => $body,
            Backend::Sqlite($db) => $body,
        }
    };
}

impl Database for Backend {
    fn kind(&self) -> DbKind {
        dispatch!(self, db => db.kind())
    }

    async fn ping(&self) -> DbResult<()> {
        dispatch!(self, db => db.ping().await)
    }

    async fn close(&self) {
        dispatch!(self, db => db.close().await)
    }

    async fn cancel(&self) -> DbResult<()> {
        dispatch!(self, db => db.cancel().await)
    }

    async fn execute_query(&self, sql: &str) -> DbResult<QueryResult> {
        dispatch!(self, db => db.execute_query(sql).await)
    }

    async fn explain_query(&self, sql: &str) -> DbResult<QueryResult> {
        dispatch!(self, db => db.explain_query(sql).await)
    }
}

impl Introspector for Backend {
    async fn get_all_tables(&self) -> DbResult<Vec<TableInfo>> {
        dispatch!(self, db => db.get_all_tables().await)
    }

    async fn get_table_schema(&self, table: &str) -> DbResult<Vec<ColumnInfo>> {
        dispatch!(self, db => db.get_table_schema(table).await)
    }

    async fn get_table_indexes(&self, table: &str) -> DbResult<Vec<IndexInfo>> {
        dispatch!(self, db => db.get_table_indexes(table).await)
    }

    async fn get_table_stats(&self, table: &str) -> DbResult<TableStats> {
        dispatch!(self, db => db.get_table_stats(table).await)
    }

    async fn get_table_sizes(&self) -> DbResult<Vec<TableStats>> {
        dispatch!(self, db => db.get_table_sizes().await)
    }

    async fn get_database_size(&self) -> DbResult<DatabaseSize> {
        dispatch!(self, db => db.get_database_size().await)
    }

    async fn get_active_connections(&self) -> DbResult<Vec<ActiveConnection>> {
        dispatch!(self, db => db.get_active_connections().await)
    }

    async fn get_slow_queries(&self) -> DbResult<Vec<SlowQuery>> {
        dispatch!(self, db => db.get_slow_queries().await)
    }

    async fn object_counts(&self) -> DbResult<(i64, i64)> {
        dispatch!(self, db => db.object_counts().await)
    }
}

impl Optimizer for Backend {
    async fn analyze_query_performance(&self, sql: &str) -> DbResult<PerformanceAnalysis> {
        dispatch!(self, db => db.analyze_query_performance(sql).await)
    }

    async fn suggest_indexes(&self, table: &str) -> DbResult<Vec<IndexSuggestion>> {
        dispatch!(self, db => db.suggest_indexes(table).await)
    }

    async fn get_query_patterns(&self) -> DbResult<Vec<QueryPattern>> {
        dispatch!(self, db => db.get_query_patterns().await)
    }

    fn optimize_query(&self, sql: &str) -> Vec<QueryOptimizationSuggestion> {
        dispatch!(self, db => db.optimize_query(sql))
    }

    async fn analyze_table_performance(&self, table: &str) -> DbResult<PerformanceAnalysis> {
        dispatch!(self, db => db.analyze_table_performance(table).await)
    }
}
