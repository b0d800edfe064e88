//! SQLite database provider
//!
//! rusqlite is synchronous, so every call hops onto the blocking pool and
//! locks the single connection for its duration. Table-scoped catalog reads
//! use the table-valued `pragma_*()` functions with bound parameters.

use crate::config::{ConnectionConfig, DbKind, SqliteMode};
use crate::db::executor::{quote_identifier, split_table};
use crate::db::models::{
    ActiveConnection, ColumnInfo, DatabaseSize, IndexInfo, SlowQuery, TableInfo, TableStats,
    pretty_bytes,
};
use crate::db::types::{BatchResult, CellValue, QueryResult};
use crate::db::{Database, Introspector};
use crate::error::{DbError, DbResult};
use regex::Regex;
use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection, InterruptHandle, OpenFlags, OptionalExtension};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::{Duration, Instant};

/// `(len)` or `(precision, scale)` in a declared column type
static TYPE_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)").expect("valid type-args regex")
});

/// SQLite database provider
#[derive(Clone)]
pub struct SqliteProvider {
    /// The connection; `None` once closed
    conn: Arc<Mutex<Option<Connection>>>,
    /// Interrupts a running statement from another thread
    interrupt: Arc<InterruptHandle>,
    /// Backing file, if any
    path: Option<PathBuf>,
    /// Name reported as the database name
    database: String,
}

impl SqliteProvider {
    /// Open the database described by `config`.
    ///
    /// The DSN carries mode and cache; busy timeout, WAL journaling (for
    /// writable files), `synchronous=NORMAL` and foreign keys are applied as
    /// pragmas because SQLite itself ignores the underscore parameters.
    pub async fn open(config: &ConnectionConfig) -> DbResult<Self> {
        let dsn = config.sqlite_dsn();
        let in_memory = config.is_in_memory();
        let use_wal = !in_memory && config.mode != SqliteMode::Ro;
        let busy = Duration::from_secs(config.timeout_secs);

        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            let conn = Connection::open_with_flags(&dsn, flags)?;
            conn.busy_timeout(busy)?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            if use_wal {
                let _mode: String =
                    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
                conn.pragma_update(None, "synchronous", "NORMAL")?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| DbError::Backend(format!("SQLite worker failed: {}", e)))?
        .map_err(|e| DbError::Unreachable(e.to_string()))?;

        let (path, database) = if in_memory {
            (None, "memory".to_string())
        } else {
            let path = PathBuf::from(&config.path);
            let database = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "main".to_string());
            (Some(path), database)
        };

        tracing::info!(connection = %config.name, path = %config.path, "Opened SQLite database");

        Ok(Self {
            interrupt: Arc::new(conn.get_interrupt_handle()),
            conn: Arc::new(Mutex::new(Some(conn))),
            path,
            database,
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| DbError::Backend("SQLite connection lock poisoned".into()))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| DbError::Unreachable("connection closed".into()))?;
            f(conn)
        })
        .await
        .map_err(|e| DbError::Backend(format!("SQLite worker failed: {}", e)))?
    }

    async fn stats_for(&self, tables: Vec<String>) -> DbResult<Vec<TableStats>> {
        self.with_conn(move |conn| {
            let total_bytes = database_bytes(conn)?;
            let mut stats = Vec::with_capacity(tables.len());
            for table in tables {
                let (schema, name) = split_table(&table);
                let schema = schema.unwrap_or("main").to_string();
                let name = name.to_string();
                ensure_table_exists(conn, &schema, &name)?;

                let quoted = quote_identifier(&format!("{}.{}", schema, name))?;
                let row_count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", quoted), [], |r| r.get(0))?;

                stats.push(TableStats {
                    name,
                    schema,
                    row_count,
                    total_size: pretty_bytes(total_bytes),
                    total_bytes,
                    ..Default::default()
                });
            }
            Ok(stats)
        })
        .await
    }
}

impl Database for SqliteProvider {
    fn kind(&self) -> DbKind {
        DbKind::Sqlite
    }

    async fn ping(&self) -> DbResult<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
            Ok(())
        })
        .await
        .map_err(|e| match e {
            DbError::Backend(msg) => DbError::Unreachable(msg),
            other => other,
        })?;

        // An unlinked file keeps answering through the open handle
        if let Some(ref path) = self.path {
            if !path.exists() {
                return Err(DbError::Unreachable(format!(
                    "database file {} no longer exists",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    async fn close(&self) {
        self.interrupt.interrupt();
        let conn = Arc::clone(&self.conn);
        let closed = tokio::task::spawn_blocking(move || {
            if let Ok(mut guard) = conn.lock() {
                if let Some(conn) = guard.take() {
                    if let Err((_, e)) = conn.close() {
                        tracing::warn!(error = %e, "SQLite close failed");
                    }
                }
            }
        })
        .await;
        if let Err(e) = closed {
            tracing::warn!(error = %e, "SQLite close task failed");
        }
    }

    async fn cancel(&self) -> DbResult<()> {
        self.interrupt.interrupt();
        Ok(())
    }

    /// Run every statement in `sql`; the last one's rows form the result
    async fn execute_query(&self, sql: &str) -> DbResult<QueryResult> {
        let sql = sql.trim().to_string();
        self.with_conn(move |conn| {
            let start = Instant::now();
            let mut statements = Batch::new(conn, &sql);
            let mut batch = BatchResult::default();

            while let Some(mut stmt) = statements.next()? {
                let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
                let width = columns.len();
                batch.describe(columns);

                let mut cursor = stmt.query([])?;
                while let Some(row) = cursor.next()? {
                    let mut values = Vec::with_capacity(width);
                    for i in 0..width {
                        values.push(cell_from_ref(row.get_ref(i)?));
                    }
                    batch.push_row(values);
                }
                batch.complete();
            }

            batch.finish(start.elapsed())
        })
        .await
    }
}

impl Introspector for SqliteProvider {
    async fn get_all_tables(&self) -> DbResult<Vec<TableInfo>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, type FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )?;
            let tables = stmt
                .query_map([], |row| {
                    Ok(TableInfo {
                        name: row.get(0)?,
                        schema: "main".to_string(),
                        kind: row.get(1)?,
                        description: String::new(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tables)
        })
        .await
    }

    async fn get_table_schema(&self, table: &str) -> DbResult<Vec<ColumnInfo>> {
        let (schema, name) = owned_parts(table);
        self.with_conn(move |conn| {
            ensure_table_exists(conn, &schema, &name)?;

            let mut fk_stmt =
                conn.prepare("SELECT \"from\" FROM pragma_foreign_key_list(?1, ?2)")?;
            let foreign: HashSet<String> = fk_stmt
                .query_map([&name, &schema], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;

            let mut stmt = conn.prepare(
                "SELECT name, type, \"notnull\", dflt_value, pk \
                 FROM pragma_table_info(?1, ?2) ORDER BY cid",
            )?;
            let columns = stmt
                .query_map([&name, &schema], |row| {
                    let name: String = row.get(0)?;
                    let data_type: String = row.get(1)?;
                    let not_null: bool = row.get(2)?;
                    let pk: i64 = row.get(4)?;
                    let (max_length, precision, scale) = type_args(&data_type);
                    Ok(ColumnInfo {
                        is_foreign_key: foreign.contains(&name),
                        name,
                        data_type,
                        // Key columns count as NOT NULL
                        nullable: !not_null && pk == 0,
                        default_value: row.get(3)?,
                        max_length,
                        precision,
                        scale,
                        is_primary_key: pk > 0,
                        description: String::new(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(columns)
        })
        .await
    }

    async fn get_table_indexes(&self, table: &str) -> DbResult<Vec<IndexInfo>> {
        let (schema, name) = owned_parts(table);
        self.with_conn(move |conn| {
            ensure_table_exists(conn, &schema, &name)?;

            let mut list = conn.prepare(
                "SELECT name, \"unique\", origin FROM pragma_index_list(?1, ?2) ORDER BY name",
            )?;
            let entries = list
                .query_map([&name, &schema], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut info = conn.prepare(
                "SELECT name FROM pragma_index_info(?1, ?2) ORDER BY seqno",
            )?;
            let mut indexes = Vec::with_capacity(entries.len());
            for (index_name, is_unique, origin) in entries {
                let columns = info
                    .query_map([&index_name, &schema], |row| {
                        Ok(row
                            .get::<_, Option<String>>(0)?
                            .unwrap_or_else(|| "<expression>".to_string()))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                indexes.push(IndexInfo {
                    name: index_name,
                    is_unique,
                    is_primary: origin == "pk",
                    columns,
                    index_type: "btree".to_string(),
                    tablespace: String::new(),
                    description: String::new(),
                });
            }
            Ok(indexes)
        })
        .await
    }

    async fn get_table_stats(&self, table: &str) -> DbResult<TableStats> {
        self.stats_for(vec![table.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Backend(format!("no such table: {}", table)))
    }

    async fn get_table_sizes(&self) -> DbResult<Vec<TableStats>> {
        let tables: Vec<String> = self
            .get_all_tables()
            .await?
            .into_iter()
            .filter(|t| t.kind == "table")
            .map(|t| t.name)
            .collect();
        self.stats_for(tables).await
    }

    async fn get_database_size(&self) -> DbResult<DatabaseSize> {
        let fallback = self.database.clone();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT seq, name, file FROM pragma_database_list")?;
            let attached = stmt
                .query_map([], |row| {
                    let _seq: i64 = row.get(0)?;
                    let name: String = row.get(1)?;
                    let file: Option<String> = row.get(2)?;
                    Ok((name, file))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let database = attached
                .into_iter()
                .find(|(name, _)| name == "main")
                .and_then(|(_, file)| file)
                .filter(|f| !f.is_empty())
                .and_then(|f| {
                    PathBuf::from(f)
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                })
                .unwrap_or(fallback);

            let bytes = database_bytes(conn)?;
            Ok(DatabaseSize {
                database,
                size: pretty_bytes(bytes),
                size_bytes: bytes,
            })
        })
        .await
    }

    async fn get_active_connections(&self) -> DbResult<Vec<ActiveConnection>> {
        Ok(vec![ActiveConnection {
            pid: std::process::id() as i64,
            user: "local".to_string(),
            database: self.database.clone(),
            client_addr: "local".to_string(),
            state: "active".to_string(),
            query: String::new(),
            duration: String::new(),
        }])
    }

    async fn get_slow_queries(&self) -> DbResult<Vec<SlowQuery>> {
        Ok(Vec::new())
    }

    async fn object_counts(&self) -> DbResult<(i64, i64)> {
        self.with_conn(|conn| {
            let counts = conn.query_row(
                "SELECT \
                   (SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'), \
                   (SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name NOT LIKE 'sqlite_%')",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(counts)
        })
        .await
    }
}

/// `schema.table` as owned parts, schema defaulting to `main`
fn owned_parts(table: &str) -> (String, String) {
    let (schema, name) = split_table(table);
    (schema.unwrap_or("main").to_string(), name.to_string())
}

fn ensure_table_exists(conn: &Connection, schema: &str, name: &str) -> DbResult<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT cid FROM pragma_table_info(?1, ?2) LIMIT 1",
            [name, schema],
            |row| row.get(0),
        )
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(DbError::Backend(format!("no such table: {}", name))),
    }
}

/// File size as SQLite sees it (`page_count * page_size`)
fn database_bytes(conn: &Connection) -> DbResult<i64> {
    let bytes = conn.query_row(
        "SELECT page_count * page_size FROM pragma_page_count, pragma_page_size",
        [],
        |row| row.get(0),
    )?;
    Ok(bytes)
}

/// Length for character types, precision/scale for numeric ones
fn type_args(declared: &str) -> (Option<i32>, Option<i32>, Option<i32>) {
    let upper = declared.to_uppercase();
    let Some(caps) = TYPE_ARGS.captures(&upper) else {
        return (None, None, None);
    };
    let first = caps.get(1).and_then(|m| m.as_str().parse().ok());
    let second = caps.get(2).and_then(|m| m.as_str().parse().ok());
    if upper.contains("CHAR") || upper.contains("TEXT") || upper.contains("CLOB") {
        (first, None, None)
    } else if upper.contains("DEC") || upper.contains("NUM") || upper.contains("REAL") {
        (None, first, second)
    } else {
        (None, None, None)
    }
}

fn cell_from_ref(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(i) => CellValue::Integer(i),
        ValueRef::Real(f) => CellValue::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => CellValue::from_bytes(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp(dir: &tempfile::TempDir) -> SqliteProvider {
        let path = dir.path().join("test.db");
        let config = ConnectionConfig::sqlite("test", path.to_string_lossy());
        SqliteProvider::open(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_execute_query_types() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp(&dir).await;

        let result = db
            .execute_query("SELECT 1 AS i, 2.5 AS f, 'x' AS t, NULL AS n, x'6869' AS b")
            .await
            .unwrap();
        assert_eq!(result.columns, vec!["i", "f", "t", "n", "b"]);
        assert_eq!(
            result.rows[0],
            vec![
                CellValue::Integer(1),
                CellValue::Float(2.5),
                CellValue::Text("x".into()),
                CellValue::Null,
                CellValue::Text("hi".into()),
            ]
        );
        assert!(!result.duration.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_statements_run_as_batch() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp(&dir).await;

        db.execute_query("CREATE TABLE a (x INTEGER); INSERT INTO a VALUES (1), (2);")
            .await
            .unwrap();
        let result = db.execute_query("SELECT COUNT(*) FROM a").await.unwrap();
        assert_eq!(result.rows[0][0], CellValue::Integer(2));
    }

    #[tokio::test]
    async fn test_statements_after_leading_select_still_run() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp(&dir).await;
        db.execute_query("CREATE TABLE a (x INTEGER)").await.unwrap();

        let result = db
            .execute_query("SELECT 1; INSERT INTO a VALUES (1)")
            .await
            .unwrap();
        assert!(result.columns.is_empty());

        let result = db
            .execute_query("INSERT INTO a VALUES (2);\nSELECT COUNT(*) AS n FROM a;")
            .await
            .unwrap();
        assert_eq!(result.columns, vec!["n"]);
        assert_eq!(result.rows[0][0], CellValue::Integer(2));
    }

    #[tokio::test]
    async fn test_error_in_later_statement_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp(&dir).await;

        let err = db
            .execute_query("SELECT 1; SELECT * FROM missing")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "backend");
    }

    #[tokio::test]
    async fn test_backend_error_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp(&dir).await;

        let err = db.execute_query("SELECT * FROM missing").await.unwrap_err();
        assert_eq!(err.kind(), "backend");
        assert!(err.to_string().contains("no such table"));
    }

    #[tokio::test]
    async fn test_introspection() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp(&dir).await;
        db.execute_query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email VARCHAR(120) NOT NULL); \
             CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users(id), \
                                  total DECIMAL(10, 2)); \
             CREATE UNIQUE INDEX idx_users_email ON users (email);",
        )
        .await
        .unwrap();

        let tables = db.get_all_tables().await.unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["orders", "users"]);

        let columns = db.get_table_schema("orders").await.unwrap();
        assert_eq!(columns.len(), 3);
        assert!(columns[0].is_primary_key);
        assert!(columns[1].is_foreign_key);
        assert_eq!(columns[2].precision, Some(10));
        assert_eq!(columns[2].scale, Some(2));

        let users = db.get_table_schema("users").await.unwrap();
        assert_eq!(users[1].max_length, Some(120));
        assert!(!users[1].nullable);

        let indexes = db.get_table_indexes("users").await.unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].columns, vec!["email"]);
        assert!(indexes[0].is_unique);
        assert_eq!(indexes[0].index_type, "btree");

        let stats = db.get_table_stats("users").await.unwrap();
        assert_eq!(stats.row_count, 0);
        assert!(stats.total_bytes > 0);
        assert_eq!(stats.seq_scan, 0);

        assert_eq!(db.object_counts().await.unwrap(), (2, 1));
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp(&dir).await;
        let err = db.get_table_schema("nope").await.unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[tokio::test]
    async fn test_stats_reject_bad_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp(&dir).await;
        let err = db.get_table_stats("users; DROP TABLE x").await.unwrap_err();
        assert!(matches!(err, DbError::Backend(_) | DbError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_synthetic_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp(&dir).await;

        let sessions = db.get_active_connections().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].client_addr, "local");
        assert!(db.get_slow_queries().await.unwrap().is_empty());

        let size = db.get_database_size().await.unwrap();
        assert_eq!(size.database, "test");
    }

    #[tokio::test]
    async fn test_ping_fails_when_file_removed() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp(&dir).await;
        db.ping().await.unwrap();

        std::fs::remove_file(dir.path().join("test.db")).unwrap();
        let err = db.ping().await.unwrap_err();
        assert_eq!(err.kind(), "unreachable");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_temp(&dir).await;
        db.close().await;
        db.close().await;
        assert_eq!(db.ping().await.unwrap_err().kind(), "unreachable");
    }

    #[tokio::test]
    async fn test_open_rw_missing_file_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let mut config =
            ConnectionConfig::sqlite("rw", dir.path().join("absent.db").to_string_lossy());
        config.mode = SqliteMode::Rw;
        let err = SqliteProvider::open(&config).await.err().unwrap();
        assert_eq!(err.kind(), "unreachable");
    }

    #[test]
    fn test_type_args() {
        assert_eq!(type_args("VARCHAR(255)"), (Some(255), None, None));
        assert_eq!(type_args("decimal(10, 2)"), (None, Some(10), Some(2)));
        assert_eq!(type_args("INTEGER"), (None, None, None));
    }
}
