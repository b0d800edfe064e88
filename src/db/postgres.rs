//! PostgreSQL database provider
//!
//! Concrete implementation using tokio-postgres. Catalog queries read
//! `pg_catalog` directly and cast every column to the Rust type it is
//! fetched as, so row decoding never depends on domain types.

use crate::config::{ConnectionConfig, DbKind, SslMode};
use crate::db::executor::split_table;
use crate::db::models::{
    ActiveConnection, ColumnInfo, DatabaseSize, IndexInfo, SlowQuery, TableInfo, TableStats,
};
use crate::db::types::{BatchResult, CellValue, QueryResult};
use crate::db::{Database, Introspector};
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::AbortHandle;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, Row};

/// First server version whose `pg_stat_statements` has `*_exec_time` columns
const EXEC_TIME_COLUMNS_VERSION: i32 = 130_000;

/// Statements returned by the statistics queries
const STATEMENT_LIMIT: i64 = 20;

const TABLE_STATS_SQL: &str = "\
    SELECT s.relname::text, s.schemaname::text, s.n_live_tup, \
           pg_size_pretty(pg_table_size(s.relid)), \
           pg_size_pretty(pg_indexes_size(s.relid)), \
           pg_size_pretty(pg_total_relation_size(s.relid)), \
           pg_total_relation_size(s.relid), \
           GREATEST(s.last_vacuum, s.last_autovacuum), \
           GREATEST(s.last_analyze, s.last_autoanalyze), \
           COALESCE(s.seq_scan, 0), COALESCE(s.idx_scan, 0), \
           s.n_tup_ins, s.n_tup_upd, s.n_tup_del \
    FROM pg_stat_user_tables s";

/// Which `pg_stat_statements` column orders a statistics read
#[derive(Debug, Clone, Copy)]
pub enum StatementOrder {
    MeanTime,
    TotalTime,
}

/// PostgreSQL database provider
#[derive(Clone)]
pub struct PostgresProvider {
    /// The tokio-postgres client
    client: Arc<Client>,
    /// Token for cancelling in-flight queries
    cancel_token: tokio_postgres::CancelToken,
    /// Background task driving the connection
    connection: AbortHandle,
    /// SSL mode (needed to cancel over the right transport)
    ssl_mode: SslMode,
    /// Deadline for pings
    timeout: Duration,
}

impl PostgresProvider {
    /// Connect to a PostgreSQL database.
    ///
    /// The connection future runs on its own task; losing it is logged and
    /// surfaces as a failed ping.
    pub async fn connect(config: &ConnectionConfig) -> DbResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));

        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.username)
            .application_name("dbpilot")
            .connect_timeout(timeout)
            .ssl_mode(match config.ssl_mode {
                SslMode::Disable => tokio_postgres::config::SslMode::Disable,
                SslMode::Allow | SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
                SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
                    tokio_postgres::config::SslMode::Require
                }
            });
        if let Some(ref password) = config.password {
            pg.password(password);
        }

        let name = config.name.clone();
        let unreachable = |e: tokio_postgres::Error| {
            let message = match e.as_db_error() {
                Some(db) => db.message().to_string(),
                None => e.to_string(),
            };
            DbError::Unreachable(message)
        };

        let (client, connection) = if config.ssl_mode.uses_tls() {
            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_tls_config());
            let (client, connection) = pg.connect(tls).await.map_err(unreachable)?;
            let handle = tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::warn!(connection = %name, error = %e, "PostgreSQL connection lost");
                }
            });
            (client, handle.abort_handle())
        } else {
            let (client, connection) =
                pg.connect(tokio_postgres::NoTls).await.map_err(unreachable)?;
            let handle = tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::warn!(connection = %name, error = %e, "PostgreSQL connection lost");
                }
            });
            (client, handle.abort_handle())
        };

        tracing::info!(connection = %config.name, endpoint = %config.endpoint(), "Connected to PostgreSQL");

        Ok(Self {
            cancel_token: client.cancel_token(),
            client: Arc::new(client),
            connection,
            ssl_mode: config.ssl_mode,
            timeout,
        })
    }

    /// Read `pg_stat_statements`, most expensive first.
    ///
    /// Only statements called more than `min_calls` times are returned.
    pub async fn statement_stats(
        &self,
        min_calls: i64,
        order: StatementOrder,
    ) -> DbResult<Vec<SlowQuery>> {
        let installed: bool = self
            .client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'pg_stat_statements')",
                &[],
            )
            .await
            .and_then(|row| row.try_get(0))?;
        if !installed {
            return Err(DbError::ExtensionMissing("pg_stat_statements".into()));
        }

        let version: i32 = self
            .client
            .query_one("SELECT current_setting('server_version_num')::int", &[])
            .await
            .and_then(|row| row.try_get(0))?;
        let sql = statement_stats_sql(version, order);

        let rows = self
            .client
            .query(sql.as_str(), &[&min_calls, &STATEMENT_LIMIT])
            .await
            .map_err(|e| {
                // Installed but not preloaded still means no statistics
                let err = DbError::from(e);
                if err.to_string().contains("pg_stat_statements") {
                    DbError::ExtensionMissing(format!("pg_stat_statements ({})", err))
                } else {
                    err
                }
            })?;

        rows.iter()
            .map(|row| {
                Ok(SlowQuery {
                    query: get(row, 0)?,
                    calls: get(row, 1)?,
                    total_time_ms: get(row, 2)?,
                    mean_time_ms: get(row, 3)?,
                    min_time_ms: get(row, 4)?,
                    max_time_ms: get(row, 5)?,
                    stddev_time_ms: get(row, 6)?,
                    rows: get(row, 7)?,
                })
            })
            .collect()
    }

    async fn query_stats(&self, table: Option<&str>) -> DbResult<Vec<TableStats>> {
        let rows = match table {
            Some(table) => {
                let (schema, name) = split_table(table);
                let sql = format!(
                    "{} WHERE s.schemaname = COALESCE($1::text, current_schema()) \
                     AND s.relname = $2::text",
                    TABLE_STATS_SQL
                );
                self.client.query(sql.as_str(), &[&schema, &name]).await?
            }
            None => {
                let sql = format!(
                    "{} ORDER BY pg_total_relation_size(s.relid) DESC, s.schemaname, s.relname",
                    TABLE_STATS_SQL
                );
                self.client.query(sql.as_str(), &[]).await?
            }
        };

        rows.iter()
            .map(|row| {
                Ok(TableStats {
                    name: get(row, 0)?,
                    schema: get(row, 1)?,
                    row_count: get(row, 2)?,
                    table_size: get(row, 3)?,
                    index_size: get(row, 4)?,
                    total_size: get(row, 5)?,
                    total_bytes: get(row, 6)?,
                    last_vacuum: get::<Option<DateTime<Utc>>>(row, 7)?,
                    last_analyze: get::<Option<DateTime<Utc>>>(row, 8)?,
                    seq_scan: get(row, 9)?,
                    idx_scan: get(row, 10)?,
                    inserts: get(row, 11)?,
                    updates: get(row, 12)?,
                    deletes: get(row, 13)?,
                })
            })
            .collect()
    }

    /// Run a string holding several statements through the simple protocol.
    ///
    /// Values come back as text; the last statement's rows form the result.
    async fn execute_batch(&self, sql: &str, start: Instant) -> DbResult<QueryResult> {
        use tokio_postgres::SimpleQueryMessage;

        let messages = self.client.simple_query(sql).await?;
        let mut batch = BatchResult::default();

        for message in messages {
            match message {
                SimpleQueryMessage::RowDescription(columns) => {
                    batch.describe(columns.iter().map(|c| c.name().to_string()).collect());
                }
                SimpleQueryMessage::Row(row) => {
                    if !batch.has_columns() {
                        batch.describe(row.columns().iter().map(|c| c.name().to_string()).collect());
                    }
                    let values = (0..row.len())
                        .map(|i| match row.get(i) {
                            Some(v) => CellValue::Text(v.to_string()),
                            None => CellValue::Null,
                        })
                        .collect();
                    batch.push_row(values);
                }
                SimpleQueryMessage::CommandComplete(_) => batch.complete(),
                _ => {}
            }
        }

        batch.finish(start.elapsed())
    }
}

impl Database for PostgresProvider {
    fn kind(&self) -> DbKind {
        DbKind::Postgres
    }

    async fn ping(&self) -> DbResult<()> {
        if self.client.is_closed() {
            return Err(DbError::Unreachable("connection closed".into()));
        }
        match tokio::time::timeout(self.timeout, self.client.simple_query("SELECT 1")).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DbError::Unreachable(e.to_string())),
            Err(_) => Err(DbError::Unreachable(format!(
                "no answer within {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn close(&self) {
        self.connection.abort();
    }

    /// Send a cancel request for the currently running query.
    async fn cancel(&self) -> DbResult<()> {
        let result = if self.ssl_mode.uses_tls() {
            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_tls_config());
            self.cancel_token.cancel_query(tls).await
        } else {
            self.cancel_token.cancel_query(tokio_postgres::NoTls).await
        };
        result.map_err(|e| DbError::Backend(format!("Cancel failed: {}", e)))
    }

    async fn execute_query(&self, sql: &str) -> DbResult<QueryResult> {
        let start = Instant::now();

        if has_multiple_statements(sql) {
            return self.execute_batch(sql, start).await;
        }

        let stmt = self.client.prepare(sql).await?;
        let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();

        let stream = self
            .client
            .query_raw(&stmt, std::iter::empty::<String>())
            .await?;
        futures::pin_mut!(stream);

        let mut rows = Vec::new();
        while let Some(row) = stream.try_next().await? {
            let values = (0..columns.len())
                .map(|i| extract_cell_value(&row, i))
                .collect();
            rows.push(values);
        }

        QueryResult::new(columns, rows, start.elapsed())
    }
}

impl Introspector for PostgresProvider {
    async fn get_all_tables(&self) -> DbResult<Vec<TableInfo>> {
        let rows = self
            .client
            .query(
                "SELECT c.relname::text, n.nspname::text, \
                        CASE c.relkind WHEN 'r' THEN 'table' WHEN 'p' THEN 'table' \
                             WHEN 'v' THEN 'view' WHEN 'm' THEN 'materialized view' \
                             WHEN 'f' THEN 'foreign table' ELSE 'other' END, \
                        COALESCE(obj_description(c.oid, 'pg_class'), '') \
                 FROM pg_class c \
                 JOIN pg_namespace n ON n.oid = c.relnamespace \
                 WHERE c.relkind IN ('r', 'p', 'v', 'm', 'f') \
                   AND n.nspname NOT LIKE 'pg_%' \
                   AND n.nspname != 'information_schema' \
                 ORDER BY n.nspname, c.relname",
                &[],
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(TableInfo {
                    name: get(row, 0)?,
                    schema: get(row, 1)?,
                    kind: get(row, 2)?,
                    description: get(row, 3)?,
                })
            })
            .collect()
    }

    async fn get_table_schema(&self, table: &str) -> DbResult<Vec<ColumnInfo>> {
        let (schema, name) = split_table(table);
        let rows = self
            .client
            .query(
                "SELECT a.attname::text, \
                        format_type(a.atttypid, a.atttypmod), \
                        NOT a.attnotnull, \
                        pg_get_expr(d.adbin, d.adrelid), \
                        CASE WHEN t.typname IN ('varchar', 'bpchar') AND a.atttypmod > 4 \
                             THEN a.atttypmod - 4 END, \
                        CASE WHEN t.typname = 'numeric' AND a.atttypmod > 4 \
                             THEN ((a.atttypmod - 4) >> 16) & 65535 END, \
                        CASE WHEN t.typname = 'numeric' AND a.atttypmod > 4 \
                             THEN (a.atttypmod - 4) & 65535 END, \
                        EXISTS (SELECT 1 FROM pg_constraint con WHERE con.conrelid = c.oid \
                                AND con.contype = 'p' AND a.attnum = ANY (con.conkey)), \
                        EXISTS (SELECT 1 FROM pg_constraint con WHERE con.conrelid = c.oid \
                                AND con.contype = 'f' AND a.attnum = ANY (con.conkey)), \
                        COALESCE(col_description(c.oid, a.attnum), '') \
                 FROM pg_attribute a \
                 JOIN pg_class c ON c.oid = a.attrelid \
                 JOIN pg_namespace n ON n.oid = c.relnamespace \
                 JOIN pg_type t ON t.oid = a.atttypid \
                 LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
                 WHERE n.nspname = COALESCE($1::text, current_schema()) \
                   AND c.relname = $2::text \
                   AND a.attnum > 0 AND NOT a.attisdropped \
                 ORDER BY a.attnum",
                &[&schema, &name],
            )
            .await?;

        if rows.is_empty() {
            return Err(DbError::Backend(format!(
                "relation \"{}\" does not exist",
                table
            )));
        }

        rows.iter()
            .map(|row| {
                Ok(ColumnInfo {
                    name: get(row, 0)?,
                    data_type: get(row, 1)?,
                    nullable: get(row, 2)?,
                    default_value: get(row, 3)?,
                    max_length: get(row, 4)?,
                    precision: get(row, 5)?,
                    scale: get(row, 6)?,
                    is_primary_key: get(row, 7)?,
                    is_foreign_key: get(row, 8)?,
                    description: get(row, 9)?,
                })
            })
            .collect()
    }

    async fn get_table_indexes(&self, table: &str) -> DbResult<Vec<IndexInfo>> {
        let (schema, name) = split_table(table);
        let rows = self
            .client
            .query(
                "SELECT ci.relname::text, ix.indisunique, ix.indisprimary, \
                        array_agg(COALESCE(a.attname::text, '<expression>') ORDER BY k.ord), \
                        am.amname::text, \
                        COALESCE(ts.spcname::text, ''), \
                        COALESCE(obj_description(ci.oid, 'pg_class'), '') \
                 FROM pg_index ix \
                 JOIN pg_class ci ON ci.oid = ix.indexrelid \
                 JOIN pg_class ct ON ct.oid = ix.indrelid \
                 JOIN pg_namespace n ON n.oid = ct.relnamespace \
                 JOIN pg_am am ON am.oid = ci.relam \
                 LEFT JOIN pg_tablespace ts ON ts.oid = ci.reltablespace \
                 JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) ON true \
                 LEFT JOIN pg_attribute a ON a.attrelid = ct.oid AND a.attnum = k.attnum \
                 WHERE n.nspname = COALESCE($1::text, current_schema()) \
                   AND ct.relname = $2::text \
                 GROUP BY ci.oid, ci.relname, ix.indisunique, ix.indisprimary, \
                          am.amname, ts.spcname \
                 ORDER BY ci.relname",
                &[&schema, &name],
            )
            .await?;

        rows.iter()
            .map(|row| {
                let index_type: String = get(row, 4)?;
                Ok(IndexInfo {
                    name: get(row, 0)?,
                    is_unique: get(row, 1)?,
                    is_primary: get(row, 2)?,
                    columns: get(row, 3)?,
                    index_type: if index_type.is_empty() {
                        "btree".to_string()
                    } else {
                        index_type
                    },
                    tablespace: get(row, 5)?,
                    description: get(row, 6)?,
                })
            })
            .collect()
    }

    async fn get_table_stats(&self, table: &str) -> DbResult<TableStats> {
        self.query_stats(Some(table))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DbError::Backend(format!("relation \"{}\" does not exist", table)))
    }

    async fn get_table_sizes(&self) -> DbResult<Vec<TableStats>> {
        self.query_stats(None).await
    }

    async fn get_database_size(&self) -> DbResult<DatabaseSize> {
        let row = self
            .client
            .query_one(
                "SELECT current_database()::text, \
                        pg_size_pretty(pg_database_size(current_database())), \
                        pg_database_size(current_database())",
                &[],
            )
            .await?;
        Ok(DatabaseSize {
            database: get(&row, 0)?,
            size: get(&row, 1)?,
            size_bytes: get(&row, 2)?,
        })
    }

    async fn get_active_connections(&self) -> DbResult<Vec<ActiveConnection>> {
        let rows = self
            .client
            .query(
                "SELECT pid, COALESCE(usename::text, ''), COALESCE(datname::text, ''), \
                        COALESCE(host(client_addr), 'local'), COALESCE(state, ''), \
                        COALESCE(left(query, 200), ''), \
                        COALESCE(date_trunc('second', now() - query_start)::text, '') \
                 FROM pg_stat_activity \
                 WHERE datname = current_database() \
                 ORDER BY query_start NULLS LAST",
                &[],
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(ActiveConnection {
                    pid: get::<i32>(row, 0)? as i64,
                    user: get(row, 1)?,
                    database: get(row, 2)?,
                    client_addr: get(row, 3)?,
                    state: get(row, 4)?,
                    query: get(row, 5)?,
                    duration: get(row, 6)?,
                })
            })
            .collect()
    }

    async fn get_slow_queries(&self) -> DbResult<Vec<SlowQuery>> {
        self.statement_stats(0, StatementOrder::MeanTime).await
    }

    async fn object_counts(&self) -> DbResult<(i64, i64)> {
        let row = self
            .client
            .query_one(
                "SELECT \
                   (SELECT count(*) FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
                    WHERE c.relkind IN ('r', 'p') AND n.nspname NOT LIKE 'pg_%' \
                      AND n.nspname != 'information_schema'), \
                   (SELECT count(*) FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
                    WHERE c.relkind = 'i' AND n.nspname NOT LIKE 'pg_%' \
                      AND n.nspname != 'information_schema')",
                &[],
            )
            .await?;
        Ok((get(&row, 0)?, get(&row, 1)?))
    }
}

/// Build the `pg_stat_statements` read for a server version
fn statement_stats_sql(server_version: i32, order: StatementOrder) -> String {
    let suffix = if server_version >= EXEC_TIME_COLUMNS_VERSION {
        "_exec_time"
    } else {
        "_time"
    };
    let order_by = match order {
        StatementOrder::MeanTime => format!("mean{}", suffix),
        StatementOrder::TotalTime => format!("total{}", suffix),
    };
    format!(
        "SELECT query, calls, total{s}::float8, mean{s}::float8, min{s}::float8, \
                max{s}::float8, stddev{s}::float8, rows \
         FROM pg_stat_statements \
         WHERE calls > $1 AND query NOT ILIKE '%pg_stat_statements%' \
         ORDER BY {order_by} DESC \
         LIMIT $2",
        s = suffix,
    )
}

/// Whether `sql` holds more than one statement (a `;` before the end).
///
/// Semicolons inside quotes, dollar quotes and comments do not count.
fn has_multiple_statements(sql: &str) -> bool {
    let body = sql.trim().trim_end_matches(';');
    let mut chars = body.chars().peekable();
    let mut quote: Option<char> = None;
    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                // Dollar quotes are rare in ad-hoc SQL; treat them as opaque
                '$' if chars.peek() == Some(&'$') => return false,
                '-' if chars.peek() == Some(&'-') => {
                    for n in chars.by_ref() {
                        if n == '\n' {
                            break;
                        }
                    }
                }
                ';' => return true,
                _ => {}
            },
        }
    }
    false
}

/// Fetch a column with a typed error instead of a panic
fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> DbResult<T> {
    row.try_get(idx).map_err(DbError::from)
}

/// Build a rustls ClientConfig that trusts OS certificates (with Mozilla roots as fallback)
fn make_tls_config() -> rustls::ClientConfig {
    let mut root_store = rustls::RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    let mut loaded = 0;
    for cert in native_certs.certs {
        if root_store.add(cert).is_ok() {
            loaded += 1;
        }
    }
    if loaded == 0 {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// Decode one cell by its column type.
///
/// Byte columns decode as UTF-8 text, date/time values as ISO-8601 and
/// anything without a Rust mapping falls back to its text form.
fn extract_cell_value(row: &Row, idx: usize) -> CellValue {
    let ty = match row.columns().get(idx) {
        Some(col) => col.type_().clone(),
        None => return CellValue::Null,
    };

    macro_rules! typed {
        ($t:ty, $wrap:expr) => {
            match row.try_get::<_, Option<$t>>(idx) {
                Ok(Some(v)) => $wrap(v),
                Ok(None) => CellValue::Null,
                Err(_) => try_as_string(row, idx),
            }
        };
    }

    match ty {
        Type::INT2 => typed!(i16, |v| CellValue::Integer(v as i64)),
        Type::INT4 => typed!(i32, |v| CellValue::Integer(v as i64)),
        Type::INT8 => typed!(i64, CellValue::Integer),
        Type::OID => typed!(u32, |v| CellValue::Integer(v as i64)),
        Type::FLOAT4 => typed!(f32, |v| CellValue::Float(v as f64)),
        Type::FLOAT8 => typed!(f64, CellValue::Float),
        Type::NUMERIC => typed!(Decimal, |v: Decimal| match v.to_f64() {
            Some(f) if v.scale() > 0 => CellValue::Float(f),
            _ => match v.to_i64() {
                Some(i) => CellValue::Integer(i),
                None => CellValue::Text(v.to_string()),
            },
        }),
        Type::BOOL => typed!(bool, CellValue::Boolean),
        Type::JSON | Type::JSONB => typed!(serde_json::Value, CellValue::Json),
        Type::BYTEA => typed!(Vec<u8>, |v: Vec<u8>| CellValue::from_bytes(&v)),
        Type::UUID => typed!(uuid::Uuid, |v: uuid::Uuid| CellValue::Uuid(v.to_string())),
        Type::TIMESTAMPTZ => typed!(DateTime<Utc>, |v: DateTime<Utc>| {
            CellValue::DateTime(v.to_rfc3339())
        }),
        Type::TIMESTAMP => typed!(chrono::NaiveDateTime, |v: chrono::NaiveDateTime| {
            CellValue::DateTime(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }),
        Type::DATE => typed!(chrono::NaiveDate, |v: chrono::NaiveDate| {
            CellValue::DateTime(v.to_string())
        }),
        Type::TIME => typed!(chrono::NaiveTime, |v: chrono::NaiveTime| {
            CellValue::DateTime(v.to_string())
        }),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::NAME_ARRAY | Type::BPCHAR_ARRAY => {
            typed!(Vec<Option<String>>, |v: Vec<Option<String>>| {
                CellValue::Array(
                    v.into_iter()
                        .map(|s| s.map_or(CellValue::Null, CellValue::Text))
                        .collect(),
                )
            })
        }
        Type::INT2_ARRAY => typed!(Vec<Option<i16>>, |v: Vec<Option<i16>>| {
            CellValue::Array(
                v.into_iter()
                    .map(|n| n.map_or(CellValue::Null, |n| CellValue::Integer(n as i64)))
                    .collect(),
            )
        }),
        Type::INT4_ARRAY => typed!(Vec<Option<i32>>, |v: Vec<Option<i32>>| {
            CellValue::Array(
                v.into_iter()
                    .map(|n| n.map_or(CellValue::Null, |n| CellValue::Integer(n as i64)))
                    .collect(),
            )
        }),
        Type::INT8_ARRAY => typed!(Vec<Option<i64>>, |v: Vec<Option<i64>>| {
            CellValue::Array(
                v.into_iter()
                    .map(|n| n.map_or(CellValue::Null, CellValue::Integer))
                    .collect(),
            )
        }),
        Type::FLOAT8_ARRAY => typed!(Vec<Option<f64>>, |v: Vec<Option<f64>>| {
            CellValue::Array(
                v.into_iter()
                    .map(|n| n.map_or(CellValue::Null, CellValue::Float))
                    .collect(),
            )
        }),
        Type::BOOL_ARRAY => typed!(Vec<Option<bool>>, |v: Vec<Option<bool>>| {
            CellValue::Array(
                v.into_iter()
                    .map(|b| b.map_or(CellValue::Null, CellValue::Boolean))
                    .collect(),
            )
        }),
        Type::UUID_ARRAY => typed!(Vec<Option<uuid::Uuid>>, |v: Vec<Option<uuid::Uuid>>| {
            CellValue::Array(
                v.into_iter()
                    .map(|u| u.map_or(CellValue::Null, |u| CellValue::Uuid(u.to_string())))
                    .collect(),
            )
        }),
        // Text types and fallback for unknown types
        _ => try_as_string(row, idx),
    }
}

/// Try to extract a value as a string (fallback for type mismatches).
///
/// When even the string fallback fails, includes the postgres type name
/// in the message so the user knows what type couldn't be displayed.
fn try_as_string(row: &Row, idx: usize) -> CellValue {
    match row.try_get::<_, Option<String>>(idx) {
        Ok(Some(v)) => CellValue::Text(v),
        Ok(None) => CellValue::Null,
        Err(_) => {
            let type_name = row
                .columns()
                .get(idx)
                .map_or("unknown", |c| c.type_().name());
            CellValue::Text(format!("<unable to display: {}>", type_name))
        }
    }
}
