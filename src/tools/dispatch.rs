//! JSON tool dispatch
//!
//! Turns `(tool name, JSON arguments)` into a JSON reply: `{"result": ...}`
//! on success, `{"error": ..., "kind": ...}` on failure, with a partial
//! `result` where one makes sense. Risky calls can be parked until the user
//! approves or rejects them.

use crate::db::is_read_only_statement;
use crate::error::{DbError, DbResult};
use crate::tools::facade::DatabaseTools;
use crate::tools::schema::find_tool;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::Mutex;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableArgs {
    table_name: String,
}

#[derive(Deserialize)]
struct SqlArgs {
    sql: String,
}

#[derive(Deserialize)]
struct QueryArgs {
    query: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DuplicateArgs {
    table_name: String,
    columns: Vec<String>,
}

fn parse<T: DeserializeOwned>(tool: &str, args: &Value) -> DbResult<T> {
    serde_json::from_value(args.clone())
        .map_err(|e| DbError::InvalidArgument(format!("{}: {}", tool, e)))
}

fn to_json<T: Serialize>(value: T) -> DbResult<Value> {
    serde_json::to_value(value).map_err(|e| DbError::Backend(e.to_string()))
}

/// The reply for a failed call
pub fn error_payload(err: &DbError) -> Value {
    let mut payload = json!({
        "error": err.to_string(),
        "kind": err.kind(),
    });
    // Statistics tools degrade to an empty list
    if matches!(err, DbError::ExtensionMissing(_)) {
        payload["result"] = json!([]);
    }
    payload
}

impl DatabaseTools {
    /// Run tool `name` with JSON `args` and wrap the outcome as JSON
    pub async fn call_tool(&self, name: &str, args: &Value) -> Value {
        let start = Instant::now();
        let outcome = self.invoke(name, args).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                tracing::info!(tool = name, elapsed_ms, "Tool call succeeded");
                json!({ "result": result })
            }
            Err(e) => {
                tracing::info!(tool = name, elapsed_ms, kind = e.kind(), error = %e, "Tool call failed");
                error_payload(&e)
            }
        }
    }

    /// Like [`call_tool`](Self::call_tool) with arguments still encoded as a
    /// JSON string, the way LLM APIs deliver them
    pub async fn call_tool_str(&self, name: &str, args: &str) -> Value {
        let args = if args.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(args) {
                Ok(v) => v,
                Err(e) => {
                    return error_payload(&DbError::InvalidArgument(format!(
                        "{}: arguments are not valid JSON: {}",
                        name, e
                    )));
                }
            }
        };
        self.call_tool(name, &args).await
    }

    async fn invoke(&self, name: &str, args: &Value) -> DbResult<Value> {
        match name {
            "execute_sql" => {
                let a: SqlArgs = parse(name, args)?;
                to_json(self.execute_sql(&a.sql).await?)
            }
            "get_all_tables" => to_json(self.get_all_tables().await?),
            "get_table_schema" => {
                let a: TableArgs = parse(name, args)?;
                to_json(self.get_table_schema(&a.table_name).await?)
            }
            "explain_query" => {
                let a: SqlArgs = parse(name, args)?;
                to_json(self.explain_query(&a.sql).await?)
            }
            "get_table_indexes" => {
                let a: TableArgs = parse(name, args)?;
                to_json(self.get_table_indexes(&a.table_name).await?)
            }
            "get_table_stats" => {
                let a: TableArgs = parse(name, args)?;
                to_json(self.get_table_stats(&a.table_name).await?)
            }
            "find_duplicate_data" => {
                let a: DuplicateArgs = parse(name, args)?;
                to_json(self.find_duplicate_data(&a.table_name, &a.columns).await?)
            }
            "get_slow_queries" => to_json(self.get_slow_queries().await?),
            "get_database_size" => to_json(self.get_database_size().await?),
            "get_table_sizes" => to_json(self.get_table_sizes().await?),
            "get_active_connections" => to_json(self.get_active_connections().await?),
            "analyze_query_performance" => {
                let a: QueryArgs = parse(name, args)?;
                to_json(self.analyze_query_performance(&a.query).await?)
            }
            "suggest_indexes" => {
                let a: TableArgs = parse(name, args)?;
                to_json(self.suggest_indexes(&a.table_name).await?)
            }
            "get_query_patterns" => to_json(self.get_query_patterns().await?),
            "optimize_query" => {
                let a: QueryArgs = parse(name, args)?;
                to_json(self.optimize_query(&a.query).await?)
            }
            "analyze_table_performance" => {
                let a: TableArgs = parse(name, args)?;
                to_json(self.analyze_table_performance(&a.table_name).await?)
            }
            other => Err(DbError::InvalidArgument(format!("unknown tool: {}", other))),
        }
    }
}

/// A tool call as selected by the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    /// Risky tools need approval unless the statement only reads
    pub fn needs_confirmation(&self) -> bool {
        if !find_tool(&self.name).is_some_and(|t| t.risky) {
            return false;
        }
        let sql = self.arguments.get("sql").and_then(Value::as_str);
        !sql.is_some_and(is_read_only_statement)
    }
}

/// What happened to a submitted call
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Ran immediately
    Completed(Value),
    /// Parked until [`ToolDispatcher::approve`] or [`ToolDispatcher::reject`]
    AwaitingApproval(ToolCall),
}

struct Parked<C> {
    call: ToolCall,
    context: C,
}

/// Runs tool calls, holding risky ones back until the user decides.
///
/// `C` is whatever the caller needs to resume its conversation (message
/// history, output sink); it is handed back untouched on approve or reject.
pub struct ToolDispatcher<C> {
    tools: DatabaseTools,
    parked: Mutex<HashMap<String, Parked<C>>>,
}

impl<C> ToolDispatcher<C> {
    pub fn new(tools: DatabaseTools) -> Self {
        Self {
            tools,
            parked: Mutex::new(HashMap::new()),
        }
    }

    pub fn tools(&self) -> &DatabaseTools {
        &self.tools
    }

    pub async fn submit(&self, call: ToolCall, context: C) -> Submission {
        if call.needs_confirmation() {
            tracing::info!(id = %call.id, tool = %call.name, "Tool call awaiting approval");
            let pending = call.clone();
            self.parked
                .lock()
                .await
                .insert(call.id.clone(), Parked { call, context });
            return Submission::AwaitingApproval(pending);
        }
        Submission::Completed(self.tools.call_tool(&call.name, &call.arguments).await)
    }

    /// Run a parked call and hand back its context with the reply
    pub async fn approve(&self, id: &str) -> DbResult<(C, Value)> {
        let parked = self.take(id).await?;
        tracing::info!(id, tool = %parked.call.name, "Tool call approved");
        let reply = self
            .tools
            .call_tool(&parked.call.name, &parked.call.arguments)
            .await;
        Ok((parked.context, reply))
    }

    /// Drop a parked call; the reply tells the LLM the user declined
    pub async fn reject(&self, id: &str) -> DbResult<(C, Value)> {
        let parked = self.take(id).await?;
        tracing::info!(id, tool = %parked.call.name, "Tool call rejected");
        Ok((
            parked.context,
            json!({ "error": "the user declined to run this tool call", "kind": "rejected" }),
        ))
    }

    /// Calls waiting for a decision
    pub async fn pending(&self) -> Vec<ToolCall> {
        let parked = self.parked.lock().await;
        let mut calls: Vec<ToolCall> = parked.values().map(|p| p.call.clone()).collect();
        calls.sort_by(|a, b| a.id.cmp(&b.id));
        calls
    }

    async fn take(&self, id: &str) -> DbResult<Parked<C>> {
        self.parked
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| DbError::InvalidArgument(format!("no pending tool call with id {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::registry::ConnectionRegistry;
    use std::sync::Arc;
    use std::time::Duration;

    async fn sqlite_tools(dir: &tempfile::TempDir) -> DatabaseTools {
        let registry = Arc::new(ConnectionRegistry::in_memory());
        let path = dir.path().join("dispatch.db");
        registry
            .add(ConnectionConfig::sqlite("local", path.to_string_lossy()))
            .await
            .unwrap();
        DatabaseTools::new(registry, Duration::from_secs(5))
    }

    fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
        ToolCall { id: id.into(), name: name.into(), arguments }
    }

    #[test]
    fn test_confirmation_rules() {
        assert!(call("1", "execute_sql", json!({"sql": "DELETE FROM t"})).needs_confirmation());
        assert!(!call("2", "execute_sql", json!({"sql": "SELECT 1"})).needs_confirmation());
        assert!(call("3", "execute_sql", json!({})).needs_confirmation());
        assert!(!call("4", "get_all_tables", Value::Null).needs_confirmation());
    }

    #[tokio::test]
    async fn test_trailing_write_is_held_for_approval() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher: ToolDispatcher<()> = ToolDispatcher::new(sqlite_tools(&dir).await);
        dispatcher
            .tools()
            .execute_sql("CREATE TABLE t (a INTEGER)")
            .await
            .unwrap();

        for (id, sql) in [
            ("c1", "SELECT 1;\nDROP\tTABLE t"),
            ("c2", "WITH d AS (DELETE\nFROM t RETURNING 1) SELECT * FROM d"),
        ] {
            let outcome = dispatcher.submit(call(id, "execute_sql", json!({"sql": sql})), ()).await;
            assert!(matches!(outcome, Submission::AwaitingApproval(ref c) if c.id == id));
        }
        assert_eq!(dispatcher.pending().await.len(), 2);

        let tables = dispatcher.tools().get_all_tables().await.unwrap();
        assert!(tables.iter().any(|t| t.name == "t"));
    }

    #[test]
    fn test_extension_missing_payload_has_empty_result() {
        let payload = error_payload(&DbError::ExtensionMissing("pg_stat_statements".into()));
        assert_eq!(payload["kind"], "extension-missing");
        assert_eq!(payload["result"], json!([]));

        let payload = error_payload(&DbError::NoCurrent);
        assert_eq!(payload["error"], "no active database connection");
        assert!(payload.get("result").is_none());
    }

    #[tokio::test]
    async fn test_call_tool_round() {
        let dir = tempfile::tempdir().unwrap();
        let tools = sqlite_tools(&dir).await;

        let reply = tools
            .call_tool("execute_sql", &json!({"sql": "CREATE TABLE t (a TEXT)"}))
            .await;
        assert!(reply.get("error").is_none(), "{reply}");

        let reply = tools.call_tool_str("get_table_schema", r#"{"tableName": "t"}"#).await;
        assert_eq!(reply["result"][0]["name"], "a");
        assert_eq!(reply["result"][0]["type"], "TEXT");
    }

    #[tokio::test]
    async fn test_call_tool_errors() {
        let dir = tempfile::tempdir().unwrap();
        let tools = sqlite_tools(&dir).await;

        let reply = tools.call_tool("drop_database", &Value::Null).await;
        assert_eq!(reply["kind"], "invalid-argument");

        let reply = tools.call_tool("get_table_schema", &json!({"table": "t"})).await;
        assert_eq!(reply["kind"], "invalid-argument");

        let reply = tools
            .call_tool("find_duplicate_data", &json!({"tableName": "t", "columns": []}))
            .await;
        assert_eq!(reply["kind"], "invalid-argument");

        let reply = tools.call_tool_str("get_all_tables", "{not json").await;
        assert_eq!(reply["kind"], "invalid-argument");

        let reply = tools.call_tool("execute_sql", &json!({"sql": "SELEC 1"})).await;
        assert_eq!(reply["kind"], "backend");
    }

    #[tokio::test]
    async fn test_parked_call_approve_and_reject() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher: ToolDispatcher<Vec<String>> = ToolDispatcher::new(sqlite_tools(&dir).await);

        let read = dispatcher
            .submit(call("r", "execute_sql", json!({"sql": "SELECT 1 AS one"})), vec![])
            .await;
        assert!(matches!(read, Submission::Completed(ref v) if v["result"]["rowCount"] == 1));

        let write = call("w1", "execute_sql", json!({"sql": "CREATE TABLE x (a INTEGER)"}));
        let outcome = dispatcher.submit(write, vec!["history".into()]).await;
        assert!(matches!(outcome, Submission::AwaitingApproval(ref c) if c.id == "w1"));
        assert_eq!(dispatcher.pending().await.len(), 1);

        let (context, reply) = dispatcher.approve("w1").await.unwrap();
        assert_eq!(context, vec!["history"]);
        assert!(reply.get("error").is_none());
        assert!(dispatcher.pending().await.is_empty());

        let drop = call("w2", "execute_sql", json!({"sql": "DROP TABLE x"}));
        dispatcher.submit(drop, vec![]).await;
        let (_, reply) = dispatcher.reject("w2").await.unwrap();
        assert_eq!(reply["kind"], "rejected");
        assert_eq!(dispatcher.approve("w2").await.unwrap_err().kind(), "invalid-argument");

        let tables = dispatcher.tools().get_all_tables().await.unwrap();
        assert_eq!(tables.len(), 1);
    }
}
