//! Tool facade and JSON dispatch against SQLite files

use crate::common::{registry_in, sqlite_db, tools_for};
use dbpilot::db::CellValue;
use dbpilot::error::DbError;
use dbpilot::optimizer::{Priority, SuggestionKind};
use dbpilot::registry::ConnectionStatus;
use serde_json::json;
use tempfile::TempDir;

const SHOP: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        email TEXT NOT NULL,
        name TEXT
    );
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id),
        total REAL,
        status TEXT,
        created_at DATETIME
    );
    CREATE VIEW big_orders AS SELECT * FROM orders WHERE total > 100;
    INSERT INTO users (email, name) VALUES
        ('alice@x', 'Alice'), ('alice@x', 'Alice B'), ('bob@x', 'Bob');
    INSERT INTO orders (user_id, total, status, created_at) VALUES
        (1, 50.0, 'new', '2024-01-01'), (3, 150.0, 'paid', '2024-01-02');
";

#[tokio::test]
async fn test_find_duplicate_data() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    registry.add(sqlite_db(&dir, "shop", SHOP)).await.unwrap();
    let tools = tools_for(&registry);

    let result = tools
        .find_duplicate_data("users", &["email".to_string()])
        .await
        .unwrap();

    assert_eq!(result.columns, vec!["email", "duplicate_count"]);
    assert_eq!(result.row_count, 1);
    assert_eq!(
        result.rows[0],
        vec![CellValue::Text("alice@x".into()), CellValue::Integer(2)]
    );
    assert!(
        !result
            .rows
            .iter()
            .any(|r| r[0] == CellValue::Text("bob@x".into()))
    );
}

#[tokio::test]
async fn test_find_duplicate_data_rejects_bad_identifiers() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    registry.add(sqlite_db(&dir, "shop", SHOP)).await.unwrap();
    let tools = tools_for(&registry);

    let err = tools
        .find_duplicate_data("users; DROP TABLE users", &["email".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid-argument");

    let err = tools.find_duplicate_data("users", &[]).await.unwrap_err();
    assert_eq!(err.kind(), "invalid-argument");
}

#[tokio::test]
async fn test_optimize_query_static_rules() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    registry.add(sqlite_db(&dir, "shop", SHOP)).await.unwrap();
    let tools = tools_for(&registry);

    let suggestions = tools
        .optimize_query("SELECT * FROM t WHERE UPPER(name)='X'")
        .await
        .unwrap();
    assert!(suggestions.len() >= 2);

    let star = suggestions
        .iter()
        .find(|s| s.description == "Avoid SELECT *")
        .unwrap();
    assert_eq!(star.priority, Priority::Low);
    assert_eq!(star.kind, SuggestionKind::Rewrite);

    let func = suggestions
        .iter()
        .find(|s| s.description == "Function applied to a column in WHERE")
        .unwrap();
    assert_eq!(func.priority, Priority::High);
    assert_eq!(func.kind, SuggestionKind::Rewrite);
}

#[tokio::test]
async fn test_introspection_through_tools() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    registry.add(sqlite_db(&dir, "shop", SHOP)).await.unwrap();
    let tools = tools_for(&registry);

    let tables = tools.get_all_tables().await.unwrap();
    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains(&"users"));
    assert!(names.contains(&"orders"));
    let view = tables.iter().find(|t| t.name == "big_orders").unwrap();
    assert_eq!(view.kind, "view");

    let columns = tools.get_table_schema("orders").await.unwrap();
    let ordered: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(ordered, vec!["id", "user_id", "total", "status", "created_at"]);
    assert!(columns[0].is_primary_key);
    assert!(columns[1].is_foreign_key);
    assert!(!columns[1].nullable);

    let stats = tools.get_table_stats("users").await.unwrap();
    assert_eq!(stats.row_count, 3);

    let sizes = tools.get_table_sizes().await.unwrap();
    assert!(sizes.iter().any(|s| s.name == "orders" && s.row_count == 2));
    assert!(!sizes.iter().any(|s| s.name == "big_orders"));

    let size = tools.get_database_size().await.unwrap();
    assert!(size.size_bytes > 0);

    assert!(tools.get_slow_queries().await.unwrap().is_empty());
    assert_eq!(tools.get_active_connections().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_suggest_indexes_and_table_analysis() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    registry.add(sqlite_db(&dir, "shop", SHOP)).await.unwrap();
    let tools = tools_for(&registry);

    let suggestions = tools.suggest_indexes("orders").await.unwrap();
    let fk = suggestions
        .iter()
        .find(|s| s.name == "idx_orders_user_id")
        .unwrap();
    assert_eq!(fk.columns, vec!["user_id"]);
    assert_eq!(fk.index_type, "btree");
    assert_eq!(fk.table, "orders");

    tools
        .execute_sql("CREATE INDEX idx_orders_user_id ON orders (user_id)")
        .await
        .unwrap();
    let indexes = tools.get_table_indexes("orders").await.unwrap();
    assert!(indexes.iter().any(|i| i.columns == vec!["user_id"]));
    let again = tools.suggest_indexes("orders").await.unwrap();
    assert!(!again.iter().any(|s| s.name == "idx_orders_user_id"));

    let analysis = tools.analyze_table_performance("orders").await.unwrap();
    assert!(analysis.overall_score <= 100);
    assert_eq!(analysis.table_stats.unwrap().row_count, 2);
}

#[tokio::test]
async fn test_analyze_query_performance_flags_full_scan() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    registry.add(sqlite_db(&dir, "shop", SHOP)).await.unwrap();
    let tools = tools_for(&registry);

    let analysis = tools
        .analyze_query_performance("SELECT id FROM orders WHERE status = 'new'")
        .await
        .unwrap();
    assert!(analysis.bottlenecks.iter().any(|b| b.contains("orders")));
    assert!(analysis.overall_score < 100);
    assert_eq!(analysis.table_count, 2);
}

#[tokio::test]
async fn test_query_result_invariants() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    registry.add(sqlite_db(&dir, "shop", SHOP)).await.unwrap();
    let tools = tools_for(&registry);

    let result = tools
        .execute_sql("SELECT id, email, name FROM users ORDER BY id")
        .await
        .unwrap();
    assert_eq!(result.row_count, result.rows.len());
    assert!(result.rows.iter().all(|r| r.len() == result.columns.len()));
    assert!(!result.duration.is_empty());

    let err = tools.execute_sql("SELECT * FROM nope").await.unwrap_err();
    assert_eq!(err.kind(), "backend");
    assert!(err.to_string().contains("nope"));
}

#[tokio::test]
async fn test_json_dispatch() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    registry.add(sqlite_db(&dir, "shop", SHOP)).await.unwrap();
    let tools = tools_for(&registry);

    let reply = tools
        .call_tool_str("execute_sql", r#"{"sql": "SELECT 1 AS one"}"#)
        .await;
    assert_eq!(reply["result"]["columns"], json!(["one"]));
    assert_eq!(reply["result"]["rowCount"], 1);

    let reply = tools
        .call_tool("get_table_schema", &json!({"tableName": "users"}))
        .await;
    assert_eq!(reply["result"][1]["name"], "email");
    assert_eq!(reply["result"][1]["type"], "TEXT");

    let reply = tools.call_tool("get_table_schema", &json!({})).await;
    assert_eq!(reply["kind"], "invalid-argument");

    let reply = tools.call_tool("drop_everything", &json!({})).await;
    assert_eq!(reply["kind"], "invalid-argument");
}

#[tokio::test]
async fn test_dead_current_connection_is_unreachable() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    registry.add(sqlite_db(&dir, "a", SHOP)).await.unwrap();
    registry.add(sqlite_db(&dir, "b", SHOP)).await.unwrap();
    registry.switch("b").await.unwrap();
    let tools = tools_for(&registry);

    std::fs::remove_file(dir.path().join("b.db")).unwrap();

    let err = tools.get_all_tables().await.unwrap_err();
    assert_eq!(err.kind(), "unreachable");

    let status = registry.status().await;
    assert_eq!(status["b"], ConnectionStatus::Unhealthy);
    assert_eq!(status["a"], ConnectionStatus::Connected);

    // The other connection still works once selected
    registry.switch("a").await.unwrap();
    assert!(tools.get_all_tables().await.is_ok());
}

#[tokio::test]
async fn test_no_current_connection() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    let tools = tools_for(&registry);

    assert_eq!(tools.get_all_tables().await.unwrap_err(), DbError::NoCurrent);
    let reply = tools.call_tool("get_all_tables", &json!({})).await;
    assert_eq!(reply["error"], "no active database connection");
    assert_eq!(reply["kind"], "no-current");
}
