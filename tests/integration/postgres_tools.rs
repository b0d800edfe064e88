//! Tool facade against a live PostgreSQL server
//!
//! Every test returns early when no server is reachable.

use crate::common::{TEST_DEADLINE, postgres_config, postgres_tools};
use dbpilot::db::CellValue;
use dbpilot::error::DbError;
use dbpilot::registry::ConnectionRegistry;
use dbpilot::tools::DatabaseTools;
use serde_json::json;
use std::sync::Arc;

/// Fresh `schema` holding `users` and `orders(user_id REFERENCES users)`
async fn create_shop(tools: &DatabaseTools, schema: &str) {
    let script = [
        format!("DROP SCHEMA IF EXISTS {schema} CASCADE"),
        format!("CREATE SCHEMA {schema}"),
        format!("CREATE TABLE {schema}.users (id SERIAL PRIMARY KEY, email TEXT NOT NULL)"),
        format!(
            "CREATE TABLE {schema}.orders (id SERIAL PRIMARY KEY, \
             user_id INTEGER NOT NULL REFERENCES {schema}.users(id), total NUMERIC(10,2))"
        ),
        format!("INSERT INTO {schema}.users (email) VALUES ('alice@x'), ('alice@x'), ('bob@x')"),
    ];
    for statement in &script {
        tools.execute_sql(statement).await.unwrap();
    }
}

async fn drop_shop(tools: &DatabaseTools, schema: &str) {
    let _ = tools
        .execute_sql(&format!("DROP SCHEMA IF EXISTS {schema} CASCADE"))
        .await;
}

#[tokio::test]
async fn test_add_and_select_one() {
    let Some(tools) = postgres_tools().await else {
        return;
    };

    let result = tools.execute_sql("SELECT 1").await.unwrap();
    assert_eq!(result.columns, vec!["?column?"]);
    assert_eq!(result.rows, vec![vec![CellValue::Integer(1)]]);
    assert_eq!(result.row_count, 1);
    assert!(!result.duration.is_empty());
}

#[tokio::test]
async fn test_foreign_key_without_index() {
    let Some(tools) = postgres_tools().await else {
        return;
    };
    create_shop(&tools, "dbpilot_it_fk").await;

    let suggestions = tools.suggest_indexes("dbpilot_it_fk.orders").await.unwrap();
    let fk = suggestions
        .iter()
        .find(|s| s.name == "idx_orders_user_id")
        .unwrap();
    assert!(fk.table.ends_with("orders"));
    assert_eq!(fk.columns, vec!["user_id"]);
    assert_eq!(fk.index_type, "btree");
    assert!(fk.create_statement.contains("CONCURRENTLY"));

    let duplicates = tools
        .find_duplicate_data("dbpilot_it_fk.users", &["email".to_string()])
        .await
        .unwrap();
    assert_eq!(duplicates.rows.len(), 1);
    assert_eq!(duplicates.rows[0][0], CellValue::Text("alice@x".into()));

    drop_shop(&tools, "dbpilot_it_fk").await;
}

#[tokio::test]
async fn test_query_patterns_without_extension() {
    let Some(tools) = postgres_tools().await else {
        return;
    };

    match tools.get_query_patterns().await {
        Ok(patterns) => {
            eprintln!(
                "pg_stat_statements is installed; {} patterns found",
                patterns.len()
            );
        }
        Err(e) => {
            assert!(matches!(e, DbError::ExtensionMissing(_)));
            let reply = tools.call_tool("get_query_patterns", &json!({})).await;
            assert_eq!(reply["kind"], "extension-missing");
            assert_eq!(reply["result"], json!([]));
        }
    }

    // The session is still usable afterwards
    assert!(tools.execute_sql("SELECT 1").await.is_ok());
}

#[tokio::test]
async fn test_introspection_and_analysis() {
    let Some(tools) = postgres_tools().await else {
        return;
    };
    create_shop(&tools, "dbpilot_it_intro").await;

    let tables = tools.get_all_tables().await.unwrap();
    assert!(
        tables
            .iter()
            .any(|t| t.schema == "dbpilot_it_intro" && t.name == "orders")
    );

    let columns = tools
        .get_table_schema("dbpilot_it_intro.orders")
        .await
        .unwrap();
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "user_id", "total"]);
    assert!(columns[0].is_primary_key);
    assert!(columns[1].is_foreign_key);

    let indexes = tools
        .get_table_indexes("dbpilot_it_intro.orders")
        .await
        .unwrap();
    assert!(indexes.iter().any(|i| i.is_primary && i.columns == vec!["id"]));

    let size = tools.get_database_size().await.unwrap();
    assert!(size.size_bytes > 0);
    assert!(!tools.get_active_connections().await.unwrap().is_empty());

    let analysis = tools
        .analyze_query_performance("SELECT * FROM dbpilot_it_intro.orders WHERE total > 10")
        .await
        .unwrap();
    assert!(analysis.overall_score <= 100);
    assert!(
        analysis
            .recommendations
            .iter()
            .any(|r| r.description == "Avoid SELECT *")
    );

    let table = tools
        .analyze_table_performance("dbpilot_it_intro.orders")
        .await
        .unwrap();
    assert!(table.table_stats.is_some());
    assert!(!table.index_suggestions.is_empty());

    drop_shop(&tools, "dbpilot_it_intro").await;
}

#[tokio::test]
async fn test_deadline_cancels_backend_query() {
    let config = postgres_config("pg-deadline");
    let registry = Arc::new(ConnectionRegistry::in_memory());
    if registry.add(config).await.is_err() {
        eprintln!("Skipping test: database not available");
        return;
    }
    let tools = DatabaseTools::new(registry, std::time::Duration::from_millis(300));

    let err = tools.execute_sql("SELECT pg_sleep(5)").await.unwrap_err();
    assert_eq!(err, DbError::Cancelled);

    // The connection survives the cancel
    let tools = DatabaseTools::new(tools.registry().clone(), TEST_DEADLINE);
    assert!(tools.execute_sql("SELECT 1").await.is_ok());
}
