//! Registry invariants and persistence through the public API

use crate::common::{registry_in, sqlite_db, tools_for};
use dbpilot::config::{ConfigStore, ConnectionConfig};
use dbpilot::error::DbError;
use dbpilot::registry::{ConnectionRegistry, ConnectionStatus};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

const SCRIPT: &str = "CREATE TABLE IF NOT EXISTS items (id INTEGER PRIMARY KEY, label TEXT);";

#[tokio::test]
async fn test_added_connection_is_listed_and_open() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);

    for name in ["one", "two", "three"] {
        registry.add(sqlite_db(&dir, name, SCRIPT)).await.unwrap();
        let listed = registry.list().await;
        assert!(listed.iter().any(|c| c.name == name));
        let status = registry.status().await[name];
        assert!(matches!(
            status,
            ConnectionStatus::Connected | ConnectionStatus::Active
        ));
    }
    assert_eq!(registry.current_name().await.as_deref(), Some("one"));
}

#[tokio::test]
async fn test_remove_then_current() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    registry.add(sqlite_db(&dir, "one", SCRIPT)).await.unwrap();
    registry.add(sqlite_db(&dir, "two", SCRIPT)).await.unwrap();

    registry.remove("one").await.unwrap();
    assert!(!registry.list().await.iter().any(|c| c.name == "one"));
    let (_, current) = registry.current().await.unwrap();
    assert_eq!(current, "two");

    registry.remove("two").await.unwrap();
    assert!(matches!(registry.current().await, Err(DbError::NoCurrent)));
}

#[tokio::test]
async fn test_failed_switch_keeps_previous_current() {
    let dir = TempDir::new().unwrap();
    let registry = registry_in(&dir);
    registry.add(sqlite_db(&dir, "one", SCRIPT)).await.unwrap();
    registry.add(sqlite_db(&dir, "two", SCRIPT)).await.unwrap();
    std::fs::remove_file(dir.path().join("two.db")).unwrap();

    assert_err!(registry.switch("two").await);
    assert_eq!(registry.current_name().await.as_deref(), Some("one"));

    assert_err!(registry.switch("missing").await);
    assert_eq!(registry.current_name().await.as_deref(), Some("one"));
}

#[tokio::test]
async fn test_invalid_profile_is_rejected() {
    let registry = ConnectionRegistry::in_memory();
    let err = registry
        .add(ConnectionConfig::sqlite("", "/tmp/x.db"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid-argument");
    assert!(registry.list().await.is_empty());
}

#[tokio::test]
async fn test_store_survives_restart() {
    let dir = TempDir::new().unwrap();
    {
        let registry = registry_in(&dir);
        registry.add(sqlite_db(&dir, "one", SCRIPT)).await.unwrap();
        registry.add(sqlite_db(&dir, "two", SCRIPT)).await.unwrap();
        assert_ok!(registry.switch("two").await);
        registry.close().await;
    }

    let path = dir.path().join("connections.json");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let doc = ConfigStore::at(&path).load();
    assert_eq!(doc.current.as_deref(), Some("two"));
    assert_eq!(doc.connections.len(), 2);

    let registry = registry_in(&dir);
    let tools = tools_for(&registry);
    let tables = tools.get_all_tables().await.unwrap();
    assert!(tables.iter().any(|t| t.name == "items"));
    assert_eq!(registry.status().await["two"], ConnectionStatus::Active);
    assert_eq!(registry.status().await["one"], ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_malformed_store_starts_empty() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("connections.json"), "{ not json").unwrap();

    let registry = registry_in(&dir);
    assert!(registry.list().await.is_empty());

    // And is rewritten on the next change
    registry.add(sqlite_db(&dir, "one", SCRIPT)).await.unwrap();
    let doc = ConfigStore::at(dir.path().join("connections.json")).load();
    assert!(doc.connections.contains_key("one"));
}
