//! Common test utilities and helpers
//!
//! Shared fixtures for the integration suites: SQLite files seeded from a
//! script, and a PostgreSQL profile read from `TEST_DB_*`.

#![allow(dead_code)]

use dbpilot::config::connections::SslMode;
use dbpilot::config::{ConfigStore, ConnectionConfig, SqliteMode};
use dbpilot::registry::ConnectionRegistry;
use dbpilot::tools::DatabaseTools;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Deadline used by every test facade
pub const TEST_DEADLINE: Duration = Duration::from_secs(10);

/// Create `<dir>/<name>.db`, run `script` in it, and return a read-write
/// profile so a deleted file is not silently recreated
pub fn sqlite_db(dir: &TempDir, name: &str, script: &str) -> ConnectionConfig {
    let path = dir.path().join(format!("{}.db", name));
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(script).unwrap();
    drop(conn);

    let mut config = ConnectionConfig::sqlite(name, path.to_string_lossy());
    config.mode = SqliteMode::Rw;
    config
}

/// A registry persisting into `dir`
pub fn registry_in(dir: &TempDir) -> Arc<ConnectionRegistry> {
    Arc::new(ConnectionRegistry::load(ConfigStore::at(
        dir.path().join("connections.json"),
    )))
}

pub fn tools_for(registry: &Arc<ConnectionRegistry>) -> DatabaseTools {
    DatabaseTools::new(registry.clone(), TEST_DEADLINE)
}

/// PostgreSQL profile from the environment (with defaults)
pub fn postgres_config(name: &str) -> ConnectionConfig {
    let mut config = ConnectionConfig::postgres(
        name,
        std::env::var("TEST_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
        std::env::var("TEST_DB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5433),
        std::env::var("TEST_DB_NAME").unwrap_or_else(|_| "test_db".to_string()),
        std::env::var("TEST_DB_USER").unwrap_or_else(|_| "test_user".to_string()),
        Some(std::env::var("TEST_DB_PASSWORD").unwrap_or_else(|_| "test_password".to_string())),
    );
    config.ssl_mode = SslMode::Disable;
    config.timeout_secs = 5;
    config
}

/// A facade whose current connection is the test server, or `None` (with
/// a message) when no server answers
pub async fn postgres_tools() -> Option<DatabaseTools> {
    let config = postgres_config("integration-test");
    let endpoint = config.endpoint();
    let registry = Arc::new(ConnectionRegistry::in_memory());
    match registry.add(config).await {
        Ok(()) => Some(tools_for(&registry)),
        Err(e) => {
            eprintln!("Skipping test: database not available at {} - {}", endpoint, e);
            None
        }
    }
}
