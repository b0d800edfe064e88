//! Persistent connection store
//!
//! All profiles and the current-connection pointer live in one JSON document:
//! `{ "connections": { <name>: ConnectionConfig }, "current": <name|null> }`.
//!
//! Loading never fails. A missing file is an empty store, an unreadable or
//! unparseable file is logged and treated as empty, and individual malformed
//! entries are skipped with a warning. Saving writes a sibling temp file and
//! renames it over the original.

use crate::config::ConnectionConfig;
use crate::error::ConfigResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The persisted document
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoredConnections {
    pub connections: BTreeMap<String, ConnectionConfig>,
    pub current: Option<String>,
}

/// Location of the persisted document (`None` = in-memory only)
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// Store at `<data dir>/dbpilot/connections.json`
    pub fn default_location() -> ConfigResult<Self> {
        Ok(Self::at(ConnectionConfig::connections_file()?))
    }

    /// Store at an explicit path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the document, dropping anything that does not parse
    pub fn load(&self) -> StoredConnections {
        let Some(path) = &self.path else {
            return StoredConnections::default();
        };

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return StoredConnections::default();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read connections file, starting empty");
                return StoredConnections::default();
            }
        };

        parse_document(&content, path)
    }

    /// Persist the document (temp file + rename)
    pub fn save(&self, doc: &StoredConnections) -> ConfigResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let json = serde_json::to_string_pretty(doc)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        if let Err(e) = restrict_permissions(&tmp) {
            tracing::warn!(
                path = %tmp.display(),
                error = %e,
                "Could not restrict connections file permissions"
            );
        }
        std::fs::rename(&tmp, path)?;

        tracing::debug!(path = %path.display(), count = doc.connections.len(), "Saved connections");
        Ok(())
    }
}

fn parse_document(content: &str, path: &Path) -> StoredConnections {
    let value: serde_json::Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Malformed connections file, starting empty");
            return StoredConnections::default();
        }
    };

    let mut doc = StoredConnections::default();

    match value.get("connections") {
        Some(serde_json::Value::Object(entries)) => {
            for (key, entry) in entries {
                match serde_json::from_value::<ConnectionConfig>(entry.clone()) {
                    Ok(mut config) => {
                        // The map key is authoritative
                        config.name = key.clone();
                        if let Err(e) = config.validate() {
                            tracing::warn!(name = %key, error = %e, "Skipping invalid connection entry");
                            continue;
                        }
                        doc.connections.insert(key.clone(), config);
                    }
                    Err(e) => {
                        tracing::warn!(name = %key, error = %e, "Skipping malformed connection entry");
                    }
                }
            }
        }
        Some(serde_json::Value::Null) | None => {}
        Some(_) => {
            tracing::warn!(path = %path.display(), "\"connections\" is not an object, ignoring it");
        }
    }

    doc.current = match value.get("current") {
        Some(serde_json::Value::String(name)) if doc.connections.contains_key(name) => {
            Some(name.clone())
        }
        Some(serde_json::Value::String(name)) => {
            tracing::warn!(name = %name, "Current connection is not registered, clearing it");
            None
        }
        _ => None,
    };

    doc
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    // The file carries credentials
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbKind;

    #[cfg(unix)]
    #[test]
    fn test_restrict_permissions_reports_failure() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        assert!(restrict_permissions(&dir.path().join("absent.json")).is_err());

        let path = dir.path().join("present.json");
        std::fs::write(&path, "{}").unwrap();
        restrict_permissions(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join("connections.json"));
        assert_eq!(store.load(), StoredConnections::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join("nested").join("connections.json"));

        let mut doc = StoredConnections::default();
        let config = ConnectionConfig::sqlite("local", "app.db");
        doc.connections.insert("local".into(), config);
        doc.current = Some("local".into());
        store.save(&doc).unwrap();

        let loaded = store.load();
        assert_eq!(loaded, doc);
        assert!(!dir.path().join("nested").join("connections.json.tmp").exists());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connections.json");
        std::fs::write(
            &path,
            r#"{
                "connections": {
                    "good": {"name": "good", "kind": "sqlite", "path": "a.db"},
                    "bad": {"name": "bad", "kind": "oracle"},
                    "empty": {"name": "empty", "kind": "sqlite"}
                },
                "current": "bad"
            }"#,
        )
        .unwrap();

        let doc = ConfigStore::at(&path).load();
        assert_eq!(doc.connections.len(), 1);
        assert_eq!(doc.connections["good"].kind, DbKind::Sqlite);
        assert_eq!(doc.current, None);
    }

    #[test]
    fn test_garbage_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connections.json");
        std::fs::write(&path, "not json at all").unwrap();
        assert_eq!(ConfigStore::at(&path).load(), StoredConnections::default());
    }

    #[test]
    fn test_in_memory_store_never_writes() {
        let store = ConfigStore::in_memory();
        store.save(&StoredConnections::default()).unwrap();
        assert!(store.path().is_none());
    }
}
