//! Connection registry
//!
//! The single owner of every registered profile and live connection. All
//! operations take one async lock; those that hand out a connection re-ping
//! it under that lock and reconnect at most once, so concurrent failures
//! collapse into a single reconnect.

use crate::config::{ConfigStore, ConnectionConfig, DbKind, StoredConnections};
use crate::db::{Backend, Database};
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tokio::sync::Mutex;

/// Health of one registered connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Open and selected as current
    Active,
    /// Open, not current
    Connected,
    /// Registered but not open
    Disconnected,
    /// The last ping and reconnect both failed
    Unhealthy,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Active => write!(f, "active"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// One row of [`ConnectionRegistry::list`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DbKind,
    pub endpoint: String,
    pub status: ConnectionStatus,
    pub is_current: bool,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct RegistryState {
    configs: BTreeMap<String, ConnectionConfig>,
    current: Option<String>,
    live: HashMap<String, Backend>,
    unhealthy: HashSet<String>,
}

impl RegistryState {
    fn status_of(&self, name: &str) -> ConnectionStatus {
        if self.unhealthy.contains(name) {
            ConnectionStatus::Unhealthy
        } else if self.live.contains_key(name) {
            if self.current.as_deref() == Some(name) {
                ConnectionStatus::Active
            } else {
                ConnectionStatus::Connected
            }
        } else {
            ConnectionStatus::Disconnected
        }
    }

    /// Profiles newest-first by `last_used`; never-used ones last
    fn by_last_used(&self) -> Vec<&ConnectionConfig> {
        let mut configs: Vec<&ConnectionConfig> = self.configs.values().collect();
        configs.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        configs
    }

    /// Hand out a live connection for `name`, opening or reconnecting once
    async fn ensure_healthy(&mut self, name: &str) -> DbResult<Backend> {
        let config = self
            .configs
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::Unknown(name.to_string()))?;

        if let Some(db) = self.live.get(name).cloned() {
            match db.ping().await {
                Ok(()) => {
                    self.unhealthy.remove(name);
                    return Ok(db);
                }
                Err(e) => {
                    tracing::warn!(name, error = %e, "Ping failed, reconnecting");
                    db.close().await;
                    self.live.remove(name);
                }
            }
        }

        match Backend::open(&config).await {
            Ok(db) => {
                tracing::info!(name, endpoint = %config.endpoint(), "Connection opened");
                self.unhealthy.remove(name);
                self.live.insert(name.to_string(), db.clone());
                Ok(db)
            }
            Err(e) => {
                tracing::warn!(name, error = %e, "Connection marked unhealthy");
                self.unhealthy.insert(name.to_string());
                Err(as_unreachable(e))
            }
        }
    }

    fn snapshot(&self) -> StoredConnections {
        StoredConnections {
            connections: self.configs.clone(),
            current: self.current.clone(),
        }
    }
}

/// Named connections, the current selection, and their live sessions
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
    store: ConfigStore,
}

impl ConnectionRegistry {
    /// Start from whatever `store` holds. Nothing is opened until used.
    pub fn load(store: ConfigStore) -> Self {
        let doc = store.load();
        tracing::debug!(count = doc.connections.len(), current = ?doc.current, "Loaded connections");
        Self {
            state: Mutex::new(RegistryState {
                configs: doc.connections,
                current: doc.current,
                ..Default::default()
            }),
            store,
        }
    }

    /// A registry that persists nothing
    pub fn in_memory() -> Self {
        Self::load(ConfigStore::in_memory())
    }

    /// Register, open and ping `config`. It becomes current if nothing was.
    ///
    /// # Errors
    /// `Duplicate` if the name is taken, `InvalidArgument` for a bad
    /// profile, `Unreachable` if it cannot be opened; nothing is registered
    /// on failure.
    pub async fn add(&self, mut config: ConnectionConfig) -> DbResult<()> {
        config.validate()?;
        let mut state = self.state.lock().await;
        if state.configs.contains_key(&config.name) {
            return Err(DbError::Duplicate(config.name));
        }

        let db = Backend::open(&config).await.map_err(as_unreachable)?;

        let name = config.name.clone();
        if state.current.is_none() {
            config.last_used = Some(Utc::now());
            state.current = Some(name.clone());
        }
        tracing::info!(name = %name, kind = %config.kind, endpoint = %config.endpoint(), "Connection added");
        state.configs.insert(name.clone(), config);
        state.live.insert(name, db);
        self.persist(&state);
        Ok(())
    }

    /// Close and forget `name`. If it was current, the most recently used
    /// remaining profile takes over.
    pub async fn remove(&self, name: &str) -> DbResult<()> {
        let mut state = self.state.lock().await;
        if state.configs.remove(name).is_none() {
            return Err(DbError::Unknown(name.to_string()));
        }
        if let Some(db) = state.live.remove(name) {
            db.close().await;
        }
        state.unhealthy.remove(name);

        if state.current.as_deref() == Some(name) {
            let next = state.by_last_used().first().map(|c| c.name.clone());
            tracing::info!(removed = name, current = ?next, "Current connection removed");
            state.current = next;
        } else {
            tracing::info!(name, "Connection removed");
        }
        self.persist(&state);
        Ok(())
    }

    /// Make `name` current. On failure the previous selection stays.
    pub async fn switch(&self, name: &str) -> DbResult<()> {
        let mut state = self.state.lock().await;
        if !state.configs.contains_key(name) {
            return Err(DbError::Unknown(name.to_string()));
        }
        state.ensure_healthy(name).await?;

        state.current = Some(name.to_string());
        if let Some(config) = state.configs.get_mut(name) {
            config.last_used = Some(Utc::now());
        }
        tracing::info!(name, "Switched connection");
        self.persist(&state);
        Ok(())
    }

    /// The current connection, re-pinged
    ///
    /// # Errors
    /// `NoCurrent` when nothing is selected, `Unreachable` when the ping
    /// and the reconnect both fail
    pub async fn current(&self) -> DbResult<(Backend, String)> {
        let mut state = self.state.lock().await;
        let name = state.current.clone().ok_or(DbError::NoCurrent)?;
        let db = state.ensure_healthy(&name).await?;
        Ok((db, name))
    }

    /// Name of the current connection, without touching it
    pub async fn current_name(&self) -> Option<String> {
        self.state.lock().await.current.clone()
    }

    /// Every profile with its status, passwords masked
    pub async fn list(&self) -> Vec<ConnectionSummary> {
        let state = self.state.lock().await;
        state
            .configs
            .values()
            .map(|c| ConnectionSummary {
                name: c.name.clone(),
                kind: c.kind,
                endpoint: c.endpoint(),
                status: state.status_of(&c.name),
                is_current: state.current.as_deref() == Some(c.name.as_str()),
                last_used: c.last_used,
            })
            .collect()
    }

    /// Profiles newest-first by last use, passwords masked
    pub async fn sorted_by_last_used(&self) -> Vec<ConnectionConfig> {
        let state = self.state.lock().await;
        state.by_last_used().into_iter().map(|c| c.redacted()).collect()
    }

    pub async fn status(&self) -> BTreeMap<String, ConnectionStatus> {
        let state = self.state.lock().await;
        state
            .configs
            .keys()
            .map(|name| (name.clone(), state.status_of(name)))
            .collect()
    }

    /// Close every live connection. Profiles stay registered.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        let live: Vec<(String, Backend)> = state.live.drain().collect();
        for (name, db) in live {
            db.close().await;
            tracing::debug!(name = %name, "Connection closed");
        }
    }

    fn persist(&self, state: &RegistryState) {
        // In-memory state is authoritative; a failed write is not rolled back
        if let Err(e) = self.store.save(&state.snapshot()) {
            tracing::warn!(error = %e, "Failed to persist connections");
        }
    }
}

/// Open failures surface as `unreachable`; rejected profiles keep their kind
fn as_unreachable(e: DbError) -> DbError {
    match e {
        DbError::Unreachable(_) | DbError::InvalidArgument(_) => e,
        other => DbError::Unreachable(other.to_string()),
    }
}
