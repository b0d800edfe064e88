//! Error types for dbpilot
//!
//! This module defines the error hierarchy used throughout the library.
//! We use `thiserror` for library-style errors; the binary wraps them with
//! `anyhow` context.

use std::io;

/// Errors surfaced by the database core: adapters, introspection,
/// optimizer, registry and tool facade.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbError {
    /// A caller-supplied value was rejected before reaching the backend
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A connection with this name is already registered
    #[error("connection '{0}' already exists")]
    Duplicate(String),

    /// No connection with this name is registered
    #[error("unknown connection '{0}'")]
    Unknown(String),

    /// An operation needed the current connection but none is selected
    #[error("no active database connection")]
    NoCurrent,

    /// Open or ping failed, including the single reconnect attempt
    #[error("database unreachable: {0}")]
    Unreachable(String),

    /// The driver or the database returned an error (message unchanged)
    #[error("{0}")]
    Backend(String),

    /// A PostgreSQL extension required by the operation is not installed
    #[error("extension not installed: {0}")]
    ExtensionMissing(String),

    /// The caller's deadline expired before the backend answered
    #[error("operation cancelled: deadline exceeded")]
    Cancelled,
}

impl DbError {
    /// Stable machine-readable kind, used in tool error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            DbError::InvalidArgument(_) => "invalid-argument",
            DbError::Duplicate(_) => "duplicate",
            DbError::Unknown(_) => "unknown",
            DbError::NoCurrent => "no-current",
            DbError::Unreachable(_) => "unreachable",
            DbError::Backend(_) => "backend",
            DbError::ExtensionMissing(_) => "extension-missing",
            DbError::Cancelled => "cancelled",
        }
    }
}

impl From<tokio_postgres::Error> for DbError {
    fn from(e: tokio_postgres::Error) -> Self {
        // Prefer the server's message over the generic "db error" display
        match e.as_db_error() {
            Some(db) => DbError::Backend(db.message().to_string()),
            None => DbError::Backend(e.to_string()),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::Backend(e.to_string())
    }
}

impl From<ConfigError> for DbError {
    fn from(e: ConfigError) -> Self {
        DbError::InvalidArgument(e.to_string())
    }
}

/// Configuration loading/parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Home/data directory not found
    #[error("Could not determine data directory")]
    NoHomeDir,

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Reading or writing a config file failed
    #[error("Config file I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Failed to parse or write JSON
    #[error("Failed to parse connections file: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to parse TOML
    #[error("Failed to parse settings: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Command parsing errors for the interactive console
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Unknown command
    #[error("Unknown command: {0}")]
    Unknown(String),

    /// Missing required argument
    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Specialized Result type for database operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Specialized Result type for config operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized Result type for command operations
pub type CommandResult<T> = std::result::Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_current_message_is_tool_visible() {
        assert_eq!(
            DbError::NoCurrent.to_string(),
            "no active database connection"
        );
    }

    #[test]
    fn test_backend_message_passes_through() {
        let err = DbError::Backend("relation \"nope\" does not exist".to_string());
        assert_eq!(err.to_string(), "relation \"nope\" does not exist");
        assert_eq!(err.kind(), "backend");
    }

    #[test]
    fn test_config_error_becomes_invalid_argument() {
        let err: DbError = ConfigError::Invalid("unknown sslmode: maybe".into()).into();
        assert_eq!(err.kind(), "invalid-argument");
        assert!(err.to_string().contains("unknown sslmode"));
    }
}
