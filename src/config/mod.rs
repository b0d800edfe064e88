//! Configuration management
//!
//! Handles connection profiles, their on-disk store, and user settings.

pub mod connections;
pub mod settings;
pub mod store;

pub use connections::{CacheMode, ConnectionConfig, DbKind, SqliteMode, SslMode};
pub use settings::{Settings, load_settings};
pub use store::{ConfigStore, StoredConnections};
