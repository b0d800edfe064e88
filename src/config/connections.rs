//! Connection configuration
//!
//! A named connection profile for either backend, plus the URL parser/builder
//! for PostgreSQL and the DSN builder for SQLite.

use crate::error::{ConfigError, ConfigResult};
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, CONTROLS, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Characters escaped inside the user-info and database parts of a URL
const URL_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Characters escaped in a SQLite `file:` URI path
const SQLITE_PATH: &AsciiSet = &CONTROLS.add(b' ').add(b'?').add(b'#').add(b'%');

/// Path SQLite treats as a private in-memory database
pub const SQLITE_MEMORY: &str = ":memory:";

/// Database connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection profile name (primary key in the registry)
    pub name: String,

    /// Backend kind
    pub kind: DbKind,

    /// Database host (PostgreSQL)
    #[serde(default)]
    pub host: String,

    /// Database port (PostgreSQL)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name (PostgreSQL)
    #[serde(default)]
    pub database: String,

    /// Username (PostgreSQL)
    #[serde(default)]
    pub username: String,

    /// Password (PostgreSQL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// SSL mode (PostgreSQL)
    #[serde(default)]
    pub ssl_mode: SslMode,

    /// Database file path, or `:memory:` (SQLite)
    #[serde(default)]
    pub path: String,

    /// File open mode (SQLite)
    #[serde(default)]
    pub mode: SqliteMode,

    /// Cache mode (SQLite)
    #[serde(default)]
    pub cache: CacheMode,

    /// Connect / busy timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Free-form description shown in listings
    #[serde(default)]
    pub description: String,

    /// When the connection was last made current
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

/// Supported database backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbKind {
    Postgres,
    Sqlite,
}

/// PostgreSQL SSL connection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    #[default]
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

/// SQLite file open mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SqliteMode {
    Ro,
    Rw,
    #[default]
    Rwc,
    Memory,
}

/// SQLite cache mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    #[default]
    Shared,
    Private,
}

fn default_port() -> u16 {
    5432
}

fn default_timeout() -> u64 {
    30
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbKind::Postgres => write!(f, "postgres"),
            DbKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    /// Whether the connection should be attempted over TLS at all
    pub fn uses_tls(&self) -> bool {
        !matches!(self, SslMode::Disable)
    }
}

impl FromStr for SslMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s {
            "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(ConfigError::Invalid(format!("unknown sslmode: {}", other))),
        }
    }
}

impl SqliteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqliteMode::Ro => "ro",
            SqliteMode::Rw => "rw",
            SqliteMode::Rwc => "rwc",
            SqliteMode::Memory => "memory",
        }
    }
}

impl FromStr for SqliteMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s {
            "ro" => Ok(SqliteMode::Ro),
            "rw" => Ok(SqliteMode::Rw),
            "rwc" => Ok(SqliteMode::Rwc),
            "memory" => Ok(SqliteMode::Memory),
            other => Err(ConfigError::Invalid(format!(
                "unknown SQLite mode: {} (expected ro, rw, rwc or memory)",
                other
            ))),
        }
    }
}

impl CacheMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Shared => "shared",
            CacheMode::Private => "private",
        }
    }
}

impl FromStr for CacheMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s {
            "shared" => Ok(CacheMode::Shared),
            "private" => Ok(CacheMode::Private),
            other => Err(ConfigError::Invalid(format!(
                "unknown SQLite cache mode: {} (expected shared or private)",
                other
            ))),
        }
    }
}

impl ConnectionConfig {
    /// A PostgreSQL profile with default SSL and timeout settings
    pub fn postgres(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: DbKind::Postgres,
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password,
            ssl_mode: SslMode::default(),
            path: String::new(),
            mode: SqliteMode::default(),
            cache: CacheMode::default(),
            timeout_secs: default_timeout(),
            description: String::new(),
            last_used: None,
        }
    }

    /// A SQLite profile for a database file (or `:memory:`)
    pub fn sqlite(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DbKind::Sqlite,
            host: String::new(),
            port: default_port(),
            database: String::new(),
            username: String::new(),
            password: None,
            ssl_mode: SslMode::default(),
            path: path.into(),
            mode: SqliteMode::default(),
            cache: CacheMode::default(),
            timeout_secs: default_timeout(),
            description: String::new(),
            last_used: None,
        }
    }

    /// Parse a connection URL into a named profile.
    ///
    /// Accepts `postgres[ql]://user[:password]@host[:port]/db[?sslmode=...]`
    /// and `sqlite://<path>`. Missing PostgreSQL parts default to
    /// `localhost`, `5432`, `postgres` and `sslmode=disable`.
    pub fn from_url(name: impl Into<String>, url: &str) -> ConfigResult<Self> {
        let url = url.trim();

        if let Some(path) = url.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err(ConfigError::Invalid("SQLite URL must contain a path".into()));
            }
            return Ok(Self::sqlite(name, decode(path)?));
        }

        let rest = url
            .strip_prefix("postgres://")
            .or_else(|| url.strip_prefix("postgresql://"))
            .ok_or_else(|| {
                ConfigError::Invalid(
                    "URL must start with postgres://, postgresql:// or sqlite://".into(),
                )
            })?;

        let (rest, query) = match rest.split_once('?') {
            Some((r, q)) => (r, Some(q)),
            None => (rest, None),
        };

        let (authority, database) = rest.split_once('/').unwrap_or((rest, ""));

        // Passwords may contain a literal '@' when not encoded; the host never does
        let (creds, host_port) = match authority.rsplit_once('@') {
            Some((c, h)) => (Some(c), h),
            None => (None, authority),
        };

        let (username, password) = match creds {
            Some(c) => match c.split_once(':') {
                Some((u, p)) => (decode(u)?, Some(decode(p)?)),
                None => (decode(c)?, None),
            },
            None => (String::new(), None),
        };

        let (host, port) = split_host_port(host_port)?;
        let database = if database.is_empty() {
            "postgres".to_string()
        } else {
            decode(database)?
        };

        let mut config = Self::postgres(name, host, port, database, username, password);

        if let Some(query) = query {
            for param in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = param.split_once('=').unwrap_or((param, ""));
                match key {
                    "sslmode" => config.ssl_mode = value.parse()?,
                    "connect_timeout" => {
                        config.timeout_secs = value.parse().map_err(|_| {
                            ConfigError::Invalid(format!("Invalid connect_timeout: {}", value))
                        })?
                    }
                    // Other libpq parameters are not interpreted
                    _ => {}
                }
            }
        }

        Ok(config)
    }

    /// Build a PostgreSQL URL for this profile.
    ///
    /// `sslmode` and `connect_timeout` are only emitted when they differ
    /// from the defaults, so parsing the result yields the same profile.
    pub fn to_url(&self) -> String {
        let mut url = String::from("postgres://");
        if !self.username.is_empty() || self.password.is_some() {
            url.push_str(&encode(&self.username));
            if let Some(ref pw) = self.password {
                url.push(':');
                url.push_str(&encode(pw));
            }
            url.push('@');
        }
        if self.host.contains(':') {
            url.push_str(&format!("[{}]", self.host));
        } else {
            url.push_str(&self.host);
        }
        url.push_str(&format!(":{}/{}", self.port, encode(&self.database)));
        let mut params = Vec::new();
        if self.ssl_mode != SslMode::Disable {
            params.push(format!("sslmode={}", self.ssl_mode.as_str()));
        }
        if self.timeout_secs != default_timeout() {
            params.push(format!("connect_timeout={}", self.timeout_secs));
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    /// Build the SQLite `file:` DSN for this profile
    pub fn sqlite_dsn(&self) -> String {
        if self.path == SQLITE_MEMORY {
            return "file::memory:?cache=shared".to_string();
        }
        format!(
            "file:{}?mode={}&cache={}&_timeout={}s&_journal_mode=WAL&_synchronous=NORMAL&_foreign_keys=on",
            utf8_percent_encode(&self.path, SQLITE_PATH),
            self.mode.as_str(),
            self.cache.as_str(),
            self.timeout_secs
        )
    }

    /// Whether the SQLite profile lives only in memory
    pub fn is_in_memory(&self) -> bool {
        self.kind == DbKind::Sqlite && (self.path == SQLITE_MEMORY || self.mode == SqliteMode::Memory)
    }

    /// Check the profile before it is registered or opened
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("connection name must not be empty".into()));
        }
        match self.kind {
            DbKind::Postgres => {
                if self.host.is_empty() {
                    return Err(ConfigError::Invalid("PostgreSQL host must not be empty".into()));
                }
                if self.port == 0 {
                    return Err(ConfigError::Invalid("PostgreSQL port must not be 0".into()));
                }
            }
            DbKind::Sqlite => {
                if self.path.is_empty() {
                    return Err(ConfigError::Invalid("SQLite path must not be empty".into()));
                }
            }
        }
        Ok(())
    }

    /// Human-readable endpoint: `host:port/db` or the file path
    pub fn endpoint(&self) -> String {
        match self.kind {
            DbKind::Postgres => format!("{}:{}/{}", self.host, self.port, self.database),
            DbKind::Sqlite => self.path.clone(),
        }
    }

    /// Copy of this profile without the password, for display
    pub fn redacted(&self) -> Self {
        Self {
            password: self.password.as_ref().map(|_| "********".to_string()),
            ..self.clone()
        }
    }

    /// Get the dbpilot data directory (platform data dir, or ~/.dbpilot)
    pub fn config_dir() -> ConfigResult<PathBuf> {
        if let Some(data) = dirs::data_dir() {
            return Ok(data.join("dbpilot"));
        }
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".dbpilot"))
    }

    /// Get the connections file path
    pub fn connections_file() -> ConfigResult<PathBuf> {
        Ok(Self::config_dir()?.join("connections.json"))
    }
}

/// Split `host[:port]` (or `[v6]:port`) with PostgreSQL defaults
fn split_host_port(host_port: &str) -> ConfigResult<(String, u16)> {
    let (host, port) = if let Some(rest) = host_port.strip_prefix('[') {
        let (h, after) = rest
            .split_once(']')
            .ok_or_else(|| ConfigError::Invalid(format!("Invalid host: {}", host_port)))?;
        (h, after.strip_prefix(':'))
    } else {
        match host_port.split_once(':') {
            Some((h, p)) => (h, Some(p)),
            None => (host_port, None),
        }
    };

    let port = match port {
        Some(p) if !p.is_empty() => p
            .parse::<u16>()
            .map_err(|_| ConfigError::Invalid(format!("Invalid port: {}", p)))?,
        _ => default_port(),
    };
    let host = if host.is_empty() { "localhost" } else { host };
    Ok((host.to_string(), port))
}

fn encode(s: &str) -> String {
    utf8_percent_encode(s, URL_COMPONENT).to_string()
}

fn decode(s: &str) -> ConfigResult<String> {
    percent_decode_str(s)
        .decode_utf8()
        .map(|c| c.into_owned())
        .map_err(|_| ConfigError::Invalid(format!("Invalid URL encoding in: {}", s)))
}
