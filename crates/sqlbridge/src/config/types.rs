//! Configuration type definitions.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::engine::EngineType;
use crate::core::traits::Timeouts;
use crate::drivers::{ConnectOptions, SslMode};
use crate::transfer::{ExportOptions, DEFAULT_CHUNK_SIZE};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection settings.
    pub connection: ConnectionConfig,

    /// Bulk transfer defaults.
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl Config {
    /// Configuration for a raw connection string, with default transfer
    /// settings.
    pub fn from_connection_string(engine: EngineType, connection_string: impl Into<String>) -> Self {
        Self {
            connection: ConnectionConfig {
                connection_string: Some(connection_string.into()),
                ..ConnectionConfig::new(engine)
            },
            transfer: TransferConfig::default(),
        }
    }
}

/// Database connection configuration.
///
/// Either `connection_string` is given verbatim, or one is built from the
/// individual fields.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Engine: `postgres` or `mssql`.
    pub engine: EngineType,

    /// Complete connection string; overrides the individual fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default by engine).
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// PostgreSQL TLS mode (default: disable).
    #[serde(default)]
    pub ssl_mode: Option<SslMode>,

    /// SQL Server: encrypt the connection (default: false).
    #[serde(default)]
    pub encrypt: bool,

    /// SQL Server: accept any server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Seconds allowed to establish the connection (default: 15).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Seconds allowed per statement (default: 30).
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("engine", &self.engine)
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "[REDACTED]"),
            )
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("command_timeout_secs", &self.command_timeout_secs)
            .finish()
    }
}

impl ConnectionConfig {
    /// Empty settings for `engine` with default timeouts.
    pub fn new(engine: EngineType) -> Self {
        Self {
            engine,
            connection_string: None,
            host: String::new(),
            port: None,
            database: String::new(),
            user: String::new(),
            password: String::new(),
            ssl_mode: None,
            encrypt: false,
            trust_server_cert: false,
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
        }
    }

    /// Port, falling back to the engine default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.engine.default_port())
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            command: Duration::from_secs(self.command_timeout_secs),
        }
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            timeouts: self.timeouts(),
            ssl_mode: self.ssl_mode,
        }
    }

    /// Connection string for the configured engine.
    ///
    /// The PostgreSQL TLS mode travels through [`connect_options`](Self::connect_options)
    /// rather than the string, since `verify-ca` and `verify-full` are not
    /// accepted by the driver's string parser.
    pub fn connection_string(&self) -> String {
        if let Some(s) = &self.connection_string {
            return s.clone();
        }
        match self.engine {
            EngineType::Postgres => format!(
                "host={} port={} dbname={} user={} password={}",
                pg_value(&self.host),
                self.port(),
                pg_value(&self.database),
                pg_value(&self.user),
                pg_value(&self.password)
            ),
            EngineType::SqlServer => format!(
                "Server=tcp:{},{};Database={};User Id={};Password={};Encrypt={};TrustServerCertificate={}",
                ado_value(&self.host),
                self.port(),
                ado_value(&self.database),
                ado_value(&self.user),
                ado_value(&self.password),
                self.encrypt,
                self.trust_server_cert
            ),
        }
    }
}

/// Quote a libpq key/value when it is empty or contains spaces, quotes or
/// backslashes.
fn pg_value(v: &str) -> String {
    if !v.is_empty() && !v.chars().any(|c| c.is_whitespace() || c == '\'' || c == '\\') {
        return v.to_string();
    }
    format!("'{}'", v.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Brace-escape an ADO.NET value that contains separators, quotes, braces or
/// whitespace. A brace literal ends at the first `}`, so each `}` is closed
/// out and emitted bare between two literals.
fn ado_value(v: &str) -> String {
    let special = |c: char| matches!(c, ';' | '=' | '{' | '}' | '\'' | '"') || c.is_whitespace();
    if !v.chars().any(special) {
        return v.to_string();
    }
    format!("{{{}}}", v.replace('}', "}}{"))
}

/// Bulk transfer defaults, overridable per command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Rows per INSERT during import (default: 1000).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Field separator (default: ',').
    #[serde(default = "default_separator")]
    pub separator: char,

    /// Export line ending (default: "\n").
    #[serde(default = "default_newline")]
    pub newline: String,

    /// Export token for NULL values (default: empty).
    #[serde(default)]
    pub null_output: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            separator: default_separator(),
            newline: default_newline(),
            null_output: String::new(),
        }
    }
}

impl TransferConfig {
    /// Export options seeded from these defaults.
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            separator: self.separator,
            newline: self.newline.clone(),
            null_output: self.null_output.clone(),
            ..Default::default()
        }
    }
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_command_timeout() -> u64 {
    30
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_separator() -> char {
    ','
}

fn default_newline() -> String {
    "\n".to_string()
}
