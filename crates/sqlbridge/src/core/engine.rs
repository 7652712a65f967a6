//! Supported database engines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// The closed set of engines a connector can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    /// PostgreSQL and wire-compatible servers.
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
    /// Microsoft SQL Server and Azure SQL.
    #[serde(rename = "mssql", alias = "sqlserver", alias = "sql_server")]
    SqlServer,
}

impl EngineType {
    /// Canonical short name, as accepted in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineType::Postgres => "postgres",
            EngineType::SqlServer => "mssql",
        }
    }

    /// Default TCP port for the engine.
    pub fn default_port(&self) -> u16 {
        match self {
            EngineType::Postgres => 5432,
            EngineType::SqlServer => 1433,
        }
    }
}

impl FromStr for EngineType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(EngineType::Postgres),
            "mssql" | "sqlserver" | "sql_server" => Ok(EngineType::SqlServer),
            _ => Err(BridgeError::UnsupportedEngine(s.to_string())),
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
