//! Database driver implementations.
//!
//! This module provides database-specific implementations of the core traits:
//!
//! - [`mssql`]: Microsoft SQL Server driver
//! - [`postgres`]: PostgreSQL driver
//! - [`common`]: Shared utilities (TLS, timeouts)
//!
//! # Architecture
//!
//! Each driver module implements:
//! - `Dialect`: SQL syntax strategy for the database engine
//! - `Connector`: one live connection
//!
//! [`DialectImpl`] and [`ConnectorImpl`] are tagged enums over the two
//! engines. Instead of dynamic dispatch via `Box<dyn Trait>`, each trait
//! method is a match over the variants, which keeps the engine set closed and
//! the dispatch static.

pub mod common;
pub mod mssql;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

// Re-export common utilities
pub use common::SslMode;

// Re-export driver types
pub use mssql::{MssqlConnector, MssqlDialect};
pub use postgres::{PostgresConnector, PostgresDialect};

use crate::core::engine::EngineType;
use crate::core::result::QueryResult;
use crate::core::traits::{Connector, Dialect, TableRef, Timeouts};
use crate::error::Result;

/// Enum-based static dispatch for dialects.
///
/// This provides zero-cost polymorphism - the compiler generates
/// a match statement instead of using vtable dispatch.
#[derive(Debug, Clone, Copy)]
pub enum DialectImpl {
    Mssql(MssqlDialect),
    Postgres(PostgresDialect),
}

impl DialectImpl {
    /// Dialect for an engine.
    pub fn for_engine(engine: EngineType) -> Self {
        match engine {
            EngineType::SqlServer => DialectImpl::Mssql(MssqlDialect::new()),
            EngineType::Postgres => DialectImpl::Postgres(PostgresDialect::new()),
        }
    }

    /// Create a dialect implementation from an engine name.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedEngine` if the name is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        Ok(Self::for_engine(db_type.parse()?))
    }
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            DialectImpl::Mssql(d) => d.name(),
            DialectImpl::Postgres(d) => d.name(),
        }
    }

    fn engine(&self) -> EngineType {
        match self {
            DialectImpl::Mssql(d) => d.engine(),
            DialectImpl::Postgres(d) => d.engine(),
        }
    }

    fn quote_ident(&self, name: &str) -> String {
        match self {
            DialectImpl::Mssql(d) => d.quote_ident(name),
            DialectImpl::Postgres(d) => d.quote_ident(name),
        }
    }

    fn requires_quoting(&self, native_type: &str) -> bool {
        match self {
            DialectImpl::Mssql(d) => d.requires_quoting(native_type),
            DialectImpl::Postgres(d) => d.requires_quoting(native_type),
        }
    }

    fn with_timeouts(&self, connection_string: &str, timeouts: &Timeouts) -> String {
        match self {
            DialectImpl::Mssql(d) => d.with_timeouts(connection_string, timeouts),
            DialectImpl::Postgres(d) => d.with_timeouts(connection_string, timeouts),
        }
    }

    fn render_value(&self, native_type: &str, value: &str) -> String {
        match self {
            DialectImpl::Mssql(d) => d.render_value(native_type, value),
            DialectImpl::Postgres(d) => d.render_value(native_type, value),
        }
    }

    fn compile_insert(
        &self,
        table: &TableRef,
        columns: &[(String, String)],
        rows: &[Vec<Option<String>>],
    ) -> Option<String> {
        match self {
            DialectImpl::Mssql(d) => d.compile_insert(table, columns, rows),
            DialectImpl::Postgres(d) => d.compile_insert(table, columns, rows),
        }
    }
}

/// Options applied when opening a connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectOptions {
    pub timeouts: Timeouts,

    /// PostgreSQL TLS mode. `None` follows the connection string's `sslmode`.
    pub ssl_mode: Option<SslMode>,
}

/// Enum-based static dispatch for connectors.
pub enum ConnectorImpl {
    Postgres(PostgresConnector),
    SqlServer(MssqlConnector),
}

#[async_trait]
impl Connector for ConnectorImpl {
    fn engine(&self) -> EngineType {
        match self {
            ConnectorImpl::Postgres(c) => c.engine(),
            ConnectorImpl::SqlServer(c) => c.engine(),
        }
    }

    async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        match self {
            ConnectorImpl::Postgres(c) => c.execute(sql).await,
            ConnectorImpl::SqlServer(c) => c.execute(sql).await,
        }
    }

    async fn execute_non_query(&mut self, sql: &str) -> Result<u64> {
        match self {
            ConnectorImpl::Postgres(c) => c.execute_non_query(sql).await,
            ConnectorImpl::SqlServer(c) => c.execute_non_query(sql).await,
        }
    }

    async fn begin(&mut self) -> Result<()> {
        match self {
            ConnectorImpl::Postgres(c) => c.begin().await,
            ConnectorImpl::SqlServer(c) => c.begin().await,
        }
    }

    async fn commit(&mut self) -> Result<()> {
        match self {
            ConnectorImpl::Postgres(c) => c.commit().await,
            ConnectorImpl::SqlServer(c) => c.commit().await,
        }
    }

    async fn rollback(&mut self) -> Result<()> {
        match self {
            ConnectorImpl::Postgres(c) => c.rollback().await,
            ConnectorImpl::SqlServer(c) => c.rollback().await,
        }
    }

    fn command_timeout(&self) -> Duration {
        match self {
            ConnectorImpl::Postgres(c) => c.command_timeout(),
            ConnectorImpl::SqlServer(c) => c.command_timeout(),
        }
    }

    fn set_command_timeout(&mut self, timeout: Duration) {
        match self {
            ConnectorImpl::Postgres(c) => c.set_command_timeout(timeout),
            ConnectorImpl::SqlServer(c) => c.set_command_timeout(timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            ConnectorImpl::Postgres(c) => c.close().await,
            ConnectorImpl::SqlServer(c) => c.close().await,
        }
    }
}

/// Builds the connector implementation for a requested engine.
pub struct ConnectorFactory;

impl ConnectorFactory {
    /// Open a connection to `engine` using `connection_string`.
    pub async fn create(
        engine: EngineType,
        connection_string: &str,
        options: &ConnectOptions,
    ) -> Result<ConnectorImpl> {
        debug!(
            "Opening {} connection (connect timeout {:?}, command timeout {:?})",
            engine, options.timeouts.connect, options.timeouts.command
        );
        match engine {
            EngineType::Postgres => Ok(ConnectorImpl::Postgres(
                PostgresConnector::connect(connection_string, options).await?,
            )),
            EngineType::SqlServer => Ok(ConnectorImpl::SqlServer(
                MssqlConnector::connect(connection_string, options).await?,
            )),
        }
    }

    /// Like [`create`](Self::create), parsing the engine name first.
    pub async fn create_by_name(
        engine: &str,
        connection_string: &str,
        options: &ConnectOptions,
    ) -> Result<ConnectorImpl> {
        let engine: EngineType = engine.parse()?;
        Self::create(engine, connection_string, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    #[test]
    fn test_dialect_impl_from_db_type() {
        let mssql = DialectImpl::from_db_type("mssql").unwrap();
        assert_eq!(mssql.name(), "mssql");

        let postgres = DialectImpl::from_db_type("postgres").unwrap();
        assert_eq!(postgres.name(), "postgres");

        // Alternative names
        assert!(DialectImpl::from_db_type("sqlserver").is_ok());
        assert!(DialectImpl::from_db_type("postgresql").is_ok());
        assert!(DialectImpl::from_db_type("pg").is_ok());

        // Unknown should error
        assert!(matches!(
            DialectImpl::from_db_type("unknown"),
            Err(BridgeError::UnsupportedEngine(_))
        ));
    }

    #[test]
    fn test_dialect_impl_dispatch() {
        let dialect = DialectImpl::for_engine(EngineType::Postgres);
        assert_eq!(dialect.engine(), EngineType::Postgres);
        assert_eq!(dialect.quote_ident("table"), "\"table\"");
        assert!(!dialect.requires_quoting("boolean"));

        let dialect = DialectImpl::for_engine(EngineType::SqlServer);
        assert_eq!(dialect.quote_ident("table"), "[table]");
        assert!(dialect.requires_quoting("boolean"));
    }

    #[test]
    fn test_dialect_impl_dispatches_literals() {
        let cols = vec![("data".to_string(), "varbinary".to_string())];
        let rows = vec![vec![Some("base64:AQI=".to_string())]];

        let mssql = DialectImpl::for_engine(EngineType::SqlServer);
        assert_eq!(
            mssql.compile_insert(&TableRef::new("t"), &cols, &rows).unwrap(),
            "INSERT INTO [t] ([data]) VALUES (0x0102);"
        );

        let pg = DialectImpl::for_engine(EngineType::Postgres);
        assert_eq!(pg.render_value("bytea", "base64:AQI="), "'\\x0102'::bytea");
        assert_eq!(pg.render_value("float8", "Infinity"), "'Infinity'");
    }

    #[tokio::test]
    async fn test_factory_rejects_unknown_engine() {
        let result =
            ConnectorFactory::create_by_name("oracle", "host=x", &ConnectOptions::default()).await;
        assert!(matches!(result, Err(BridgeError::UnsupportedEngine(_))));
    }

    #[tokio::test]
    async fn test_factory_rejects_malformed_postgres_string() {
        let result = ConnectorFactory::create(
            EngineType::Postgres,
            "host=localhost bogus_key=1",
            &ConnectOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }
}
