//! PostgreSQL driver.
//!
//! This module provides PostgreSQL-specific implementations:
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresConnector`]: single-connection executor over tokio-postgres
//! - [`catalog`]: catalog queries used by schema introspection

pub mod catalog;
mod connector;
mod dialect;

pub use connector::PostgresConnector;
pub use dialect::PostgresDialect;
