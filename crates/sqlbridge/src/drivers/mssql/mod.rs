//! Microsoft SQL Server driver.
//!
//! This module provides MSSQL-specific implementations:
//!
//! - [`MssqlDialect`]: SQL syntax strategy for MSSQL
//! - [`MssqlConnector`]: single-connection executor over tiberius
//! - [`catalog`]: catalog queries used by schema introspection

pub mod catalog;
mod connector;
mod dialect;

pub use connector::MssqlConnector;
pub use dialect::MssqlDialect;
