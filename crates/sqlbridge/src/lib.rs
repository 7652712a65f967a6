//! # sqlbridge
//!
//! Dialect-aware database access for PostgreSQL and SQL Server.
//!
//! This library lets one code path talk to both engines:
//!
//! - **Dialects** that own identifier quoting, literal quoting rules and
//!   timeout settings for each engine
//! - **Connectors** wrapping exactly one live connection, with bounded
//!   statement execution and transactions
//! - **Schema introspection** into one normalized model
//! - **Bulk DSV import** in chunked multi-row INSERTs with an all-or-nothing
//!   or best-effort failure policy
//! - **DSV export** of query results, one row at a time
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlbridge::{Config, ConnectorFactory, Connector};
//!
//! #[tokio::main]
//! async fn main() -> sqlbridge::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let conn = &config.connection;
//!     let mut connector = ConnectorFactory::create(
//!         conn.engine,
//!         &conn.connection_string(),
//!         &conn.connect_options(),
//!     )
//!     .await?;
//!     let result = connector.execute("SELECT 1").await?;
//!     println!("{} rows", result.rows.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod introspect;
pub mod normalize;
pub mod transfer;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use config::{Config, ConnectionConfig, TransferConfig};
pub use self::core::{
    Command, Connector, Dialect, EngineType, QueryResult, SchemaModel, SqlValue, TableRef,
    Timeouts,
};
pub use drivers::{ConnectOptions, ConnectorFactory, ConnectorImpl, DialectImpl, SslMode};
pub use error::{BridgeError, ErrorPosition, Result};
pub use introspect::{
    annotate_databases, AllowAll, AllowList, DatabaseAccessPolicy, SchemaIntrospector,
};
pub use normalize::{NativeCursor, ResultNormalizer};
pub use transfer::{
    BulkImportPipeline, ExportOptions, ImportOptions, ImportOutcome, ImportStatus, QuoteDoubling,
    ValueSanitizer,
};
