//! Common utilities shared across database drivers.
//!
//! - [`tls`]: TLS configuration for PostgreSQL connections
//! - [`timeout`]: bounding driver futures by the connector's timeouts

pub mod timeout;
pub mod tls;

pub use tls::SslMode;
