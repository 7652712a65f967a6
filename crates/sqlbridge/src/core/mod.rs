//! Core abstractions shared by every engine.
//!
//! - [`engine`]: the closed set of supported engines
//! - [`traits`]: [`Dialect`] and [`Connector`] seams implemented by drivers
//! - [`command`]: statements bound to a connector
//! - [`schema`]: normalized schema model returned by introspection
//! - [`result`]: uniform text result model
//! - [`value`]: typed native values and their text rendering
//!
//! The core module is engine-agnostic. Driver modules (`drivers/postgres`,
//! `drivers/mssql`) implement the traits, and the pipelines only ever talk to
//! the traits.

pub mod command;
pub mod engine;
pub mod result;
pub mod schema;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use command::Command;
pub use engine::EngineType;
pub use result::{QueryResult, ResultColumn};
pub use schema::{
    ColumnDescriptor, ConstraintDescriptor, ConstraintKind, DatabaseEntry, IndexDescriptor,
    RoutineDescriptor, SchemaEntry, SchemaModel, SchemaObject, TableDescriptor, ViewDescriptor,
};
pub use traits::{normalize_type_name, Connector, Dialect, TableRef, Timeouts};
pub use value::{SqlValue, BINARY_MARKER};
