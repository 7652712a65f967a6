//! Core traits for dialect-aware database access.
//!
//! This module defines the two seams every engine plugs into:
//!
//! - [`Dialect`]: SQL syntax strategy (quoting, literal generation, timeouts)
//! - [`Connector`]: one live connection executing statements sequentially
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` provides interchangeable SQL generation rules
//! - **Template Method**: `Dialect::compile_insert` builds on the per-engine
//!   `quote_ident` and `requires_quoting` primitives

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::drivers::DialectImpl;
use crate::error::Result;

use super::command::Command;
use super::engine::EngineType;
use super::result::QueryResult;

/// Optionally schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    /// Unqualified table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// Schema-qualified table.
    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Build from an optional schema, treating an empty string as absent.
    pub fn with_schema(schema: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.filter(|s| !s.is_empty()).map(str::to_string),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Connect and command timeouts applied to a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub command: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            command: Duration::from_secs(30),
        }
    }
}

/// SQL dialect abstraction for engine-specific syntax.
///
/// Dialects are stateless values; they can be cloned and shared freely.
pub trait Dialect: Send + Sync {
    /// Get the dialect name (e.g., "postgres", "mssql").
    fn name(&self) -> &str;

    /// Engine this dialect belongs to.
    fn engine(&self) -> EngineType;

    /// Quote an identifier for this dialect.
    fn quote_ident(&self, name: &str) -> String;

    /// Whether values of a column with this native type are wrapped in
    /// single quotes when compiled into a statement.
    fn requires_quoting(&self, native_type: &str) -> bool;

    /// Append this dialect's timeout settings to a connection string.
    fn with_timeouts(&self, connection_string: &str, timeouts: &Timeouts) -> String;

    /// Render a table reference, quoting each part.
    fn qualify_table(&self, table: &TableRef) -> String {
        match &table.schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_ident(schema),
                self.quote_ident(&table.name)
            ),
            None => self.quote_ident(&table.name),
        }
    }

    /// Render one non-empty cell as a SQL literal for a column of
    /// `native_type`.
    ///
    /// The default wraps the value in single quotes when the type requires
    /// it. Dialects override this for literal forms the engine needs, such
    /// as binary data.
    fn render_value(&self, native_type: &str, value: &str) -> String {
        quote_if(self.requires_quoting(native_type), value)
    }

    /// Compile rows into one multi-row INSERT statement.
    ///
    /// `columns` pairs each column name with its native type. Absent or empty
    /// values become `NULL`; others go through [`render_value`](Self::render_value).
    /// Values are emitted as given: escaping is the caller's concern.
    /// Returns `None` for an empty row set.
    fn compile_insert(
        &self,
        table: &TableRef,
        columns: &[(String, String)],
        rows: &[Vec<Option<String>>],
    ) -> Option<String> {
        if rows.is_empty() {
            return None;
        }
        Some(format!(
            "INSERT INTO {} ({}) VALUES {};",
            self.qualify_table(table),
            quoted_columns(self, columns),
            render_rows(self, columns, rows)
        ))
    }
}

/// Wrap `value` in single quotes when `quote` is set.
pub fn quote_if(quote: bool, value: &str) -> String {
    if quote {
        format!("'{}'", value)
    } else {
        value.to_string()
    }
}

/// Comma-separated quoted column list.
pub fn quoted_columns<D: Dialect + ?Sized>(dialect: &D, columns: &[(String, String)]) -> String {
    columns
        .iter()
        .map(|(name, _)| dialect.quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Row constructors `(a, b),(c, d)` for an INSERT.
pub fn render_rows<D: Dialect + ?Sized>(
    dialect: &D,
    columns: &[(String, String)],
    rows: &[Vec<Option<String>>],
) -> String {
    rows.iter()
        .map(|row| {
            let cells = row
                .iter()
                .enumerate()
                .map(|(i, cell)| match cell.as_deref() {
                    None | Some("") => "NULL".to_string(),
                    Some(v) => match columns.get(i) {
                        Some((_, ty)) => dialect.render_value(ty, v),
                        None => quote_if(true, v),
                    },
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", cells)
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Normalize a native type name for quoting lookups.
///
/// Trims, lower-cases, drops any precision suffix such as `(10,2)` and
/// collapses internal whitespace.
pub fn normalize_type_name(native_type: &str) -> String {
    let base = match native_type.find('(') {
        Some(idx) => &native_type[..idx],
        None => native_type,
    };
    base.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One live database connection.
///
/// All operations take `&mut self`: a connector is owned by a single request
/// and used sequentially. Dropping a connector releases its connection.
#[async_trait]
pub trait Connector: Send {
    /// Engine behind this connection.
    fn engine(&self) -> EngineType;

    /// SQL dialect matching this connection.
    fn dialect(&self) -> DialectImpl {
        DialectImpl::for_engine(self.engine())
    }

    /// Execute a statement and return its first result set.
    async fn execute(&mut self, sql: &str) -> Result<QueryResult>;

    /// Execute a statement and return the number of affected rows.
    async fn execute_non_query(&mut self, sql: &str) -> Result<u64>;

    /// Bind a statement to this connection.
    fn create_command(&mut self, sql: &str) -> Command<'_, Self>
    where
        Self: Sized,
    {
        Command::new(self, sql)
    }

    /// Start a transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Commit the current transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the current transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// Current command timeout.
    fn command_timeout(&self) -> Duration;

    /// Replace the command timeout for subsequent operations.
    fn set_command_timeout(&mut self, timeout: Duration);

    /// Close the connection. Later operations fail with a connection error.
    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_type_name() {
        assert_eq!(normalize_type_name("  NUMERIC(10, 2) "), "numeric");
        assert_eq!(normalize_type_name("Double   Precision"), "double precision");
        assert_eq!(normalize_type_name("varchar(max)"), "varchar");
    }

    #[test]
    fn test_table_ref_display() {
        assert_eq!(TableRef::qualified("dbo", "t").to_string(), "dbo.t");
        assert_eq!(TableRef::with_schema(Some(""), "t"), TableRef::new("t"));
    }
}
