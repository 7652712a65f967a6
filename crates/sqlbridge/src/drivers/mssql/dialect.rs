//! MSSQL SQL dialect (Strategy pattern).
//!
//! Provides MSSQL-specific identifier quoting, literal quoting rules and
//! ADO connection-string timeout settings.

use crate::core::engine::EngineType;
use crate::core::traits::{
    normalize_type_name, quote_if, quoted_columns, render_rows, Dialect, TableRef, Timeouts,
};
use crate::core::value::decode_binary;

/// Type names whose values are emitted without single quotes.
const UNQUOTED_TYPES: &[&str] = &[
    "bit",
    "tinyint",
    "smallint",
    "int",
    "bigint",
    "decimal",
    "numeric",
    "money",
    "smallmoney",
    "float",
    "real",
];

/// Binary column types; marked cells compile to `0x` literals.
const BINARY_TYPES: &[&str] = &["binary", "varbinary", "image"];

/// Most row constructors SQL Server accepts in one `VALUES` clause.
pub const MAX_VALUES_ROWS: usize = 1000;

/// Microsoft SQL Server dialect implementation.
///
/// Implements the Strategy pattern for SQL syntax differences.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MSSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn engine(&self) -> EngineType {
        EngineType::SqlServer
    }

    fn quote_ident(&self, name: &str) -> String {
        // MSSQL uses square brackets for identifier quoting
        // Handle names that contain closing brackets by doubling them
        format!("[{}]", name.replace(']', "]]"))
    }

    fn requires_quoting(&self, native_type: &str) -> bool {
        !UNQUOTED_TYPES.contains(&normalize_type_name(native_type).as_str())
    }

    fn render_value(&self, native_type: &str, value: &str) -> String {
        let ty = normalize_type_name(native_type);
        if BINARY_TYPES.contains(&ty.as_str()) {
            if let Some(bytes) = decode_binary(value) {
                return format!("0x{}", hex::encode(bytes));
            }
        }
        quote_if(!UNQUOTED_TYPES.contains(&ty.as_str()), value)
    }

    /// Past [`MAX_VALUES_ROWS`] rows the constructors move into a derived
    /// table, which has no row cap.
    fn compile_insert(
        &self,
        table: &TableRef,
        columns: &[(String, String)],
        rows: &[Vec<Option<String>>],
    ) -> Option<String> {
        if rows.is_empty() {
            return None;
        }
        let cols = quoted_columns(self, columns);
        let values = render_rows(self, columns, rows);
        let target = self.qualify_table(table);
        if rows.len() <= MAX_VALUES_ROWS {
            return Some(format!("INSERT INTO {} ({}) VALUES {};", target, cols, values));
        }
        Some(format!(
            "INSERT INTO {} ({}) SELECT * FROM (VALUES {}) AS [v] ({});",
            target, cols, values, cols
        ))
    }

    fn with_timeouts(&self, connection_string: &str, timeouts: &Timeouts) -> String {
        let mut out = connection_string.trim_end().to_string();
        let mut push = |pair: String| {
            if !out.is_empty() && !out.ends_with(';') {
                out.push(';');
            }
            out.push_str(&pair);
        };

        if !ado_has_key(connection_string, &["connect timeout", "connection timeout"]) {
            push(format!("Connect Timeout={}", timeouts.connect.as_secs().max(1)));
        }
        if !ado_has_key(connection_string, &["command timeout"]) {
            push(format!("Command Timeout={}", timeouts.command.as_secs()));
        }
        out
    }
}

fn ado_has_key(s: &str, keys: &[&str]) -> bool {
    s.split(';').any(|pair| {
        let key = pair.split('=').next().unwrap_or_default().trim().to_lowercase();
        keys.contains(&key.as_str())
    })
}
