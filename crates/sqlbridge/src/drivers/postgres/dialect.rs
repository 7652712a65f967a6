//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Provides PostgreSQL-specific identifier quoting, literal quoting rules and
//! connection-string timeout settings.

use crate::core::engine::EngineType;
use crate::core::traits::{normalize_type_name, quote_if, Dialect, Timeouts};
use crate::core::value::decode_binary;

/// Type names whose values are emitted without single quotes.
const UNQUOTED_TYPES: &[&str] = &[
    "smallint",
    "integer",
    "int",
    "bigint",
    "int2",
    "int4",
    "int8",
    "smallserial",
    "serial",
    "bigserial",
    "serial2",
    "serial4",
    "serial8",
    "decimal",
    "numeric",
    "real",
    "double precision",
    "float4",
    "float8",
    "boolean",
    "bool",
    "oid",
];

/// Float spellings that are only valid as quoted input.
const NON_FINITE: &[&str] = &["nan", "infinity", "-infinity", "inf", "-inf", "+infinity", "+inf"];

/// PostgreSQL dialect implementation.
///
/// Implements the Strategy pattern for SQL syntax differences.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn engine(&self) -> EngineType {
        EngineType::Postgres
    }

    fn quote_ident(&self, name: &str) -> String {
        // PostgreSQL uses double quotes for identifier quoting
        // Handle names that contain double quotes by doubling them
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn requires_quoting(&self, native_type: &str) -> bool {
        !UNQUOTED_TYPES.contains(&normalize_type_name(native_type).as_str())
    }

    fn render_value(&self, native_type: &str, value: &str) -> String {
        let ty = normalize_type_name(native_type);
        if ty == "bytea" {
            if let Some(bytes) = decode_binary(value) {
                return format!("'\\x{}'::bytea", hex::encode(bytes));
            }
        }
        let quote = !UNQUOTED_TYPES.contains(&ty.as_str())
            || NON_FINITE.contains(&value.trim().to_lowercase().as_str());
        quote_if(quote, value)
    }

    fn with_timeouts(&self, connection_string: &str, timeouts: &Timeouts) -> String {
        let connect_secs = timeouts.connect.as_secs().max(1);
        let statement_ms = timeouts.command.as_millis();

        if is_url(connection_string) {
            let mut params = Vec::new();
            if !url_has_param(connection_string, "connect_timeout") {
                params.push(format!("connect_timeout={}", connect_secs));
            }
            if !url_has_param(connection_string, "options") {
                params.push(format!("options=-c%20statement_timeout%3D{}", statement_ms));
            }
            if params.is_empty() {
                return connection_string.to_string();
            }
            let sep = if connection_string.contains('?') {
                "&"
            } else {
                "?"
            };
            format!("{}{}{}", connection_string, sep, params.join("&"))
        } else {
            let mut out = connection_string.trim_end().to_string();
            if !kv_has_key(connection_string, "connect_timeout") {
                push_kv(&mut out, &format!("connect_timeout={}", connect_secs));
            }
            if !kv_has_key(connection_string, "options") {
                push_kv(
                    &mut out,
                    &format!("options='-c statement_timeout={}'", statement_ms),
                );
            }
            out
        }
    }
}

fn is_url(s: &str) -> bool {
    let lower = s.trim_start().to_lowercase();
    lower.starts_with("postgres://") || lower.starts_with("postgresql://")
}

fn url_has_param(url: &str, key: &str) -> bool {
    match url.split_once('?') {
        Some((_, query)) => query
            .split('&')
            .any(|pair| pair.split('=').next().unwrap_or_default().eq_ignore_ascii_case(key)),
        None => false,
    }
}

fn kv_has_key(s: &str, key: &str) -> bool {
    s.split_whitespace().any(|token| {
        token
            .split('=')
            .next()
            .map(|k| k.trim().eq_ignore_ascii_case(key))
            .unwrap_or(false)
    })
}

fn push_kv(out: &mut String, pair: &str) {
    if !out.is_empty() {
        out.push(' ');
    }
    out.push_str(pair);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::TableRef;
    use std::time::Duration;

    fn timeouts() -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(10),
            command: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_quote_ident() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_ident("name"), "\"name\"");
        assert_eq!(dialect.quote_ident("table\"name"), "\"table\"\"name\"");
        assert_eq!(dialect.quote_ident("Users"), "\"Users\"");
    }

    #[test]
    fn test_requires_quoting_table() {
        let dialect = PostgresDialect::new();
        for ty in UNQUOTED_TYPES {
            assert!(!dialect.requires_quoting(ty), "{} should be unquoted", ty);
        }
        let quoted = [
            "text", "varchar", "uuid", "date", "timestamp", "bytea", "jsonb", "money",
            "smallmoney", "bit", "tinyint",
        ];
        for ty in quoted {
            assert!(dialect.requires_quoting(ty), "{} should be quoted", ty);
        }
    }

    #[test]
    fn test_requires_quoting_normalizes_names() {
        let dialect = PostgresDialect::new();
        assert!(!dialect.requires_quoting("NUMERIC(10,2)"));
        assert!(!dialect.requires_quoting("  Double Precision "));
        assert!(dialect.requires_quoting("character varying(255)"));
    }

    #[test]
    fn test_compile_insert() {
        let dialect = PostgresDialect::new();
        let cols = vec![
            ("id".to_string(), "int4".to_string()),
            ("name".to_string(), "text".to_string()),
            ("active".to_string(), "bool".to_string()),
        ];
        let rows = vec![
            vec![Some("1".into()), Some("alice".into()), Some("true".into())],
            vec![Some("2".into()), None, Some("".into())],
        ];
        let sql = dialect
            .compile_insert(&TableRef::qualified("public", "users"), &cols, &rows)
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"users\" (\"id\", \"name\", \"active\") \
             VALUES (1, 'alice', true),(2, NULL, NULL);"
        );
    }

    #[test]
    fn test_compile_insert_does_not_escape_values() {
        let dialect = PostgresDialect::new();
        let cols = vec![("name".to_string(), "text".to_string())];
        let rows = vec![vec![Some("O'Brien".into())]];
        let sql = dialect
            .compile_insert(&TableRef::new("t"), &cols, &rows)
            .unwrap();
        assert_eq!(sql, "INSERT INTO \"t\" (\"name\") VALUES ('O'Brien');");
    }

    #[test]
    fn test_render_value() {
        let dialect = PostgresDialect::new();
        let cases = [
            ("bytea", "base64:AQI=", "'\\x0102'::bytea"),
            ("bytea", "base64:", "'\\x'::bytea"),
            ("bytea", "\\x0102", "'\\x0102'"),
            ("float8", "NaN", "'NaN'"),
            ("real", "-Infinity", "'-Infinity'"),
            ("numeric(10,2)", "nan", "'nan'"),
            ("float8", "1.5", "1.5"),
            ("text", "base64:AQI=", "'base64:AQI='"),
        ];
        for (ty, value, expected) in cases {
            assert_eq!(dialect.render_value(ty, value), expected, "{} {}", ty, value);
        }
    }

    #[test]
    fn test_compile_insert_binary_column() {
        let dialect = PostgresDialect::new();
        let cols = vec![
            ("id".to_string(), "int4".to_string()),
            ("payload".to_string(), "bytea".to_string()),
        ];
        let rows = vec![vec![Some("1".into()), Some("base64:3q2+7w==".into())]];
        let sql = dialect
            .compile_insert(&TableRef::new("blobs"), &cols, &rows)
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"blobs\" (\"id\", \"payload\") VALUES (1, '\\xdeadbeef'::bytea);"
        );
    }

    #[test]
    fn test_compile_insert_empty_chunk() {
        let dialect = PostgresDialect::new();
        let cols = vec![("id".to_string(), "int4".to_string())];
        assert!(dialect.compile_insert(&TableRef::new("t"), &cols, &[]).is_none());
    }

    #[test]
    fn test_with_timeouts_key_value() {
        let dialect = PostgresDialect::new();
        let out = dialect.with_timeouts("host=localhost dbname=app", &timeouts());
        assert_eq!(
            out,
            "host=localhost dbname=app connect_timeout=10 options='-c statement_timeout=30000'"
        );
    }

    #[test]
    fn test_with_timeouts_keeps_existing_keys() {
        let dialect = PostgresDialect::new();
        let out = dialect.with_timeouts("host=db connect_timeout=3", &timeouts());
        assert_eq!(
            out,
            "host=db connect_timeout=3 options='-c statement_timeout=30000'"
        );
    }

    #[test]
    fn test_with_timeouts_url() {
        let dialect = PostgresDialect::new();
        let out = dialect.with_timeouts("postgres://u:p@db/app", &timeouts());
        assert_eq!(
            out,
            "postgres://u:p@db/app?connect_timeout=10&options=-c%20statement_timeout%3D30000"
        );
        let out = dialect.with_timeouts("postgresql://db/app?sslmode=require", &timeouts());
        assert!(out.starts_with("postgresql://db/app?sslmode=require&connect_timeout=10"));
    }
}
