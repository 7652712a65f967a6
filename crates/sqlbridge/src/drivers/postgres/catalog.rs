//! PostgreSQL catalog queries.
//!
//! Every query returns the column names the shared schema assembler expects,
//! with identifiers cast to `text` so the result cells are plain strings.

use crate::core::traits::TableRef;
use crate::introspect::CatalogQueries;

const USER_SCHEMA_FILTER: &str = "NOT IN ('pg_catalog', 'information_schema')";

/// Catalog queries for PostgreSQL.
pub const QUERIES: CatalogQueries = CatalogQueries {
    objects: r#"
        SELECT table_schema::text AS schema_name,
               table_name::text AS object_name,
               CASE table_type WHEN 'VIEW' THEN 'view' ELSE 'table' END AS object_kind
        FROM information_schema.tables
        WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
          AND table_schema NOT LIKE 'pg_toast%'
          AND table_schema NOT LIKE 'pg_temp%'
          AND table_type IN ('BASE TABLE', 'VIEW')
        ORDER BY table_schema, table_name
    "#,
    columns: r#"
        SELECT c.table_schema::text AS schema_name,
               c.table_name::text AS table_name,
               c.column_name::text AS column_name,
               c.udt_name::text AS data_type,
               c.character_maximum_length::int4 AS max_length,
               c.ordinal_position::int4 AS ordinal_position,
               c.is_nullable::text AS is_nullable
        FROM information_schema.columns c
        WHERE c.table_schema NOT IN ('pg_catalog', 'information_schema')
          AND c.table_schema NOT LIKE 'pg_toast%'
          AND c.table_schema NOT LIKE 'pg_temp%'
        ORDER BY c.table_schema, c.table_name, c.ordinal_position
    "#,
    constraints: r#"
        SELECT n.nspname::text AS schema_name,
               cl.relname::text AS table_name,
               con.conname::text AS constraint_name,
               con.contype::text AS constraint_type,
               a.attname::text AS column_name,
               fcl.relname::text AS target_table,
               fa.attname::text AS target_column
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class cl ON cl.oid = con.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = cl.relnamespace
        LEFT JOIN LATERAL unnest(con.conkey, con.confkey)
             WITH ORDINALITY AS k(attnum, fattnum, ord) ON true
        LEFT JOIN pg_catalog.pg_attribute a
             ON a.attrelid = con.conrelid AND a.attnum = k.attnum
        LEFT JOIN pg_catalog.pg_class fcl ON fcl.oid = con.confrelid
        LEFT JOIN pg_catalog.pg_attribute fa
             ON fa.attrelid = con.confrelid AND fa.attnum = k.fattnum
        WHERE con.contype IN ('p', 'f', 'u', 'c')
          AND n.nspname NOT IN ('pg_catalog', 'information_schema')
          AND n.nspname NOT LIKE 'pg_toast%'
        ORDER BY n.nspname, cl.relname, con.conname, k.ord
    "#,
    indexes: r#"
        SELECT n.nspname::text AS schema_name,
               t.relname::text AS table_name,
               i.relname::text AS index_name,
               a.attname::text AS column_name,
               k.ord::int4 AS key_ordinal,
               ix.indisunique AS is_unique,
               ix.indisprimary AS is_primary
        FROM pg_catalog.pg_index ix
        JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
        JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
        LEFT JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
        WHERE n.nspname NOT IN ('pg_catalog', 'information_schema')
          AND n.nspname NOT LIKE 'pg_toast%'
        ORDER BY n.nspname, t.relname, i.relname, k.ord
    "#,
    routines: r#"
        SELECT r.routine_schema::text AS schema_name,
               r.routine_name::text AS routine_name,
               r.specific_name::text AS routine_key,
               r.routine_type::text AS routine_type,
               r.data_type::text AS return_type
        FROM information_schema.routines r
        WHERE r.routine_schema NOT IN ('pg_catalog', 'information_schema')
        ORDER BY r.routine_schema, r.routine_name, r.specific_name
    "#,
    parameters: r#"
        SELECT p.specific_schema::text AS schema_name,
               p.specific_name::text AS routine_key,
               p.parameter_name::text AS parameter_name,
               p.udt_name::text AS data_type,
               p.character_maximum_length::int4 AS max_length,
               p.ordinal_position::int4 AS ordinal_position
        FROM information_schema.parameters p
        WHERE p.specific_schema NOT IN ('pg_catalog', 'information_schema')
        ORDER BY p.specific_schema, p.specific_name, p.ordinal_position
    "#,
    databases: r#"
        SELECT datname::text AS name
        FROM pg_catalog.pg_database
        WHERE NOT datistemplate
        ORDER BY datname
    "#,
};

/// Columns of one table, with key flags, in ordinal order.
///
/// An unqualified table resolves against `current_schema()`.
pub fn table_columns(table: &TableRef) -> String {
    let schema = match &table.schema {
        Some(s) => literal(s),
        None => "current_schema()".to_string(),
    };
    format!(
        r#"
        SELECT c.column_name::text AS column_name,
               c.udt_name::text AS data_type,
               c.character_maximum_length::int4 AS max_length,
               c.ordinal_position::int4 AS ordinal_position,
               c.is_nullable::text AS is_nullable,
               EXISTS (
                   SELECT 1
                   FROM information_schema.table_constraints tc
                   JOIN information_schema.key_column_usage k
                     ON k.constraint_schema = tc.constraint_schema
                    AND k.constraint_name = tc.constraint_name
                   WHERE tc.constraint_type = 'PRIMARY KEY'
                     AND tc.table_schema = c.table_schema
                     AND tc.table_name = c.table_name
                     AND k.column_name = c.column_name
               ) AS is_primary_key,
               EXISTS (
                   SELECT 1
                   FROM information_schema.table_constraints tc
                   JOIN information_schema.key_column_usage k
                     ON k.constraint_schema = tc.constraint_schema
                    AND k.constraint_name = tc.constraint_name
                   WHERE tc.constraint_type = 'FOREIGN KEY'
                     AND tc.table_schema = c.table_schema
                     AND tc.table_name = c.table_name
                     AND k.column_name = c.column_name
               ) AS is_foreign_key
        FROM information_schema.columns c
        WHERE c.table_schema = {} AND c.table_name = {}
          AND c.table_schema {}
        ORDER BY c.ordinal_position
        "#,
        schema,
        literal(&table.name),
        USER_SCHEMA_FILTER
    )
}

/// Single-quoted SQL string literal.
fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
