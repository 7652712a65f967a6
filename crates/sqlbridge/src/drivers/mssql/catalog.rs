//! SQL Server catalog queries.
//!
//! Column aliases match the PostgreSQL queries so one assembler handles both.

use crate::core::traits::TableRef;
use crate::introspect::CatalogQueries;

/// Catalog queries for SQL Server.
pub const QUERIES: CatalogQueries = CatalogQueries {
    objects: r#"
        SELECT s.name AS schema_name,
               o.name AS object_name,
               CASE o.type WHEN 'V' THEN 'view' ELSE 'table' END AS object_kind
        FROM sys.objects o
        JOIN sys.schemas s ON s.schema_id = o.schema_id
        WHERE o.type IN ('U', 'V')
          AND o.is_ms_shipped = 0
          AND s.name NOT IN ('sys', 'INFORMATION_SCHEMA')
        ORDER BY s.name, o.name
    "#,
    columns: r#"
        SELECT c.TABLE_SCHEMA AS schema_name,
               c.TABLE_NAME AS table_name,
               c.COLUMN_NAME AS column_name,
               c.DATA_TYPE AS data_type,
               c.CHARACTER_MAXIMUM_LENGTH AS max_length,
               c.ORDINAL_POSITION AS ordinal_position,
               c.IS_NULLABLE AS is_nullable
        FROM INFORMATION_SCHEMA.COLUMNS c
        WHERE c.TABLE_SCHEMA NOT IN ('sys', 'INFORMATION_SCHEMA')
        ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION
    "#,
    constraints: r#"
        SELECT schema_name, table_name, constraint_name, constraint_type,
               column_name, target_table, target_column
        FROM (
            SELECT s.name AS schema_name, t.name AS table_name, kc.name AS constraint_name,
                   kc.type AS constraint_type, c.name AS column_name,
                   CAST(NULL AS sysname) AS target_table, CAST(NULL AS sysname) AS target_column,
                   ic.key_ordinal AS ord
            FROM sys.key_constraints kc
            JOIN sys.tables t ON t.object_id = kc.parent_object_id
            JOIN sys.schemas s ON s.schema_id = t.schema_id
            JOIN sys.index_columns ic
              ON ic.object_id = kc.parent_object_id AND ic.index_id = kc.unique_index_id
            JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
            WHERE t.is_ms_shipped = 0
            UNION ALL
            SELECT s.name, t.name, fk.name, 'F', pc.name, rt.name, rc.name,
                   fkc.constraint_column_id
            FROM sys.foreign_keys fk
            JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
            JOIN sys.tables t ON t.object_id = fk.parent_object_id
            JOIN sys.schemas s ON s.schema_id = t.schema_id
            JOIN sys.columns pc
              ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
            JOIN sys.tables rt ON rt.object_id = fkc.referenced_object_id
            JOIN sys.columns rc
              ON rc.object_id = fkc.referenced_object_id
             AND rc.column_id = fkc.referenced_column_id
            WHERE t.is_ms_shipped = 0
            UNION ALL
            SELECT s.name, t.name, cc.name, 'C', c.name, NULL, NULL, 1
            FROM sys.check_constraints cc
            JOIN sys.tables t ON t.object_id = cc.parent_object_id
            JOIN sys.schemas s ON s.schema_id = t.schema_id
            LEFT JOIN sys.columns c
              ON c.object_id = cc.parent_object_id AND c.column_id = cc.parent_column_id
            WHERE t.is_ms_shipped = 0
        ) x
        ORDER BY schema_name, table_name, constraint_name, ord
    "#,
    indexes: r#"
        SELECT s.name AS schema_name,
               t.name AS table_name,
               i.name AS index_name,
               c.name AS column_name,
               ic.key_ordinal AS key_ordinal,
               i.is_unique AS is_unique,
               i.is_primary_key AS is_primary
        FROM sys.indexes i
        JOIN sys.tables t ON t.object_id = i.object_id
        JOIN sys.schemas s ON s.schema_id = t.schema_id
        JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
        JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
        WHERE i.type > 0
          AND ic.is_included_column = 0
          AND t.is_ms_shipped = 0
        ORDER BY s.name, t.name, i.name, ic.key_ordinal
    "#,
    routines: r#"
        SELECT s.name AS schema_name,
               o.name AS routine_name,
               CAST(o.object_id AS varchar(20)) AS routine_key,
               CASE WHEN o.type = 'P' THEN 'PROCEDURE' ELSE 'FUNCTION' END AS routine_type,
               r.DATA_TYPE AS return_type
        FROM sys.objects o
        JOIN sys.schemas s ON s.schema_id = o.schema_id
        LEFT JOIN INFORMATION_SCHEMA.ROUTINES r
          ON r.SPECIFIC_SCHEMA = s.name AND r.SPECIFIC_NAME = o.name
        WHERE o.type IN ('P', 'FN', 'IF', 'TF')
          AND o.is_ms_shipped = 0
        ORDER BY s.name, o.name
    "#,
    parameters: r#"
        SELECT s.name AS schema_name,
               CAST(p.object_id AS varchar(20)) AS routine_key,
               p.name AS parameter_name,
               t.name AS data_type,
               CASE
                   WHEN p.max_length = -1 THEN -1
                   WHEN t.name IN ('nchar', 'nvarchar') THEN p.max_length / 2
                   WHEN t.name IN ('char', 'varchar', 'binary', 'varbinary') THEN p.max_length
                   ELSE NULL
               END AS max_length,
               p.parameter_id AS ordinal_position
        FROM sys.parameters p
        JOIN sys.objects o ON o.object_id = p.object_id
        JOIN sys.schemas s ON s.schema_id = o.schema_id
        JOIN sys.types t ON t.user_type_id = p.user_type_id
        WHERE o.type IN ('P', 'FN', 'IF', 'TF')
          AND o.is_ms_shipped = 0
          AND p.parameter_id > 0
        ORDER BY s.name, p.object_id, p.parameter_id
    "#,
    databases: r#"
        SELECT name
        FROM sys.databases
        ORDER BY name
    "#,
};

/// Columns of one table, with key flags, in ordinal order.
///
/// An unqualified table resolves against the caller's default schema.
pub fn table_columns(table: &TableRef) -> String {
    let schema = match &table.schema {
        Some(s) => literal(s),
        None => "SCHEMA_NAME()".to_string(),
    };
    format!(
        r#"
        SELECT c.COLUMN_NAME AS column_name,
               c.DATA_TYPE AS data_type,
               c.CHARACTER_MAXIMUM_LENGTH AS max_length,
               c.ORDINAL_POSITION AS ordinal_position,
               c.IS_NULLABLE AS is_nullable,
               CASE WHEN EXISTS (
                   SELECT 1
                   FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
                   JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k
                     ON k.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
                    AND k.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
                   WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
                     AND tc.TABLE_SCHEMA = c.TABLE_SCHEMA
                     AND tc.TABLE_NAME = c.TABLE_NAME
                     AND k.COLUMN_NAME = c.COLUMN_NAME
               ) THEN 1 ELSE 0 END AS is_primary_key,
               CASE WHEN EXISTS (
                   SELECT 1
                   FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
                   JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE k
                     ON k.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
                    AND k.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
                   WHERE tc.CONSTRAINT_TYPE = 'FOREIGN KEY'
                     AND tc.TABLE_SCHEMA = c.TABLE_SCHEMA
                     AND tc.TABLE_NAME = c.TABLE_NAME
                     AND k.COLUMN_NAME = c.COLUMN_NAME
               ) THEN 1 ELSE 0 END AS is_foreign_key
        FROM INFORMATION_SCHEMA.COLUMNS c
        WHERE c.TABLE_SCHEMA = {} AND c.TABLE_NAME = {}
        ORDER BY c.ORDINAL_POSITION
        "#,
        schema,
        literal(&table.name)
    )
}

/// Unicode string literal.
fn literal(s: &str) -> String {
    format!("N'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_columns_literals() {
        let sql = table_columns(&TableRef::qualified("dbo", "Order's"));
        assert!(sql.contains("c.TABLE_SCHEMA = N'dbo'"));
        assert!(sql.contains("c.TABLE_NAME = N'Order''s'"));
        let sql = table_columns(&TableRef::new("Orders"));
        assert!(sql.contains("c.TABLE_SCHEMA = SCHEMA_NAME()"));
    }
}
