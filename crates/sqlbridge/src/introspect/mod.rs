//! Schema introspection over a live connector.
//!
//! Each engine supplies a [`CatalogQueries`] set whose result columns share
//! one naming scheme. [`SchemaIntrospector`] runs them through the connector
//! and hands the results to the shared assembler, so the model is built the
//! same way for both engines and rebuilt fresh on every call.

pub mod assemble;

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info};

use crate::core::engine::EngineType;
use crate::core::schema::{ColumnDescriptor, DatabaseEntry, SchemaModel};
use crate::core::traits::{Connector, TableRef};
use crate::drivers::{mssql, postgres};
use crate::error::{BridgeError, Result};

pub use assemble::CatalogSnapshot;

/// Catalog SQL for one engine.
///
/// Result column aliases:
///
/// - `objects`: schema_name, object_name, object_kind (`table` | `view`)
/// - `columns`: schema_name, table_name, column_name, data_type, max_length,
///   ordinal_position, is_nullable
/// - `constraints`: schema_name, table_name, constraint_name,
///   constraint_type, column_name, target_table, target_column
/// - `indexes`: schema_name, table_name, index_name, column_name,
///   key_ordinal, is_unique, is_primary
/// - `routines`: schema_name, routine_name, routine_key, routine_type,
///   return_type
/// - `parameters`: schema_name, routine_key, parameter_name, data_type,
///   max_length, ordinal_position
/// - `databases`: name
#[derive(Debug, Clone, Copy)]
pub struct CatalogQueries {
    pub objects: &'static str,
    pub columns: &'static str,
    pub constraints: &'static str,
    pub indexes: &'static str,
    pub routines: &'static str,
    pub parameters: &'static str,
    pub databases: &'static str,
}

impl CatalogQueries {
    pub fn for_engine(engine: EngineType) -> &'static CatalogQueries {
        match engine {
            EngineType::Postgres => &postgres::catalog::QUERIES,
            EngineType::SqlServer => &mssql::catalog::QUERIES,
        }
    }
}

/// Catalog query for the columns of a single table.
pub fn table_columns_sql(engine: EngineType, table: &TableRef) -> String {
    match engine {
        EngineType::Postgres => postgres::catalog::table_columns(table),
        EngineType::SqlServer => mssql::catalog::table_columns(table),
    }
}

/// Reads engine catalogs into the normalized schema model.
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Describe every user schema of the connected database.
    ///
    /// An empty database yields an empty model.
    pub async fn describe<C: Connector + ?Sized>(connector: &mut C) -> Result<SchemaModel> {
        let start = Instant::now();
        let queries = CatalogQueries::for_engine(connector.engine());

        let snapshot = CatalogSnapshot {
            objects: connector.execute(queries.objects).await?,
            columns: connector.execute(queries.columns).await?,
            constraints: connector.execute(queries.constraints).await?,
            indexes: connector.execute(queries.indexes).await?,
            routines: connector.execute(queries.routines).await?,
            parameters: connector.execute(queries.parameters).await?,
        };
        debug!(
            "Loaded catalog: {} objects, {} columns, {} constraint rows, {} index rows, {} routines",
            snapshot.objects.rows.len(),
            snapshot.columns.rows.len(),
            snapshot.constraints.rows.len(),
            snapshot.indexes.rows.len(),
            snapshot.routines.rows.len()
        );

        let model = assemble::assemble(&snapshot)?;
        info!(
            "Described {} schemas in {:?}",
            model.schemas.len(),
            start.elapsed()
        );
        Ok(model)
    }

    /// Names of the databases on the server, in catalog order.
    pub async fn describe_database_names<C: Connector + ?Sized>(
        connector: &mut C,
    ) -> Result<Vec<String>> {
        let queries = CatalogQueries::for_engine(connector.engine());
        let result = connector.execute(queries.databases).await?;
        assemble::database_names(&result)
    }

    /// Columns of one table in ordinal order, with key flags.
    ///
    /// A table with no visible columns is a schema error.
    pub async fn table_columns<C: Connector + ?Sized>(
        connector: &mut C,
        table: &TableRef,
    ) -> Result<Vec<ColumnDescriptor>> {
        let sql = table_columns_sql(connector.engine(), table);
        let result = connector.execute(&sql).await?;
        let columns = assemble::table_columns(&result)?;
        if columns.is_empty() {
            return Err(BridgeError::Schema(format!(
                "table '{}' does not exist or has no visible columns",
                table
            )));
        }
        Ok(columns)
    }
}

/// Decides which databases a caller may use.
pub trait DatabaseAccessPolicy: Send + Sync {
    fn is_allowed(&self, database: &str) -> bool;
}

/// Every database is allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl DatabaseAccessPolicy for AllowAll {
    fn is_allowed(&self, _database: &str) -> bool {
        true
    }
}

/// Only the listed databases are allowed. Names compare case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    names: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }
}

impl DatabaseAccessPolicy for AllowList {
    fn is_allowed(&self, database: &str) -> bool {
        self.names.contains(&database.to_lowercase())
    }
}

/// Annotate database names with the policy's decision, keeping their order.
pub fn annotate_databases(
    names: &[String],
    policy: &dyn DatabaseAccessPolicy,
) -> Vec<DatabaseEntry> {
    names
        .iter()
        .map(|name| DatabaseEntry {
            name: name.clone(),
            allowed: policy.is_allowed(name),
        })
        .collect()
}
