//! Builds a [`SchemaModel`] from normalized catalog result sets.
//!
//! Both engines' catalog queries return the same column aliases, so this is
//! the only place that knows how catalog rows become descriptors.

use std::collections::HashMap;

use tracing::debug;

use crate::core::result::QueryResult;
use crate::core::schema::{
    ColumnDescriptor, ConstraintDescriptor, ConstraintKind, IndexDescriptor, RoutineDescriptor,
    SchemaEntry, SchemaModel, SchemaObject, TableDescriptor, ViewDescriptor,
};
use crate::error::{BridgeError, Result};

/// Raw catalog result sets for one database.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub objects: QueryResult,
    pub columns: QueryResult,
    pub constraints: QueryResult,
    pub indexes: QueryResult,
    pub routines: QueryResult,
    pub parameters: QueryResult,
}

/// Named-column view over a catalog result.
struct Catalog<'a> {
    result: &'a QueryResult,
    index: HashMap<String, usize>,
}

impl<'a> Catalog<'a> {
    fn new(result: &'a QueryResult) -> Self {
        let index = result
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.to_lowercase(), i))
            .collect();
        Self { result, index }
    }

    /// Fail early when a query did not return an expected alias.
    /// An empty result with no columns is accepted as "no rows".
    fn require(&self, what: &str, columns: &[&str]) -> Result<()> {
        if self.result.columns.is_empty() {
            return Ok(());
        }
        for col in columns {
            if !self.index.contains_key(*col) {
                return Err(BridgeError::Schema(format!(
                    "{} catalog result is missing column '{}'",
                    what, col
                )));
            }
        }
        Ok(())
    }

    fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.result.rows.iter().map(move |cells| Row {
            cells,
            index: &self.index,
        })
    }
}

struct Row<'a> {
    cells: &'a [Option<String>],
    index: &'a HashMap<String, usize>,
}

impl<'a> Row<'a> {
    fn text(&self, col: &str) -> Option<&'a str> {
        let i = *self.index.get(col)?;
        self.cells.get(i)?.as_deref()
    }

    fn owned(&self, col: &str) -> Option<String> {
        self.text(col).map(str::to_string)
    }

    fn int(&self, col: &str) -> Option<i32> {
        self.text(col)?.trim().parse().ok()
    }

    fn flag(&self, col: &str) -> Option<bool> {
        parse_flag(self.text(col)?)
    }
}

/// Interpret a catalog boolean rendered as text.
pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn column_from_row(row: &Row<'_>, name: String) -> ColumnDescriptor {
    ColumnDescriptor {
        name,
        native_type_name: row.owned("data_type").unwrap_or_default(),
        max_length: row.int("max_length"),
        ordinal_position: row.int("ordinal_position"),
        is_nullable: row.flag("is_nullable"),
        is_primary_key: row.flag("is_primary_key").unwrap_or(false),
        is_foreign_key: row.flag("is_foreign_key").unwrap_or(false),
    }
}

/// Stable sort by ordinal position; columns without one keep their place at
/// the end.
fn order_columns(columns: &mut [ColumnDescriptor]) {
    columns.sort_by_key(|c| c.ordinal_position.unwrap_or(i32::MAX));
}

/// Accumulates schemas and objects while preserving first-seen order.
#[derive(Default)]
struct ModelBuilder {
    schemas: Vec<SchemaEntry>,
    schema_pos: HashMap<String, usize>,
    object_pos: HashMap<(String, String), usize>,
    routine_pos: HashMap<(String, String), usize>,
}

impl ModelBuilder {
    fn schema_mut(&mut self, name: &str) -> usize {
        if let Some(&i) = self.schema_pos.get(name) {
            return i;
        }
        self.schemas.push(SchemaEntry {
            name: name.to_string(),
            objects: Vec::new(),
        });
        let i = self.schemas.len() - 1;
        self.schema_pos.insert(name.to_string(), i);
        i
    }

    fn push_object(&mut self, schema: &str, object: SchemaObject) {
        let s = self.schema_mut(schema);
        let key = (schema.to_string(), object.name().to_string());
        self.schemas[s].objects.push(object);
        self.object_pos.insert(key, self.schemas[s].objects.len() - 1);
    }

    fn push_routine(&mut self, schema: &str, key: String, routine: RoutineDescriptor) {
        let s = self.schema_mut(schema);
        self.schemas[s].objects.push(SchemaObject::Routine(routine));
        self.routine_pos
            .insert((schema.to_string(), key), self.schemas[s].objects.len() - 1);
    }

    fn object_mut(&mut self, schema: &str, name: &str) -> Option<&mut SchemaObject> {
        let s = *self.schema_pos.get(schema)?;
        let o = *self
            .object_pos
            .get(&(schema.to_string(), name.to_string()))?;
        self.schemas[s].objects.get_mut(o)
    }

    fn table_mut(&mut self, schema: &str, name: &str) -> Option<&mut TableDescriptor> {
        match self.object_mut(schema, name)? {
            SchemaObject::Table(t) => Some(t),
            _ => None,
        }
    }

    fn routine_mut(&mut self, schema: &str, key: &str) -> Option<&mut RoutineDescriptor> {
        let s = *self.schema_pos.get(schema)?;
        let o = *self
            .routine_pos
            .get(&(schema.to_string(), key.to_string()))?;
        match self.schemas[s].objects.get_mut(o)? {
            SchemaObject::Routine(r) => Some(r),
            _ => None,
        }
    }
}

/// Assemble the schema model from catalog result sets.
///
/// Objects keep catalog order, columns keep ordinal order and index keys keep
/// key order. Rows that reference unknown objects are ignored; views and
/// routines with partial metadata are kept with the missing fields absent.
pub fn assemble(snapshot: &CatalogSnapshot) -> Result<SchemaModel> {
    let mut builder = ModelBuilder::default();

    let objects = Catalog::new(&snapshot.objects);
    objects.require("object", &["schema_name", "object_name", "object_kind"])?;
    for row in objects.rows() {
        let (Some(schema), Some(name)) = (row.text("schema_name"), row.text("object_name")) else {
            continue;
        };
        let object = match row.text("object_kind").map(str::to_lowercase).as_deref() {
            Some("view") => SchemaObject::View(ViewDescriptor {
                name: name.to_string(),
                columns: Vec::new(),
            }),
            _ => SchemaObject::Table(TableDescriptor {
                name: name.to_string(),
                columns: Vec::new(),
                constraints: Vec::new(),
                indexes: Vec::new(),
            }),
        };
        builder.push_object(schema, object);
    }

    let columns = Catalog::new(&snapshot.columns);
    columns.require("column", &["schema_name", "table_name", "column_name", "data_type"])?;
    for row in columns.rows() {
        let (Some(schema), Some(table), Some(name)) = (
            row.text("schema_name"),
            row.text("table_name"),
            row.text("column_name"),
        ) else {
            continue;
        };
        let column = column_from_row(&row, name.to_string());
        match builder.object_mut(schema, table) {
            Some(SchemaObject::Table(t)) => t.columns.push(column),
            Some(SchemaObject::View(v)) => v.columns.push(column),
            _ => debug!("Ignoring column {}.{}.{}: no such object", schema, table, name),
        }
    }

    let constraints = Catalog::new(&snapshot.constraints);
    constraints.require(
        "constraint",
        &["schema_name", "table_name", "constraint_name", "constraint_type"],
    )?;
    for row in constraints.rows() {
        let (Some(schema), Some(table), Some(name)) = (
            row.text("schema_name"),
            row.text("table_name"),
            row.text("constraint_name"),
        ) else {
            continue;
        };
        let Some(kind) = row.text("constraint_type").and_then(ConstraintKind::from_catalog) else {
            continue;
        };
        let Some(t) = builder.table_mut(schema, table) else {
            continue;
        };
        let source_column = row.owned("column_name");
        if let Some(col) = &source_column {
            if let Some(c) = t.columns.iter_mut().find(|c| &c.name == col) {
                match kind {
                    ConstraintKind::PrimaryKey => c.is_primary_key = true,
                    ConstraintKind::ForeignKey => c.is_foreign_key = true,
                    _ => {}
                }
            }
        }
        t.constraints.push(ConstraintDescriptor {
            name: name.to_string(),
            kind,
            source_table: table.to_string(),
            source_column,
            target_table: row.owned("target_table"),
            target_column: row.owned("target_column"),
        });
    }

    let indexes = Catalog::new(&snapshot.indexes);
    indexes.require("index", &["schema_name", "table_name", "index_name"])?;
    for row in indexes.rows() {
        let (Some(schema), Some(table), Some(name)) = (
            row.text("schema_name"),
            row.text("table_name"),
            row.text("index_name"),
        ) else {
            continue;
        };
        let Some(t) = builder.table_mut(schema, table) else {
            continue;
        };
        let column = row.owned("column_name");
        match t.indexes.iter_mut().find(|i| i.name == name) {
            Some(index) => index.columns.extend(column),
            None => t.indexes.push(IndexDescriptor {
                name: name.to_string(),
                columns: column.into_iter().collect(),
                is_unique: row.flag("is_unique").unwrap_or(false),
                is_primary: row.flag("is_primary").unwrap_or(false),
            }),
        }
    }

    let routines = Catalog::new(&snapshot.routines);
    routines.require("routine", &["schema_name", "routine_name"])?;
    for row in routines.rows() {
        let (Some(schema), Some(name)) = (row.text("schema_name"), row.text("routine_name")) else {
            continue;
        };
        let key = row.owned("routine_key").unwrap_or_else(|| name.to_string());
        builder.push_routine(
            schema,
            key,
            RoutineDescriptor {
                name: name.to_string(),
                routine_type: row.owned("routine_type"),
                parameters: Vec::new(),
                return_type: row.owned("return_type"),
            },
        );
    }

    let parameters = Catalog::new(&snapshot.parameters);
    parameters.require("parameter", &["schema_name", "routine_key"])?;
    for row in parameters.rows() {
        let (Some(schema), Some(key)) = (row.text("schema_name"), row.text("routine_key")) else {
            continue;
        };
        let name = match (row.owned("parameter_name"), row.int("ordinal_position")) {
            (Some(n), _) => n,
            (None, Some(pos)) => format!("${}", pos),
            (None, None) => String::new(),
        };
        let param = column_from_row(&row, name);
        if let Some(r) = builder.routine_mut(schema, key) {
            r.parameters.push(param);
        }
    }

    for schema in &mut builder.schemas {
        for object in &mut schema.objects {
            match object {
                SchemaObject::Table(t) => order_columns(&mut t.columns),
                SchemaObject::View(v) => order_columns(&mut v.columns),
                SchemaObject::Routine(r) => order_columns(&mut r.parameters),
            }
        }
    }

    Ok(SchemaModel {
        schemas: builder.schemas,
    })
}

/// Columns of a single table from the `table_columns` catalog query.
pub fn table_columns(result: &QueryResult) -> Result<Vec<ColumnDescriptor>> {
    let catalog = Catalog::new(result);
    catalog.require("table column", &["column_name", "data_type"])?;
    let mut columns: Vec<ColumnDescriptor> = catalog
        .rows()
        .filter_map(|row| {
            let name = row.owned("column_name")?;
            Some(column_from_row(&row, name))
        })
        .collect();
    order_columns(&mut columns);
    Ok(columns)
}

/// Database names from the databases catalog query, in result order.
pub fn database_names(result: &QueryResult) -> Result<Vec<String>> {
    let catalog = Catalog::new(result);
    catalog.require("database", &["name"])?;
    Ok(catalog.rows().filter_map(|row| row.owned("name")).collect())
}
