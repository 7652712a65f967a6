//! Normalized schema model returned by introspection.
//!
//! These types are engine-agnostic: both catalog readers fill the same shapes,
//! and serde field names are the stable wire contract.

use serde::{Deserialize, Serialize};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Engine type name as reported by the catalog (e.g. `varchar`, `int4`).
    pub native_type_name: String,

    /// Maximum character length, when the type has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i32>,

    /// 1-based position within the owning table or routine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal_position: Option<i32>,

    /// Whether the column accepts NULL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_nullable: Option<bool>,

    /// Whether the column is part of the primary key.
    #[serde(default)]
    pub is_primary_key: bool,

    /// Whether the column references another table.
    #[serde(default)]
    pub is_foreign_key: bool,
}

impl ColumnDescriptor {
    /// Create a column with only a name and type.
    pub fn new(name: impl Into<String>, native_type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_type_name: native_type_name.into(),
            max_length: None,
            ordinal_position: None,
            is_nullable: None,
            is_primary_key: false,
            is_foreign_key: false,
        }
    }
}

/// Kind of table constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
}

impl ConstraintKind {
    /// Map a catalog constraint code to a kind.
    ///
    /// Accepts the `information_schema` spelling (`PRIMARY KEY`), the
    /// `pg_constraint.contype` letters and the `sys.objects.type` codes.
    pub fn from_catalog(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "PRIMARY KEY" | "P" | "PK" => Some(ConstraintKind::PrimaryKey),
            "FOREIGN KEY" | "F" | "FK" => Some(ConstraintKind::ForeignKey),
            "UNIQUE" | "U" | "UQ" => Some(ConstraintKind::Unique),
            "CHECK" | "C" => Some(ConstraintKind::Check),
            _ => None,
        }
    }
}

/// One (constraint, column) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintDescriptor {
    pub name: String,
    pub kind: ConstraintKind,
    pub source_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
}

/// Index metadata with key columns in index order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDescriptor {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
}

/// Base table with its columns, constraints and indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub constraints: Vec<ConstraintDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
}

impl TableDescriptor {
    /// Primary key column names, in column order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Look up a column by name, ignoring case.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// View and its output columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// Stored procedure or function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineDescriptor {
    pub name: String,

    /// `FUNCTION` or `PROCEDURE` when the catalog reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routine_type: Option<String>,

    pub parameters: Vec<ColumnDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
}

/// One object in a schema, tagged by kind on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SchemaObject {
    Table(TableDescriptor),
    View(ViewDescriptor),
    Routine(RoutineDescriptor),
}

impl SchemaObject {
    /// Object name regardless of kind.
    pub fn name(&self) -> &str {
        match self {
            SchemaObject::Table(t) => &t.name,
            SchemaObject::View(v) => &v.name,
            SchemaObject::Routine(r) => &r.name,
        }
    }
}

/// A named schema and its objects in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaEntry {
    pub name: String,
    pub objects: Vec<SchemaObject>,
}

/// Complete schema snapshot of one database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaModel {
    pub schemas: Vec<SchemaEntry>,
}

impl SchemaModel {
    /// True when the database has no user objects.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Find a schema by name.
    pub fn schema(&self, name: &str) -> Option<&SchemaEntry> {
        self.schemas.iter().find(|s| s.name == name)
    }

    /// Find a table by schema and name.
    pub fn table(&self, schema: &str, name: &str) -> Option<&TableDescriptor> {
        self.schema(schema)?.objects.iter().find_map(|o| match o {
            SchemaObject::Table(t) if t.name == name => Some(t),
            _ => None,
        })
    }

    /// Iterate over every table in every schema.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableDescriptor)> {
        self.schemas.iter().flat_map(|s| {
            s.objects.iter().filter_map(move |o| match o {
                SchemaObject::Table(t) => Some((s.name.as_str(), t)),
                _ => None,
            })
        })
    }
}

/// A database name annotated by an access policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseEntry {
    pub name: String,
    pub allowed: bool,
}
