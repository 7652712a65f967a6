//! Uniform query result model.

use serde::{Deserialize, Serialize};

/// Column header of a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultColumn {
    pub name: String,
    pub native_type_name: String,
}

impl ResultColumn {
    pub fn new(name: impl Into<String>, native_type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_type_name: native_type_name.into(),
        }
    }
}

/// Text-only result of one statement.
///
/// Every row holds exactly `columns.len()` cells in column order. SQL NULL is
/// `None`; binary payloads carry the [`BINARY_MARKER`](super::value::BINARY_MARKER)
/// prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Vec<Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_affected: Option<u64>,
    pub elapsed_time_ms: u64,
}

impl QueryResult {
    /// Result of a statement that returns no rows.
    pub fn affected(records: u64) -> Self {
        Self {
            records_affected: Some(records),
            ..Default::default()
        }
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Cell accessor by row and column index.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col)?.as_deref()
    }
}
