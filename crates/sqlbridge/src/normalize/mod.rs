//! Conversion of native result cursors into the uniform [`QueryResult`].
//!
//! Drivers expose their decoded rows through [`NativeCursor`]; the normalizer
//! renders every value to text without reordering, deduplicating or
//! aggregating anything.

use crate::core::engine::EngineType;
use crate::core::result::{QueryResult, ResultColumn};
use crate::core::value::SqlValue;
use crate::error::{BridgeError, Result};

/// A forward-only cursor over typed native rows.
pub trait NativeCursor {
    /// Column metadata, available before the first row.
    fn columns(&self) -> &[ResultColumn];

    /// Next decoded row, `None` when exhausted.
    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>>;

    /// Rows affected, when the statement reported a count.
    fn records_affected(&self) -> Option<u64> {
        None
    }
}

/// Renders native cursors into text results.
#[derive(Debug, Clone, Copy)]
pub struct ResultNormalizer {
    engine: EngineType,
}

impl ResultNormalizer {
    pub fn new(engine: EngineType) -> Self {
        Self { engine }
    }

    /// Drain a cursor into a [`QueryResult`].
    ///
    /// `elapsed_time_ms` is left at zero; the caller owns the clock.
    pub fn normalize<C: NativeCursor + ?Sized>(&self, cursor: &mut C) -> Result<QueryResult> {
        let columns = cursor.columns().to_vec();
        let width = columns.len();
        let mut rows = Vec::new();

        while let Some(values) = cursor.next_row()? {
            if values.len() != width {
                return Err(BridgeError::execution(
                    format!(
                        "row {} has {} values but the result has {} columns",
                        rows.len(),
                        values.len(),
                        width
                    ),
                    None,
                    None,
                ));
            }
            rows.push(values.iter().map(|v| v.render(self.engine)).collect());
        }

        Ok(QueryResult {
            columns,
            rows,
            records_affected: cursor.records_affected(),
            elapsed_time_ms: 0,
        })
    }
}

/// Cursor over rows already held in memory.
#[derive(Debug, Clone)]
pub struct VecCursor {
    columns: Vec<ResultColumn>,
    rows: std::vec::IntoIter<Vec<SqlValue>>,
    records_affected: Option<u64>,
}

impl VecCursor {
    pub fn new(columns: Vec<ResultColumn>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
            records_affected: None,
        }
    }

    pub fn with_records_affected(mut self, n: u64) -> Self {
        self.records_affected = Some(n);
        self
    }
}

impl NativeCursor for VecCursor {
    fn columns(&self) -> &[ResultColumn] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>> {
        Ok(self.rows.next())
    }

    fn records_affected(&self) -> Option<u64> {
        self.records_affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn columns() -> Vec<ResultColumn> {
        vec![
            ResultColumn::new("id", "int"),
            ResultColumn::new("flag", "bit"),
            ResultColumn::new("payload", "varbinary"),
            ResultColumn::new("note", "nvarchar"),
        ]
    }

    #[test]
    fn test_normalize_preserves_order_and_nulls() {
        let mut cursor = VecCursor::new(
            columns(),
            vec![
                vec![
                    SqlValue::I32(2),
                    SqlValue::Bool(true),
                    SqlValue::Bytes(b"hi".to_vec()),
                    SqlValue::Null,
                ],
                vec![
                    SqlValue::I32(1),
                    SqlValue::Bool(false),
                    SqlValue::Null,
                    SqlValue::Text("x".into()),
                ],
            ],
        );

        let result = ResultNormalizer::new(EngineType::SqlServer)
            .normalize(&mut cursor)
            .unwrap();

        assert_eq!(result.column_names(), vec!["id", "flag", "payload", "note"]);
        assert_eq!(
            result.rows,
            vec![
                vec![
                    Some("2".to_string()),
                    Some("1".to_string()),
                    Some("base64:aGk=".to_string()),
                    None
                ],
                vec![
                    Some("1".to_string()),
                    Some("0".to_string()),
                    None,
                    Some("x".to_string())
                ],
            ]
        );
    }

    #[test]
    fn test_normalize_postgres_booleans_and_uuid() {
        let id = Uuid::nil();
        let mut cursor = VecCursor::new(
            vec![ResultColumn::new("ok", "bool"), ResultColumn::new("id", "uuid")],
            vec![vec![SqlValue::Bool(true), SqlValue::Uuid(id)]],
        )
        .with_records_affected(1);

        let result = ResultNormalizer::new(EngineType::Postgres)
            .normalize(&mut cursor)
            .unwrap();

        assert_eq!(result.cell(0, 0), Some("true"));
        assert_eq!(result.cell(0, 1), Some("00000000-0000-0000-0000-000000000000"));
        assert_eq!(result.records_affected, Some(1));
    }

    #[test]
    fn test_normalize_rejects_ragged_rows() {
        let mut cursor = VecCursor::new(columns(), vec![vec![SqlValue::I32(1)]]);
        let err = ResultNormalizer::new(EngineType::Postgres)
            .normalize(&mut cursor)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Execution { .. }));
    }

    #[test]
    fn test_normalize_empty_result() {
        let mut cursor = VecCursor::new(columns(), vec![]);
        let result = ResultNormalizer::new(EngineType::Postgres)
            .normalize(&mut cursor)
            .unwrap();
        assert_eq!(result.columns.len(), 4);
        assert!(result.rows.is_empty());
    }
}
