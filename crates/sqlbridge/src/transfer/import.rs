//! Chunked DSV import into one table.
//!
//! Records stream from a [`DsvReader`] into chunks of at most `chunk_size`
//! rows. Each chunk compiles to a single multi-row INSERT. Two failure
//! policies exist:
//!
//! - best effort (`rollback_on_error = false`): every chunk commits in its own
//!   transaction; a failed chunk is rolled back and replayed row by row so
//!   only the offending rows are lost
//! - all or nothing (`rollback_on_error = true`): one outer transaction wraps
//!   the whole import and the first failure rolls everything back

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::dsv::{DsvReader, SEPARATORS};
use super::sanitize::ValueSanitizer;
use crate::core::schema::ColumnDescriptor;
use crate::core::traits::{Connector, Dialect, TableRef};
use crate::error::{BridgeError, Result};
use crate::introspect::SchemaIntrospector;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const MAX_CHUNK_SIZE: usize = 10_000;

fn default_separator() -> char {
    ','
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_true() -> bool {
    true
}

/// Options for one import request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    /// Target table name.
    pub table: String,

    /// Target schema; the connection's default schema when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default = "default_separator")]
    pub separator: char,

    /// Rows per INSERT statement, 1 to 10000.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Honor `"` quoting in the input.
    #[serde(default, alias = "doubleQuotesEnabled")]
    pub double_quotes: bool,

    #[serde(default)]
    pub rollback_on_error: bool,

    /// Data records to discard after the header.
    #[serde(default)]
    pub rows_to_skip: u64,

    /// First record names the columns.
    #[serde(default = "default_true")]
    pub has_header: bool,
}

impl ImportOptions {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: None,
            separator: default_separator(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            double_quotes: false,
            rollback_on_error: false,
            rows_to_skip: 0,
            has_header: true,
        }
    }

    /// Check ranges and the separator set.
    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            return Err(BridgeError::Config("import table must not be empty".into()));
        }
        if !SEPARATORS.contains(&self.separator) {
            return Err(BridgeError::Config(format!(
                "separator {:?} is not one of ',', '\\t', ';'",
                self.separator
            )));
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(BridgeError::Config(format!(
                "chunk size must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        Ok(())
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::with_schema(self.schema.as_deref(), self.table.clone())
    }
}

/// Pipeline phase. Terminal phases double as the outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportPhase {
    Idle,
    Reading,
    Parsing,
    Compiling,
    Executing,
    Finished(ImportStatus),
}

/// How an import ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportStatus {
    /// Every row read was committed.
    Committed,
    /// Nothing was committed.
    RolledBack,
    /// Some rows were committed and some failed.
    PartiallyCommitted,
}

/// Result of one import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub total_rows_read: u64,
    pub rows_committed: u64,
    /// Failed rows keyed by 0-based data row index.
    pub per_row_errors: BTreeMap<u64, String>,
    pub status: ImportStatus,
    pub cancelled: bool,
    pub batches_executed: u64,
}

impl ImportOutcome {
    fn empty() -> Self {
        Self {
            total_rows_read: 0,
            rows_committed: 0,
            per_row_errors: BTreeMap::new(),
            status: ImportStatus::Committed,
            cancelled: false,
            batches_executed: 0,
        }
    }
}

/// Rows waiting for execution, with their data row indices.
#[derive(Default)]
struct Chunk {
    indices: Vec<u64>,
    rows: Vec<Vec<Option<String>>>,
}

impl Chunk {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn push(&mut self, index: u64, row: Vec<Option<String>>) {
        self.indices.push(index);
        self.rows.push(row);
    }

    fn clear(&mut self) {
        self.indices.clear();
        self.rows.clear();
    }
}

/// Counters for a running import.
#[derive(Default)]
struct Progress {
    /// Index the next data record gets.
    next_row: u64,
    /// Index of the first row not yet covered by an executed chunk.
    chunk_start: u64,
    committed: u64,
    batches: u64,
    errors: BTreeMap<u64, String>,
}

/// Streams DSV input into a table.
pub struct BulkImportPipeline {
    options: ImportOptions,
    sanitizer: Option<Arc<dyn ValueSanitizer>>,
    phase: ImportPhase,
}

impl BulkImportPipeline {
    /// Create a pipeline, validating the options.
    pub fn new(options: ImportOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            sanitizer: None,
            phase: ImportPhase::Idle,
        })
    }

    /// Apply `sanitizer` to every non-null value before compilation.
    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn ValueSanitizer>) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    fn transition(&mut self, next: ImportPhase) {
        if self.phase != next {
            trace!("Import phase {:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }

    /// Import `input`, resolving the target columns from the catalog.
    pub async fn import<C, R>(
        &mut self,
        connector: &mut C,
        input: R,
        cancel: &CancellationToken,
    ) -> Result<ImportOutcome>
    where
        C: Connector + ?Sized,
        R: AsyncRead + Unpin,
    {
        let table = self.options.table_ref();
        let columns = SchemaIntrospector::table_columns(connector, &table).await?;
        self.import_with_columns(connector, input, &columns, cancel)
            .await
    }

    /// Import `input` into a table whose columns are already known.
    ///
    /// `columns` must be in ordinal order; headerless input maps onto them
    /// positionally.
    pub async fn import_with_columns<C, R>(
        &mut self,
        connector: &mut C,
        input: R,
        columns: &[ColumnDescriptor],
        cancel: &CancellationToken,
    ) -> Result<ImportOutcome>
    where
        C: Connector + ?Sized,
        R: AsyncRead + Unpin,
    {
        let result = self.run(connector, input, columns, cancel).await;
        self.transition(ImportPhase::Idle);
        result
    }

    async fn run<C, R>(
        &mut self,
        connector: &mut C,
        input: R,
        columns: &[ColumnDescriptor],
        cancel: &CancellationToken,
    ) -> Result<ImportOutcome>
    where
        C: Connector + ?Sized,
        R: AsyncRead + Unpin,
    {
        let start = Instant::now();
        let opts = self.options.clone();
        let table = opts.table_ref();
        let dialect = connector.dialect();

        self.transition(ImportPhase::Reading);
        let mut reader = DsvReader::new(input, opts.separator, opts.double_quotes);

        let targets = if opts.has_header {
            loop {
                match reader.next_record().await? {
                    Some(header) if is_blank(&header) => continue,
                    Some(header) => break map_header(&header, columns, &table)?,
                    None => {
                        info!("Import into {}: input is empty", table);
                        return Ok(ImportOutcome::empty());
                    }
                }
            }
        } else {
            if columns.is_empty() {
                return Err(BridgeError::Schema(format!("table '{}' has no columns", table)));
            }
            columns
                .iter()
                .map(|c| (c.name.clone(), c.native_type_name.clone()))
                .collect::<Vec<_>>()
        };
        let width = targets.len();

        let mut skipped = 0u64;
        while skipped < opts.rows_to_skip && !cancel.is_cancelled() {
            match reader.next_record().await {
                Ok(Some(fields)) if width != 1 && is_blank(&fields) => {}
                Ok(Some(_)) | Err(BridgeError::Parse { .. }) => skipped += 1,
                Ok(None) => break,
                Err(e) => return Err(e),
            }
        }
        if skipped > 0 {
            debug!("Skipped {} leading rows", skipped);
        }

        if opts.rollback_on_error {
            connector.begin().await?;
        }

        let mut progress = Progress::default();
        let mut chunk = Chunk::default();
        let mut failure: Option<(u64, String)> = None;
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            self.transition(ImportPhase::Reading);
            let record = match reader.next_record().await {
                // A blank line is a NULL row only for a single-column target.
                Ok(Some(fields)) if width != 1 && is_blank(&fields) => continue,
                Ok(Some(fields)) => Ok(fields),
                Ok(None) => break,
                Err(BridgeError::Parse { message, .. }) => Err(message),
                Err(e) => return Err(self.abort(connector, e).await),
            };
            let index = progress.next_row;
            progress.next_row += 1;

            self.transition(ImportPhase::Parsing);
            match record.and_then(|fields| self.shape_row(fields, width)) {
                Ok(row) => chunk.push(index, row),
                Err(message) if opts.rollback_on_error => {
                    failure = Some((index, message));
                    break;
                }
                Err(message) => {
                    debug!("Row {} rejected: {}", index, message);
                    progress.errors.insert(index, message);
                }
            }

            if chunk.len() >= opts.chunk_size {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                if let Some(f) = self
                    .flush(connector, &dialect, &table, &targets, &chunk, &mut progress)
                    .await?
                {
                    failure = Some(f);
                    break;
                }
                chunk.clear();
                progress.chunk_start = progress.next_row;
            }
        }

        if !cancelled && failure.is_none() && !chunk.is_empty() {
            if let Some(f) = self
                .flush(connector, &dialect, &table, &targets, &chunk, &mut progress)
                .await?
            {
                failure = Some(f);
            }
            progress.chunk_start = progress.next_row;
        }

        let outcome = if opts.rollback_on_error {
            if failure.is_some() || cancelled {
                connector.rollback().await?;
                warn!(
                    "Import into {} rolled back{}",
                    table,
                    if cancelled { " after cancellation" } else { "" }
                );
                ImportOutcome {
                    total_rows_read: progress.next_row,
                    rows_committed: 0,
                    per_row_errors: failure.into_iter().collect(),
                    status: ImportStatus::RolledBack,
                    cancelled,
                    batches_executed: progress.batches,
                }
            } else {
                connector.commit().await?;
                ImportOutcome {
                    total_rows_read: progress.next_row,
                    rows_committed: progress.committed,
                    per_row_errors: BTreeMap::new(),
                    status: ImportStatus::Committed,
                    cancelled: false,
                    batches_executed: progress.batches,
                }
            }
        } else {
            let total = if cancelled {
                // Rows of the unexecuted chunk were never attempted.
                let cut = progress.chunk_start;
                progress.errors.retain(|row, _| *row < cut);
                cut
            } else {
                progress.next_row
            };
            let status = if progress.errors.is_empty() {
                ImportStatus::Committed
            } else if progress.committed > 0 {
                ImportStatus::PartiallyCommitted
            } else {
                ImportStatus::RolledBack
            };
            ImportOutcome {
                total_rows_read: total,
                rows_committed: progress.committed,
                per_row_errors: progress.errors,
                status,
                cancelled,
                batches_executed: progress.batches,
            }
        };

        self.transition(ImportPhase::Finished(outcome.status));
        info!(
            "Imported {} of {} rows into {} in {:?} ({} batches, {} errors{})",
            outcome.rows_committed,
            outcome.total_rows_read,
            table,
            start.elapsed(),
            outcome.batches_executed,
            outcome.per_row_errors.len(),
            if outcome.cancelled { ", cancelled" } else { "" }
        );
        Ok(outcome)
    }

    /// Turn raw fields into compiled-ready cells.
    fn shape_row(
        &self,
        fields: Vec<String>,
        width: usize,
    ) -> std::result::Result<Vec<Option<String>>, String> {
        if fields.len() != width {
            return Err(format!(
                "expected {} fields, found {}",
                width,
                fields.len()
            ));
        }
        Ok(fields
            .into_iter()
            .map(|f| {
                if f.is_empty() {
                    None
                } else {
                    Some(match &self.sanitizer {
                        Some(s) => s.sanitize(&f),
                        None => f,
                    })
                }
            })
            .collect())
    }

    /// Execute one chunk under the configured policy.
    ///
    /// Returns the failure to report when the all-or-nothing policy must
    /// stop. Connection errors always propagate.
    async fn flush<C, D>(
        &mut self,
        connector: &mut C,
        dialect: &D,
        table: &TableRef,
        targets: &[(String, String)],
        chunk: &Chunk,
        progress: &mut Progress,
    ) -> Result<Option<(u64, String)>>
    where
        C: Connector + ?Sized,
        D: Dialect,
    {
        self.transition(ImportPhase::Compiling);
        let Some(sql) = dialect.compile_insert(table, targets, &chunk.rows) else {
            return Ok(None);
        };
        let first = chunk.indices.first().copied().unwrap_or(progress.chunk_start);

        self.transition(ImportPhase::Executing);
        progress.batches += 1;
        debug!(
            "Executing batch {} ({} rows from row {})",
            progress.batches,
            chunk.len(),
            first
        );

        if self.options.rollback_on_error {
            return match connector.execute_non_query(&sql).await {
                Ok(_) => {
                    progress.committed += chunk.len() as u64;
                    Ok(None)
                }
                Err(e) if e.is_connection() => Err(e),
                Err(e) => Ok(Some((first, row_message(&e)))),
            };
        }

        match run_in_transaction(connector, &sql).await {
            Ok(_) => {
                progress.committed += chunk.len() as u64;
                Ok(None)
            }
            Err(e) if e.is_connection() => Err(e),
            Err(e) => {
                warn!(
                    "Batch starting at row {} failed ({}); retrying {} rows individually",
                    first,
                    row_message(&e),
                    chunk.len()
                );
                for (index, row) in chunk.indices.iter().zip(&chunk.rows) {
                    let Some(single) =
                        dialect.compile_insert(table, targets, std::slice::from_ref(row))
                    else {
                        continue;
                    };
                    match connector.execute_non_query(&single).await {
                        Ok(_) => progress.committed += 1,
                        Err(e) if e.is_connection() => return Err(e),
                        Err(e) => {
                            progress.errors.insert(*index, row_message(&e));
                        }
                    }
                }
                Ok(None)
            }
        }
    }

    /// Roll back the outer transaction, if any, before surfacing a fatal
    /// error.
    async fn abort<C: Connector + ?Sized>(
        &mut self,
        connector: &mut C,
        err: BridgeError,
    ) -> BridgeError {
        if self.options.rollback_on_error && !err.is_connection() {
            if let Err(rb) = connector.rollback().await {
                warn!("Rollback after failed import also failed: {}", rb);
            }
        }
        self.transition(ImportPhase::Finished(ImportStatus::RolledBack));
        err
    }
}

/// Run one statement in its own transaction.
async fn run_in_transaction<C: Connector + ?Sized>(connector: &mut C, sql: &str) -> Result<u64> {
    connector.begin().await?;
    let result = match connector.execute_non_query(sql).await {
        Ok(n) => connector.commit().await.map(|_| n),
        Err(e) => Err(e),
    };
    if let Err(e) = &result {
        if !e.is_connection() {
            connector.rollback().await?;
        }
    }
    result
}

fn is_blank(fields: &[String]) -> bool {
    matches!(fields, [only] if only.is_empty())
}

/// Map header names onto table columns, ignoring case.
fn map_header(
    header: &[String],
    columns: &[ColumnDescriptor],
    table: &TableRef,
) -> Result<Vec<(String, String)>> {
    let mut targets: Vec<(String, String)> = Vec::with_capacity(header.len());
    for name in header {
        let name = name.trim();
        let column = columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                BridgeError::Schema(format!(
                    "header column '{}' does not exist in table '{}'",
                    name, table
                ))
            })?;
        if targets.iter().any(|(n, _)| n == &column.name) {
            return Err(BridgeError::Schema(format!(
                "header column '{}' appears more than once",
                name
            )));
        }
        targets.push((column.name.clone(), column.native_type_name.clone()));
    }
    Ok(targets)
}

fn row_message(err: &BridgeError) -> String {
    match err {
        BridgeError::Execution { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnector;
    use crate::transfer::sanitize::QuoteDoubling;

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("id", "int4"),
            ColumnDescriptor::new("name", "varchar"),
        ]
    }

    fn csv(rows: usize) -> String {
        let mut s = String::from("id,name\n");
        for i in 0..rows {
            s.push_str(&format!("{},row{}\n", i, i));
        }
        s
    }

    fn options(chunk: usize) -> ImportOptions {
        ImportOptions {
            chunk_size: chunk,
            ..ImportOptions::new("people")
        }
    }

    async fn run(
        conn: &mut MockConnector,
        opts: ImportOptions,
        input: &str,
    ) -> Result<ImportOutcome> {
        BulkImportPipeline::new(opts)?
            .import_with_columns(conn, input.as_bytes(), &columns(), &CancellationToken::new())
            .await
    }

    #[test]
    fn test_options_validation() {
        assert!(options(1).validate().is_ok());
        assert!(options(MAX_CHUNK_SIZE).validate().is_ok());
        assert!(matches!(options(0).validate(), Err(BridgeError::Config(_))));
        assert!(matches!(
            options(MAX_CHUNK_SIZE + 1).validate(),
            Err(BridgeError::Config(_))
        ));
        let pipe = ImportOptions {
            separator: '|',
            ..ImportOptions::new("t")
        };
        assert!(BulkImportPipeline::new(pipe).is_err());
    }

    #[test]
    fn test_options_wire_defaults() {
        let opts: ImportOptions = serde_json::from_str(r#"{"table":"t"}"#).unwrap();
        assert_eq!(opts, ImportOptions::new("t"));
        let opts: ImportOptions =
            serde_json::from_str(r#"{"table":"t","separator":"\t","doubleQuotes":true}"#).unwrap();
        assert_eq!(opts.separator, '\t');
        assert!(opts.double_quotes);
    }

    #[tokio::test]
    async fn test_chunking_2500_rows() {
        let mut conn = MockConnector::postgres();
        let outcome = run(&mut conn, options(1000), &csv(2500)).await.unwrap();

        assert_eq!(outcome.batches_executed, 3);
        assert_eq!(outcome.total_rows_read, 2500);
        assert_eq!(outcome.rows_committed, 2500);
        assert_eq!(outcome.status, ImportStatus::Committed);

        let sizes: Vec<usize> = conn
            .inserts()
            .iter()
            .map(|sql| sql.matches("),(").count() + 1)
            .collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert_eq!(conn.committed_rows(), 2500);
        assert!(conn.inserts()[0].starts_with("INSERT INTO \"people\" (\"id\", \"name\") VALUES (0, 'row0'),"));
    }

    #[tokio::test]
    async fn test_best_effort_retries_failed_chunk_row_by_row() {
        let mut conn = MockConnector::postgres();
        let input = "id,name\n1,a\n2,FAIL\n3,c\n4,d\n5,e\n";
        let outcome = run(&mut conn, options(2), input).await.unwrap();

        assert_eq!(outcome.total_rows_read, 5);
        assert_eq!(outcome.rows_committed, 4);
        assert_eq!(outcome.per_row_errors.len(), 1);
        assert_eq!(outcome.per_row_errors.get(&1).map(String::as_str), Some("mock failure"));
        assert_eq!(outcome.status, ImportStatus::PartiallyCommitted);
        assert_eq!(
            outcome.rows_committed,
            outcome.total_rows_read - outcome.per_row_errors.len() as u64
        );
        assert_eq!(conn.committed_rows(), 4);
        assert!(!conn.in_transaction());
    }

    #[tokio::test]
    async fn test_all_or_nothing_rolls_back() {
        let mut conn = MockConnector::postgres();
        let opts = ImportOptions {
            rollback_on_error: true,
            ..options(2)
        };
        let input = "id,name\n1,a\n2,b\n3,c\n4,FAIL\n5,e\n";
        let outcome = run(&mut conn, opts, input).await.unwrap();

        assert_eq!(outcome.rows_committed, 0);
        assert_eq!(outcome.status, ImportStatus::RolledBack);
        // Attributed to the first row of the failing chunk.
        assert_eq!(outcome.per_row_errors.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(conn.committed_rows(), 0);
        assert_eq!(conn.statements().last().map(String::as_str), Some("ROLLBACK"));
        // Reading stopped at the failing chunk.
        assert_eq!(outcome.total_rows_read, 4);
    }

    #[tokio::test]
    async fn test_all_or_nothing_parse_error() {
        let mut conn = MockConnector::postgres();
        let opts = ImportOptions {
            rollback_on_error: true,
            ..options(10)
        };
        let outcome = run(&mut conn, opts, "id,name\n1,a\n2\n3,c\n").await.unwrap();
        assert_eq!(outcome.status, ImportStatus::RolledBack);
        assert!(outcome.per_row_errors.contains_key(&1));
        assert!(conn.inserts().is_empty());
    }

    #[tokio::test]
    async fn test_all_or_nothing_commits_once() {
        let mut conn = MockConnector::sqlserver();
        let opts = ImportOptions {
            rollback_on_error: true,
            ..options(2)
        };
        let outcome = run(&mut conn, opts, &csv(5)).await.unwrap();
        assert_eq!(outcome.rows_committed, 5);
        assert_eq!(outcome.status, ImportStatus::Committed);
        let tx: Vec<&str> = conn
            .statements()
            .iter()
            .map(String::as_str)
            .filter(|s| matches!(*s, "BEGIN" | "COMMIT" | "ROLLBACK"))
            .collect();
        assert_eq!(tx, vec!["BEGIN", "COMMIT"]);
        assert!(conn.inserts()[0].starts_with("INSERT INTO [people] ([id], [name])"));
    }

    #[tokio::test]
    async fn test_rows_to_skip_after_header() {
        let mut conn = MockConnector::postgres();
        let opts = ImportOptions {
            rows_to_skip: 3,
            ..options(100)
        };
        let outcome = run(&mut conn, opts, &csv(10)).await.unwrap();
        assert_eq!(outcome.total_rows_read, 7);
        assert!(conn.inserts()[0].contains("(3, 'row3')"));
        assert!(!conn.inserts()[0].contains("'row2'"));
    }

    #[tokio::test]
    async fn test_unknown_header_fails_before_any_statement() {
        let mut conn = MockConnector::postgres();
        let err = run(&mut conn, options(10), "id,nickname\n1,a\n").await.unwrap_err();
        assert!(matches!(err, BridgeError::Schema(_)));
        assert!(conn.statements().is_empty());
    }

    #[tokio::test]
    async fn test_header_is_case_insensitive_and_reorders() {
        let mut conn = MockConnector::postgres();
        run(&mut conn, options(10), "NAME,Id\nbob,7\n").await.unwrap();
        assert_eq!(
            conn.inserts()[0],
            "INSERT INTO \"people\" (\"name\", \"id\") VALUES ('bob', 7);"
        );
    }

    #[tokio::test]
    async fn test_field_count_mismatch_is_row_error() {
        let mut conn = MockConnector::postgres();
        let outcome = run(&mut conn, options(10), "id,name\n1,a\n2\n3,c,extra\n4,d\n")
            .await
            .unwrap();
        assert_eq!(outcome.total_rows_read, 4);
        assert_eq!(outcome.rows_committed, 2);
        assert_eq!(outcome.per_row_errors.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_headerless_uses_ordinal_columns() {
        let mut conn = MockConnector::postgres();
        let opts = ImportOptions {
            has_header: false,
            ..options(10)
        };
        run(&mut conn, opts, "1,a\n2,\n").await.unwrap();
        assert_eq!(
            conn.inserts()[0],
            "INSERT INTO \"people\" (\"id\", \"name\") VALUES (1, 'a'),(2, NULL);"
        );
    }

    #[tokio::test]
    async fn test_sanitizer_applied() {
        let mut conn = MockConnector::postgres();
        BulkImportPipeline::new(options(10))
            .unwrap()
            .with_sanitizer(Arc::new(QuoteDoubling))
            .import_with_columns(
                &mut conn,
                "id,name\n1,O'Brien\n".as_bytes(),
                &columns(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(conn.inserts()[0].contains("'O''Brien'"));
    }

    #[tokio::test]
    async fn test_cancellation_truncates_at_unexecuted_chunk() {
        let cancel = CancellationToken::new();
        let mut conn = MockConnector::postgres().cancel_after_inserts(1, cancel.clone());
        let outcome = BulkImportPipeline::new(options(2))
            .unwrap()
            .import_with_columns(&mut conn, csv(6).as_bytes(), &columns(), &cancel)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.rows_committed, 2);
        assert_eq!(outcome.total_rows_read, 2);
        assert_eq!(outcome.status, ImportStatus::Committed);
        assert_eq!(conn.inserts().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_rolls_back_outer_transaction() {
        let cancel = CancellationToken::new();
        let mut conn = MockConnector::postgres().cancel_after_inserts(1, cancel.clone());
        let opts = ImportOptions {
            rollback_on_error: true,
            ..options(2)
        };
        let outcome = BulkImportPipeline::new(opts)
            .unwrap()
            .import_with_columns(&mut conn, csv(6).as_bytes(), &columns(), &cancel)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.rows_committed, 0);
        assert_eq!(outcome.status, ImportStatus::RolledBack);
        assert_eq!(conn.committed_rows(), 0);
    }

    #[tokio::test]
    async fn test_connection_error_propagates() {
        let mut conn = MockConnector::postgres().break_on("INSERT");
        let err = run(&mut conn, options(10), &csv(3)).await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_import_resolves_table_columns() {
        let mut conn = MockConnector::sqlserver().with_table(&[("Id", "int"), ("Label", "nvarchar")]);
        let opts = ImportOptions {
            schema: Some("dbo".into()),
            ..ImportOptions::new("Items")
        };
        let outcome = BulkImportPipeline::new(opts)
            .unwrap()
            .import(&mut conn, "id,label\n1,x\n".as_bytes(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.rows_committed, 1);
        assert_eq!(
            conn.inserts()[0],
            "INSERT INTO [dbo].[Items] ([Id], [Label]) VALUES (1, 'x');"
        );
    }

    #[tokio::test]
    async fn test_empty_input() {
        let mut conn = MockConnector::postgres();
        let outcome = run(&mut conn, options(10), "").await.unwrap();
        assert_eq!(outcome, ImportOutcome::empty());
        assert!(conn.statements().is_empty());
    }

    #[tokio::test]
    async fn test_blank_lines_skipped_for_multi_column_table() {
        let mut conn = MockConnector::postgres();
        let input = "\nid,name\n1,a\n\n2,b\n\r\n";
        let outcome = run(&mut conn, options(10), input).await.unwrap();

        assert_eq!(outcome.total_rows_read, 2);
        assert_eq!(outcome.status, ImportStatus::Committed);
        assert_eq!(
            conn.inserts()[0],
            "INSERT INTO \"people\" (\"id\", \"name\") VALUES (1, 'a'),(2, 'b');"
        );
    }

    #[tokio::test]
    async fn test_blank_line_is_null_row_for_single_column_table() {
        let mut conn = MockConnector::postgres();
        let opts = ImportOptions {
            has_header: false,
            ..options(10)
        };
        let columns = vec![ColumnDescriptor::new("note", "text")];
        let outcome = BulkImportPipeline::new(opts)
            .unwrap()
            .import_with_columns(
                &mut conn,
                "x\n\ny\n".as_bytes(),
                &columns,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.total_rows_read, 3);
        assert_eq!(outcome.rows_committed, 3);
        assert_eq!(
            conn.inserts()[0],
            "INSERT INTO \"people\" (\"note\") VALUES ('x'),(NULL),('y');"
        );
    }

    #[tokio::test]
    async fn test_header_with_byte_order_mark() {
        let mut conn = MockConnector::postgres();
        let input = "\u{feff}ID,Name\n1,a\n";
        let outcome = run(&mut conn, options(10), input).await.unwrap();

        assert_eq!(outcome.rows_committed, 1);
        assert!(conn.inserts()[0].starts_with("INSERT INTO \"people\" (\"id\", \"name\")"));
    }

    #[tokio::test]
    async fn test_sqlserver_large_chunk_stays_one_statement() {
        let mut conn = MockConnector::sqlserver();
        let outcome = run(&mut conn, options(2500), &csv(2500)).await.unwrap();

        assert_eq!(outcome.batches_executed, 1);
        assert_eq!(outcome.rows_committed, 2500);
        assert!(outcome.per_row_errors.is_empty());
        let inserts = conn.inserts();
        let sql = inserts[0];
        assert!(sql.starts_with("INSERT INTO [people] ([id], [name]) SELECT * FROM (VALUES (0, 'row0'),"));
        assert!(sql.ends_with(") AS [v] ([id], [name]);"));
    }
}
