//! Scripted in-memory connector for unit tests.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::engine::EngineType;
use crate::core::result::{QueryResult, ResultColumn};
use crate::core::traits::Connector;
use crate::error::{BridgeError, Result};

/// Build a text-typed result from literal cells.
pub fn text_result(columns: &[&str], rows: &[&[Option<&str>]]) -> QueryResult {
    QueryResult {
        columns: columns
            .iter()
            .map(|c| ResultColumn::new(*c, "text"))
            .collect(),
        rows: rows
            .iter()
            .map(|r| r.iter().map(|c| c.map(str::to_string)).collect())
            .collect(),
        records_affected: None,
        elapsed_time_ms: 0,
    }
}

/// Records every statement, tracks transactional row counts and fails any
/// statement containing `FAIL`.
///
/// INSERT row counts are taken from the number of `),(` separators. Rows
/// inserted outside a transaction count as committed immediately.
pub struct MockConnector {
    engine: EngineType,
    statements: Vec<String>,
    responses: Vec<(String, QueryResult)>,
    command_timeout: Duration,
    timeouts_seen: Vec<Duration>,
    in_tx: bool,
    pending: u64,
    committed: u64,
    inserts: usize,
    cancel_after: Option<(usize, CancellationToken)>,
    broken_on: Option<String>,
}

impl MockConnector {
    fn new(engine: EngineType) -> Self {
        Self {
            engine,
            statements: Vec::new(),
            responses: Vec::new(),
            command_timeout: Duration::from_secs(30),
            timeouts_seen: Vec::new(),
            in_tx: false,
            pending: 0,
            committed: 0,
            inserts: 0,
            cancel_after: None,
            broken_on: None,
        }
    }

    pub fn postgres() -> Self {
        Self::new(EngineType::Postgres)
    }

    pub fn sqlserver() -> Self {
        Self::new(EngineType::SqlServer)
    }

    /// Answer `execute` calls whose SQL contains `needle`.
    pub fn respond(mut self, needle: &str, result: QueryResult) -> Self {
        self.responses.push((needle.to_string(), result));
        self
    }

    /// Answer the table-columns catalog query with `(name, type)` pairs.
    pub fn with_table(self, columns: &[(&str, &str)]) -> Self {
        let rows: Vec<Vec<Option<&str>>> = columns
            .iter()
            .map(|(name, ty)| vec![Some(*name), Some(*ty)])
            .collect();
        let rows: Vec<&[Option<&str>]> = rows.iter().map(|r| r.as_slice()).collect();
        self.respond("is_primary_key", text_result(&["column_name", "data_type"], &rows))
    }

    /// Cancel `token` once `n` INSERT statements have run.
    pub fn cancel_after_inserts(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    /// Fail with a connection error on any statement containing `needle`.
    pub fn break_on(mut self, needle: &str) -> Self {
        self.broken_on = Some(needle.to_string());
        self
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// INSERT statements in execution order.
    pub fn inserts(&self) -> Vec<&str> {
        self.statements
            .iter()
            .filter(|s| s.starts_with("INSERT"))
            .map(String::as_str)
            .collect()
    }

    pub fn timeouts_seen(&self) -> &[Duration] {
        &self.timeouts_seen
    }

    pub fn committed_rows(&self) -> u64 {
        self.committed
    }

    pub fn in_transaction(&self) -> bool {
        self.in_tx
    }

    fn record(&mut self, sql: &str) -> Result<()> {
        self.statements.push(sql.to_string());
        self.timeouts_seen.push(self.command_timeout);
        if let Some(needle) = &self.broken_on {
            if sql.contains(needle.as_str()) {
                return Err(BridgeError::connection_msg("mock connection", "connection reset"));
            }
        }
        if sql.contains("FAIL") {
            return Err(BridgeError::execution(
                "mock failure",
                Some(sql),
                None,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn engine(&self) -> EngineType {
        self.engine
    }

    async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.record(sql)?;
        Ok(self
            .responses
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or_default())
    }

    async fn execute_non_query(&mut self, sql: &str) -> Result<u64> {
        let result = self.record(sql);
        if sql.starts_with("INSERT") {
            self.inserts += 1;
            if let Some((n, token)) = &self.cancel_after {
                if self.inserts >= *n {
                    token.cancel();
                }
            }
        }
        result?;
        if !sql.starts_with("INSERT") {
            return Ok(0);
        }
        let rows = sql.matches("),(").count() as u64 + 1;
        if self.in_tx {
            self.pending += rows;
        } else {
            self.committed += rows;
        }
        Ok(rows)
    }

    async fn begin(&mut self) -> Result<()> {
        self.record("BEGIN")?;
        if self.in_tx {
            return Err(BridgeError::execution("transaction already open", None, None));
        }
        self.in_tx = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.record("COMMIT")?;
        if !self.in_tx {
            return Err(BridgeError::execution("no open transaction", None, None));
        }
        self.committed += self.pending;
        self.pending = 0;
        self.in_tx = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.record("ROLLBACK")?;
        self.pending = 0;
        self.in_tx = false;
        Ok(())
    }

    fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    fn set_command_timeout(&mut self, timeout: Duration) {
        self.command_timeout = timeout;
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
