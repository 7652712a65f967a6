//! PostgreSQL connector.
//!
//! Wraps one tokio-postgres client and the spawned task driving its
//! connection. The task is aborted when the connector is closed or dropped.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Client, Config as PgConfig, NoTls, Row, SimpleQueryMessage};
use tracing::{debug, info, warn};

use super::PostgresDialect;
use crate::core::engine::EngineType;
use crate::core::result::{QueryResult, ResultColumn};
use crate::core::traits::{Connector, Dialect};
use crate::core::value::SqlValue;
use crate::drivers::common::timeout::{run_bounded, ConnState};
use crate::drivers::common::SslMode;
use crate::drivers::ConnectOptions;
use crate::error::{BridgeError, ErrorPosition, Result};
use crate::normalize::{NativeCursor, ResultNormalizer};

const ENGINE_LABEL: &str = "PostgreSQL";

/// One live PostgreSQL connection.
pub struct PostgresConnector {
    client: Option<Client>,
    driver: Option<JoinHandle<()>>,
    command_timeout: Duration,
    state: ConnState,
}

impl PostgresConnector {
    /// Open a connection.
    ///
    /// The dialect's timeout settings are appended to the connection string
    /// before parsing, and the whole handshake is bounded by the connect
    /// timeout.
    pub async fn connect(connection_string: &str, options: &ConnectOptions) -> Result<Self> {
        let conn_str = PostgresDialect::new().with_timeouts(connection_string, &options.timeouts);
        let mut pg_config: PgConfig = conn_str.parse().map_err(|e| {
            BridgeError::Config(format!("invalid PostgreSQL connection string: {}", e))
        })?;

        let ssl_mode = options
            .ssl_mode
            .unwrap_or_else(|| SslMode::from_pg(pg_config.get_ssl_mode()));
        if ssl_mode.requires_tls() {
            pg_config.ssl_mode(tokio_postgres::config::SslMode::Require);
        } else {
            warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
        }

        let (client, driver) =
            tokio::time::timeout(options.timeouts.connect, open(&pg_config, ssl_mode))
                .await
                .map_err(|_| {
                    BridgeError::connection_msg(
                        "connecting to PostgreSQL",
                        format!("timed out after {:?}", options.timeouts.connect),
                    )
                })??;

        info!(
            "Connected to PostgreSQL: {:?}/{} (ssl_mode={})",
            pg_config.get_hosts().first(),
            pg_config.get_dbname().unwrap_or_default(),
            ssl_mode
        );

        Ok(Self {
            client: Some(client),
            driver: Some(driver),
            command_timeout: options.timeouts.command,
            state: ConnState::Open,
        })
    }

    async fn batch(&mut self, sql: &str) -> Result<()> {
        self.state.ensure_usable(ENGINE_LABEL)?;
        let client = self.client.as_ref().ok_or_else(closed)?;
        run_bounded(&mut self.state, self.command_timeout, sql, async {
            client
                .batch_execute(sql)
                .await
                .map_err(|e| map_pg_error(e, sql))
        })
        .await
    }
}

async fn open(pg_config: &PgConfig, ssl_mode: SslMode) -> Result<(Client, JoinHandle<()>)> {
    match ssl_mode.connector()? {
        Some(tls) => {
            let (client, connection) = pg_config
                .connect(tls)
                .await
                .map_err(|e| BridgeError::connection("connecting to PostgreSQL", e))?;
            Ok((client, spawn_driver(connection)))
        }
        None => {
            let (client, connection) = pg_config
                .connect(NoTls)
                .await
                .map_err(|e| BridgeError::connection("connecting to PostgreSQL", e))?;
            Ok((client, spawn_driver(connection)))
        }
    }
}

fn spawn_driver<S, T>(connection: tokio_postgres::Connection<S, T>) -> JoinHandle<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("PostgreSQL connection closed with error: {}", e);
        }
    })
}

fn closed() -> BridgeError {
    BridgeError::connection_msg("PostgreSQL connector is unusable", "the connection was closed")
}

#[async_trait]
impl Connector for PostgresConnector {
    fn engine(&self) -> EngineType {
        EngineType::Postgres
    }

    async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.state.ensure_usable(ENGINE_LABEL)?;
        let client = self.client.as_ref().ok_or_else(closed)?;
        let started = Instant::now();

        let mut result = run_bounded(&mut self.state, self.command_timeout, sql, async {
            match client.prepare(sql).await {
                Ok(stmt) if stmt.columns().is_empty() => {
                    let n = client
                        .execute(&stmt, &[])
                        .await
                        .map_err(|e| map_pg_error(e, sql))?;
                    Ok(QueryResult::affected(n))
                }
                Ok(stmt) => {
                    let rows = client
                        .query(&stmt, &[])
                        .await
                        .map_err(|e| map_pg_error(e, sql))?;
                    let mut cursor = PgCursor::new(&stmt, rows);
                    ResultNormalizer::new(EngineType::Postgres).normalize(&mut cursor)
                }
                // Multi-statement batches cannot be prepared; run them over
                // the simple protocol, which returns text cells.
                Err(e) if is_multi_statement(&e) => {
                    let messages = client
                        .simple_query(sql)
                        .await
                        .map_err(|e| map_pg_error(e, sql))?;
                    Ok(simple_result(messages))
                }
                Err(e) => Err(map_pg_error(e, sql)),
            }
        })
        .await?;

        result.elapsed_time_ms = started.elapsed().as_millis() as u64;
        debug!(
            "PostgreSQL statement returned {} rows in {}ms",
            result.rows.len(),
            result.elapsed_time_ms
        );
        Ok(result)
    }

    async fn execute_non_query(&mut self, sql: &str) -> Result<u64> {
        self.state.ensure_usable(ENGINE_LABEL)?;
        let client = self.client.as_ref().ok_or_else(closed)?;
        run_bounded(&mut self.state, self.command_timeout, sql, async {
            let messages = client
                .simple_query(sql)
                .await
                .map_err(|e| map_pg_error(e, sql))?;
            Ok::<u64, BridgeError>(
                messages
                    .iter()
                    .map(|m| match m {
                        SimpleQueryMessage::CommandComplete(n) => *n,
                        _ => 0,
                    })
                    .sum(),
            )
        })
        .await
    }

    async fn begin(&mut self) -> Result<()> {
        self.batch("BEGIN").await
    }

    async fn commit(&mut self) -> Result<()> {
        self.batch("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.batch("ROLLBACK").await
    }

    fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    fn set_command_timeout(&mut self, timeout: Duration) {
        self.command_timeout = timeout;
    }

    async fn close(&mut self) -> Result<()> {
        self.client = None;
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.state = ConnState::Closed;
        debug!("PostgreSQL connection closed");
        Ok(())
    }
}

impl Drop for PostgresConnector {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// Map a driver error onto the bridge taxonomy.
///
/// Server-reported errors are execution errors carrying the 1-based character
/// offset when the server gives one; anything else means the transport failed.
fn map_pg_error(e: tokio_postgres::Error, sql: &str) -> BridgeError {
    if let Some(db) = e.as_db_error() {
        let position = match db.position() {
            Some(tokio_postgres::error::ErrorPosition::Original(p)) => {
                Some(ErrorPosition::Offset(*p))
            }
            _ => None,
        };
        return BridgeError::execution(db.message(), Some(sql), position);
    }
    BridgeError::connection("executing PostgreSQL statement", e)
}

fn is_multi_statement(e: &tokio_postgres::Error) -> bool {
    e.code() == Some(&SqlState::SYNTAX_ERROR)
        && e
            .as_db_error()
            .map(|db| db.message().contains("multiple commands"))
            .unwrap_or(false)
}

/// Build a text result from simple-protocol messages.
///
/// The first result set wins; its columns are typed as `text` because the
/// simple protocol does not report types.
fn simple_result(messages: Vec<SimpleQueryMessage>) -> QueryResult {
    let mut result = QueryResult::default();
    let mut affected = 0u64;
    let mut in_first_set = true;

    for message in messages {
        match message {
            SimpleQueryMessage::Row(row) if in_first_set => {
                if result.columns.is_empty() {
                    result.columns = row
                        .columns()
                        .iter()
                        .map(|c| ResultColumn::new(c.name(), "text"))
                        .collect();
                }
                result.rows.push(
                    (0..row.len())
                        .map(|i| row.get(i).map(str::to_string))
                        .collect(),
                );
            }
            SimpleQueryMessage::CommandComplete(n) => {
                affected += n;
                if !result.rows.is_empty() {
                    in_first_set = false;
                }
            }
            _ => {}
        }
    }

    result.records_affected = Some(affected);
    result
}

/// Cursor over rows returned by an extended-protocol query.
struct PgCursor {
    columns: Vec<ResultColumn>,
    types: Vec<Type>,
    rows: std::vec::IntoIter<Row>,
}

impl PgCursor {
    fn new(stmt: &tokio_postgres::Statement, rows: Vec<Row>) -> Self {
        Self {
            columns: stmt
                .columns()
                .iter()
                .map(|c| ResultColumn::new(c.name(), c.type_().name()))
                .collect(),
            types: stmt.columns().iter().map(|c| c.type_().clone()).collect(),
            rows: rows.into_iter(),
        }
    }
}

impl NativeCursor for PgCursor {
    fn columns(&self) -> &[ResultColumn] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>> {
        let Some(row) = self.rows.next() else {
            return Ok(None);
        };
        let values = self
            .types
            .iter()
            .enumerate()
            .map(|(idx, ty)| convert_pg_value(&row, idx, ty))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(values))
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        BridgeError::execution(format!("decoding column {}: {}", idx, e), None, None)
    })
}

/// Convert one PostgreSQL cell to a typed value, driven by the column type.
fn convert_pg_value(row: &Row, idx: usize, ty: &Type) -> Result<SqlValue> {
    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.map(SqlValue::Bool),
        Type::INT2 => get::<i16>(row, idx)?.map(SqlValue::I16),
        Type::INT4 => get::<i32>(row, idx)?.map(SqlValue::I32),
        Type::INT8 => get::<i64>(row, idx)?.map(SqlValue::I64),
        Type::OID => get::<u32>(row, idx)?.map(|v| SqlValue::I64(v as i64)),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(SqlValue::F32),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(SqlValue::F64),
        Type::NUMERIC => get::<rust_decimal::Decimal>(row, idx)?.map(SqlValue::Decimal),
        Type::UUID => get::<uuid::Uuid>(row, idx)?.map(SqlValue::Uuid),
        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, idx)?.map(SqlValue::DateTime),
        Type::TIMESTAMPTZ => get::<chrono::DateTime<chrono::FixedOffset>>(row, idx)?
            .map(SqlValue::DateTimeOffset),
        Type::DATE => get::<chrono::NaiveDate>(row, idx)?.map(SqlValue::Date),
        Type::TIME => get::<chrono::NaiveTime>(row, idx)?.map(SqlValue::Time),
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(SqlValue::Bytes),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx)?.map(SqlValue::Json),
        _ => get::<RawCell>(row, idx)?.map(RawCell::into_value),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

/// Fallback decoder for types without a dedicated mapping.
///
/// Text-like types (varchar, text, name, enums, citext) arrive as UTF-8;
/// anything else is kept as binary.
struct RawCell(Vec<u8>);

impl RawCell {
    fn into_value(self) -> SqlValue {
        match String::from_utf8(self.0) {
            Ok(text) => SqlValue::Text(text),
            Err(e) => SqlValue::Bytes(e.into_bytes()),
        }
    }
}

impl<'a> FromSql<'a> for RawCell {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(RawCell(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}
