//! SQL Server connector.
//!
//! Wraps one tiberius client over a tokio TCP stream with TCP keepalives.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tiberius::{Client, ColumnData, ColumnType, Config, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use super::MssqlDialect;
use crate::core::engine::EngineType;
use crate::core::result::{QueryResult, ResultColumn};
use crate::core::traits::{Connector, Dialect};
use crate::core::value::SqlValue;
use crate::drivers::common::timeout::{run_bounded, ConnState};
use crate::drivers::ConnectOptions;
use crate::error::{BridgeError, ErrorPosition, Result};
use crate::normalize::{ResultNormalizer, VecCursor};

/// Maximum TDS packet size (32767 bytes, ~32KB).
const TDS_MAX_PACKET_SIZE: u32 = 32767;

/// TCP keepalive interval (30 seconds).
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

const ENGINE_LABEL: &str = "SQL Server";

type TdsClient = Client<Compat<TcpStream>>;

/// One live SQL Server connection.
pub struct MssqlConnector {
    client: Option<TdsClient>,
    command_timeout: Duration,
    state: ConnState,
}

impl MssqlConnector {
    /// Open a connection from an ADO.NET-style connection string.
    ///
    /// `Encrypt` and `TrustServerCertificate` in the string select the TLS
    /// behaviour; the handshake is bounded by the connect timeout.
    pub async fn connect(connection_string: &str, options: &ConnectOptions) -> Result<Self> {
        let conn_str = MssqlDialect::new().with_timeouts(connection_string, &options.timeouts);
        let mut config = Config::from_ado_string(&conn_str).map_err(|e| {
            BridgeError::Config(format!("invalid SQL Server connection string: {}", e))
        })?;
        config.packet_size(TDS_MAX_PACKET_SIZE);

        let addr = config.get_addr().to_string();
        let client = tokio::time::timeout(options.timeouts.connect, open(config))
            .await
            .map_err(|_| {
                BridgeError::connection_msg(
                    "connecting to SQL Server",
                    format!("timed out after {:?}", options.timeouts.connect),
                )
            })??;

        info!("Connected to SQL Server: {}", addr);

        Ok(Self {
            client: Some(client),
            command_timeout: options.timeouts.command,
            state: ConnState::Open,
        })
    }

    async fn batch(&mut self, sql: &str) -> Result<()> {
        self.state.ensure_usable(ENGINE_LABEL)?;
        let client = self.client.as_mut().ok_or_else(closed)?;
        run_bounded(&mut self.state, self.command_timeout, sql, async {
            client
                .simple_query(sql)
                .await
                .map_err(|e| map_tds_error(e, sql))?
                .into_results()
                .await
                .map_err(|e| map_tds_error(e, sql))?;
            Ok(())
        })
        .await
    }
}

async fn open(config: Config) -> Result<TdsClient> {
    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| BridgeError::connection("opening TCP connection to SQL Server", e))?;
    tcp.set_nodelay(true).ok();

    // Enable TCP keepalives
    let std_tcp = tcp
        .into_std()
        .map_err(|e| BridgeError::connection("configuring SQL Server socket", e))?;
    let socket = socket2::Socket::from(std_tcp);
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(TCP_KEEPALIVE_INTERVAL)
        .with_interval(TCP_KEEPALIVE_INTERVAL);
    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        warn!("Failed to set TCP keepalive on SQL Server connection: {}", e);
    }
    let std_tcp: std::net::TcpStream = socket.into();
    std_tcp.set_nonblocking(true).ok();
    let tcp = TcpStream::from_std(std_tcp)
        .map_err(|e| BridgeError::connection("configuring SQL Server socket", e))?;

    Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| BridgeError::connection("connecting to SQL Server", e))
}

fn closed() -> BridgeError {
    BridgeError::connection_msg("SQL Server connector is unusable", "the connection was closed")
}

#[async_trait]
impl Connector for MssqlConnector {
    fn engine(&self) -> EngineType {
        EngineType::SqlServer
    }

    async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.state.ensure_usable(ENGINE_LABEL)?;
        let client = self.client.as_mut().ok_or_else(closed)?;
        let started = Instant::now();

        let mut result = run_bounded(&mut self.state, self.command_timeout, sql, async {
            let mut stream = client
                .simple_query(sql)
                .await
                .map_err(|e| map_tds_error(e, sql))?;
            let columns: Vec<ResultColumn> = stream
                .columns()
                .await
                .map_err(|e| map_tds_error(e, sql))?
                .map(|cols| {
                    cols.iter()
                        .map(|c| ResultColumn::new(c.name(), type_name(c.column_type())))
                        .collect()
                })
                .unwrap_or_default();
            let rows = stream
                .into_first_result()
                .await
                .map_err(|e| map_tds_error(e, sql))?;

            let values = rows
                .into_iter()
                .map(|row| row.into_iter().map(convert_column_data).collect())
                .collect::<Result<Vec<Vec<SqlValue>>>>()?;

            let mut cursor = VecCursor::new(columns, values);
            ResultNormalizer::new(EngineType::SqlServer).normalize(&mut cursor)
        })
        .await?;

        result.elapsed_time_ms = started.elapsed().as_millis() as u64;
        debug!(
            "SQL Server statement returned {} rows in {}ms",
            result.rows.len(),
            result.elapsed_time_ms
        );
        Ok(result)
    }

    async fn execute_non_query(&mut self, sql: &str) -> Result<u64> {
        self.state.ensure_usable(ENGINE_LABEL)?;
        let client = self.client.as_mut().ok_or_else(closed)?;
        run_bounded(&mut self.state, self.command_timeout, sql, async {
            let result = client
                .execute(sql, &[])
                .await
                .map_err(|e| map_tds_error(e, sql))?;
            Ok::<u64, BridgeError>(result.total())
        })
        .await
    }

    async fn begin(&mut self) -> Result<()> {
        self.batch("BEGIN TRANSACTION").await
    }

    async fn commit(&mut self) -> Result<()> {
        self.batch("COMMIT TRANSACTION").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }

    fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    fn set_command_timeout(&mut self, timeout: Duration) {
        self.command_timeout = timeout;
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                debug!("SQL Server connection close reported: {}", e);
            }
        }
        self.state = ConnState::Closed;
        Ok(())
    }
}

/// Map a driver error onto the bridge taxonomy.
///
/// Server errors carry the 1-based line within the batch; transport errors
/// mean the connection is gone.
fn map_tds_error(e: tiberius::error::Error, sql: &str) -> BridgeError {
    match e {
        tiberius::error::Error::Server(token) => {
            let position = match token.line() {
                0 => None,
                line => Some(ErrorPosition::Line(line)),
            };
            BridgeError::execution(
                format!("{} (error {})", token.message(), token.code()),
                Some(sql),
                position,
            )
        }
        tiberius::error::Error::Io { .. }
        | tiberius::error::Error::Tls(_)
        | tiberius::error::Error::Protocol(_)
        | tiberius::error::Error::Routing { .. } => {
            BridgeError::connection("executing SQL Server statement", e)
        }
        other => BridgeError::execution(other.to_string(), Some(sql), None),
    }
}

/// Engine type name for a TDS column type.
fn type_name(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Null => "null",
        ColumnType::Bit | ColumnType::Bitn => "bit",
        ColumnType::Int1 => "tinyint",
        ColumnType::Int2 => "smallint",
        ColumnType::Int4 | ColumnType::Intn => "int",
        ColumnType::Int8 => "bigint",
        ColumnType::Float4 => "real",
        ColumnType::Float8 | ColumnType::Floatn => "float",
        ColumnType::Money => "money",
        ColumnType::Money4 => "smallmoney",
        ColumnType::Datetime4 => "smalldatetime",
        ColumnType::Datetime | ColumnType::Datetimen => "datetime",
        ColumnType::Datetime2 => "datetime2",
        ColumnType::DatetimeOffsetn => "datetimeoffset",
        ColumnType::Daten => "date",
        ColumnType::Timen => "time",
        ColumnType::Guid => "uniqueidentifier",
        ColumnType::Decimaln => "decimal",
        ColumnType::Numericn => "numeric",
        ColumnType::BigVarBin => "varbinary",
        ColumnType::BigBinary => "binary",
        ColumnType::Image => "image",
        ColumnType::BigVarChar => "varchar",
        ColumnType::BigChar => "char",
        ColumnType::NVarchar => "nvarchar",
        ColumnType::NChar => "nchar",
        ColumnType::Text => "text",
        ColumnType::NText => "ntext",
        ColumnType::Xml => "xml",
        ColumnType::Udt => "udt",
        ColumnType::SSVariant => "sql_variant",
    }
}

fn decode<'a, T: FromSql<'a>>(data: &'a ColumnData<'static>) -> Result<Option<T>> {
    T::from_sql(data)
        .map_err(|e| BridgeError::execution(format!("decoding SQL Server value: {}", e), None, None))
}

/// Convert one TDS cell to a typed value.
fn convert_column_data(data: ColumnData<'static>) -> Result<SqlValue> {
    let value = match &data {
        ColumnData::U8(v) => v.map(|v| SqlValue::I16(v as i16)),
        ColumnData::I16(v) => v.map(SqlValue::I16),
        ColumnData::I32(v) => v.map(SqlValue::I32),
        ColumnData::I64(v) => v.map(SqlValue::I64),
        ColumnData::F32(v) => v.map(SqlValue::F32),
        ColumnData::F64(v) => v.map(SqlValue::F64),
        ColumnData::Bit(v) => v.map(SqlValue::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| SqlValue::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(SqlValue::Uuid),
        ColumnData::Binary(v) => v.as_ref().map(|b| SqlValue::Bytes(b.to_vec())),
        ColumnData::Numeric(_) => decode::<rust_decimal::Decimal>(&data)?.map(SqlValue::Decimal),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| SqlValue::Text(Cow::clone(x).into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            decode::<chrono::NaiveDateTime>(&data)?.map(SqlValue::DateTime)
        }
        ColumnData::Date(_) => decode::<chrono::NaiveDate>(&data)?.map(SqlValue::Date),
        ColumnData::Time(_) => decode::<chrono::NaiveTime>(&data)?.map(SqlValue::Time),
        ColumnData::DateTimeOffset(_) => {
            decode::<chrono::DateTime<chrono::FixedOffset>>(&data)?.map(SqlValue::DateTimeOffset)
        }
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(type_name(ColumnType::Money4), "smallmoney");
        assert_eq!(type_name(ColumnType::NVarchar), "nvarchar");
        assert_eq!(type_name(ColumnType::Bitn), "bit");
    }

    #[test]
    fn test_convert_scalars() {
        assert_eq!(convert_column_data(ColumnData::Bit(Some(true))).unwrap(), SqlValue::Bool(true));
        assert_eq!(convert_column_data(ColumnData::U8(Some(7))).unwrap(), SqlValue::I16(7));
        assert_eq!(convert_column_data(ColumnData::I32(None)).unwrap(), SqlValue::Null);
        assert_eq!(
            convert_column_data(ColumnData::String(Some(Cow::Borrowed("x")))).unwrap(),
            SqlValue::Text("x".into())
        );
        assert_eq!(
            convert_column_data(ColumnData::Binary(Some(Cow::Owned(vec![1, 2])))).unwrap(),
            SqlValue::Bytes(vec![1, 2])
        );
    }

    #[test]
    fn test_convert_numeric() {
        let numeric = tiberius::numeric::Numeric::new_with_scale(12345, 2);
        let value = convert_column_data(ColumnData::Numeric(Some(numeric))).unwrap();
        assert_eq!(value, SqlValue::Decimal(rust_decimal::Decimal::new(12345, 2)));
    }
}
