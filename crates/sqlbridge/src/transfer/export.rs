//! DSV export of query results.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use super::dsv::{encode_record, SEPARATORS};
use crate::core::result::QueryResult;
use crate::core::traits::Connector;
use crate::error::{BridgeError, Result};

fn default_separator() -> char {
    ','
}

fn default_newline() -> String {
    "\n".to_string()
}

/// Options for one export request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    #[serde(default = "default_separator")]
    pub separator: char,

    /// `"\n"` or `"\r\n"`.
    #[serde(default = "default_newline")]
    pub newline: String,

    #[serde(default)]
    pub include_header: bool,

    /// Wrap every non-null field in `"`.
    #[serde(default)]
    pub add_quotes: bool,

    /// Written for NULL and empty values, never quoted.
    #[serde(default, alias = "nullOutputToken")]
    pub null_output: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            newline: default_newline(),
            include_header: false,
            add_quotes: false,
            null_output: String::new(),
        }
    }
}

impl ExportOptions {
    pub fn validate(&self) -> Result<()> {
        if !SEPARATORS.contains(&self.separator) {
            return Err(BridgeError::Config(format!(
                "separator {:?} is not one of ',', '\\t', ';'",
                self.separator
            )));
        }
        if self.newline != "\n" && self.newline != "\r\n" {
            return Err(BridgeError::Config(format!(
                "newline must be \\n or \\r\\n, got {:?}",
                self.newline
            )));
        }
        Ok(())
    }
}

/// Serialize a result as DSV, one row per emitted chunk.
pub fn export(
    result: QueryResult,
    options: ExportOptions,
) -> impl Stream<Item = Bytes> + Send + 'static {
    let header = options.include_header.then(|| {
        Bytes::from(encode_record(
            result.columns.iter().map(|c| Some(c.name.as_str())),
            options.separator,
            options.add_quotes,
            &options.null_output,
            &options.newline,
        ))
    });

    let rows = stream::iter(result.rows).map(move |row| {
        Bytes::from(encode_record(
            row.iter().map(|cell| cell.as_deref()),
            options.separator,
            options.add_quotes,
            &options.null_output,
            &options.newline,
        ))
    });

    stream::iter(header).chain(rows)
}

/// Execute `sql` and export its first result set.
///
/// Options are validated before the statement runs.
pub async fn export_query<C: Connector + ?Sized>(
    connector: &mut C,
    sql: &str,
    options: ExportOptions,
) -> Result<impl Stream<Item = Bytes> + Send + 'static> {
    options.validate()?;
    let result = connector.execute(sql).await?;
    debug!(
        "Exporting {} rows x {} columns",
        result.rows.len(),
        result.columns.len()
    );
    Ok(export(result, options))
}

/// Drain an export stream into a writer, returning the bytes written.
pub async fn write_to<S, W>(stream: S, writer: &mut W) -> Result<u64>
where
    S: Stream<Item = Bytes>,
    W: AsyncWrite + Unpin,
{
    let mut stream = std::pin::pin!(stream);
    let mut written = 0u64;
    let mut chunks = 0u64;
    while let Some(chunk) = stream.next().await {
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
        chunks += 1;
    }
    writer.flush().await?;
    info!("Wrote {} bytes in {} chunks", written, chunks);
    Ok(written)
}
