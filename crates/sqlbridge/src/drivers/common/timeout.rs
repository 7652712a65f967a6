//! Timeout handling shared by the connectors.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{BridgeError, Result};

/// Liveness of a connector's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnState {
    #[default]
    Open,
    /// An operation timed out or the transport failed.
    Broken,
    /// `close` was called.
    Closed,
}

impl ConnState {
    /// Fail fast when the connection can no longer be used.
    pub fn ensure_usable(&self, engine: &str) -> Result<()> {
        match self {
            ConnState::Open => Ok(()),
            ConnState::Broken => Err(BridgeError::connection_msg(
                format!("{} connector is unusable", engine),
                "a previous operation timed out or lost the connection",
            )),
            ConnState::Closed => Err(BridgeError::connection_msg(
                format!("{} connector is unusable", engine),
                "the connection was closed",
            )),
        }
    }
}

/// Run a statement future under the command timeout.
///
/// On expiry the connection is marked broken, since the server may still be
/// executing the statement and the protocol stream is in an unknown state.
pub async fn run_bounded<F, T>(
    state: &mut ConnState,
    limit: Duration,
    sql: &str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            if e.is_connection() {
                *state = ConnState::Broken;
            }
            Err(e)
        }
        Err(_) => {
            warn!("Statement timed out after {:?}; discarding connection", limit);
            *state = ConnState::Broken;
            Err(BridgeError::execution(
                format!("statement timed out after {}s", limit.as_secs_f64()),
                Some(sql),
                None,
            ))
        }
    }
}
