//! Commands bound to a connector.

use std::time::Duration;

use super::result::QueryResult;
use super::traits::Connector;
use crate::error::Result;

/// A statement bound to one connector, with an optional timeout override.
///
/// The override applies only while this command runs; the connector's own
/// command timeout is restored afterwards, on success and on error.
pub struct Command<'c, C: Connector + ?Sized> {
    connector: &'c mut C,
    sql: String,
    timeout: Option<Duration>,
}

impl<'c, C: Connector + ?Sized> Command<'c, C> {
    pub fn new(connector: &'c mut C, sql: impl Into<String>) -> Self {
        Self {
            connector,
            sql: sql.into(),
            timeout: None,
        }
    }

    /// Override the command timeout for this statement.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Statement text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Execute and return the first result set.
    pub async fn execute(self) -> Result<QueryResult> {
        let Command {
            connector,
            sql,
            timeout,
        } = self;
        let previous = apply_timeout(connector, timeout);
        let result = connector.execute(&sql).await;
        restore_timeout(connector, previous);
        result
    }

    /// Execute and return the affected row count.
    pub async fn execute_non_query(self) -> Result<u64> {
        let Command {
            connector,
            sql,
            timeout,
        } = self;
        let previous = apply_timeout(connector, timeout);
        let result = connector.execute_non_query(&sql).await;
        restore_timeout(connector, previous);
        result
    }
}

fn apply_timeout<C: Connector + ?Sized>(
    connector: &mut C,
    timeout: Option<Duration>,
) -> Option<Duration> {
    let timeout = timeout?;
    let previous = connector.command_timeout();
    connector.set_command_timeout(timeout);
    Some(previous)
}

fn restore_timeout<C: Connector + ?Sized>(connector: &mut C, previous: Option<Duration>) {
    if let Some(previous) = previous {
        connector.set_command_timeout(previous);
    }
}
