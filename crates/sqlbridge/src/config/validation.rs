//! Configuration validation.

use super::Config;
use crate::error::{BridgeError, Result};
use crate::transfer::{MAX_CHUNK_SIZE, SEPARATORS};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let conn = &config.connection;

    match &conn.connection_string {
        Some(s) if s.trim().is_empty() => {
            return Err(BridgeError::Config(
                "connection.connection_string must not be empty".into(),
            ));
        }
        Some(_) => {}
        None => {
            if conn.host.is_empty() {
                return Err(BridgeError::Config("connection.host is required".into()));
            }
            if conn.database.is_empty() {
                return Err(BridgeError::Config(
                    "connection.database is required".into(),
                ));
            }
            if conn.user.is_empty() {
                return Err(BridgeError::Config("connection.user is required".into()));
            }
        }
    }

    if conn.connect_timeout_secs == 0 {
        return Err(BridgeError::Config(
            "connection.connect_timeout_secs must be at least 1".into(),
        ));
    }
    if conn.command_timeout_secs == 0 {
        return Err(BridgeError::Config(
            "connection.command_timeout_secs must be at least 1".into(),
        ));
    }

    let transfer = &config.transfer;
    if transfer.chunk_size == 0 || transfer.chunk_size > MAX_CHUNK_SIZE {
        return Err(BridgeError::Config(format!(
            "transfer.chunk_size must be between 1 and {}",
            MAX_CHUNK_SIZE
        )));
    }
    if !SEPARATORS.contains(&transfer.separator) {
        return Err(BridgeError::Config(format!(
            "transfer.separator must be one of ',', '\\t', ';', got {:?}",
            transfer.separator
        )));
    }
    if transfer.newline != "\n" && transfer.newline != "\r\n" {
        return Err(BridgeError::Config(
            "transfer.newline must be \"\\n\" or \"\\r\\n\"".into(),
        ));
    }

    Ok(())
}
