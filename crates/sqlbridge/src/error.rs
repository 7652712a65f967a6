//! Error types for the bridge library.

use std::fmt;

use thiserror::Error;

/// Where in a statement the engine located an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum ErrorPosition {
    /// 1-based character offset (PostgreSQL).
    Offset(u32),
    /// 1-based line number within the batch (SQL Server).
    Line(u32),
}

impl fmt::Display for ErrorPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPosition::Offset(o) => write!(f, "character {}", o),
            ErrorPosition::Line(l) => write!(f, "line {}", l),
        }
    }
}

/// Main error type for bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error (invalid YAML, out-of-range options, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The connection could not be established or was lost.
    #[error("Connection error: {context}")]
    Connection {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A statement failed at the engine.
    #[error("Execution error: {message}{}", fmt_position(.position))]
    Execution {
        message: String,
        statement: Option<String>,
        position: Option<ErrorPosition>,
    },

    /// A DSV record violates quoting or field-count rules.
    #[error("Parse error in row {row}: {message}")]
    Parse { row: u64, message: String },

    /// No connector exists for the requested engine.
    #[error("Unsupported engine: '{0}'. Supported engines: postgres, mssql")]
    UnsupportedEngine(String),

    /// Target table or column could not be resolved.
    #[error("Schema error: {0}")]
    Schema(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation was cancelled (SIGINT, etc.)
    #[error("Operation cancelled")]
    Cancelled,
}

/// Plain-message cause used when a lower layer only reports text.
#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

impl BridgeError {
    /// Create a Connection error with context about where it occurred.
    pub fn connection<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        BridgeError::Connection {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Create a Connection error whose cause is only a message.
    pub fn connection_msg(context: impl Into<String>, cause: impl Into<String>) -> Self {
        BridgeError::Connection {
            context: context.into(),
            source: Box::new(Message(cause.into())),
        }
    }

    /// Create an Execution error.
    pub fn execution(
        message: impl Into<String>,
        statement: Option<&str>,
        position: Option<ErrorPosition>,
    ) -> Self {
        BridgeError::Execution {
            message: message.into(),
            statement: statement.map(str::to_string),
            position,
        }
    }

    /// Create a Parse error for a data row.
    pub fn parse(row: u64, message: impl Into<String>) -> Self {
        BridgeError::Parse {
            row,
            message: message.into(),
        }
    }

    /// Whether the error means the connection can no longer be used.
    pub fn is_connection(&self) -> bool {
        matches!(self, BridgeError::Connection { .. })
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            BridgeError::Config(_) | BridgeError::Yaml(_) | BridgeError::UnsupportedEngine(_) => 2,
            BridgeError::Connection { .. } => 3,
            BridgeError::Execution { .. } | BridgeError::Schema(_) => 4,
            BridgeError::Parse { .. } => 5,
            BridgeError::Cancelled => 130,
            BridgeError::Io(_) | BridgeError::Json(_) => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        if let BridgeError::Execution {
            statement: Some(stmt),
            ..
        } = self
        {
            output.push_str(&format!("\nStatement:\n  {}\n", truncate(stmt, 500)));
        }

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

fn fmt_position(position: &Option<ErrorPosition>) -> String {
    match position {
        Some(p) => format!(" (at {})", p),
        None => String::new(),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
