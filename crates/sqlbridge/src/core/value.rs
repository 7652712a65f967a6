//! Typed native values and their text rendering.
//!
//! Drivers decode rows into [`SqlValue`] and the result normalizer renders
//! each value to the uniform text cell form.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::engine::EngineType;

/// Prefix that marks a text cell as base64-encoded binary data.
pub const BINARY_MARKER: &str = "base64:";

/// A single decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value (`bool` / `bit`).
    Bool(bool),

    /// 16-bit signed integer (smallint, tinyint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real/float4).
    F32(f32),

    /// 64-bit floating point (double precision/float8).
    F64(f64),

    /// Exact numeric (decimal, numeric, money).
    Decimal(Decimal),

    /// Character data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// UUID/GUID value.
    Uuid(Uuid),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),

    /// JSON document.
    Json(serde_json::Value),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Render the value as a text cell, `None` for NULL.
    ///
    /// Booleans use the engine's own literal form so that an exported value
    /// can be imported back into the same engine.
    #[must_use]
    pub fn render(&self, engine: EngineType) -> Option<String> {
        let text = match self {
            SqlValue::Null => return None,
            SqlValue::Bool(v) => match engine {
                EngineType::Postgres => v.to_string(),
                EngineType::SqlServer => (if *v { "1" } else { "0" }).to_string(),
            },
            SqlValue::I16(v) => v.to_string(),
            SqlValue::I32(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F32(v) if v.is_finite() => v.to_string(),
            SqlValue::F32(v) => non_finite(f64::from(*v)).to_string(),
            SqlValue::F64(v) if v.is_finite() => v.to_string(),
            SqlValue::F64(v) => non_finite(*v).to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(v) => v.clone(),
            SqlValue::Bytes(v) => encode_binary(v),
            SqlValue::Uuid(v) => v.hyphenated().to_string(),
            SqlValue::DateTime(v) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            SqlValue::DateTimeOffset(v) => v.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string(),
            SqlValue::Date(v) => v.format("%Y-%m-%d").to_string(),
            SqlValue::Time(v) => v.format("%H:%M:%S%.f").to_string(),
            SqlValue::Json(v) => v.to_string(),
        };
        Some(text)
    }
}

/// Spelling of NaN and the infinities, as PostgreSQL accepts them in input.
fn non_finite(v: f64) -> &'static str {
    if v.is_nan() {
        "NaN"
    } else if v.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

/// Encode a binary payload as a marked text cell.
pub fn encode_binary(bytes: &[u8]) -> String {
    format!("{}{}", BINARY_MARKER, STANDARD.encode(bytes))
}

/// Decode a marked text cell back to bytes.
///
/// Returns `None` when the cell carries no marker or the payload is not
/// valid base64.
pub fn decode_binary(cell: &str) -> Option<Vec<u8>> {
    let payload = cell.strip_prefix(BINARY_MARKER)?;
    STANDARD.decode(payload).ok()
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}
