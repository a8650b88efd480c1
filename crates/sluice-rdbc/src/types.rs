//! Value types for sluice-rdbc
//!
//! A compact SQL value model covering what extraction needs:
//! - Primitive types (bool, integers, floats)
//! - Exact decimals, kept in their textual form
//! - Date/time types with and without timezone
//! - Binary data, UUID and JSON
//!
//! Column types are described by portable SQL type names (see
//! [`Value::sql_type`]); backends normalise their native type names onto the
//! same vocabulary so downstream consumers only deal with one set of names.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// SQL value type that can hold any supported database value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean value
    Bool(bool),
    /// 16-bit signed integer (SMALLINT)
    Int16(i16),
    /// 32-bit signed integer (INTEGER)
    Int32(i32),
    /// 64-bit signed integer (BIGINT)
    Int64(i64),
    /// 32-bit floating point (REAL)
    Float32(f32),
    /// 64-bit floating point (DOUBLE PRECISION)
    Float64(f64),
    /// Arbitrary precision decimal (NUMERIC, DECIMAL) as its exact text,
    /// including `NaN` and `Infinity`
    Decimal(String),
    /// Text string (VARCHAR, TEXT, CHAR)
    String(String),
    /// Binary data (BYTEA, BLOB, VARBINARY)
    Bytes(Vec<u8>),
    /// Date without time (DATE)
    Date(NaiveDate),
    /// Time without date (TIME)
    Time(NaiveTime),
    /// Timestamp without timezone (TIMESTAMP)
    DateTime(NaiveDateTime),
    /// Timestamp with timezone (TIMESTAMPTZ)
    DateTimeTz(DateTime<Utc>),
    /// UUID
    Uuid(Uuid),
    /// JSON value
    Json(serde_json::Value),
}

impl Value {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get SQL type name
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => sql_types::BOOLEAN,
            Self::Int16(_) => sql_types::SMALLINT,
            Self::Int32(_) => sql_types::INTEGER,
            Self::Int64(_) => sql_types::BIGINT,
            Self::Float32(_) => sql_types::REAL,
            Self::Float64(_) => sql_types::DOUBLE,
            Self::Decimal(_) => sql_types::DECIMAL,
            Self::String(_) => sql_types::VARCHAR,
            Self::Bytes(_) => sql_types::BYTEA,
            Self::Date(_) => sql_types::DATE,
            Self::Time(_) => sql_types::TIME,
            Self::DateTime(_) => sql_types::TIMESTAMP,
            Self::DateTimeTz(_) => sql_types::TIMESTAMPTZ,
            Self::Uuid(_) => sql_types::UUID,
            Self::Json(_) => sql_types::JSONB,
        }
    }

    /// Try to convert to bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int16(n) => Some(*n != 0),
            Self::Int32(n) => Some(*n != 0),
            Self::Int64(n) => Some(*n != 0),
            Self::String(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Some(true),
                "false" | "f" | "no" | "n" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int16(n) => Some(i64::from(*n)),
            Self::Int32(n) => Some(i64::from(*n)),
            Self::Int64(n) => Some(*n),
            Self::Float32(n) if n.is_finite() => Some(*n as i64),
            Self::Float64(n) if n.is_finite() => Some(*n as i64),
            Self::Decimal(s) | Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int16(n) => Some(f64::from(*n)),
            Self::Int32(n) => Some(f64::from(*n)),
            Self::Int64(n) => Some(*n as f64),
            Self::Float32(n) => Some(f64::from(*n)),
            Self::Float64(n) => Some(*n),
            Self::Decimal(s) | Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to borrow as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Try to borrow as bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b.as_slice()),
            Self::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Convert to owned string representation (NULL has none)
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::String(s) | Self::Decimal(s) => Some(s.clone()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Int16(n) => Some(n.to_string()),
            Self::Int32(n) => Some(n.to_string()),
            Self::Int64(n) => Some(n.to_string()),
            Self::Float32(n) => Some(n.to_string()),
            Self::Float64(n) => Some(n.to_string()),
            Self::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Self::Date(d) => Some(d.to_string()),
            Self::Time(t) => Some(t.to_string()),
            Self::DateTime(dt) => Some(dt.to_string()),
            Self::DateTimeTz(dt) => Some(dt.to_rfc3339()),
            Self::Uuid(u) => Some(u.to_string()),
            Self::Json(j) => Some(j.to_string()),
        }
    }
}

/// Portable SQL type names shared by backends and consumers
pub mod sql_types {
    /// BOOLEAN
    pub const BOOLEAN: &str = "BOOLEAN";
    /// SMALLINT
    pub const SMALLINT: &str = "SMALLINT";
    /// INTEGER
    pub const INTEGER: &str = "INTEGER";
    /// BIGINT
    pub const BIGINT: &str = "BIGINT";
    /// REAL
    pub const REAL: &str = "REAL";
    /// DOUBLE PRECISION
    pub const DOUBLE: &str = "DOUBLE PRECISION";
    /// DECIMAL / NUMERIC
    pub const DECIMAL: &str = "DECIMAL";
    /// VARCHAR / TEXT
    pub const VARCHAR: &str = "VARCHAR";
    /// BYTEA / BLOB
    pub const BYTEA: &str = "BYTEA";
    /// DATE
    pub const DATE: &str = "DATE";
    /// TIME
    pub const TIME: &str = "TIME";
    /// TIMESTAMP
    pub const TIMESTAMP: &str = "TIMESTAMP";
    /// TIMESTAMP WITH TIME ZONE
    pub const TIMESTAMPTZ: &str = "TIMESTAMPTZ";
    /// UUID
    pub const UUID: &str = "UUID";
    /// JSON / JSONB
    pub const JSONB: &str = "JSONB";
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTimeTz(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// Database row as positional column values.
///
/// Names and types live in the [`ColumnMetadata`] reported once per query;
/// value `i` belongs to column `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Get column count
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if row is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get all values
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get value by column index
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Take the values out of the row
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Column metadata as reported by the source for a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    /// Column name
    pub name: String,
    /// Portable SQL type name (see [`sql_types`])
    pub type_name: String,
    /// Whether column is nullable
    pub nullable: bool,
    /// Column ordinal (1-based)
    pub ordinal: u32,
}

impl ColumnMetadata {
    /// Create basic column metadata
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable: true,
            ordinal: 0,
        }
    }

    /// Set the 1-based ordinal
    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = ordinal;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_null() {
        assert!(Value::Null.is_null());
        assert!(!Value::Int32(0).is_null());
        assert_eq!(Value::Null.as_string(), None);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::String("yes".into()).as_bool(), Some(true));
        assert_eq!(Value::String("false".into()).as_bool(), Some(false));

        assert_eq!(Value::Int32(42).as_i64(), Some(42));
        assert_eq!(Value::Float64(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::Float64(f64::NAN).as_i64(), None);
    }

    #[test]
    fn test_value_from_impl() {
        let v: Value = 42_i32.into();
        assert!(matches!(v, Value::Int32(42)));

        let v: Value = "hello".into();
        assert!(matches!(v, Value::String(s) if s == "hello"));

        let v: Value = None::<i32>.into();
        assert!(v.is_null());
    }

    #[test]
    fn test_sql_type_vocabulary() {
        assert_eq!(Value::Int64(1).sql_type(), sql_types::BIGINT);
        assert_eq!(Value::Float64(1.0).sql_type(), "DOUBLE PRECISION");
        assert_eq!(Value::Json(serde_json::json!({})).sql_type(), "JSONB");
    }

    #[test]
    fn test_row_operations() {
        let row = Row::new(vec![Value::Int32(1), Value::String("Alice".into())]);

        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&Value::Int32(1)));
        assert_eq!(row.get(2), None);
        assert_eq!(row.into_values().len(), 2);
    }

    #[test]
    fn test_decimal_text_is_exact() {
        let wide = "12345678901234567890123456789012345.000000001";
        let v = Value::Decimal(wide.into());
        assert_eq!(v.sql_type(), sql_types::DECIMAL);
        assert_eq!(v.as_string().as_deref(), Some(wide));
        assert_eq!(Value::Decimal("NaN".into()).as_string().as_deref(), Some("NaN"));
        assert_eq!(Value::Decimal("42".into()).as_i64(), Some(42));
    }
}
