//! Unit tests for sluice-rdbc types module

use chrono::{NaiveDate, TimeZone, Utc};
use sluice_rdbc::types::{sql_types, ColumnMetadata, Row, Value};

#[test]
fn test_value_as_i64_from_decimal_and_string() {
    assert_eq!(Value::Decimal("125000".into()).as_i64(), Some(125_000));
    assert_eq!(Value::Decimal("NaN".into()).as_i64(), None);
    assert_eq!(Value::String("42".into()).as_i64(), Some(42));
    assert_eq!(Value::String("abc".into()).as_i64(), None);
    assert_eq!(Value::Null.as_i64(), None);
}

#[test]
fn test_value_as_string_temporal() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    assert_eq!(Value::Date(date).as_string().as_deref(), Some("2024-03-01"));

    let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    assert_eq!(
        Value::DateTimeTz(ts).as_string().as_deref(),
        Some("2024-03-01T12:00:00+00:00")
    );
}

#[test]
fn test_value_sql_types() {
    assert_eq!(Value::Bool(true).sql_type(), sql_types::BOOLEAN);
    assert_eq!(Value::Bytes(vec![1]).sql_type(), sql_types::BYTEA);
    assert_eq!(Value::Null.sql_type(), "NULL");
}

#[test]
fn test_row_is_positional() {
    let row = Row::new(vec![Value::Int64(7), Value::Null]);
    assert_eq!(row.values(), &[Value::Int64(7), Value::Null]);
    assert_eq!(row.get(1), Some(&Value::Null));
    assert!(!row.is_empty());
}

#[test]
fn test_column_metadata_defaults() {
    let column = ColumnMetadata::new("amount", sql_types::DECIMAL).with_ordinal(3);
    assert!(column.nullable);
    assert_eq!(column.ordinal, 3);
    assert_eq!(column.type_name, "DECIMAL");
}
