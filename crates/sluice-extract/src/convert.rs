//! Row-to-Arrow conversion
//!
//! Maps the portable SQL type names reported by the source onto Arrow types and
//! builds one [`RecordBatch`] per fetched chunk. DECIMAL, UUID and JSON columns
//! are carried as text so no precision is lost.

use arrow_array::builder::{
    BinaryBuilder, BooleanBuilder, Date32Builder, Float32Builder, Float64Builder, Int16Builder,
    Int32Builder, Int64Builder, StringBuilder, Time64MicrosecondBuilder,
    TimestampMicrosecondBuilder,
};
use arrow_array::{ArrayRef, RecordBatch, RecordBatchOptions};
use arrow_schema::{ArrowError, DataType, Field, Schema, SchemaRef, TimeUnit};
use chrono::{Datelike, Timelike};
use sluice_rdbc::types::{sql_types, ColumnMetadata, Row, Value};
use std::sync::Arc;

/// Days between 0001-01-01 (CE) and 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Arrow type for a portable SQL type name
pub fn arrow_type(sql_type: &str) -> DataType {
    match sql_type {
        sql_types::BOOLEAN => DataType::Boolean,
        sql_types::SMALLINT => DataType::Int16,
        sql_types::INTEGER => DataType::Int32,
        sql_types::BIGINT => DataType::Int64,
        sql_types::REAL => DataType::Float32,
        sql_types::DOUBLE => DataType::Float64,
        sql_types::DATE => DataType::Date32,
        sql_types::TIME => DataType::Time64(TimeUnit::Microsecond),
        sql_types::TIMESTAMP => DataType::Timestamp(TimeUnit::Microsecond, None),
        sql_types::TIMESTAMPTZ => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        sql_types::BYTEA => DataType::Binary,
        _ => DataType::Utf8,
    }
}

/// Arrow schema for the columns reported by the source
pub fn schema_for(columns: &[ColumnMetadata]) -> SchemaRef {
    let fields: Vec<Field> = columns
        .iter()
        .map(|c| Field::new(&c.name, arrow_type(&c.type_name), true))
        .collect();
    Arc::new(Schema::new(fields))
}

fn mismatch(field: &Field, value: &Value) -> ArrowError {
    ArrowError::CastError(format!(
        "column '{}' ({}) cannot hold a {} value",
        field.name(),
        field.data_type(),
        value.sql_type()
    ))
}

/// Build column `idx` of `rows` as an array of `field`'s type
fn build_column(field: &Field, rows: &[Row], idx: usize) -> Result<ArrayRef, ArrowError> {
    let values = rows.iter().map(|r| r.get(idx).unwrap_or(&Value::Null));

    macro_rules! build {
        ($builder:expr, |$v:ident| $convert:expr) => {{
            let mut builder = $builder;
            for $v in values {
                if $v.is_null() {
                    builder.append_null();
                    continue;
                }
                match $convert {
                    Some(converted) => builder.append_value(converted),
                    None => return Err(mismatch(field, $v)),
                }
            }
            Arc::new(builder.finish()) as ArrayRef
        }};
    }

    let n = rows.len();
    let array = match field.data_type() {
        DataType::Boolean => build!(BooleanBuilder::with_capacity(n), |v| v.as_bool()),
        DataType::Int16 => build!(Int16Builder::with_capacity(n), |v| v
            .as_i64()
            .and_then(|i| i16::try_from(i).ok())),
        DataType::Int32 => build!(Int32Builder::with_capacity(n), |v| v
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())),
        DataType::Int64 => build!(Int64Builder::with_capacity(n), |v| v.as_i64()),
        DataType::Float32 => build!(Float32Builder::with_capacity(n), |v| v
            .as_f64()
            .map(|f| f as f32)),
        DataType::Float64 => build!(Float64Builder::with_capacity(n), |v| v.as_f64()),
        DataType::Date32 => build!(Date32Builder::with_capacity(n), |v| match v {
            Value::Date(d) => Some(d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE),
            _ => None,
        }),
        DataType::Time64(TimeUnit::Microsecond) => {
            build!(Time64MicrosecondBuilder::with_capacity(n), |v| match v {
                Value::Time(t) => Some(
                    i64::from(t.num_seconds_from_midnight()) * 1_000_000
                        + i64::from(t.nanosecond() / 1_000),
                ),
                _ => None,
            })
        }
        DataType::Timestamp(TimeUnit::Microsecond, None) => {
            build!(TimestampMicrosecondBuilder::with_capacity(n), |v| match v {
                Value::DateTime(dt) => Some(dt.and_utc().timestamp_micros()),
                _ => None,
            })
        }
        DataType::Timestamp(TimeUnit::Microsecond, Some(tz)) => build!(
            TimestampMicrosecondBuilder::with_capacity(n).with_timezone(tz.clone()),
            |v| match v {
                Value::DateTimeTz(dt) => Some(dt.timestamp_micros()),
                _ => None,
            }
        ),
        DataType::Binary => build!(BinaryBuilder::with_capacity(n, 0), |v| v.as_bytes()),
        DataType::Utf8 => build!(StringBuilder::with_capacity(n, 0), |v| v.as_string()),
        other => {
            return Err(ArrowError::NotYetImplemented(format!(
                "column '{}' has unsupported type {}",
                field.name(),
                other
            )))
        }
    };
    Ok(array)
}

/// Build a batch from fetched rows.
///
/// Rows are positional: value `i` of every row belongs to field `i`.
pub fn rows_to_batch(schema: &SchemaRef, rows: &[Row]) -> Result<RecordBatch, ArrowError> {
    let columns = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(idx, field)| build_column(field, rows, idx))
        .collect::<Result<Vec<_>, _>>()?;

    // Explicit row count keeps zero-column batches well-formed
    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    RecordBatch::try_new_with_options(schema.clone(), columns, &options)
}
