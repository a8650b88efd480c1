//! PostgreSQL backend implementation for sluice-rdbc
//!
//! Provides PostgreSQL-specific implementations:
//! - Cursor-backed row streaming (`DECLARE ... NO SCROLL CURSOR` / `FETCH FORWARD`)
//! - Text-protocol decoding: every column type arrives as its server text and
//!   is parsed by type, so types without a native mapping keep their contents
//! - Connection factory building a `tokio_postgres::Config` from discrete fields
//!
//! Result schemas come from describing the statement (`prepare`), rows from the
//! simple query protocol. Each session is pinned to ISO dates, UTC, hex bytea
//! and postgres-style intervals so the text forms parse deterministically.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::types::Type;
use tokio_postgres::SimpleQueryMessage;
use tracing::{debug, error};

use crate::connection::{
    Connection, ConnectionConfig, ConnectionFactory, DatabaseType, RowStream, StreamFuture,
};
use crate::error::{Error, Result};
use crate::sql::{close_cursor, declare_cursor, fetch_forward, normalize_statement};
use crate::types::{sql_types, ColumnMetadata, Row, Value};

/// Name of the server-side cursor opened by [`PgConnection::query_stream`]
const CURSOR_NAME: &str = "sluice_cursor";

/// Session settings the text decoders rely on
const SESSION_SETUP: &str = "SET DateStyle = 'ISO, MDY'; \
     SET IntervalStyle = 'postgres'; \
     SET TimeZone = 'UTC'; \
     SET bytea_output = 'hex'; \
     SET extra_float_digits = 3";

/// Map a PostgreSQL type onto the portable type vocabulary
fn pg_type_name(pg_type: &Type) -> &'static str {
    match *pg_type {
        Type::BOOL => sql_types::BOOLEAN,
        Type::INT2 => sql_types::SMALLINT,
        Type::INT4 => sql_types::INTEGER,
        Type::INT8 => sql_types::BIGINT,
        Type::FLOAT4 => sql_types::REAL,
        Type::FLOAT8 => sql_types::DOUBLE,
        Type::NUMERIC => sql_types::DECIMAL,
        Type::BYTEA => sql_types::BYTEA,
        Type::DATE => sql_types::DATE,
        Type::TIME => sql_types::TIME,
        Type::TIMESTAMP => sql_types::TIMESTAMP,
        Type::TIMESTAMPTZ => sql_types::TIMESTAMPTZ,
        Type::UUID => sql_types::UUID,
        Type::JSON | Type::JSONB => sql_types::JSONB,
        _ => sql_types::VARCHAR,
    }
}

fn column_metadata(columns: &[tokio_postgres::Column]) -> Vec<ColumnMetadata> {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            ColumnMetadata::new(c.name(), pg_type_name(c.type_())).with_ordinal(i as u32 + 1)
        })
        .collect()
}

/// Described column: name for error messages, type for decoding
#[derive(Debug, Clone)]
struct PgColumn {
    name: String,
    pg_type: Type,
}

fn pg_columns(columns: &[tokio_postgres::Column]) -> Vec<PgColumn> {
    columns
        .iter()
        .map(|c| PgColumn {
            name: c.name().to_string(),
            pg_type: c.type_().clone(),
        })
        .collect()
}

fn parse<T>(column: &PgColumn, text: &str, parsed: Option<T>) -> Result<T> {
    parsed.ok_or_else(|| {
        Error::type_conversion(format!(
            "column '{}' ({}): cannot parse '{}'",
            column.name,
            column.pg_type.name(),
            text
        ))
    })
}

/// Decode the server's text form of a non-NULL value.
///
/// Types without a portable mapping (inet, interval, enums, arrays, ...) are
/// kept as their text. A mapped type whose text does not parse is an error.
fn text_to_value(column: &PgColumn, text: &str) -> Result<Value> {
    let value = match column.pg_type {
        Type::BOOL => Value::Bool(parse(
            column,
            text,
            match text {
                "t" => Some(true),
                "f" => Some(false),
                _ => None,
            },
        )?),
        Type::INT2 => Value::Int16(parse(column, text, text.parse().ok())?),
        Type::INT4 => Value::Int32(parse(column, text, text.parse().ok())?),
        Type::INT8 => Value::Int64(parse(column, text, text.parse().ok())?),
        Type::FLOAT4 => Value::Float32(parse(column, text, text.parse().ok())?),
        Type::FLOAT8 => Value::Float64(parse(column, text, text.parse().ok())?),
        Type::NUMERIC => Value::Decimal(text.to_string()),
        Type::BYTEA => Value::Bytes(parse(
            column,
            text,
            text.strip_prefix("\\x").and_then(|h| hex::decode(h).ok()),
        )?),
        Type::DATE => Value::Date(parse(
            column,
            text,
            NaiveDate::parse_from_str(text, "%Y-%m-%d").ok(),
        )?),
        Type::TIME => Value::Time(parse(
            column,
            text,
            NaiveTime::parse_from_str(text, "%H:%M:%S%.f").ok(),
        )?),
        Type::TIMESTAMP => Value::DateTime(parse(
            column,
            text,
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").ok(),
        )?),
        Type::TIMESTAMPTZ => Value::DateTimeTz(parse(
            column,
            text,
            DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        )?),
        Type::UUID => Value::Uuid(parse(column, text, uuid::Uuid::parse_str(text).ok())?),
        Type::JSON | Type::JSONB => {
            Value::Json(parse(column, text, serde_json::from_str(text).ok())?)
        }
        _ => Value::String(text.to_string()),
    };
    Ok(value)
}

/// Decode the data rows of a simple-query response
fn decode_rows(columns: &[PgColumn], messages: Vec<SimpleQueryMessage>) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    for message in messages {
        let SimpleQueryMessage::Row(row) = message else {
            continue;
        };
        if row.len() != columns.len() {
            return Err(Error::type_conversion(format!(
                "row has {} columns, query described {}",
                row.len(),
                columns.len()
            )));
        }
        let values = columns
            .iter()
            .enumerate()
            .map(|(i, column)| match row.get(i) {
                Some(text) => text_to_value(column, text),
                None => Ok(Value::Null),
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(Row::new(values));
    }
    Ok(rows)
}

/// PostgreSQL connection implementation
pub struct PgConnection {
    client: Arc<tokio_postgres::Client>,
    closed: AtomicBool,
}

impl PgConnection {
    /// Create a new connection from a tokio-postgres client.
    ///
    /// The client's session must already carry the settings applied by
    /// [`PgConnectionFactory::connect`].
    pub fn new(client: tokio_postgres::Client) -> Self {
        Self {
            client: Arc::new(client),
            closed: AtomicBool::new(false),
        }
    }

    /// Get the underlying client
    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(Error::connection("connection is closed"));
        }
        Ok(())
    }

    async fn describe(&self, sql: &str) -> Result<tokio_postgres::Statement> {
        self.client
            .prepare(sql)
            .await
            .map_err(|e| Error::query_with_sql(e.to_string(), sql))
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        self.ensure_open()?;

        let body = normalize_statement(sql);
        let columns = pg_columns(self.describe(body).await?.columns());
        let messages = self
            .client
            .simple_query(body)
            .await
            .map_err(|e| Error::query_with_sql(e.to_string(), body))?;

        decode_rows(&columns, messages)
    }

    async fn query_stream(&self, sql: &str, fetch_size: usize) -> Result<Box<dyn RowStream>> {
        self.ensure_open()?;

        let body = normalize_statement(sql);
        let declare_sql = declare_cursor(CURSOR_NAME, body)?;
        let fetch_sql = fetch_forward(CURSOR_NAME, fetch_size)?;

        // Describe only: the source reports the result schema without running the query.
        let statement = self.describe(body).await?;

        self.client
            .batch_execute("BEGIN READ ONLY")
            .await
            .map_err(|e| Error::cursor(format!("failed to begin transaction: {}", e)))?;

        if let Err(e) = self.client.batch_execute(&declare_sql).await {
            let _ = self.client.batch_execute("ROLLBACK").await;
            return Err(Error::query_with_sql(e.to_string(), body));
        }

        debug!(fetch_size, "declared cursor {}", CURSOR_NAME);

        Ok(Box::new(PgRowStream {
            client: Arc::clone(&self.client),
            columns: column_metadata(statement.columns()),
            pg_columns: pg_columns(statement.columns()),
            fetch_sql,
            open: true,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Row stream over a server-side cursor inside a read-only transaction
pub struct PgRowStream {
    client: Arc<tokio_postgres::Client>,
    columns: Vec<ColumnMetadata>,
    pg_columns: Vec<PgColumn>,
    fetch_sql: String,
    open: bool,
}

impl PgRowStream {
    async fn finish(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        let close_sql = format!("{}; COMMIT", close_cursor(CURSOR_NAME)?);
        if let Err(e) = self.client.batch_execute(&close_sql).await {
            let _ = self.client.batch_execute("ROLLBACK").await;
            return Err(Error::cursor(format!("failed to close cursor: {}", e)));
        }
        Ok(())
    }

    async fn abort(&mut self) {
        self.open = false;
        if let Err(e) = self.client.batch_execute("ROLLBACK").await {
            debug!("rollback after failed fetch: {}", e);
        }
    }

    async fn fetch(&mut self) -> Result<Option<Vec<Row>>> {
        if !self.open {
            return Ok(None);
        }

        let messages = match self.client.simple_query(&self.fetch_sql).await {
            Ok(messages) => messages,
            Err(e) => {
                self.abort().await;
                return Err(Error::cursor(format!("fetch failed: {}", e)));
            }
        };

        let rows = match decode_rows(&self.pg_columns, messages) {
            Ok(rows) => rows,
            Err(e) => {
                self.abort().await;
                return Err(e);
            }
        };

        if rows.is_empty() {
            self.finish().await?;
            return Ok(None);
        }
        Ok(Some(rows))
    }
}

impl RowStream for PgRowStream {
    fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    fn next_chunk(&mut self) -> StreamFuture<'_, Option<Vec<Row>>> {
        Box::pin(self.fetch())
    }

    fn close(&mut self) -> StreamFuture<'_, ()> {
        Box::pin(self.finish())
    }
}

impl Drop for PgRowStream {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        // Dropped mid-stream: roll back so the server releases the cursor.
        let client = Arc::clone(&self.client);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = client.batch_execute("ROLLBACK").await {
                    debug!("rollback of abandoned cursor failed: {}", e);
                }
            });
        }
    }
}

/// PostgreSQL connection factory
#[derive(Debug, Clone, Default)]
pub struct PgConnectionFactory;

impl PgConnectionFactory {
    fn pg_config(config: &ConnectionConfig) -> tokio_postgres::Config {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.username)
            .password(config.expose_password())
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        if let Some(app) = &config.application_name {
            pg.application_name(app);
        }
        pg
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let (client, connection) = Self::pg_config(config)
            .connect(tokio_postgres::NoTls)
            .await
            .map_err(|e| {
                Error::connection_with_source(
                    format!("failed to connect to {}", config.describe()),
                    e,
                )
            })?;

        // Spawn the connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        client.batch_execute(SESSION_SETUP).await.map_err(|e| {
            Error::connection_with_source(
                format!("failed to configure session on {}", config.describe()),
                e,
            )
        })?;

        Ok(Box::new(PgConnection::new(client)))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use chrono::TimeZone;
    use secrecy::SecretString;
    use tokio_postgres::types::Kind;

    fn col(name: &str, pg_type: Type) -> PgColumn {
        PgColumn {
            name: name.into(),
            pg_type,
        }
    }

    fn decode(pg_type: Type, text: &str) -> Value {
        text_to_value(&col("c", pg_type), text).unwrap()
    }

    #[test]
    fn test_pg_type_names() {
        assert_eq!(pg_type_name(&Type::INT8), "BIGINT");
        assert_eq!(pg_type_name(&Type::TEXT), "VARCHAR");
        assert_eq!(pg_type_name(&Type::JSON), "JSONB");
        assert_eq!(pg_type_name(&Type::TIMESTAMPTZ), "TIMESTAMPTZ");
        assert_eq!(pg_type_name(&Type::INET), "VARCHAR");
    }

    #[test]
    fn test_text_scalars() {
        assert_eq!(decode(Type::BOOL, "t"), Value::Bool(true));
        assert_eq!(decode(Type::BOOL, "f"), Value::Bool(false));
        assert_eq!(decode(Type::INT2, "-7"), Value::Int16(-7));
        assert_eq!(decode(Type::INT4, "2147483647"), Value::Int32(i32::MAX));
        assert_eq!(decode(Type::INT8, "-9000000000"), Value::Int64(-9_000_000_000));
        assert_eq!(decode(Type::FLOAT4, "1.5"), Value::Float32(1.5));
        assert_eq!(
            decode(Type::FLOAT8, "-Infinity"),
            Value::Float64(f64::NEG_INFINITY)
        );
        assert!(matches!(decode(Type::FLOAT8, "NaN"), Value::Float64(f) if f.is_nan()));
        assert_eq!(decode(Type::TEXT, "hello"), Value::String("hello".into()));
    }

    #[test]
    fn test_numeric_keeps_exact_text() {
        let wide = "123456789012345678901234567890.123456789012345";
        assert_eq!(decode(Type::NUMERIC, wide), Value::Decimal(wide.into()));
        assert_eq!(decode(Type::NUMERIC, "NaN"), Value::Decimal("NaN".into()));
        assert_eq!(decode(Type::NUMERIC, "10.50"), Value::Decimal("10.50".into()));
    }

    #[test]
    fn test_text_temporal() {
        assert_eq!(
            decode(Type::DATE, "2024-03-01"),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(
            decode(Type::TIME, "12:34:56.5"),
            Value::Time(NaiveTime::from_hms_milli_opt(12, 34, 56, 500).unwrap())
        );
        assert_eq!(
            decode(Type::TIME, "08:00:00"),
            Value::Time(NaiveTime::from_hms_opt(8, 0, 0).unwrap())
        );
        assert_eq!(
            decode(Type::TIMESTAMP, "2024-03-01 12:00:00.000123"),
            Value::DateTime(
                NaiveDate::from_ymd_opt(2024, 3, 1)
                    .unwrap()
                    .and_hms_micro_opt(12, 0, 0, 123)
                    .unwrap()
            )
        );
        assert_eq!(
            decode(Type::TIMESTAMPTZ, "2024-03-01 10:00:00+00"),
            Value::DateTimeTz(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(
            decode(Type::TIMESTAMPTZ, "2024-03-01 12:00:00.25+02:00"),
            Value::DateTimeTz(
                Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
                    + chrono::Duration::milliseconds(250)
            )
        );
    }

    #[test]
    fn test_text_bytes_uuid_json() {
        assert_eq!(
            decode(Type::BYTEA, "\\xdeadbeef"),
            Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef])
        );
        assert_eq!(decode(Type::BYTEA, "\\x"), Value::Bytes(Vec::new()));
        assert_eq!(
            decode(Type::UUID, "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"),
            Value::Uuid(uuid::Uuid::parse_str("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11").unwrap())
        );
        assert_eq!(
            decode(Type::JSONB, r#"{"a": [1, 2]}"#),
            Value::Json(serde_json::json!({"a": [1, 2]}))
        );
    }

    #[test]
    fn test_unmapped_types_keep_their_text() {
        assert_eq!(decode(Type::INET, "10.0.0.1"), Value::String("10.0.0.1".into()));
        assert_eq!(
            decode(Type::INTERVAL, "1 day 02:00:00"),
            Value::String("1 day 02:00:00".into())
        );
        assert_eq!(decode(Type::CHAR, "x"), Value::String("x".into()));
        assert_eq!(
            decode(Type::INT4_ARRAY, "{1,2,3}"),
            Value::String("{1,2,3}".into())
        );

        let mood = Type::new(
            "mood".into(),
            90_001,
            Kind::Enum(vec!["happy".into(), "sad".into()]),
            "public".into(),
        );
        assert_eq!(decode(mood, "happy"), Value::String("happy".into()));
    }

    #[test]
    fn test_unparseable_text_names_the_column() {
        for (pg_type, text) in [
            (Type::INT4, "12x"),
            (Type::BOOL, "maybe"),
            (Type::BYTEA, "deadbeef"),
            (Type::DATE, "infinity"),
            (Type::UUID, "not-a-uuid"),
            (Type::JSON, "{"),
        ] {
            let err = text_to_value(&col("amount", pg_type), text).unwrap_err();
            assert_eq!(err.category(), ErrorCategory::TypeConversion);
            assert!(err.to_string().contains("column 'amount'"), "{}", err);
        }
    }

    #[test]
    fn test_pg_connection_factory_type() {
        let factory = PgConnectionFactory;
        assert_eq!(factory.database_type(), DatabaseType::PostgreSQL);
    }

    #[test]
    fn test_pg_config_from_fields() {
        let config = ConnectionConfig::new(
            DatabaseType::PostgreSQL,
            "localhost",
            6543,
            "analytics",
            "reader",
            SecretString::from("s3cret"),
        )
        .with_connect_timeout(2_000);

        let pg = PgConnectionFactory::pg_config(&config);
        assert_eq!(pg.get_ports(), &[6543]);
        assert_eq!(pg.get_dbname(), Some("analytics"));
        assert_eq!(pg.get_user(), Some("reader"));
        assert_eq!(pg.get_password(), Some(&b"s3cret"[..]));
        assert_eq!(pg.get_connect_timeout(), Some(&Duration::from_millis(2_000)));
        assert_eq!(pg.get_application_name(), Some("sluice"));
    }
}
