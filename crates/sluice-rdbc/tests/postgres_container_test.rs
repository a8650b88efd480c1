//! Cursor streaming against a real PostgreSQL server
//!
//! Run with `cargo test -p sluice-rdbc --test postgres_container_test -- --ignored`

#![cfg(feature = "postgres")]

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use secrecy::SecretString;
use sluice_rdbc::postgres::PgConnectionFactory;
use sluice_rdbc::prelude::*;
use std::time::Duration;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::postgres::Postgres;
use tokio::time::sleep;
use tokio_postgres::{Client, NoTls};

struct PgServer {
    #[allow(dead_code)]
    container: ContainerAsync<Postgres>,
    host: String,
    port: u16,
}

impl PgServer {
    async fn start() -> Result<Self> {
        let container = Postgres::default()
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;
        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(5432).await?;

        let server = Self {
            container,
            host,
            port,
        };
        server.wait_for_ready().await?;
        Ok(server)
    }

    fn conn_str(&self) -> String {
        format!(
            "host={} port={} user=postgres password=postgres dbname=postgres",
            self.host, self.port
        )
    }

    async fn wait_for_ready(&self) -> Result<()> {
        for _ in 1..=60 {
            if tokio_postgres::connect(&self.conn_str(), NoTls).await.is_ok() {
                return Ok(());
            }
            sleep(Duration::from_millis(500)).await;
        }
        anyhow::bail!("PostgreSQL did not become ready")
    }

    /// Plain client for setup and for watching sessions from outside
    async fn admin(&self) -> Result<Client> {
        let (client, connection) = tokio_postgres::connect(&self.conn_str(), NoTls).await?;
        tokio::spawn(async move {
            let _ = connection.await;
        });
        Ok(client)
    }

    fn config(&self) -> ConnectionConfig {
        ConnectionConfig::new(
            DatabaseType::PostgreSQL,
            self.host.clone(),
            self.port,
            "postgres",
            "postgres",
            SecretString::from("postgres"),
        )
        .with_application_name("sluice-it")
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        Ok(PgConnectionFactory.connect(&self.config()).await?)
    }
}

/// State of the `sluice-it` session as seen by the server
async fn session_state(admin: &Client) -> Result<String> {
    let row = admin
        .query_one(
            "SELECT state FROM pg_stat_activity WHERE application_name = 'sluice-it'",
            &[],
        )
        .await?;
    Ok(row.get::<_, Option<String>>(0).unwrap_or_default())
}

async fn wait_for_idle(admin: &Client) -> Result<()> {
    for _ in 0..50 {
        if session_state(admin).await? == "idle" {
            return Ok(());
        }
        sleep(Duration::from_millis(100)).await;
    }
    anyhow::bail!("session still {}", session_state(admin).await?)
}

async fn open_cursors(conn: &dyn Connection) -> Result<i64> {
    let row = conn
        .query_one("SELECT COUNT(*) FROM pg_cursors")
        .await?
        .context("count returned no row")?;
    Ok(row.get(0).and_then(Value::as_i64).unwrap_or(-1))
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_chunks_are_bounded_and_cursor_released() -> Result<()> {
    let server = PgServer::start().await?;
    let admin = server.admin().await?;
    admin
        .batch_execute("CREATE TABLE numbers AS SELECT g AS n FROM generate_series(1, 1000) g")
        .await?;

    let conn = server.connect().await?;
    let mut stream = conn
        .query_stream("SELECT n FROM numbers ORDER BY n;", 300)
        .await?;
    assert_eq!(stream.columns()[0].name, "n");
    assert_eq!(stream.columns()[0].type_name, sql_types::INTEGER);
    assert_eq!(session_state(&admin).await?, "idle in transaction");

    let mut sizes = Vec::new();
    let mut last = 0;
    while let Some(chunk) = stream.next_chunk().await? {
        sizes.push(chunk.len());
        last = chunk.last().and_then(|r| r.get(0)).and_then(Value::as_i64).unwrap_or(0);
    }
    assert_eq!(sizes, vec![300, 300, 300, 100]);
    assert_eq!(last, 1000);

    // exhausted: cursor closed and transaction committed
    assert!(stream.next_chunk().await?.is_none());
    assert_eq!(session_state(&admin).await?, "idle");
    assert_eq!(open_cursors(conn.as_ref()).await?, 0);
    Ok(())
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_close_and_drop_release_cursor() -> Result<()> {
    let server = PgServer::start().await?;
    let admin = server.admin().await?;
    admin
        .batch_execute("CREATE TABLE numbers AS SELECT g AS n FROM generate_series(1, 50) g")
        .await?;
    let conn = server.connect().await?;

    // explicit close mid-stream
    let mut stream = conn.query_stream("SELECT n FROM numbers", 10).await?;
    assert_eq!(stream.next_chunk().await?.map(|c| c.len()), Some(10));
    stream.close().await?;
    assert_eq!(session_state(&admin).await?, "idle");
    assert_eq!(open_cursors(conn.as_ref()).await?, 0);

    // dropped mid-stream: rolled back in the background
    let mut stream = conn.query_stream("SELECT n FROM numbers", 10).await?;
    assert!(stream.next_chunk().await?.is_some());
    drop(stream);
    wait_for_idle(&admin).await?;
    assert_eq!(open_cursors(conn.as_ref()).await?, 0);

    // the connection is reusable afterwards
    let mut stream = conn.query_stream("SELECT n FROM numbers", 50).await?;
    assert_eq!(stream.next_chunk().await?.map(|c| c.len()), Some(50));
    assert!(stream.next_chunk().await?.is_none());
    Ok(())
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_declare_failure_rolls_back() -> Result<()> {
    let server = PgServer::start().await?;
    let admin = server.admin().await?;
    let conn = server.connect().await?;

    let err = match conn.query_stream("SELECT * FROM missing_table", 10).await {
        Ok(_) => anyhow::bail!("query against a missing table succeeded"),
        Err(e) => e,
    };
    assert_eq!(err.category(), ErrorCategory::Query);
    assert_eq!(session_state(&admin).await?, "idle");
    Ok(())
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_every_column_type_round_trips() -> Result<()> {
    let server = PgServer::start().await?;
    let admin = server.admin().await?;
    admin
        .batch_execute(
            r#"
            CREATE TYPE mood AS ENUM ('happy', 'sad');
            CREATE TABLE typed (
                b bool, s int2, i int4, l int8, r float4, d float8,
                big numeric, nan numeric, raw bytea,
                day date, tod time, ts timestamp, tstz timestamptz,
                id uuid, doc jsonb,
                addr inet, span interval, flag "char", feeling mood, nums int4[]
            );
            INSERT INTO typed VALUES (
                true, -3, 42, 9000000000, 1.5, 'Infinity',
                123456789012345678901234567890.123456789, 'NaN', '\xdeadbeef',
                '2024-03-01', '12:34:56.5', '2024-03-01 08:00:00.000123',
                '2024-03-01 12:00:00+02',
                'a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11', '{"a": [1, 2]}',
                '10.0.0.1', '1 day 2 hours', 'x', 'happy', '{1,2,3}'
            );
            INSERT INTO typed DEFAULT VALUES;
            "#,
        )
        .await?;

    let conn = server.connect().await?;
    let mut stream = conn.query_stream("SELECT * FROM typed", 10).await?;

    let types: Vec<&str> = stream.columns().iter().map(|c| c.type_name.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "BOOLEAN",
            "SMALLINT",
            "INTEGER",
            "BIGINT",
            "REAL",
            "DOUBLE PRECISION",
            "DECIMAL",
            "DECIMAL",
            "BYTEA",
            "DATE",
            "TIME",
            "TIMESTAMP",
            "TIMESTAMPTZ",
            "UUID",
            "JSONB",
            "VARCHAR",
            "VARCHAR",
            "VARCHAR",
            "VARCHAR",
            "VARCHAR",
        ]
    );

    let rows = stream.next_chunk().await?.context("no rows")?;
    assert_eq!(rows.len(), 2);
    let full = rows[0].values();
    let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    assert_eq!(full[0], Value::Bool(true));
    assert_eq!(full[1], Value::Int16(-3));
    assert_eq!(full[2], Value::Int32(42));
    assert_eq!(full[3], Value::Int64(9_000_000_000));
    assert_eq!(full[4], Value::Float32(1.5));
    assert_eq!(full[5], Value::Float64(f64::INFINITY));
    assert_eq!(
        full[6],
        Value::Decimal("123456789012345678901234567890.123456789".into())
    );
    assert_eq!(full[7], Value::Decimal("NaN".into()));
    assert_eq!(full[8], Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef]));
    assert_eq!(full[9], Value::Date(date));
    assert_eq!(
        full[10],
        Value::Time(NaiveTime::from_hms_milli_opt(12, 34, 56, 500).unwrap())
    );
    assert_eq!(
        full[11],
        Value::DateTime(date.and_hms_micro_opt(8, 0, 0, 123).unwrap())
    );
    assert_eq!(
        full[12],
        Value::DateTimeTz(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
    );
    assert_eq!(
        full[13].as_string().as_deref(),
        Some("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11")
    );
    assert_eq!(full[14], Value::Json(serde_json::json!({"a": [1, 2]})));
    assert_eq!(full[15], Value::String("10.0.0.1".into()));
    assert_eq!(full[16], Value::String("1 day 02:00:00".into()));
    assert_eq!(full[17], Value::String("x".into()));
    assert_eq!(full[18], Value::String("happy".into()));
    assert_eq!(full[19], Value::String("{1,2,3}".into()));

    assert!(rows[1].values().iter().all(Value::is_null));
    assert!(stream.next_chunk().await?.is_none());
    Ok(())
}
