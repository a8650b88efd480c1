//! Connection traits for sluice-rdbc
//!
//! Core abstractions for database connectivity:
//! - Connection: query execution and cursor-backed streaming
//! - RowStream: chunked, forward-only row iteration over a server-side cursor
//! - ConnectionFactory: creates connections from a [`ConnectionConfig`]

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::pin::Pin;

use crate::error::{Error, Result};
use crate::types::{ColumnMetadata, Row};

/// Boxed future returned by [`RowStream`] methods
pub type StreamFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A connection to a database
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a query that returns rows
    async fn query(&self, sql: &str) -> Result<Vec<Row>>;

    /// Execute a query and return the first row (convenience method)
    async fn query_one(&self, sql: &str) -> Result<Option<Row>> {
        let rows = self.query(sql).await?;
        Ok(rows.into_iter().next())
    }

    /// Execute a query in cursor mode.
    ///
    /// The source must not materialise the whole result set: rows are pulled
    /// from the returned stream at most `fetch_size` at a time, and nothing is
    /// fetched until the caller asks for the next chunk.
    async fn query_stream(&self, sql: &str, fetch_size: usize) -> Result<Box<dyn RowStream>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// Chunked, forward-only row stream over an open cursor.
///
/// Implementations release the cursor when [`RowStream::close`] is awaited and
/// must also release it (best effort) when dropped unclosed.
pub trait RowStream: Send {
    /// Column schema reported by the source for the query
    fn columns(&self) -> &[ColumnMetadata];

    /// Fetch the next chunk. `Ok(None)` means the cursor is exhausted.
    fn next_chunk(&mut self) -> StreamFuture<'_, Option<Vec<Row>>>;

    /// Close the cursor and end its transaction
    fn close(&mut self) -> StreamFuture<'_, ()>;
}

/// Configuration for creating connections.
///
/// The password is held as a [`SecretString`] and never appears in `Debug`
/// output; backends build their native configuration from the discrete fields
/// rather than from a formatted URL.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Database type (resolved from the configured driver name)
    pub database_type: DatabaseType,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database name
    pub database: String,
    /// User name
    pub username: String,
    /// Password resolved from the environment
    pub password: SecretString,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Application name (shown in pg_stat_activity, etc)
    pub application_name: Option<String>,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("database_type", &self.database_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("application_name", &self.application_name)
            .finish()
    }
}

impl ConnectionConfig {
    /// Create configuration from discrete connection fields
    pub fn new(
        database_type: DatabaseType,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            database_type,
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password,
            connect_timeout_ms: 10_000,
            application_name: Some("sluice".into()),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    /// Set application name
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Expose the password to a backend (use sparingly!)
    pub fn expose_password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Human-readable target without credentials, safe for logs
    pub fn describe(&self) -> String {
        format!(
            "{}://{}@{}:{}/{}",
            self.database_type.scheme(),
            self.username,
            self.host,
            self.port,
            self.database
        )
    }
}

/// Factory for creating connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;

    /// Get the database type
    fn database_type(&self) -> DatabaseType;
}

/// Database type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    /// PostgreSQL
    PostgreSQL,
    /// MySQL/MariaDB
    MySQL,
    /// SQL Server
    SqlServer,
    /// SQLite
    SQLite,
    /// Oracle
    Oracle,
}

impl DatabaseType {
    /// Resolve a driver name such as `postgresql`, `postgres` or the
    /// SQLAlchemy-style `postgresql+psycopg2` (dialect before the `+`).
    pub fn from_driver(driver: &str) -> Result<Self> {
        let dialect = driver
            .split('+')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        match dialect.as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Self::PostgreSQL),
            "mysql" | "mariadb" => Ok(Self::MySQL),
            "mssql" | "sqlserver" => Ok(Self::SqlServer),
            "sqlite" => Ok(Self::SQLite),
            "oracle" => Ok(Self::Oracle),
            _ => Err(Error::config(format!("unknown driver '{}'", driver))),
        }
    }

    /// URL scheme used when describing a target
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::MySQL => "mysql",
            Self::SqlServer => "mssql",
            Self::SQLite => "sqlite",
            Self::Oracle => "oracle",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PostgreSQL => write!(f, "PostgreSQL"),
            Self::MySQL => write!(f, "MySQL"),
            Self::SqlServer => write!(f, "SQL Server"),
            Self::SQLite => write!(f, "SQLite"),
            Self::Oracle => write!(f, "Oracle"),
        }
    }
}
