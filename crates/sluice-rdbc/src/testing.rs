//! In-memory backend for tests
//!
//! [`MemoryConnectionFactory`] serves registered result sets through the same
//! [`Connection`] / [`RowStream`] traits as a real backend, so extraction code
//! can be exercised without a database server.
//!
//! # Example
//!
//! ```rust,ignore
//! use sluice_rdbc::testing::MemoryConnectionFactory;
//!
//! let factory = MemoryConnectionFactory::new()
//!     .with_result("SELECT id FROM t", vec![ColumnMetadata::new("id", "BIGINT")], rows)
//!     .fail_after_chunks(2);
//!
//! // hand `factory` to whatever resolves connections, then inspect:
//! assert_eq!(factory.connect_count(), 1);
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::connection::{
    Connection, ConnectionConfig, ConnectionFactory, DatabaseType, RowStream, StreamFuture,
};
use crate::error::{Error, Result};
use crate::sql::{count_query, normalize_statement};
use crate::types::{ColumnMetadata, Row, Value};

#[derive(Debug, Clone)]
struct Dataset {
    columns: Vec<ColumnMetadata>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    datasets: Mutex<HashMap<String, Dataset>>,
    count_failure: Mutex<Option<String>>,
    connect_failure: Mutex<Option<String>>,
    fail_after_chunks: Mutex<Option<usize>>,
    connects: AtomicUsize,
    fetches: AtomicUsize,
    closed_streams: AtomicUsize,
    max_chunk_len: AtomicUsize,
}

impl MemoryState {
    fn lookup(&self, sql: &str) -> Option<Dataset> {
        self.datasets
            .lock()
            .get(normalize_statement(sql))
            .cloned()
    }

    /// Resolve `SELECT COUNT(*) FROM (<q>) AS subquery` against registered queries
    fn lookup_count(&self, sql: &str) -> Option<usize> {
        let sql = normalize_statement(sql);
        self.datasets
            .lock()
            .iter()
            .find(|(query, _)| count_query(query) == sql)
            .map(|(_, data)| data.rows.len())
    }
}

/// Connection factory serving in-memory result sets
#[derive(Debug, Clone)]
pub struct MemoryConnectionFactory {
    state: Arc<MemoryState>,
}

impl Default for MemoryConnectionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnectionFactory {
    /// Create an empty factory
    pub fn new() -> Self {
        Self {
            state: Arc::new(MemoryState::default()),
        }
    }

    /// Register the result of a query
    pub fn with_result(
        self,
        sql: &str,
        columns: Vec<ColumnMetadata>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.state.datasets.lock().insert(
            normalize_statement(sql).to_string(),
            Dataset { columns, rows },
        );
        self
    }

    /// Make every count query fail with the given message
    pub fn fail_count(self, message: impl Into<String>) -> Self {
        *self.state.count_failure.lock() = Some(message.into());
        self
    }

    /// Make every connection attempt fail with the given message
    pub fn fail_connect(self, message: impl Into<String>) -> Self {
        *self.state.connect_failure.lock() = Some(message.into());
        self
    }

    /// Make streams fail once `n` chunks have been served
    pub fn fail_after_chunks(self, n: usize) -> Self {
        *self.state.fail_after_chunks.lock() = Some(n);
        self
    }

    /// Number of connections opened so far
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Number of chunk fetches served so far (including the final empty one)
    pub fn fetch_count(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    /// Number of streams released, either by `close` or by drop
    pub fn closed_stream_count(&self) -> usize {
        self.state.closed_streams.load(Ordering::SeqCst)
    }

    /// Largest chunk served so far
    pub fn max_chunk_len(&self) -> usize {
        self.state.max_chunk_len.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        if let Some(message) = self.state.connect_failure.lock().clone() {
            return Err(Error::connection(message));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
        }))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }
}

/// Connection handed out by [`MemoryConnectionFactory`]
#[derive(Debug)]
pub struct MemoryConnection {
    state: Arc<MemoryState>,
}

fn to_rows(rows: Vec<Vec<Value>>) -> VecDeque<Row> {
    rows.into_iter().map(Row::new).collect()
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        if let Some(count) = self.state.lookup_count(sql) {
            if let Some(message) = self.state.count_failure.lock().clone() {
                return Err(Error::query_with_sql(message, sql));
            }
            return Ok(vec![Row::new(vec![Value::Int64(count as i64)])]);
        }

        match self.state.lookup(sql) {
            Some(data) => Ok(to_rows(data.rows).into()),
            None => Err(Error::query_with_sql("relation does not exist", sql)),
        }
    }

    async fn query_stream(&self, sql: &str, fetch_size: usize) -> Result<Box<dyn RowStream>> {
        if fetch_size == 0 {
            return Err(Error::config("fetch size must be at least 1"));
        }
        let data = self
            .state
            .lookup(sql)
            .ok_or_else(|| Error::query_with_sql("relation does not exist", sql))?;
        let fail_after = *self.state.fail_after_chunks.lock();

        Ok(Box::new(MemoryRowStream {
            state: Arc::clone(&self.state),
            rows: to_rows(data.rows),
            columns: data.columns,
            fetch_size,
            served: 0,
            fail_after,
            open: true,
        }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Row stream over a registered result set
#[derive(Debug)]
pub struct MemoryRowStream {
    state: Arc<MemoryState>,
    columns: Vec<ColumnMetadata>,
    rows: VecDeque<Row>,
    fetch_size: usize,
    served: usize,
    fail_after: Option<usize>,
    open: bool,
}

impl MemoryRowStream {
    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.state.closed_streams.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fetch(&mut self) -> Result<Option<Vec<Row>>> {
        if !self.open {
            return Ok(None);
        }
        self.state.fetches.fetch_add(1, Ordering::SeqCst);

        if self.fail_after == Some(self.served) {
            self.release();
            return Err(Error::cursor(format!(
                "connection lost after {} chunks",
                self.served
            )));
        }

        if self.rows.is_empty() {
            self.release();
            return Ok(None);
        }

        let take = self.fetch_size.min(self.rows.len());
        let chunk: Vec<Row> = self.rows.drain(..take).collect();
        self.served += 1;
        self.state.max_chunk_len.fetch_max(chunk.len(), Ordering::SeqCst);
        Ok(Some(chunk))
    }
}

impl RowStream for MemoryRowStream {
    fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    fn next_chunk(&mut self) -> StreamFuture<'_, Option<Vec<Row>>> {
        let result = self.fetch();
        Box::pin(async move { result })
    }

    fn close(&mut self) -> StreamFuture<'_, ()> {
        self.release();
        Box::pin(async { Ok(()) })
    }
}

impl Drop for MemoryRowStream {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new(
            DatabaseType::PostgreSQL,
            "localhost",
            5432,
            "test",
            "test",
            SecretString::from("pw"),
        )
    }

    fn factory(rows: usize) -> MemoryConnectionFactory {
        MemoryConnectionFactory::new().with_result(
            "SELECT id FROM t",
            vec![ColumnMetadata::new("id", "BIGINT")],
            (0..rows as i64).map(|i| vec![Value::Int64(i)]).collect(),
        )
    }

    #[tokio::test]
    async fn test_count_query_resolves() {
        let factory = factory(7);
        let conn = factory.connect(&config()).await.unwrap();
        let row = conn
            .query_one(&count_query("SELECT id FROM t;"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get(0).and_then(Value::as_i64), Some(7));
    }

    #[tokio::test]
    async fn test_stream_chunks() {
        let factory = factory(5);
        let conn = factory.connect(&config()).await.unwrap();
        let mut stream = conn.query_stream("SELECT id FROM t", 2).await.unwrap();
        assert_eq!(factory.fetch_count(), 0);

        let mut sizes = Vec::new();
        while let Some(chunk) = stream.next_chunk().await.unwrap() {
            sizes.push(chunk.len());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(factory.closed_stream_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let factory = factory(5).fail_after_chunks(1);
        let conn = factory.connect(&config()).await.unwrap();
        let mut stream = conn.query_stream("SELECT id FROM t", 2).await.unwrap();
        assert!(stream.next_chunk().await.unwrap().is_some());
        assert!(stream.next_chunk().await.is_err());
    }

    #[tokio::test]
    async fn test_drop_releases_stream() {
        let factory = factory(5);
        let conn = factory.connect(&config()).await.unwrap();
        let stream = conn.query_stream("SELECT id FROM t", 2).await.unwrap();
        drop(stream);
        assert_eq!(factory.closed_stream_count(), 1);
    }
}
