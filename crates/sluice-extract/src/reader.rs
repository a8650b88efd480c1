//! Chunked, cursor-backed reading
//!
//! [`ChunkedReader::stream`] returns a [`BatchStream`]: a lazy, single-pass,
//! forward-only sequence of Arrow batches. Nothing touches the source until
//! the first [`BatchStream::next_batch`] call, and each call fetches exactly
//! one chunk, so at most one chunk of rows is held at a time.
//!
//! ```text
//!  Pending ──(first pull: connect, declare cursor)──▶ Open
//!  Open ──(chunk)──▶ Open
//!  Open ──(exhausted | error | close)──▶ Closed
//! ```
//!
//! A zero-row result still yields one empty batch so the schema reaches the
//! writer. Dropping a stream before it is exhausted releases the cursor.

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use futures::stream::{self, BoxStream, StreamExt};
use sluice_rdbc::connection::{Connection, RowStream};
use tracing::{debug, warn};

use crate::convert::{rows_to_batch, schema_for};
use crate::error::{ExtractError, Result};
use crate::manager::ConnectionHandle;

/// Produces batch streams for one query
#[derive(Debug, Clone)]
pub struct ChunkedReader {
    handle: ConnectionHandle,
    query: String,
    chunk_size: usize,
}

impl ChunkedReader {
    /// Create a reader. `chunk_size` must be at least 1.
    pub fn new(handle: ConnectionHandle, query: impl Into<String>, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ExtractError::config("chunk size must be at least 1"));
        }
        Ok(Self {
            handle,
            query: query.into(),
            chunk_size,
        })
    }

    /// Maximum rows per batch
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Start a new pass over the query. Each call re-executes it.
    pub fn stream(&self) -> BatchStream {
        BatchStream {
            handle: self.handle.clone(),
            query: self.query.clone(),
            chunk_size: self.chunk_size,
            state: StreamState::Pending,
            batches: 0,
        }
    }
}

enum StreamState {
    Pending,
    Open {
        conn: Box<dyn Connection>,
        rows: Box<dyn RowStream>,
        schema: SchemaRef,
    },
    Closed,
}

/// Lazy sequence of batches over an open cursor
pub struct BatchStream {
    handle: ConnectionHandle,
    query: String,
    chunk_size: usize,
    state: StreamState,
    batches: usize,
}

impl BatchStream {
    /// Whether the stream has reached its terminal state
    pub fn is_closed(&self) -> bool {
        matches!(self.state, StreamState::Closed)
    }

    async fn open(&mut self) -> Result<()> {
        let conn = self.handle.connect().await?;
        let rows = match conn.query_stream(&self.query, self.chunk_size).await {
            Ok(rows) => rows,
            Err(e) => {
                let _ = conn.close().await;
                return Err(e.into());
            }
        };
        let schema = schema_for(rows.columns());
        debug!(
            connection = self.handle.name(),
            columns = schema.fields().len(),
            chunk_size = self.chunk_size,
            "cursor opened"
        );
        self.state = StreamState::Open { conn, rows, schema };
        Ok(())
    }

    /// Pull the next batch. `Ok(None)` once the result is exhausted.
    ///
    /// Any error closes the stream; later calls return `Ok(None)`.
    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if let StreamState::Pending = self.state {
            if let Err(e) = self.open().await {
                self.state = StreamState::Closed;
                return Err(e);
            }
        }

        let (chunk, schema) = match &mut self.state {
            StreamState::Open { rows, schema, .. } => (rows.next_chunk().await, schema.clone()),
            _ => return Ok(None),
        };

        match chunk {
            Ok(Some(rows)) => match rows_to_batch(&schema, &rows) {
                Ok(batch) => {
                    self.batches += 1;
                    Ok(Some(batch))
                }
                Err(e) => {
                    self.abort();
                    Err(e.into())
                }
            },
            Ok(None) => {
                self.close().await?;
                if self.batches == 0 {
                    self.batches = 1;
                    return Ok(Some(RecordBatch::new_empty(schema)));
                }
                Ok(None)
            }
            Err(e) => {
                self.abort();
                Err(e.into())
            }
        }
    }

    /// Release the cursor and connection. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if let StreamState::Open { conn, mut rows, .. } =
            std::mem::replace(&mut self.state, StreamState::Closed)
        {
            let closed = rows.close().await;
            drop(rows);
            if let Err(e) = conn.close().await {
                warn!("closing source connection failed: {}", e);
            }
            closed?;
        }
        Ok(())
    }

    /// Drop the cursor without waiting for a clean close
    fn abort(&mut self) {
        self.state = StreamState::Closed;
    }

    /// Adapt into a `futures` stream; the stream ends after the first error
    pub fn into_stream(self) -> BoxStream<'static, Result<RecordBatch>> {
        stream::unfold(Some(self), |state| async move {
            let mut reader = state?;
            match reader.next_batch().await {
                Ok(Some(batch)) => Some((Ok(batch), Some(reader))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
        .boxed()
    }
}
