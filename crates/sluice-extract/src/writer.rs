//! Schema-stable incremental writer
//!
//! [`SchemaStableWriter`] drains a batch stream into one data file. The first
//! batch locks the schema and creates the file; each later batch must have the
//! same field names and types or the write aborts with
//! [`ExtractError::SchemaMismatch`].
//!
//! ```text
//!  Unlocked ──(first batch)──▶ Locked ──(batch*)──▶ Locked ──(exhausted)──▶ Closed
//!       └────────────── any error ──────────────▶ Aborted
//! ```
//!
//! On abort the file handle is released before the error is returned; the
//! partially written file stays on disk for the caller to remove.

use arrow_array::RecordBatch;
use arrow_schema::{Schema, SchemaRef};
use futures::{Stream, TryStreamExt};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::{ExtractError, Result};
use crate::format::{CsvWriter, FormatSink, FormatWriter, OutputFormat, ParquetWriter};
use crate::progress::ProgressSink;

/// Writer lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum WriterState {
    /// No batch seen yet
    Unlocked,
    /// Schema fixed by the first batch
    Locked(SchemaRef),
    /// Output finalized
    Closed,
    /// A write failed; terminal
    Aborted,
}

fn describe(schema: &Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| format!("{}: {}", f.name(), f.data_type()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Field names and types must match exactly; nullability and metadata are ignored
fn same_shape(locked: &Schema, batch: &Schema) -> bool {
    locked.fields().len() == batch.fields().len()
        && locked
            .fields()
            .iter()
            .zip(batch.fields().iter())
            .all(|(a, b)| a.name() == b.name() && a.data_type() == b.data_type())
}

/// Drains a batch stream into a single file of one format
pub struct SchemaStableWriter {
    format: Box<dyn FormatWriter>,
    state: WriterState,
}

impl SchemaStableWriter {
    /// Create a writer for the given format
    pub fn new(format: Box<dyn FormatWriter>) -> Self {
        Self {
            format,
            state: WriterState::Unlocked,
        }
    }

    /// Create a writer for `format` with the storage options applied
    pub fn for_format(format: OutputFormat, storage: &StorageConfig) -> Self {
        match format {
            OutputFormat::Parquet => {
                Self::new(Box::new(ParquetWriter::new(storage.parquet_writer_config())))
            }
            OutputFormat::Csv => Self::new(Box::new(CsvWriter::new(storage.csv_writer_config()))),
        }
    }

    /// Current state
    pub fn state(&self) -> &WriterState {
        &self.state
    }

    /// Format name
    pub fn format_name(&self) -> &'static str {
        self.format.name()
    }

    /// File extension for this writer's output, including compression suffix
    pub fn extension(&self) -> String {
        self.format.extension()
    }

    /// Consume `batches` to the end and write them to `path`.
    ///
    /// Returns the number of rows written. An empty stream still produces a
    /// file: Parquet without columns, or an empty CSV.
    pub async fn write<S>(
        &mut self,
        batches: S,
        path: &Path,
        progress: &mut dyn ProgressSink,
    ) -> Result<u64>
    where
        S: Stream<Item = Result<RecordBatch>> + Unpin,
    {
        if self.state != WriterState::Unlocked {
            return Err(ExtractError::config("writer has already been used"));
        }

        match self.drain(batches, path, progress).await {
            Ok(total) => {
                self.state = WriterState::Closed;
                progress.finish();
                info!(rows = total, path = %path.display(), "wrote {} output", self.format.name());
                Ok(total)
            }
            Err(e) => {
                self.state = WriterState::Aborted;
                Err(e)
            }
        }
    }

    fn open(&self, path: &Path, schema: SchemaRef) -> Result<Box<dyn FormatSink>> {
        let file = File::create(path)?;
        debug!(path = %path.display(), columns = schema.fields().len(), "schema locked");
        Ok(self.format.open(Box::new(BufWriter::new(file)), schema)?)
    }

    async fn drain<S>(
        &mut self,
        mut batches: S,
        path: &Path,
        progress: &mut dyn ProgressSink,
    ) -> Result<u64>
    where
        S: Stream<Item = Result<RecordBatch>> + Unpin,
    {
        let mut sink: Option<Box<dyn FormatSink>> = None;
        let mut total: u64 = 0;
        let mut index = 0usize;

        while let Some(batch) = batches.try_next().await? {
            match &self.state {
                WriterState::Unlocked => {
                    let schema = batch.schema();
                    sink = Some(self.open(path, schema.clone())?);
                    self.state = WriterState::Locked(schema);
                }
                WriterState::Locked(locked) => {
                    if !same_shape(locked, batch.schema_ref()) {
                        return Err(ExtractError::SchemaMismatch {
                            batch: index,
                            expected: describe(locked),
                            found: describe(batch.schema_ref()),
                        });
                    }
                }
                WriterState::Closed | WriterState::Aborted => {
                    return Err(ExtractError::config("writer is no longer accepting batches"));
                }
            }

            if let Some(sink) = sink.as_mut() {
                sink.write(&batch)?;
            }
            let rows = batch.num_rows();
            total += rows as u64;
            index += 1;
            progress.on_batch(rows);
        }

        let sink = match sink {
            Some(sink) => sink,
            None => self.open(path, Arc::new(Schema::empty()))?,
        };
        sink.finish()?;
        debug!(batches = index, rows = total, "output finalized");
        Ok(total)
    }
}
