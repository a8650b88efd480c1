//! Output formats for extracted batches
//!
//! Formats are **how** batches are serialized; the
//! [`SchemaStableWriter`](crate::writer::SchemaStableWriter) decides **when**
//! the destination is opened, checked and finalized.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    SchemaStableWriter                           │
//! │  locks the schema on the first batch, owns the data file        │
//! └───────────────────────────┬─────────────────────────────────────┘
//!                             │ opens
//!                             ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Format Sinks                                 │
//! │  ParquetSink (columnar), CsvSink (row text + compression)       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Available Formats
//!
//! | Format | Extension | Compression | One unit per batch |
//! |--------|-----------|-------------|--------------------|
//! | Parquet | `.parquet` | in-file codec (snappy default) | row group |
//! | CSV | `.csv[.gz\|.zst\|.snappy\|.lz4]` | whole-file wrapper (none default) | rows, header once |

pub mod csv;
pub mod output_compression;
pub mod parquet;

pub use csv::{CsvDelimiter, CsvLineEnding, CsvSink, CsvWriter, CsvWriterConfig, CsvWriterError};
pub use output_compression::{full_extension, CompressedOutput, OutputCompression};
pub use parquet::{ParquetCompression, ParquetError, ParquetSink, ParquetWriter, ParquetWriterConfig};

use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Destination byte stream handed to a format sink
pub type OutputTarget = Box<dyn Write + Send>;

/// Factory for format sinks.
///
/// A `FormatWriter` holds the format options; [`FormatWriter::open`] binds
/// them to a destination and a schema once that schema is known.
pub trait FormatWriter: Send + Sync {
    /// Format name ("parquet", "csv")
    fn name(&self) -> &'static str;

    /// File extension including any compression suffix (e.g. ".csv.gz")
    fn extension(&self) -> String;

    /// Open a sink over `output` that accepts batches with exactly `schema`
    fn open(
        &self,
        output: OutputTarget,
        schema: SchemaRef,
    ) -> Result<Box<dyn FormatSink>, FormatError>;
}

/// An open, schema-bound destination
pub trait FormatSink: Send {
    /// Append one batch
    fn write(&mut self, batch: &RecordBatch) -> Result<(), FormatError>;

    /// Finalize the output (footer, compression trailer) and release it
    fn finish(self: Box<Self>) -> Result<(), FormatError>;
}

/// Errors that can occur during format operations
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("CSV error: {0}")]
    Csv(#[from] CsvWriterError),
}

/// Output format selection
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Apache Parquet columnar format
    #[default]
    Parquet,
    /// CSV (Comma-Separated Values)
    Csv,
}

impl OutputFormat {
    /// Format name as recorded in run metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Parquet => "parquet",
            OutputFormat::Csv => "csv",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
