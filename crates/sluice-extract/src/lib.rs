//! sluice-extract - Streaming extraction of query results to versioned files
//!
//! Runs a named SQL query against a configured relational source and writes
//! the complete result to one Parquet or CSV file, fetching and writing in
//! bounded chunks so memory stays flat regardless of result size.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ JobRunner            version dir, snapshot, metadata.json    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ ConnectionManager ─▶ ConnectionHandle (lazy, cached by name) │
//! │ RowCounter           advisory COUNT(*) for progress          │
//! │ ChunkedReader  ───▶  BatchStream (server-side cursor)        │
//! │ SchemaStableWriter ▶ FormatSink (ParquetSink | CsvSink)      │
//! │ ProgressSink         per-batch row counts                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ sluice-rdbc          connections, values, SQL helpers        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Library Usage
//!
//! ```rust,ignore
//! use sluice_extract::{JobRunner, RunOptions};
//!
//! let mut runner = JobRunner::from_file("pipeline_config.yaml")?;
//! let metadata = runner.run("daily_orders", &RunOptions::default()).await?;
//! println!("{} rows", metadata.rows);
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! sluice daily_orders
//! sluice daily_orders --version v1 --format csv --annotation "backfill"
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod convert;
pub mod counter;
pub mod error;
pub mod format;
pub mod job;
pub mod manager;
pub mod progress;
pub mod reader;
pub mod writer;

pub use config::{ConnectionSettings, ExecutionConfig, JobSpec, PipelineConfig, StorageConfig};
pub use counter::RowCounter;
pub use error::{ErrorCategory, ExtractError, Result};
pub use format::{FormatSink, FormatWriter, OutputCompression, OutputFormat, ParquetCompression};
pub use job::{git_hash, JobRunner, RunMetadata, RunOptions};
pub use manager::{ConnectionHandle, ConnectionManager};
pub use progress::{LogProgress, NoProgress, ProgressSink};
pub use reader::{BatchStream, ChunkedReader};
pub use writer::{SchemaStableWriter, WriterState};
