//! Parquet format writer
//!
//! The columnar sink. The Arrow schema of the first batch becomes the file
//! schema and every batch is flushed as its own row group, so a file written
//! from `k` non-empty batches has exactly `k` row groups. The footer is only
//! written by [`FormatSink::finish`]; an unfinished file is not readable.
//!
//! # Example
//!
//! ```rust,ignore
//! use sluice_extract::format::{ParquetWriter, ParquetWriterConfig, ParquetCompression, FormatWriter};
//!
//! let writer = ParquetWriter::new(ParquetWriterConfig {
//!     compression: ParquetCompression::Zstd,
//!     ..Default::default()
//! });
//!
//! let mut sink = writer.open(Box::new(file), schema)?;
//! sink.write(&batch)?;
//! sink.finish()?;
//! ```

use super::{FormatError, FormatSink, FormatWriter, OutputTarget};
use arrow_array::RecordBatch;
use arrow_schema::SchemaRef;
use parquet::{
    arrow::ArrowWriter,
    basic::Compression,
    file::properties::{EnabledStatistics, WriterProperties},
};
use serde::{Deserialize, Serialize};
use std::io::Write as _;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during Parquet operations
#[derive(Error, Debug)]
pub enum ParquetError {
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Parquet write error: {0}")]
    Write(#[from] parquet::errors::ParquetError),
}

/// Result type for Parquet operations
pub type ParquetResult<T> = Result<T, ParquetError>;

/// Compression codec for Parquet files
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    /// No compression
    None,
    /// Snappy compression (fast, moderate ratio)
    #[default]
    Snappy,
    /// Gzip compression (slower, better ratio)
    Gzip,
    /// LZ4 compression (very fast, lower ratio)
    Lz4,
    /// Zstd compression (good balance of speed and ratio)
    Zstd,
    /// Brotli compression (best ratio, slowest)
    Brotli,
}

impl ParquetCompression {
    fn to_parquet_compression(self) -> Compression {
        match self {
            ParquetCompression::None => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(Default::default()),
            ParquetCompression::Lz4 => Compression::LZ4,
            ParquetCompression::Zstd => Compression::ZSTD(Default::default()),
            ParquetCompression::Brotli => Compression::BROTLI(Default::default()),
        }
    }
}

impl std::fmt::Display for ParquetCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParquetCompression::None => "none",
            ParquetCompression::Snappy => "snappy",
            ParquetCompression::Gzip => "gzip",
            ParquetCompression::Lz4 => "lz4",
            ParquetCompression::Zstd => "zstd",
            ParquetCompression::Brotli => "brotli",
        };
        f.write_str(name)
    }
}

/// Configuration for Parquet writer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParquetWriterConfig {
    /// Compression codec to use
    #[serde(default)]
    pub compression: ParquetCompression,

    /// Whether to write statistics in footer
    #[serde(default = "default_enable_statistics")]
    pub enable_statistics: bool,

    /// Data page size in bytes (default: 1MB)
    #[serde(default = "default_data_page_size")]
    pub data_page_size: usize,

    /// Dictionary page size limit in bytes (default: 1MB)
    #[serde(default = "default_dictionary_page_size")]
    pub dictionary_page_size: usize,
}

fn default_enable_statistics() -> bool {
    true
}

fn default_data_page_size() -> usize {
    1_048_576 // 1MB
}

fn default_dictionary_page_size() -> usize {
    1_048_576 // 1MB
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            compression: ParquetCompression::default(),
            enable_statistics: default_enable_statistics(),
            data_page_size: default_data_page_size(),
            dictionary_page_size: default_dictionary_page_size(),
        }
    }
}

/// Parquet writer: opens [`ParquetSink`]s with a fixed set of properties
#[derive(Debug, Clone)]
pub struct ParquetWriter {
    config: ParquetWriterConfig,
}

impl ParquetWriter {
    /// Create a new Parquet writer with the given configuration
    pub fn new(config: ParquetWriterConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &ParquetWriterConfig {
        &self.config
    }

    /// Build writer properties from config
    fn build_writer_properties(&self) -> WriterProperties {
        // Row groups are cut explicitly after each batch, never by size
        let mut builder = WriterProperties::builder()
            .set_compression(self.config.compression.to_parquet_compression())
            .set_data_page_size_limit(self.config.data_page_size)
            .set_dictionary_page_size_limit(self.config.dictionary_page_size)
            .set_max_row_group_size(usize::MAX);

        if !self.config.enable_statistics {
            builder = builder.set_statistics_enabled(EnabledStatistics::None);
        }

        builder.build()
    }
}

impl FormatWriter for ParquetWriter {
    fn name(&self) -> &'static str {
        "parquet"
    }

    fn extension(&self) -> String {
        ".parquet".to_string()
    }

    fn open(
        &self,
        output: OutputTarget,
        schema: SchemaRef,
    ) -> Result<Box<dyn FormatSink>, FormatError> {
        let props = self.build_writer_properties();
        let writer = ArrowWriter::try_new(output, schema, Some(props)).map_err(ParquetError::from)?;
        debug!(compression = %self.config.compression, "opened parquet sink");
        Ok(Box::new(ParquetSink {
            writer,
            row_groups: 0,
        }))
    }
}

/// Open Parquet file accepting batches of one schema
pub struct ParquetSink {
    writer: ArrowWriter<OutputTarget>,
    row_groups: usize,
}

impl ParquetSink {
    fn write_row_group(&mut self, batch: &RecordBatch) -> ParquetResult<()> {
        if batch.num_rows() == 0 {
            return Ok(());
        }
        self.writer.write(batch)?;
        self.writer.flush()?;
        self.row_groups += 1;
        Ok(())
    }
}

impl FormatSink for ParquetSink {
    fn write(&mut self, batch: &RecordBatch) -> Result<(), FormatError> {
        Ok(self.write_row_group(batch)?)
    }

    fn finish(self: Box<Self>) -> Result<(), FormatError> {
        let row_groups = self.row_groups;
        let mut output = self.writer.into_inner().map_err(ParquetError::from)?;
        output.flush()?;
        debug!(row_groups, "finalized parquet file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{ArrayRef, Float64Array, Int64Array, StringArray};
    use arrow_schema::{DataType, Field, Schema};
    use parquet::file::metadata::ParquetMetaData;
    use parquet::file::reader::{FileReader, SerializedFileReader};
    use std::fs::File;
    use std::sync::Arc;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("name", DataType::Utf8, true),
            Field::new("score", DataType::Float64, true),
        ]))
    }

    fn batch(start: i64, len: i64) -> RecordBatch {
        let ids: Vec<i64> = (start..start + len).collect();
        let names: Vec<String> = ids.iter().map(|i| format!("user-{}", i)).collect();
        let scores: Vec<f64> = ids.iter().map(|i| *i as f64 * 0.5).collect();
        RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(Int64Array::from(ids)) as ArrayRef,
                Arc::new(StringArray::from(names)) as ArrayRef,
                Arc::new(Float64Array::from(scores)) as ArrayRef,
            ],
        )
        .unwrap()
    }

    /// Write batches to a temporary file and return its bytes and footer
    fn write_all(
        config: ParquetWriterConfig,
        batches: &[RecordBatch],
    ) -> (Vec<u8>, ParquetMetaData) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.parquet");

        let writer = ParquetWriter::new(config);
        let file = File::create(&path).unwrap();
        let mut sink = writer.open(Box::new(file), schema()).unwrap();
        for b in batches {
            sink.write(b).unwrap();
        }
        sink.finish().unwrap();

        let reader = SerializedFileReader::new(File::open(&path).unwrap()).unwrap();
        let metadata = reader.metadata().clone();
        (std::fs::read(&path).unwrap(), metadata)
    }

    #[test]
    fn test_one_row_group_per_batch() {
        let (_, metadata) = write_all(
            ParquetWriterConfig::default(),
            &[batch(0, 100), batch(100, 100), batch(200, 17)],
        );
        assert_eq!(metadata.num_row_groups(), 3);
        assert_eq!(metadata.file_metadata().num_rows(), 217);
        assert_eq!(metadata.row_group(2).num_rows(), 17);
    }

    #[test]
    fn test_empty_batch_writes_schema_only() {
        let (_, metadata) = write_all(
            ParquetWriterConfig::default(),
            &[RecordBatch::new_empty(schema())],
        );
        assert_eq!(metadata.num_row_groups(), 0);
        assert_eq!(metadata.file_metadata().schema_descr().num_columns(), 3);
    }

    #[test]
    fn test_output_is_deterministic() {
        let batches = [batch(0, 50), batch(50, 50)];
        let (a, _) = write_all(ParquetWriterConfig::default(), &batches);
        let (b, _) = write_all(ParquetWriterConfig::default(), &batches);
        assert_eq!(a, b);
    }

    #[test]
    fn test_compression_codecs() {
        for compression in [
            ParquetCompression::None,
            ParquetCompression::Snappy,
            ParquetCompression::Gzip,
            ParquetCompression::Lz4,
            ParquetCompression::Zstd,
            ParquetCompression::Brotli,
        ] {
            let (bytes, metadata) = write_all(
                ParquetWriterConfig {
                    compression,
                    ..Default::default()
                },
                &[batch(0, 10)],
            );
            assert_eq!(&bytes[..4], b"PAR1", "bad header for {}", compression);
            assert_eq!(metadata.file_metadata().num_rows(), 10);
        }
    }

    #[test]
    fn test_writer_properties_disable_statistics() {
        let writer = ParquetWriter::new(ParquetWriterConfig {
            enable_statistics: false,
            ..Default::default()
        });
        let props = writer.build_writer_properties();
        assert_eq!(
            props.statistics_enabled(&parquet::schema::types::ColumnPath::from("id")),
            EnabledStatistics::None
        );
    }
}
