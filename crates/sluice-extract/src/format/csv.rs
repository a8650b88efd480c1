//! CSV format writer
//!
//! The row-text sink. The header row is written once, when the sink is opened
//! with the locked schema; every batch after that only appends rows. Output can
//! be wrapped in a whole-file compression stream (see
//! [`OutputCompression`]); it is uncompressed unless configured otherwise.
//!
//! # Features
//!
//! - Configurable delimiter (comma, tab, semicolon, pipe)
//! - RFC 4180 compliant quoting and escaping
//! - Configurable null representation (empty by default)
//! - Values rendered with Arrow's display formatting (ISO dates and timestamps)

use super::{CompressedOutput, FormatError, FormatSink, FormatWriter, OutputCompression, OutputTarget};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use arrow_array::{Array, RecordBatch};
use arrow_schema::SchemaRef;
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use thiserror::Error;

/// Errors that can occur during CSV operations
#[derive(Error, Debug)]
pub enum CsvWriterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for CSV operations
pub type CsvWriterResult<T> = Result<T, CsvWriterError>;

/// CSV delimiter options
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CsvDelimiter {
    /// Comma (,) - standard CSV
    #[default]
    Comma,
    /// Tab (\t) - TSV format
    Tab,
    /// Semicolon (;) - common in European locales
    Semicolon,
    /// Pipe (|) - useful when data contains commas
    Pipe,
}

impl CsvDelimiter {
    fn as_char(self) -> char {
        match self {
            CsvDelimiter::Comma => ',',
            CsvDelimiter::Tab => '\t',
            CsvDelimiter::Semicolon => ';',
            CsvDelimiter::Pipe => '|',
        }
    }
}

/// Line ending style
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CsvLineEnding {
    /// Unix-style line endings (\n)
    #[default]
    Lf,
    /// Windows-style line endings (\r\n) - RFC 4180 standard
    Crlf,
}

impl CsvLineEnding {
    fn as_str(self) -> &'static str {
        match self {
            CsvLineEnding::Lf => "\n",
            CsvLineEnding::Crlf => "\r\n",
        }
    }
}

/// Configuration for CSV writer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CsvWriterConfig {
    /// Field delimiter
    #[serde(default)]
    pub delimiter: CsvDelimiter,

    /// Quote character (default: double quote)
    #[serde(default = "default_quote_char")]
    pub quote_char: char,

    /// Always quote fields, even if not necessary
    #[serde(default)]
    pub always_quote: bool,

    /// Line ending style
    #[serde(default)]
    pub line_ending: CsvLineEnding,

    /// Null value representation
    #[serde(default)]
    pub null_value: String,

    /// Whole-file compression
    #[serde(default)]
    pub compression: OutputCompression,
}

fn default_quote_char() -> char {
    '"'
}

impl Default for CsvWriterConfig {
    fn default() -> Self {
        Self {
            delimiter: CsvDelimiter::default(),
            quote_char: default_quote_char(),
            always_quote: false,
            line_ending: CsvLineEnding::default(),
            null_value: String::new(),
            compression: OutputCompression::None,
        }
    }
}

impl CsvWriterConfig {
    /// Escape a field value according to RFC 4180
    fn escape_field(&self, field: &str) -> String {
        let delimiter = self.delimiter.as_char();
        let quote = self.quote_char;

        let needs_quoting = self.always_quote
            || field.contains(delimiter)
            || field.contains(quote)
            || field.contains('\n')
            || field.contains('\r');

        if needs_quoting {
            // Escape quotes by doubling them
            let escaped = field.replace(quote, &format!("{}{}", quote, quote));
            format!("{}{}{}", quote, escaped, quote)
        } else {
            field.to_string()
        }
    }
}

/// CSV writer: opens [`CsvSink`]s
#[derive(Debug, Clone, Default)]
pub struct CsvWriter {
    config: CsvWriterConfig,
}

impl CsvWriter {
    /// Create a new CSV writer with the given configuration
    pub fn new(config: CsvWriterConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &CsvWriterConfig {
        &self.config
    }
}

impl FormatWriter for CsvWriter {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn extension(&self) -> String {
        super::full_extension(".csv", &self.config.compression)
    }

    fn open(
        &self,
        output: OutputTarget,
        schema: SchemaRef,
    ) -> Result<Box<dyn FormatSink>, FormatError> {
        let output = self
            .config
            .compression
            .wrap(BufWriter::new(output))
            .map_err(CsvWriterError::from)?;
        let mut sink = CsvSink {
            config: self.config.clone(),
            output,
            line: String::new(),
        };
        sink.write_header(&schema)?;
        Ok(Box::new(sink))
    }
}

/// Open CSV destination whose header has been written
pub struct CsvSink {
    config: CsvWriterConfig,
    output: CompressedOutput<BufWriter<OutputTarget>>,
    line: String,
}

impl CsvSink {
    fn write_header(&mut self, schema: &SchemaRef) -> CsvWriterResult<()> {
        // A schema without columns has no header line
        if schema.fields().is_empty() {
            return Ok(());
        }
        let header: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| self.config.escape_field(f.name()))
            .collect();
        self.write_line(&header.join(&self.config.delimiter.as_char().to_string()))
    }

    fn write_line(&mut self, line: &str) -> CsvWriterResult<()> {
        self.output.write_all(line.as_bytes())?;
        self.output
            .write_all(self.config.line_ending.as_str().as_bytes())?;
        Ok(())
    }

    fn write_rows(&mut self, batch: &RecordBatch) -> CsvWriterResult<()> {
        let options = FormatOptions::default();
        let columns = batch.columns();
        let formatters = columns
            .iter()
            .map(|c| ArrayFormatter::try_new(c.as_ref(), &options))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CsvWriterError::Serialization(e.to_string()))?;
        let delimiter = self.config.delimiter.as_char();

        let mut line = std::mem::take(&mut self.line);
        for row in 0..batch.num_rows() {
            line.clear();
            for (idx, (column, formatter)) in columns.iter().zip(&formatters).enumerate() {
                if idx > 0 {
                    line.push(delimiter);
                }
                if column.is_null(row) {
                    line.push_str(&self.config.escape_field(&self.config.null_value));
                    continue;
                }
                let value = formatter
                    .value(row)
                    .try_to_string()
                    .map_err(|e| CsvWriterError::Serialization(e.to_string()))?;
                line.push_str(&self.config.escape_field(&value));
            }
            self.write_line(&line)?;
        }
        self.line = line;
        Ok(())
    }
}

impl FormatSink for CsvSink {
    fn write(&mut self, batch: &RecordBatch) -> Result<(), FormatError> {
        Ok(self.write_rows(batch)?)
    }

    fn finish(self: Box<Self>) -> Result<(), FormatError> {
        let mut output = self.output.finish()?;
        output.flush()?;
        Ok(())
    }
}
