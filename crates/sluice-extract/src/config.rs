//! Configuration for sluice
//!
//! Example configuration:
//!
//! ```yaml
//! connections:
//!   warehouse:
//!     driver: postgresql
//!     host: db.internal
//!     port: 5432
//!     database: analytics
//!     username: etl
//!     password_env: WAREHOUSE_PASSWORD
//!
//! jobs:
//!   daily_orders:
//!     connection: warehouse
//!     query: SELECT * FROM orders WHERE created_at >= current_date - 1
//!
//! storage:
//!   base_path: ./data
//!   default_format: parquet
//!   default_compression: snappy
//!   csv_compression: none
//!
//! execution:
//!   chunk_size: 50000
//! ```
//!
//! The historical key names `drivername` and `password_env_var` are accepted
//! as aliases. Secrets never appear in the file: `password_env` names the
//! environment variable that holds the password.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ExtractError, Result};
use crate::format::{
    CsvWriterConfig, OutputCompression, OutputFormat, ParquetCompression, ParquetWriterConfig,
};

/// Complete pipeline configuration document
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Named connections
    #[serde(default)]
    pub connections: HashMap<String, ConnectionSettings>,

    /// Named jobs
    #[serde(default)]
    pub jobs: HashMap<String, JobSpec>,

    /// Output storage settings
    pub storage: StorageConfig,

    /// Execution tuning
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// A named connection. Holds a reference to the credential, never the credential.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    /// Driver name (`postgresql`, `postgresql+psycopg2`, ...)
    #[serde(alias = "drivername")]
    pub driver: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Database name
    pub database: String,

    /// User name
    pub username: String,

    /// Name of the environment variable holding the password
    #[serde(alias = "password_env_var")]
    pub password_env: String,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// A job: one query against one connection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobSpec {
    /// Connection name
    pub connection: String,

    /// Query text
    pub query: String,
}

/// Output storage settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root of the `<job>/<version>` directory tree
    pub base_path: PathBuf,

    /// Format used when the run does not override it
    #[serde(default)]
    pub default_format: OutputFormat,

    /// Parquet codec
    #[serde(default)]
    pub default_compression: ParquetCompression,

    /// Whole-file compression for CSV output (none unless set)
    #[serde(default)]
    pub csv_compression: OutputCompression,

    /// Further Parquet options (the codec comes from `default_compression`)
    #[serde(default)]
    pub parquet: ParquetWriterConfig,

    /// Further CSV options (compression comes from `csv_compression`)
    #[serde(default)]
    pub csv: CsvWriterConfig,
}

impl StorageConfig {
    /// Parquet options with the configured codec applied
    pub fn parquet_writer_config(&self) -> ParquetWriterConfig {
        ParquetWriterConfig {
            compression: self.default_compression,
            ..self.parquet.clone()
        }
    }

    /// CSV options with the configured whole-file compression applied
    pub fn csv_writer_config(&self) -> CsvWriterConfig {
        CsvWriterConfig {
            compression: self.csv_compression,
            ..self.csv.clone()
        }
    }
}

/// Execution tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Maximum rows per batch
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    50_000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExtractError::config(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| ExtractError::config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.execution.chunk_size == 0 {
            return Err(ExtractError::config("execution.chunk_size must be at least 1"));
        }
        if self.storage.base_path.as_os_str().is_empty() {
            return Err(ExtractError::config("storage.base_path must not be empty"));
        }
        for (name, job) in &self.jobs {
            if job.query.trim().is_empty() {
                return Err(ExtractError::config(format!("job '{}' has an empty query", name)));
            }
        }
        Ok(())
    }

    /// Look up a job by name
    pub fn job(&self, name: &str) -> Result<&JobSpec> {
        self.jobs
            .get(name)
            .ok_or_else(|| ExtractError::config(format!("job '{}' not found", name)))
    }
}
