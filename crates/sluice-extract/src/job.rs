//! Job execution
//!
//! [`JobRunner::run`] drives one extraction from configuration to a versioned
//! artifact directory:
//!
//! ```text
//! <base_path>/<job>/<version>/
//!     data.parquet | data.csv[.gz|.zst|.snappy|.lz4]
//!     snapshot_config.yaml
//!     metadata.json
//! ```
//!
//! Every file of the version directory is removed again if the run fails
//! after the data file was created.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::counter::RowCounter;
use crate::error::{ExtractError, Result};
use crate::format::OutputFormat;
use crate::manager::ConnectionManager;
use crate::progress::LogProgress;
use crate::reader::ChunkedReader;
use crate::writer::SchemaStableWriter;
use sluice_rdbc::connection::ConnectionFactory;

/// File name of the configuration snapshot
pub const SNAPSHOT_FILE: &str = "snapshot_config.yaml";

/// File name of the run metadata
pub const METADATA_FILE: &str = "metadata.json";

/// Per-run options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Explicit version label; a timestamp is used when absent
    pub version: Option<String>,
    /// Free-text note recorded in the metadata
    pub annotation: String,
    /// Format override
    pub format: Option<OutputFormat>,
    /// Invocation recorded in the metadata
    pub command: String,
}

/// Provenance record written next to the data file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Job name
    pub job: String,
    /// Version label
    pub version: String,
    /// Output format
    pub format: OutputFormat,
    /// Rows written
    pub rows: u64,
    /// Wall-clock duration, rounded to two decimals
    pub duration_sec: f64,
    /// Commit hash of the working directory, or "unknown"
    pub git_hash: String,
    /// Free-text note
    pub annotation: String,
    /// Invocation
    pub command: String,
}

/// Runs jobs from one configuration
#[derive(Debug)]
pub struct JobRunner {
    config: PipelineConfig,
    config_path: Option<PathBuf>,
    manager: ConnectionManager,
}

impl JobRunner {
    /// Create a runner over an already loaded configuration
    pub fn new(config: PipelineConfig) -> Self {
        let manager = ConnectionManager::new(config.connections.clone());
        Self {
            config,
            config_path: None,
            manager,
        }
    }

    /// Load the configuration file and create a runner over it
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = PipelineConfig::from_file(&path)?;
        let mut runner = Self::new(config);
        runner.config_path = Some(path);
        Ok(runner)
    }

    /// Resolve credentials through a custom lookup
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.manager = self.manager.with_env(env);
        self
    }

    /// Use one connection factory for every connection
    pub fn with_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.manager = self.manager.with_factory(factory);
        self
    }

    /// Loaded configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Connection manager shared by all runs of this runner
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Run `job` and return its metadata
    pub async fn run(&mut self, job: &str, options: &RunOptions) -> Result<RunMetadata> {
        let started = Instant::now();
        let spec = self.config.job(job)?.clone();

        let explicit = options.version.is_some();
        let version = options
            .version
            .clone()
            .unwrap_or_else(|| Local::now().format("%Y%m%d_%H%M%S").to_string());
        validate_label("version", &version)?;
        validate_label("job", job)?;

        let dir = self.config.storage.base_path.join(job).join(&version);
        if explicit && dir.exists() {
            return Err(ExtractError::VersionConflict {
                job: job.to_string(),
                version,
                path: dir,
            });
        }
        std::fs::create_dir_all(&dir)?;

        let format = options.format.unwrap_or(self.config.storage.default_format);
        let mut writer = SchemaStableWriter::for_format(format, &self.config.storage);
        let data_path = dir.join(format!("data{}", writer.extension()));
        info!(job, version = %version, format = %format, "starting extraction to {}", dir.display());

        let handle = self.manager.get_connection(&spec.connection)?;
        let total = RowCounter.estimate_row_count(&handle, &spec.query).await;
        if total > 0 {
            info!(job, "source reports {} rows", total);
        }

        let reader = ChunkedReader::new(handle, spec.query.as_str(), self.config.execution.chunk_size)?;
        let mut progress = LogProgress::new(format!("Extracting ({})", format), total);
        let written = writer
            .write(reader.stream().into_stream(), &data_path, &mut progress)
            .await;

        let outcome = match written {
            Ok(rows) => self.record(&dir, job, &version, format, rows, started, options),
            Err(e) => Err(e),
        };
        let metadata = match outcome {
            Ok(metadata) => metadata,
            Err(e) => {
                error!(job, "extraction failed: {}", e);
                for partial in [data_path.clone(), dir.join(SNAPSHOT_FILE), dir.join(METADATA_FILE)] {
                    remove_partial(&partial);
                }
                return Err(e);
            }
        };

        info!(
            job,
            rows = metadata.rows,
            duration_sec = metadata.duration_sec,
            "extraction finished: {}",
            data_path.display()
        );
        Ok(metadata)
    }

    /// Write the configuration snapshot and metadata next to a finished data file
    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        dir: &Path,
        job: &str,
        version: &str,
        format: OutputFormat,
        rows: u64,
        started: Instant,
        options: &RunOptions,
    ) -> Result<RunMetadata> {
        self.write_snapshot(&dir.join(SNAPSHOT_FILE))?;
        let metadata = RunMetadata {
            job: job.to_string(),
            version: version.to_string(),
            format,
            rows,
            duration_sec: round2(started.elapsed().as_secs_f64()),
            git_hash: git_hash(),
            annotation: options.annotation.clone(),
            command: options.command.clone(),
        };
        let json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| ExtractError::config(format!("failed to encode metadata: {}", e)))?;
        std::fs::write(dir.join(METADATA_FILE), json)?;
        Ok(metadata)
    }

    fn write_snapshot(&self, target: &Path) -> Result<()> {
        match &self.config_path {
            Some(source) => {
                std::fs::copy(source, target)?;
            }
            None => {
                let yaml = serde_yaml::to_string(&self.config)
                    .map_err(|e| ExtractError::config(format!("failed to encode config: {}", e)))?;
                std::fs::write(target, yaml)?;
            }
        }
        Ok(())
    }
}

/// Labels become directory names and must stay inside the base path
fn validate_label(kind: &str, label: &str) -> Result<()> {
    let bad = label.is_empty()
        || label == "."
        || label == ".."
        || label.contains(['/', '\\']);
    if bad {
        return Err(ExtractError::config(format!(
            "{} '{}' is not a valid directory name",
            kind, label
        )));
    }
    Ok(())
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove partial output {}: {}", path.display(), e),
    }
}

fn round2(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}

/// Commit hash of the working directory, or `"unknown"`
pub fn git_hash() -> String {
    Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
