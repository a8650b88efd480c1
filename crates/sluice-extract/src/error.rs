//! Error types for sluice-extract
//!
//! Every failure of an extraction run maps onto one [`ErrorCategory`]. Only
//! count estimation is non-fatal; it is caught where it happens and downgraded
//! to a warning, so in practice it never reaches the caller.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::format::FormatError;

/// Result type alias for extraction operations
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing file, connection, job, or invalid setting
    Config,
    /// Unresolved credential
    Security,
    /// Advisory row count could not be obtained
    CountEstimation,
    /// Failure while pulling a batch from the source
    Streaming,
    /// Failure while serializing or flushing a batch
    Write,
    /// Destination version already exists
    VersionConflict,
}

impl ErrorCategory {
    /// Whether errors in this category abort the run
    #[inline]
    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::CountEstimation)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "config"),
            Self::Security => write!(f, "security"),
            Self::CountEstimation => write!(f, "count_estimation"),
            Self::Streaming => write!(f, "streaming"),
            Self::Write => write!(f, "write"),
            Self::VersionConflict => write!(f, "version_conflict"),
        }
    }
}

/// Main error type for sluice-extract
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential could not be resolved. Carries the variable name, never its value.
    #[error("security error: {0}")]
    Security(String),

    /// Row count estimation failed
    #[error("row count estimation failed: {0}")]
    CountEstimation(#[source] sluice_rdbc::Error),

    /// Pulling a batch from the source failed
    #[error("streaming error: {message}")]
    Streaming {
        /// Description of the failure
        message: String,
        /// Underlying cause
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serializing or flushing a batch failed
    #[error("write error: {0}")]
    Write(#[from] FormatError),

    /// A batch does not match the schema locked by the first batch
    #[error("schema mismatch in batch {batch}: expected [{expected}], found [{found}]")]
    SchemaMismatch {
        /// Zero-based index of the offending batch
        batch: usize,
        /// Locked schema
        expected: String,
        /// Schema of the offending batch
        found: String,
    },

    /// The requested version directory already exists
    #[error("version '{version}' of job '{job}' already exists at {}", path.display())]
    VersionConflict {
        /// Job name
        job: String,
        /// Requested version label
        version: String,
        /// Existing directory
        path: PathBuf,
    },

    /// IO error outside the data file (directories, snapshots, metadata)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Config,
            Self::Security(_) => ErrorCategory::Security,
            Self::CountEstimation(_) => ErrorCategory::CountEstimation,
            Self::Streaming { .. } => ErrorCategory::Streaming,
            Self::Write(_) | Self::SchemaMismatch { .. } | Self::Io(_) => ErrorCategory::Write,
            Self::VersionConflict { .. } => ErrorCategory::VersionConflict,
        }
    }

    /// Whether this error aborts the run
    pub fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a security error
    pub fn security(message: impl Into<String>) -> Self {
        Self::Security(message.into())
    }

    /// Create a streaming error without an underlying cause
    pub fn streaming(message: impl Into<String>) -> Self {
        Self::Streaming {
            message: message.into(),
            source: None,
        }
    }
}

impl From<sluice_rdbc::Error> for ExtractError {
    fn from(err: sluice_rdbc::Error) -> Self {
        Self::Streaming {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<arrow_schema::ArrowError> for ExtractError {
    fn from(err: arrow_schema::ArrowError) -> Self {
        Self::Streaming {
            message: format!("failed to build batch: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_count_estimation_is_non_fatal() {
        assert!(!ErrorCategory::CountEstimation.is_fatal());
        for category in [
            ErrorCategory::Config,
            ErrorCategory::Security,
            ErrorCategory::Streaming,
            ErrorCategory::Write,
            ErrorCategory::VersionConflict,
        ] {
            assert!(category.is_fatal(), "{} should be fatal", category);
        }
    }

    #[test]
    fn test_rdbc_error_becomes_streaming() {
        let err: ExtractError = sluice_rdbc::Error::cursor("fetch failed").into();
        assert_eq!(err.category(), ErrorCategory::Streaming);
        assert!(err.to_string().contains("fetch failed"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_schema_mismatch_is_write_category() {
        let err = ExtractError::SchemaMismatch {
            batch: 2,
            expected: "id: Int64".into(),
            found: "id: Utf8".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Write);
        assert!(err.to_string().contains("batch 2"));
    }

    #[test]
    fn test_version_conflict_display() {
        let err = ExtractError::VersionConflict {
            job: "orders".into(),
            version: "v1".into(),
            path: PathBuf::from("/data/orders/v1"),
        };
        assert_eq!(
            err.to_string(),
            "version 'v1' of job 'orders' already exists at /data/orders/v1"
        );
    }
}
