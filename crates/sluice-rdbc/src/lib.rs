//! # sluice-rdbc
//!
//! Relational database connectivity for the sluice extraction engine.
//!
//! This crate provides a small, backend-neutral interface for reading large
//! query results without materialising them in memory.
//!
//! ## Features
//!
//! - **Cursor Streaming**: server-side cursors fetched in bounded chunks
//! - **Portable Types**: one value model and one SQL type vocabulary for all backends
//! - **Credential Hygiene**: passwords held as secrets, never formatted into URLs or logs
//! - **Test Backend**: in-memory connections with failure injection
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sluice_rdbc::prelude::*;
//!
//! let config = ConnectionConfig::new(
//!     DatabaseType::from_driver("postgresql")?,
//!     "localhost",
//!     5432,
//!     "warehouse",
//!     "etl",
//!     password,
//! );
//!
//! let conn = PgConnectionFactory.connect(&config).await?;
//! let mut stream = conn.query_stream("SELECT * FROM orders", 50_000).await?;
//! while let Some(rows) = stream.next_chunk().await? {
//!     // at most 50_000 rows per chunk
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `postgres` - PostgreSQL support via tokio-postgres (default)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod sql;
pub mod testing;
pub mod types;

// Backend implementations (conditionally compiled)
#[cfg(feature = "postgres")]
pub mod postgres;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Value and type system
    pub use crate::types::{sql_types, ColumnMetadata, Row, Value};

    // Connection traits and config
    pub use crate::connection::{
        Connection, ConnectionConfig, ConnectionFactory, DatabaseType, RowStream,
    };

    // SQL helpers
    pub use crate::sql::{count_query, normalize_statement};

    #[cfg(feature = "postgres")]
    pub use crate::postgres::PgConnectionFactory;
}

// Re-export commonly used items at crate root
pub use error::{Error, Result};
pub use types::Value;
