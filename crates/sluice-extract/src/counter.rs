//! Advisory row counting
//!
//! The count sizes the progress display and nothing else. Zero means
//! "unknown", not "empty".

use sluice_rdbc::sql::count_query;
use tracing::{debug, warn};

use crate::error::{ExtractError, Result};
use crate::manager::ConnectionHandle;

/// Best-effort row count estimator
#[derive(Debug, Default, Clone, Copy)]
pub struct RowCounter;

impl RowCounter {
    /// Count the rows `query` would return, or 0 if that cannot be determined.
    ///
    /// Runs on its own connection, which is closed before returning. Failures
    /// are logged as warnings and never propagated.
    pub async fn estimate_row_count(&self, handle: &ConnectionHandle, query: &str) -> u64 {
        match self.try_count(handle, query).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Could not determine total row count: {}", e);
                0
            }
        }
    }

    /// Count the rows `query` would return
    pub async fn try_count(&self, handle: &ConnectionHandle, query: &str) -> Result<u64> {
        let sql = count_query(query);
        debug!(connection = handle.name(), "{}", sql);

        let conn = handle.connect().await.map_err(ExtractError::CountEstimation)?;
        let result = conn.query_one(&sql).await;
        if let Err(e) = conn.close().await {
            debug!("closing count connection failed: {}", e);
        }

        let row = result
            .map_err(ExtractError::CountEstimation)?
            .ok_or_else(|| {
                ExtractError::CountEstimation(sluice_rdbc::Error::query_with_sql(
                    "count query returned no rows",
                    sql.clone(),
                ))
            })?;

        row.get(0)
            .and_then(|v| v.as_i64())
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| {
                ExtractError::CountEstimation(sluice_rdbc::Error::type_conversion(
                    "count query did not return a non-negative integer",
                ))
            })
    }
}
