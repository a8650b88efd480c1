//! Progress reporting
//!
//! A [`ProgressSink`] observes the row count of every batch the writer
//! persists. It cannot fail and has no influence on the run; swapping it out
//! (e.g. for [`NoProgress`] or a closure in tests) changes nothing else.

use std::time::{Duration, Instant};
use tracing::info;

/// Observer fed with per-batch row counts
pub trait ProgressSink: Send {
    /// Called after each batch has been written
    fn on_batch(&mut self, rows: usize);

    /// Called once after the last batch
    fn finish(&mut self) {}
}

impl<F> ProgressSink for F
where
    F: FnMut(usize) + Send,
{
    fn on_batch(&mut self, rows: usize) {
        self(rows)
    }
}

/// Discards all progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_batch(&mut self, _rows: usize) {}
}

/// Renders progress through `tracing`, at most once per interval
#[derive(Debug)]
pub struct LogProgress {
    label: String,
    total: u64,
    rows: u64,
    interval: Duration,
    last_report: Option<Instant>,
}

impl LogProgress {
    /// Default minimum time between two progress lines
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

    /// Create a reporter. A `total` of zero means unknown.
    pub fn new(label: impl Into<String>, total: u64) -> Self {
        Self {
            label: label.into(),
            total,
            rows: 0,
            interval: Self::DEFAULT_INTERVAL,
            last_report: None,
        }
    }

    /// Set the minimum time between two progress lines
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Rows observed so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Bounded (`rows/total (pct%)`) or unbounded (`rows`) rendering
    pub fn render(&self) -> String {
        if self.total > 0 {
            let pct = self.rows as f64 * 100.0 / self.total as f64;
            format!("{}/{} rows ({:.1}%)", self.rows, self.total, pct)
        } else {
            format!("{} rows", self.rows)
        }
    }
}

impl ProgressSink for LogProgress {
    fn on_batch(&mut self, rows: usize) {
        self.rows += rows as u64;
        let due = self
            .last_report
            .map_or(true, |last| last.elapsed() >= self.interval);
        if due {
            self.last_report = Some(Instant::now());
            info!("{}: {}", self.label, self.render());
        }
    }

    fn finish(&mut self) {
        info!("{}: {} (done)", self.label, self.render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_rendering() {
        let mut progress = LogProgress::new("Extracting (Parquet)", 200);
        progress.on_batch(50);
        assert_eq!(progress.render(), "50/200 rows (25.0%)");
        progress.on_batch(150);
        assert_eq!(progress.render(), "200/200 rows (100.0%)");
    }

    #[test]
    fn test_unbounded_rendering_when_total_unknown() {
        let mut progress = LogProgress::new("Extracting (CSV)", 0);
        progress.on_batch(1_000);
        progress.on_batch(24);
        assert_eq!(progress.rows(), 1_024);
        assert_eq!(progress.render(), "1024 rows");
    }

    #[test]
    fn test_estimate_may_be_exceeded() {
        let mut progress = LogProgress::new("x", 10).with_interval(Duration::ZERO);
        progress.on_batch(15);
        assert_eq!(progress.render(), "15/10 rows (150.0%)");
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |rows: usize| seen.push(rows);
            sink.on_batch(3);
            sink.on_batch(4);
            sink.finish();
        }
        assert_eq!(seen, vec![3, 4]);
    }
}
