//! Per-ticker collection counters.

use crate::models::EntryOutcome;
use std::time::Duration;

/// Counters for one ticker's collection run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionStats {
    /// Target days processed.
    pub days: usize,
    /// Feed entries seen.
    pub entries: usize,
    pub accepted: usize,
    /// Entries dropped by the filters (expected).
    pub skipped: usize,
    /// Entries that hit a resolution or extraction error.
    pub failed: usize,
    /// Days whose feed request itself failed.
    pub feed_failures: usize,
    /// Partition files written.
    pub files_written: usize,
    /// Rows newly added across all partitions.
    pub rows_added: usize,
    /// Partition writes that failed.
    pub write_failures: usize,
    pub elapsed: Duration,
}

impl CollectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &EntryOutcome) {
        self.entries += 1;
        match outcome {
            EntryOutcome::Accepted(_) => self.accepted += 1,
            EntryOutcome::Skipped(_) => self.skipped += 1,
            EntryOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Share of entries that ended up accepted (%).
    pub fn acceptance_rate(&self) -> f64 {
        if self.entries == 0 {
            0.0
        } else {
            (self.accepted as f64 / self.entries as f64) * 100.0
        }
    }

    pub fn log_summary(&self, ticker: &str) {
        tracing::info!(
            ticker,
            days = self.days,
            entries = self.entries,
            accepted = self.accepted,
            skipped = self.skipped,
            failed = self.failed,
            feed_failures = self.feed_failures,
            files_written = self.files_written,
            rows_added = self.rows_added,
            write_failures = self.write_failures,
            acceptance_rate = format!("{:.1}%", self.acceptance_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "Collection finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NewsError;
    use crate::models::SkipReason;

    #[test]
    fn test_record_outcomes() {
        let mut stats = CollectionStats::new();
        stats.record(&EntryOutcome::Skipped(SkipReason::DuplicateTitle));
        stats.record(&EntryOutcome::Failed {
            link: "l".into(),
            error: NewsError::Decode("x".into()),
        });
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.acceptance_rate(), 0.0);
    }

    #[test]
    fn test_acceptance_rate_empty() {
        assert_eq!(CollectionStats::new().acceptance_rate(), 0.0);
    }
}
