//! Crawl pacing, string helpers and output directory checks.
//!
//! - Randomized politeness delays between upstream requests
//! - String truncation and whitespace cleanup for logs and extracted text
//! - Output directory creation with a write probe

use once_cell::sync::Lazy;
use rand::{Rng, rng};
use regex::Regex;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, instrument};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Inclusive range for a randomized pause, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn millis(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn none() -> Self {
        Self::millis(0, 0)
    }

    /// Draw one delay from the range.
    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng().random_range(self.min_ms..=self.max_ms))
    }
}

/// Pauses between upstream calls.
///
/// The production values keep the request rate against the aggregator and
/// publishers low; tests use [`Delays::none`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delays {
    /// After every link resolution.
    pub after_resolve: DelayRange,
    /// Between article download and parse.
    pub after_download: DelayRange,
    /// After each target day's cycle.
    pub after_day: DelayRange,
}

impl Delays {
    pub const fn none() -> Self {
        Self {
            after_resolve: DelayRange::none(),
            after_download: DelayRange::none(),
            after_day: DelayRange::none(),
        }
    }
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            after_resolve: DelayRange::millis(1_500, 2_000),
            after_download: DelayRange::millis(1_500, 2_000),
            after_day: DelayRange::millis(2_500, 5_000),
        }
    }
}

/// Sleep for a random duration drawn from `range`.
pub async fn pause(range: DelayRange) {
    let delay = range.sample();
    if delay.is_zero() {
        return;
    }
    debug!(?delay, "Pausing");
    tokio::time::sleep(delay).await;
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a char boundary) with
/// `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then writes and removes a
/// probe file.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path).await?;
    let probe = path.join("..__probe_write__");
    fs::write(&probe, b"").await?;
    let _ = fs::remove_file(&probe).await;
    Ok(())
}
