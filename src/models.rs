//! Data models for feed entries, extracted articles, and stored rows.
//!
//! - [`FeedEntry`]: one item of the aggregator's RSS search result
//! - [`ExtractedArticle`]: what the extractor pulled out of a publisher page
//! - [`NewsRecord`]: a row of a per-date Parquet file
//! - [`EntryOutcome`]: status-tagged result of processing one feed entry

use crate::error::NewsError;
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

/// A single item returned by the RSS search feed.
///
/// Transient: produced by the feed fetcher and consumed right away.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    /// Headline as reported by the aggregator.
    pub title: String,
    /// Aggregator redirect link.
    pub link: String,
    /// Aggregator-reported publish time, in the feed's own offset.
    pub published: Option<NaiveDateTime>,
}

/// Content extracted from a publisher page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedArticle {
    pub title: String,
    pub body: String,
    /// Publish time found in the page, if any.
    pub published: Option<NaiveDateTime>,
}

/// One row of a per-date article table.
///
/// Column order on disk is `title, date, link, body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsRecord {
    pub title: String,
    pub date: NaiveDate,
    pub link: String,
    pub body: String,
}

/// Why an entry was filtered out.
///
/// These are expected rejections, not faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Timestamp falls outside the target day's tolerance window.
    OutsideWindow,
    /// Effective date is not a trading day.
    MarketClosed,
    EmptyTitle,
    DuplicateTitle,
    DuplicateLink,
    /// Resolver produced no URL or the URL still points at the aggregator.
    Unresolved,
    EmptyBody,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::OutsideWindow => "outside_window",
            SkipReason::MarketClosed => "market_closed",
            SkipReason::EmptyTitle => "empty_title",
            SkipReason::DuplicateTitle => "duplicate_title",
            SkipReason::DuplicateLink => "duplicate_link",
            SkipReason::Unresolved => "unresolved",
            SkipReason::EmptyBody => "empty_body",
        };
        f.write_str(s)
    }
}

/// Result of running one feed entry through resolve, extract and filter.
#[derive(Debug)]
pub enum EntryOutcome {
    Accepted(NewsRecord),
    Skipped(SkipReason),
    Failed { link: String, error: NewsError },
}
