//! Per-ticker collection loop.
//!
//! For each target day: fetch the feed, run every entry through
//! filter → resolve → extract → filter, then merge the accepted records into
//! the per-date Parquet partitions and pause before the next day.
//!
//! Seen titles and links live in a [`SeenSets`] owned by one
//! [`Collector::collect_ticker`] call, so nothing leaks between tickers.

use crate::calendar::TradingCalendar;
use crate::config::{TickerConfig, news_dir};
use crate::error::{NewsError, Result};
use crate::filter::{DateWindow, SeenSets, check_date};
use crate::models::{EntryOutcome, FeedEntry, NewsRecord, SkipReason};
use crate::outputs::parquet::{group_by_date, write_partition};
use crate::scrapers::{ArticleSource, FeedSource, LinkResolver, is_aggregator_url};
use crate::stats::CollectionStats;
use crate::utils::{Delays, ensure_writable_dir, pause, truncate_for_log};
use chrono::{Duration, NaiveDate};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Knobs for a collection run.
#[derive(Debug, Clone)]
pub struct CollectSettings {
    /// Directory holding the `<ticker>/NewsData` trees.
    pub output_root: PathBuf,
    /// Slack around the target day.
    pub tolerance: Duration,
    pub delays: Delays,
}

impl Default for CollectSettings {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            tolerance: Duration::days(1),
            delays: Delays::default(),
        }
    }
}

/// Filters that apply to every entry of one target day.
struct DayContext<'a> {
    window: DateWindow,
    calendar: &'a TradingCalendar,
}

/// Why an entry did not make it through the pipeline.
enum Rejected {
    Skip(SkipReason),
    Error(NewsError),
}

impl From<SkipReason> for Rejected {
    fn from(reason: SkipReason) -> Self {
        Rejected::Skip(reason)
    }
}

impl From<NewsError> for Rejected {
    fn from(error: NewsError) -> Self {
        Rejected::Error(error)
    }
}

/// Drives the pipeline over a feed, a link resolver and an article source.
pub struct Collector<F, R, A> {
    feed: F,
    resolver: R,
    articles: A,
    settings: CollectSettings,
}

impl<F, R, A> Collector<F, R, A>
where
    F: FeedSource,
    R: LinkResolver,
    A: ArticleSource,
{
    pub fn new(feed: F, resolver: R, articles: A, settings: CollectSettings) -> Self {
        Self {
            feed,
            resolver,
            articles,
            settings,
        }
    }

    /// Collect news for `ticker` on every day in `start..=end`.
    ///
    /// Each day issues one feed request; every entry then goes through the
    /// aggregator-stage filters, link resolution, article extraction and the
    /// effective-date filters. Accepted records are merged into their date
    /// partitions under `settings.output_root`.
    ///
    /// # Arguments
    ///
    /// * `ticker` - Symbol to collect, looked up in `config`
    /// * `config` - Ticker query configuration
    /// * `start` - First target day (inclusive)
    /// * `end` - Last target day (inclusive)
    ///
    /// # Returns
    ///
    /// Counters for the run. Feed, entry and write failures are logged and
    /// counted here rather than returned.
    ///
    /// # Errors
    ///
    /// * [`NewsError::UnknownTicker`] when `ticker` has no query; nothing is
    ///   created on disk in that case
    /// * [`NewsError::Io`] when the output directory cannot be created or
    ///   written
    #[instrument(level = "info", skip(self, config))]
    pub async fn collect_ticker(
        &self,
        ticker: &str,
        config: &TickerConfig,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CollectionStats> {
        let query = config.query_for(ticker)?;
        ensure_writable_dir(&news_dir(&self.settings.output_root, ticker)).await?;

        let started = Instant::now();
        let calendar = TradingCalendar::nasdaq(start, end);
        let days: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();
        let mut seen = SeenSets::new();
        let mut stats = CollectionStats::new();

        info!(%query, days = days.len(), open_days = calendar.len(), "Starting collection");

        for (i, day) in days.iter().copied().enumerate() {
            stats.days += 1;
            let progress = format!("{}/{}", i + 1, days.len());
            info!(%progress, after = %(day - Duration::days(1)), target_day = %day, "Fetching feed");

            match self.feed.fetch(query, day).await {
                Ok(entries) => {
                    info!(%progress, target_day = %day, count = entries.len(), "Feed entries");
                    let ctx = DayContext {
                        window: DateWindow::around(day, self.settings.tolerance),
                        calendar: &calendar,
                    };
                    let mut records = Vec::new();
                    for entry in &entries {
                        let outcome = self.process_entry(entry, &ctx, &mut seen).await;
                        stats.record(&outcome);
                        if let EntryOutcome::Accepted(record) = outcome {
                            records.push(record);
                        }
                    }
                    self.write_records(ticker, records, &mut stats).await;
                }
                Err(e) => {
                    stats.feed_failures += 1;
                    error!(target_day = %day, error = %e, "Feed fetch failed; skipping day");
                }
            }

            pause(self.settings.delays.after_day).await;
        }

        stats.elapsed = started.elapsed();
        debug!(seen_links = seen.len(), "Seen-set size at end of run");
        stats.log_summary(ticker);
        Ok(stats)
    }

    /// Run one entry through both filter passes, resolution and extraction.
    async fn process_entry(
        &self,
        entry: &FeedEntry,
        ctx: &DayContext<'_>,
        seen: &mut SeenSets,
    ) -> EntryOutcome {
        match self.try_entry(entry, ctx, seen).await {
            Ok(record) => {
                debug!(link = %record.link, date = %record.date, "Accepted article");
                EntryOutcome::Accepted(record)
            }
            Err(Rejected::Skip(reason)) => {
                debug!(link = %entry.link, %reason, "Skipped entry");
                EntryOutcome::Skipped(reason)
            }
            Err(Rejected::Error(error)) => {
                warn!(
                    link = %entry.link,
                    title = %truncate_for_log(&entry.title, 120),
                    error = %error,
                    "Entry failed; skipping"
                );
                EntryOutcome::Failed {
                    link: entry.link.clone(),
                    error,
                }
            }
        }
    }

    async fn try_entry(
        &self,
        entry: &FeedEntry,
        ctx: &DayContext<'_>,
        seen: &mut SeenSets,
    ) -> std::result::Result<NewsRecord, Rejected> {
        let reported = entry.published.ok_or(SkipReason::OutsideWindow)?;
        check_date(reported, &ctx.window, ctx.calendar)?;
        seen.admit_entry(&entry.title, &entry.link)?;

        let resolved = self.resolver.resolve(&entry.link).await;
        pause(self.settings.delays.after_resolve).await;
        let url = resolved?;
        if url.is_empty() || is_aggregator_url(&url) {
            return Err(SkipReason::Unresolved.into());
        }
        seen.admit_link(&url)?;

        let html = self.articles.download(&url).await?;
        pause(self.settings.delays.after_download).await;
        let article = self.articles.parse(&url, &html)?;

        let effective = article.published.unwrap_or(reported);
        check_date(effective, &ctx.window, ctx.calendar)?;

        let body = article.body.trim();
        if body.is_empty() {
            return Err(SkipReason::EmptyBody.into());
        }
        let title = match article.title.trim() {
            "" => entry.title.clone(),
            t => t.to_string(),
        };

        Ok(NewsRecord {
            title,
            date: effective.date(),
            link: url,
            body: body.to_string(),
        })
    }

    /// Merge one day's accepted records into their date partitions.
    async fn write_records(&self, ticker: &str, records: Vec<NewsRecord>, stats: &mut CollectionStats) {
        if records.is_empty() {
            info!("No news to save");
            return;
        }

        for (date, group) in group_by_date(records) {
            let root = self.settings.output_root.clone();
            let ticker_owned = ticker.to_string();
            let written = tokio::task::spawn_blocking(move || {
                write_partition(&root, &ticker_owned, date, group)
            })
            .await
            .map_err(NewsError::from)
            .and_then(|r| r);

            match written {
                Ok(write) => {
                    debug!(
                        path = %write.path.display(),
                        rows = write.rows,
                        added = write.added,
                        merged = write.merged,
                        "Partition written"
                    );
                    stats.files_written += 1;
                    stats.rows_added += write.added;
                }
                Err(e) => {
                    stats.write_failures += 1;
                    error!(%date, error = %e, "Failed to write partition");
                }
            }
        }
    }
}
