//! Google News RSS search.
//!
//! One request per target day, scoped with `after:`/`before:` operators to
//! the day before through the target day.

use super::FeedSource;
use crate::error::{NewsError, Result};
use crate::models::FeedEntry;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use reqwest::Client;
use tracing::{debug, info, instrument};

const SEARCH_URL: &str = "https://news.google.com/rss/search";

/// RSS search client for the aggregator.
#[derive(Debug, Clone)]
pub struct GoogleNewsFeed {
    client: Client,
    search_url: String,
}

impl GoogleNewsFeed {
    pub fn new(client: Client) -> Self {
        Self::with_search_url(client, SEARCH_URL)
    }

    pub fn with_search_url(client: Client, search_url: impl Into<String>) -> Self {
        Self {
            client,
            search_url: search_url.into(),
        }
    }
}

impl FeedSource for GoogleNewsFeed {
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, query: &str, day: NaiveDate) -> Result<Vec<FeedEntry>> {
        let url = build_search_url(&self.search_url, query, day);
        debug!(%url, "Fetching RSS search");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(NewsError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        let bytes = response.bytes().await?;
        let entries = parse_feed(&bytes)?;
        info!(count = entries.len(), "Fetched feed entries");
        Ok(entries)
    }
}

/// Build the search URL for `day`.
///
/// Terms are percent-encoded individually and joined with `+`.
pub fn build_search_url(search_url: &str, query: &str, day: NaiveDate) -> String {
    let terms = query
        .split_whitespace()
        .map(|t| urlencoding::encode(t).into_owned())
        .collect::<Vec<_>>()
        .join("+");
    let after = day - Duration::days(1);
    let before = day + Duration::days(1);
    format!(
        "{}?q={}+after:{}+before:{}&hl=en&gl=US&ceid=US:en",
        search_url,
        terms,
        after.format("%Y-%m-%d"),
        before.format("%Y-%m-%d")
    )
}

/// Parse an RSS document into feed entries, preserving feed order.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedEntry>> {
    let channel = rss::Channel::read_from(bytes)?;
    let entries = channel
        .items()
        .iter()
        .filter_map(|item| {
            let link = item.link()?.trim().to_string();
            Some(FeedEntry {
                title: item.title().unwrap_or_default().trim().to_string(),
                link,
                published: item.pub_date().and_then(parse_pub_date),
            })
        })
        .collect();
    Ok(entries)
}

/// Parse an RSS `pubDate`, keeping the wall-clock time of its own offset.
pub fn parse_pub_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.naive_local())
}
