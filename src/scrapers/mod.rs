//! Upstream sources for the collection pipeline.
//!
//! Each stage sits behind a small trait so the collector can be driven by
//! fakes in tests:
//!
//! | Stage | Trait | Implementation |
//! |-------|-------|----------------|
//! | Feed search | [`FeedSource`] | [`google_news::GoogleNewsFeed`] |
//! | Redirect decoding | [`LinkResolver`] | [`decoder::GoogleNewsDecoder`] |
//! | Article download/parse | [`ArticleSource`] | [`article::ArticleExtractor`] |
//!
//! All calls are awaited one at a time; failures are returned to the
//! collector, which logs and skips the affected entry or day.

use crate::error::Result;
use crate::models::{ExtractedArticle, FeedEntry};
use chrono::NaiveDate;
use reqwest::Client;
use std::time::Duration;

pub mod article;
pub mod decoder;
pub mod google_news;

/// Host of the news aggregator.
pub const AGGREGATOR_HOST: &str = "news.google.com";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Search feed returning candidate entries for one target day.
pub trait FeedSource {
    async fn fetch(&self, query: &str, day: NaiveDate) -> Result<Vec<FeedEntry>>;
}

/// Turns an aggregator redirect link into the publisher URL.
pub trait LinkResolver {
    async fn resolve(&self, link: &str) -> Result<String>;
}

/// Downloads and parses publisher pages.
pub trait ArticleSource {
    async fn download(&self, url: &str) -> Result<String>;
    fn parse(&self, url: &str, html: &str) -> Result<ExtractedArticle>;
}

/// HTTP client shared by all sources.
pub fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(20))
        .build()?)
}

/// Whether `url` still points at the aggregator.
pub fn is_aggregator_url(url: &str) -> bool {
    url.contains(AGGREGATOR_HOST)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_aggregator_url() {
        assert!(is_aggregator_url("https://news.google.com/rss/articles/CBMi"));
        assert!(!is_aggregator_url("https://www.reuters.com/markets/nvidia"));
    }

    #[test]
    fn test_http_client_builds() {
        assert!(http_client().is_ok());
    }
}
