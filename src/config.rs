//! Ticker query configuration and database connection settings.

use crate::error::{NewsError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Per-ticker settings from `tickers.json`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TickerEntry {
    /// Search terms sent to the news feed, space separated.
    pub query: String,
}

/// Mapping from ticker symbol to its search settings.
///
/// ```json
/// { "NVDA": { "query": "NVIDIA stock" } }
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct TickerConfig {
    tickers: BTreeMap<String, TickerEntry>,
}

impl TickerConfig {
    /// Load the ticker configuration from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to `tickers.json`
    ///
    /// # Errors
    ///
    /// * [`NewsError::ConfigRead`] if the file cannot be read
    /// * [`NewsError::ConfigParse`] if it is not a `{ ticker: { query } }` map
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| NewsError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&raw).map_err(|source| NewsError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(tickers = config.tickers.len(), "Loaded ticker config");
        Ok(config)
    }

    pub fn from_json(raw: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Search query for `ticker`, or [`NewsError::UnknownTicker`].
    pub fn query_for(&self, ticker: &str) -> Result<&str> {
        self.tickers
            .get(ticker)
            .map(|entry| entry.query.as_str())
            .ok_or_else(|| NewsError::UnknownTicker(ticker.to_string()))
    }
}

/// PostgreSQL connection parameters for the bulk loader.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    /// Full URL; wins over the individual parts when set.
    pub url: Option<String>,
}

impl DatabaseSettings {
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            self.name
        )
    }
}

/// Where per-ticker output directories live.
pub fn news_dir(output_root: &Path, ticker: &str) -> PathBuf {
    output_root.join(ticker).join("NewsData")
}
