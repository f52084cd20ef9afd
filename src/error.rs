//! Error type shared by the collector and the bulk loader.
//!
//! Configuration problems abort a ticker (or the whole run when the config
//! file itself is unreadable). Everything else is recovered at the entry or
//! day level by the caller and only surfaces in logs and stats.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NewsError {
    #[error("failed to read ticker config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid ticker config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("'{0}' is not present in the ticker config")]
    UnknownTicker(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to parse RSS feed: {0}")]
    Feed(#[from] rss::Error),

    #[error("failed to decode aggregator link: {0}")]
    Decode(String),

    #[error("failed to extract article: {0}")]
    Extract(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("required column '{0}' is missing")]
    MissingColumn(String),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, NewsError>;
