//! # Ticker News
//!
//! Collects per-day news about stock tickers from the Google News RSS search
//! feed, resolves each entry to its publisher page, extracts the article
//! text, and stores accepted articles in per-date Parquet files. A second
//! subcommand bulk-loads an aggregated Parquet file into PostgreSQL.
//!
//! ## Usage
//!
//! ```sh
//! ticker_news collect --start 2025-01-01 --end 2025-01-31 --tickers NVDA
//! ticker_news load --parquet-file News_Datas.parquet
//! ```
//!
//! ## Architecture
//!
//! For every ticker and every target day:
//! 1. **Feed**: query the RSS search with a one-day `after:`/`before:` window
//! 2. **Filter**: date tolerance window, NASDAQ trading days, title/link dedup
//! 3. **Resolve**: decode the aggregator link into the publisher URL
//! 4. **Extract**: download the page and pull out title, body and publish date
//! 5. **Output**: merge accepted rows into `<ticker>/NewsData/<ticker>_<date>.parquet`

use chrono::Duration;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod calendar;
mod cli;
mod collector;
mod config;
mod error;
mod filter;
mod loader;
mod models;
mod outputs;
mod scrapers;
mod stats;
mod utils;

use cli::{Cli, CollectArgs, Command, LoadArgs};
use collector::{CollectSettings, Collector};
use config::{DatabaseSettings, TickerConfig};
use scrapers::article::ArticleExtractor;
use scrapers::decoder::GoogleNewsDecoder;
use scrapers::google_news::GoogleNewsFeed;
use utils::Delays;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("ticker_news starting up");

    let args = Cli::parse();

    match args.command {
        Command::Collect(collect) => run_collect(collect).await?,
        Command::Load(load) => run_load(load).await?,
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

async fn run_collect(args: CollectArgs) -> Result<(), Box<dyn Error>> {
    debug!(?args, "Parsed collect arguments");
    let config = match TickerConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "Cannot read ticker config");
            return Err(e.into());
        }
    };

    let client = scrapers::http_client()?;
    let collector = Collector::new(
        GoogleNewsFeed::new(client.clone()),
        GoogleNewsDecoder::new(client.clone()),
        ArticleExtractor::new(client),
        CollectSettings {
            output_root: args.output_dir.clone(),
            tolerance: Duration::days(args.tolerance_days),
            delays: Delays::default(),
        },
    );

    info!(
        tickers = ?args.tickers,
        start = %args.start,
        end = %args.end,
        output = %args.output_dir.display(),
        "Collecting"
    );

    for ticker in &args.tickers {
        match collector
            .collect_ticker(ticker, &config, args.start, args.end)
            .await
        {
            Ok(stats) => info!(%ticker, accepted = stats.accepted, rows_added = stats.rows_added, "Ticker done"),
            Err(e) => error!(%ticker, error = %e, "Ticker collection aborted; continuing"),
        }
    }
    Ok(())
}

async fn run_load(args: LoadArgs) -> Result<(), Box<dyn Error>> {
    let settings = DatabaseSettings {
        user: args.db_user,
        password: args.db_password,
        host: args.db_host,
        port: args.db_port,
        name: args.db_name,
        url: args.database_url,
    };

    match loader::load_parquet(&settings, &args.parquet_file, &args.table).await {
        Ok(rows) => {
            info!(rows, table = %args.table, "Load complete");
            Ok(())
        }
        Err(e) => {
            error!(path = %args.parquet_file.display(), error = %e, "Load failed");
            Err(e.into())
        }
    }
}
